use std::backtrace::Backtrace;
use std::error::Error;
use std::fmt;

use cpl::error::CplError;

/// Result type for maintenance commands.
pub type MaintenanceResult<T> = Result<T, MaintenanceError>;

/// Captured backtrace wrapper to avoid thiserror's unstable feature detection.
pub struct CapturedBacktrace(Backtrace);

impl CapturedBacktrace {
    fn capture() -> Self {
        Self(Backtrace::capture())
    }
}

impl fmt::Debug for CapturedBacktrace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error type for the maintenance binary.
///
/// Wraps [`CplError`] for index errors and provides variants for setup errors.
#[derive(Debug)]
pub enum MaintenanceError {
    /// Index maintenance, recompute or query error.
    Cpl(CplError),
    /// Configuration or telemetry setup error.
    Config(Box<dyn Error + Send + Sync>, CapturedBacktrace),
    /// Database connection error.
    Database(sqlx::Error, CapturedBacktrace),
    /// I/O error.
    Io(std::io::Error, CapturedBacktrace),
}

impl MaintenanceError {
    /// Returns a short category label for this error.
    pub fn category(&self) -> &'static str {
        match self {
            MaintenanceError::Cpl(_) => "index error",
            MaintenanceError::Config(_, _) => "configuration error",
            MaintenanceError::Database(_, _) => "database error",
            MaintenanceError::Io(_, _) => "i/o error",
        }
    }

    /// Creates a configuration error from any error.
    pub fn config<E: Error + Send + Sync + 'static>(err: E) -> Self {
        MaintenanceError::Config(Box::new(err), CapturedBacktrace::capture())
    }
}

impl fmt::Display for MaintenanceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaintenanceError::Cpl(err) => write!(f, "{err}"),
            MaintenanceError::Config(source, _) => write!(f, "configuration error: {source}"),
            MaintenanceError::Database(source, _) => write!(f, "database error: {source}"),
            MaintenanceError::Io(source, _) => write!(f, "i/o error: {source}"),
        }
    }
}

impl Error for MaintenanceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MaintenanceError::Cpl(err) => err.source(),
            MaintenanceError::Config(source, _) => Some(source.as_ref()),
            MaintenanceError::Database(source, _) => Some(source),
            MaintenanceError::Io(source, _) => Some(source),
        }
    }
}

impl From<CplError> for MaintenanceError {
    fn from(err: CplError) -> Self {
        MaintenanceError::Cpl(err)
    }
}

impl From<sqlx::Error> for MaintenanceError {
    fn from(err: sqlx::Error) -> Self {
        MaintenanceError::Database(err, CapturedBacktrace::capture())
    }
}

impl From<std::io::Error> for MaintenanceError {
    fn from(err: std::io::Error) -> Self {
        MaintenanceError::Io(err, CapturedBacktrace::capture())
    }
}
