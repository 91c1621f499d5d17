//! Error types and result definitions for index maintenance.
//!
//! [`CplError`] carries a classification ([`ErrorKind`]), a static description, optional
//! dynamic detail, an optional source error and the callsite where it was raised. Handlers
//! inspect the kind to decide whether a failure is tolerable (a read-only store) or must be
//! reported to the caller (a failed commit).

use std::backtrace::Backtrace;
use std::borrow::Cow;
use std::error;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

/// Convenient result type for index operations using [`CplError`] as the error type.
pub type CplResult<T> = Result<T, CplError>;

/// Detailed payload stored for every [`CplError`].
#[derive(Debug, Clone)]
struct ErrorPayload {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<Cow<'static, str>>,
    source: Option<Arc<dyn error::Error + Send + Sync>>,
    location: &'static Location<'static>,
    backtrace: Arc<Backtrace>,
}

/// Main error type for index maintenance, recompute and queries.
#[derive(Debug, Clone)]
pub struct CplError {
    payload: ErrorPayload,
}

/// Categories of errors raised while maintaining or reading the index.
#[derive(PartialEq, Eq, Copy, Clone, Debug, Hash)]
#[non_exhaustive]
pub enum ErrorKind {
    // Connection errors
    StorageConnectionFailed,

    // Query and execution errors
    StorageQueryFailed,
    StorageLockTimeout,
    StorageSchemaError,

    // Transaction errors
    TransactionFailed,
    ReadOnlyStorage,

    // Data errors
    ConstraintViolation,
    ConversionError,
    InvalidData,

    // Configuration and setup errors
    ConfigError,
    MigrationFailed,
    IoError,

    // State errors
    InvalidState,

    Unknown,

    /// Raised by fault injection in tests.
    #[cfg(feature = "failpoints")]
    InjectedFailure,
}

impl CplError {
    /// Returns the [`ErrorKind`] of this error.
    pub fn kind(&self) -> ErrorKind {
        self.payload.kind
    }

    /// Returns the static description of this error.
    pub fn description(&self) -> &str {
        &self.payload.description
    }

    /// Returns the detailed error information if available.
    pub fn detail(&self) -> Option<&str> {
        self.payload.detail.as_deref()
    }

    /// Returns the captured backtrace for this error.
    pub fn backtrace(&self) -> &Backtrace {
        self.payload.backtrace.as_ref()
    }

    /// Returns the captured callsite location for this error.
    pub fn location(&self) -> &'static Location<'static> {
        self.payload.location
    }

    /// Returns `true` when the storage rejected a write because it is read-only.
    ///
    /// Such failures only leave the index stale and are never surfaced to the host.
    pub fn is_read_only(&self) -> bool {
        self.kind() == ErrorKind::ReadOnlyStorage
    }

    /// Attaches an originating [`error::Error`] to this error and returns the modified instance.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: error::Error + Send + Sync + 'static,
    {
        self.payload.source = Some(Arc::new(source));
        self
    }

    /// Creates a [`CplError`] from its components, recording the caller location.
    #[track_caller]
    fn from_components(
        kind: ErrorKind,
        description: Cow<'static, str>,
        detail: Option<Cow<'static, str>>,
        source: Option<Arc<dyn error::Error + Send + Sync>>,
    ) -> Self {
        CplError {
            payload: ErrorPayload {
                kind,
                description,
                detail,
                source,
                location: Location::caller(),
                backtrace: Arc::new(Backtrace::capture()),
            },
        }
    }
}

impl PartialEq for CplError {
    fn eq(&self, other: &CplError) -> bool {
        self.payload.kind == other.payload.kind
            && self.payload.description == other.payload.description
    }
}

impl fmt::Display for CplError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        let payload = &self.payload;
        let location = payload.location;
        write!(
            f,
            "[{:?}] {} @ {}:{}:{}",
            payload.kind,
            payload.description,
            location.file(),
            location.line(),
            location.column()
        )?;

        if let Some(detail) = payload.detail.as_deref() {
            if detail.trim().is_empty() {
                write!(f, "\n  Detail: <empty>")?;
            } else {
                write!(f, "\n  Detail:")?;
                for line in detail.lines() {
                    write!(f, "\n    {line}")?;
                }
            }
        }

        let rendered_backtrace = payload.backtrace.to_string();
        if !rendered_backtrace.trim().is_empty() && rendered_backtrace != "disabled backtrace" {
            write!(f, "\n  Backtrace:")?;
            for line in rendered_backtrace.lines() {
                write!(f, "\n    {line}")?;
            }
        }

        Ok(())
    }
}

impl error::Error for CplError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.payload
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}

/// Creates a [`CplError`] from an error kind and static description.
impl From<(ErrorKind, &'static str)> for CplError {
    #[track_caller]
    fn from((kind, desc): (ErrorKind, &'static str)) -> CplError {
        CplError::from_components(kind, Cow::Borrowed(desc), None, None)
    }
}

/// Creates a [`CplError`] from an error kind, static description, and dynamic detail.
impl<D> From<(ErrorKind, &'static str, D)> for CplError
where
    D: Into<Cow<'static, str>>,
{
    #[track_caller]
    fn from((kind, desc, detail): (ErrorKind, &'static str, D)) -> CplError {
        CplError::from_components(kind, Cow::Borrowed(desc), Some(detail.into()), None)
    }
}

impl From<std::io::Error> for CplError {
    #[track_caller]
    fn from(err: std::io::Error) -> CplError {
        let detail = err.to_string();
        CplError::from_components(
            ErrorKind::IoError,
            Cow::Borrowed("I/O operation failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

/// Classifies a Postgres SQLSTATE code reported by the storage engine.
fn classify_sqlstate(code: &str) -> (ErrorKind, &'static str) {
    match code {
        // read_only_sql_transaction
        "25006" => (
            ErrorKind::ReadOnlyStorage,
            "Postgres rejected a write in read-only mode",
        ),
        // serialization_failure, deadlock_detected, transaction_rollback
        "40001" | "40P01" | "40000" => (ErrorKind::TransactionFailed, "Postgres transaction failed"),
        // in_failed_sql_transaction, invalid_transaction_state
        "25P02" | "25000" => (
            ErrorKind::TransactionFailed,
            "Postgres transaction state error",
        ),
        // lock_not_available
        "55P03" => (ErrorKind::StorageLockTimeout, "Postgres lock not available"),
        // undefined_table, undefined_column, invalid_schema_name
        "42P01" | "42703" | "3F000" => (
            ErrorKind::StorageSchemaError,
            "Postgres schema object not found",
        ),
        // admin_shutdown, crash_shutdown, cannot_connect_now
        "57P01" | "57P02" | "57P03" => (
            ErrorKind::StorageConnectionFailed,
            "Postgres is shutting down or starting up",
        ),
        code if code.starts_with("23") => (
            ErrorKind::ConstraintViolation,
            "Postgres constraint violation",
        ),
        code if code.starts_with("22") => {
            (ErrorKind::ConversionError, "Postgres data conversion failed")
        }
        code if code.starts_with("08") => {
            (ErrorKind::StorageConnectionFailed, "Postgres connection failed")
        }
        _ => (ErrorKind::StorageQueryFailed, "Postgres query failed"),
    }
}

/// Converts [`sqlx::Error`] to [`CplError`], classifying database errors by SQLSTATE.
impl From<sqlx::Error> for CplError {
    #[track_caller]
    fn from(err: sqlx::Error) -> CplError {
        let (kind, description) = match &err {
            sqlx::Error::Database(db_err) => match db_err.code() {
                Some(code) => classify_sqlstate(&code),
                None => (ErrorKind::StorageQueryFailed, "Postgres query failed"),
            },
            sqlx::Error::Io(_) => (ErrorKind::IoError, "Postgres I/O failed"),
            sqlx::Error::Tls(_) => (
                ErrorKind::StorageConnectionFailed,
                "Postgres TLS negotiation failed",
            ),
            sqlx::Error::PoolClosed | sqlx::Error::PoolTimedOut => (
                ErrorKind::StorageConnectionFailed,
                "Postgres connection pool unavailable",
            ),
            sqlx::Error::RowNotFound => (ErrorKind::InvalidData, "Expected row was not found"),
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => (
                ErrorKind::ConversionError,
                "Failed to decode a Postgres value",
            ),
            sqlx::Error::Configuration(_) => {
                (ErrorKind::ConfigError, "Invalid Postgres configuration")
            }
            _ => (ErrorKind::StorageQueryFailed, "Database operation failed"),
        };

        let detail = err.to_string();
        CplError::from_components(
            kind,
            Cow::Borrowed(description),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}

impl From<sqlx::migrate::MigrateError> for CplError {
    #[track_caller]
    fn from(err: sqlx::migrate::MigrateError) -> CplError {
        let detail = err.to_string();
        CplError::from_components(
            ErrorKind::MigrationFailed,
            Cow::Borrowed("Applying index migrations failed"),
            Some(Cow::Owned(detail)),
            Some(Arc::new(err)),
        )
    }
}
