//! Shared configuration types.

mod connection;
mod index;
mod maintenance;

pub use connection::{
    DefaultPgConnectionOptions, IntoConnectOptions, PgConnectionConfig, TlsConfig,
};
pub use index::{DEFAULT_CONTENT_NAMESPACES, IndexConfig};
pub use maintenance::MaintenanceConfig;

use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// No content namespace is configured, so nothing could ever be indexed.
    #[error("`content_namespaces` must contain at least one namespace")]
    NoContentNamespaces,
    /// The source schema name is empty.
    #[error("`source_schema` cannot be empty")]
    EmptySourceSchema,
}
