//! Configuration for the created pages index.
//!
//! Holds the connection settings for the Postgres database that stores both the host's
//! page history and the derived index, the index settings themselves, and the hierarchical
//! loader used by the maintenance binary.

mod environment;
mod load;
pub mod shared;

pub use environment::Environment;
pub use load::{Config, LoadConfigError, load_config, load_config_from};
