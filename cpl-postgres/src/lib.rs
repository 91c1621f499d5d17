//! Postgres connection helpers for the created pages index.

mod pool;
pub mod sqlx;

pub use pool::{connect_to_database, create_lazy_pool};
