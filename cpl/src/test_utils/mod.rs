//! Helpers shared by unit and integration tests.
//!
//! - [`wiki`] drives an in-memory wiki and the index together and checks them against each other
//! - [`failpoints`] configures fault injection for the duration of a test
//! - [`database`] spawns isolated Postgres databases with the index and host tables

#[cfg(feature = "test-utils")]
pub mod database;
pub mod failpoints;
pub mod wiki;
