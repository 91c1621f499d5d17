//! Logging setup shared by the created pages binaries and tests.

pub mod tracing;
