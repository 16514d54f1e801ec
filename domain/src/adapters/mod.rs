//! In-process adapters that live inside the domain crate for convenience.
//!
//! These back unit tests, HTTP route tests and local demos. The real adapters
//! (SQLite, MongoDB) live in separate crates under `adapters/`.

pub mod memory_repo;
