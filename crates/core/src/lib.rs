//! Shared domain logic for the tessera render farm.
//!
//! Everything in this crate is free of HTTP and process wiring so that the
//! server and the client can both use it, and so it can be tested in
//! isolation.

pub mod admission;
pub mod command_engine;
pub mod config;
pub mod error;
pub mod hashing;
pub mod partition;
pub mod protocol;
pub mod render;
pub mod types;
