//! Tessera render server library.
//!
//! Exposes the building blocks (config, blob transfer, render service,
//! admission, discovery, routes) so integration tests and the binary
//! entrypoint can both access them.

pub mod admission;
pub mod background;
pub mod blob;
pub mod config;
pub mod discovery;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod service;
pub mod state;
