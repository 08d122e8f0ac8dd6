//! Location relay
//!
//! Share an ephemeral location through a room code. A sender publishes
//! its coordinates under a code and keeps refreshing them; a receiver
//! polls the newest coordinates published under the same code.
//!
//! - [`api`]: the three HTTP endpoints (create, update, read)
//! - [`database`]: the location store, PostgreSQL or in-memory
//! - [`client`]: typed HTTP client for the endpoints
//! - [`sender`] / [`receiver`]: the two client polling loops

pub mod api;
pub mod client;
pub mod config;
pub mod database;
pub mod errors;
pub mod geolocation;
pub mod models;
pub mod receiver;
pub mod sender;
pub mod server;
