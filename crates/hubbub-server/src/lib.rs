//! # hubbub-server
//!
//! In-process broadcast hub behind an axum WebSocket endpoint.
//!
//! - [`hub`]: the single coordinator owning session membership and fan-out
//! - [`session`]: one per connection, an inbound and an outbound loop
//! - [`adapter`]: the connection seam (axum WebSocket, in-memory for tests)
//! - [`server`]: `/ws`, `/health` and `/metrics`, plus graceful shutdown
//!
//! Every message a session sends is broadcast to every registered session,
//! the sender included. Sessions whose mailbox fills up are evicted.

#![deny(unsafe_code)]

pub mod adapter;
pub mod config;
pub mod error;
pub mod health;
pub mod hub;
pub mod metrics;
pub mod server;
pub mod session;
pub mod shutdown;
