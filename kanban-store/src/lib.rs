//! Kanban reference document store library.
//!
//! Exposes the store server for use in tests and embedding. The server
//! accepts WebSocket connections, keeps task collections in memory, and
//! pushes a snapshot to every subscriber after each change.

pub mod collection;
pub mod config;
pub mod server;
