//! Shared definitions for the kanban task model and store wire format.

pub mod codec;
pub mod protocol;
pub mod task;
