//! Kanban: terminal board mirroring a live document store.

pub mod app;
pub mod board;
pub mod config;
pub mod remote;
pub mod sync;
pub mod ui;
