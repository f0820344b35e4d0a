//! Battery agent internals shared by the binary and its integration tests

pub mod api;
pub mod config;
