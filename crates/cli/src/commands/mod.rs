//! CLI subcommand implementations

pub mod predict;
pub mod report;
pub mod status;
