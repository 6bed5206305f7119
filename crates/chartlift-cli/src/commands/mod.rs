//! CLI command implementations

pub mod images;
pub mod pull;
