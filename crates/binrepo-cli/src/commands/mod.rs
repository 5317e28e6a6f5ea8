//! CLI commands

pub mod check;
pub mod locate;
pub mod resolve;
