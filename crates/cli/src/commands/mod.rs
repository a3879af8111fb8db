//! CLI Commands

pub mod aggregate;
pub mod config;
pub mod report;
