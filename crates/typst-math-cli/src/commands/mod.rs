//! CLI command implementations

pub mod build;
pub mod cache;
pub mod doctor;
pub mod render;
