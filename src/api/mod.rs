//! HTTP API handlers

pub mod health;
pub mod prompt;
pub mod quiz;
