//! Request handlers

pub mod advance;
pub mod health;
pub mod settlement;
