//! Request data transfer objects
//!
//! Responses serialize the domain types directly.

pub mod advance;
pub mod settlement;
