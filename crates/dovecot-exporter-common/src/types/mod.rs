//! Core data types for quota keys and samples

pub mod identity;
pub mod sample;
