//! CLI command implementations.

pub mod keygen;
pub mod serve;
pub mod validate;
