//! Boost.Python binding generator driven by C++ declaration dumps.

pub mod cli;
pub mod config;
pub mod core;
pub mod error;

pub use error::{BindsworthError, Result};
