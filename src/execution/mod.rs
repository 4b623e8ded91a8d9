//! Execution support: configuration, memory accounting and cancellation

mod cancel;
mod config;
mod memory;

pub use cancel::*;
pub use config::*;
pub use memory::*;
