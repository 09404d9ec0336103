// Core business logic module

pub mod config;
pub mod diagnostics;

// Re-export commonly used items
pub use config::Config;
pub use diagnostics::DiagnosticEngine;
