// UI and formatting module

pub mod formatters;

// Re-export commonly used items for cleaner imports
pub use formatters::{
    format_crash_entry, format_event_line, format_event_trace, format_megabytes,
    format_memory_sample, format_timestamp, severity_label,
};
