//! Utility functions for coercing loosely-typed source values.

pub mod format;

// Re-export commonly used functions at module level
pub use format::{
    dedup_preserving_order, is_valid_image_url, opt_string, parse_float_lenient,
    parse_int_lenient, slugify, split_list, truthy,
};
