//! Transaction functionality
//!
//! Payment requests and the decimal amount handling shared by every chain
//! adapter.

pub mod types;
pub mod amount;

pub use types::*;
pub use amount::{format_amount, parse_amount};
