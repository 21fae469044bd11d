//! Utility functions for HTML field extraction and URL comparison.

pub mod html;
pub mod url;

// Re-export commonly used functions at module level
pub use html::{element_value_by_id, hidden_inputs};
pub use self::url::{endpoint, same_host, same_page};
