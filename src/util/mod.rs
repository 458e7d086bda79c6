//! Utility functions for common operations.
//!
//! This module provides reusable utilities for:
//!
//! - **URL validation**: Security-focused validation to prevent SSRF attacks
//!
//! # Examples
//!
//! ```ignore
//! use crate::util::validate_url;
//!
//! // Validate a feed or article URL
//! let url = validate_url("https://example.com/feed.xml").unwrap();
//! ```

mod url_validator;

pub use url_validator::{validate_url, UrlValidationError};
