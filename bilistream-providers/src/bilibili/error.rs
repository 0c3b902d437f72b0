//! Bilibili client error types
//!
//! The Bilibili client shares the provider-wide error enum.

pub use crate::error::{bytes_with_limit, check_response, json_with_limit};
pub use crate::error::ProviderClientError as BilibiliError;
