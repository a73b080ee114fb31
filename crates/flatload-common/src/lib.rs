//! Flatload Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared building blocks for the flatload workspace:
//!
//! - **Logging**: `tracing` subscriber setup driven by `LOG_*` variables
//! - **Error Handling**: the [`CommonError`] type and [`Result`] alias
//! - **Identifiers**: validation and quoting of SQL table/column names
//!
//! # Example
//!
//! ```
//! use flatload_common::identifiers::quote_identifier;
//!
//! assert_eq!(quote_identifier("employees").unwrap(), "\"employees\"");
//! assert!(quote_identifier("employees; drop table x").is_err());
//! ```

pub mod error;
pub mod identifiers;
pub mod logging;

pub use error::{CommonError, Result};
