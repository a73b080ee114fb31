//! SQL identifier validation and quoting
//!
//! Table and column names in a load configuration are data, and they end up
//! interpolated into DDL and INSERT statements. Only plain identifiers are
//! accepted, and every accepted identifier is emitted double-quoted.

use std::sync::OnceLock;

use regex::Regex;

use crate::error::{CommonError, Result};

/// PostgreSQL truncates identifiers longer than this (NAMEDATALEN - 1).
pub const MAX_IDENTIFIER_LENGTH: usize = 63;

#[allow(clippy::unwrap_used)]
fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap())
}

/// Validate a table or column name
///
/// # Errors
///
/// Returns [`CommonError::InvalidIdentifier`] when the name is empty, longer
/// than [`MAX_IDENTIFIER_LENGTH`], or contains anything other than ASCII
/// letters, digits and underscores (leading digit not allowed).
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(CommonError::invalid_identifier(name, "must not be empty"));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(CommonError::invalid_identifier(
            name,
            format!("must be at most {} characters", MAX_IDENTIFIER_LENGTH),
        ));
    }

    if !identifier_pattern().is_match(name) {
        return Err(CommonError::invalid_identifier(
            name,
            "only letters, digits and underscores are allowed, and it cannot start with a digit",
        ));
    }

    Ok(())
}

/// Validate and double-quote an identifier for use in generated SQL
pub fn quote_identifier(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name))
}
