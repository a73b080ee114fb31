//! Named validation and transformation rules
//!
//! Rules are looked up by upper-cased name in two namespaces. A validation
//! rule that is not registered is treated as a regular expression that must
//! match the whole (trimmed) value. A transformation rule that is not
//! registered leaves the value unchanged.
//!
//! Pattern rules are compiled with ASCII-only `\d`, `\w`, `\s` and case
//! folding. A pattern that cannot be expressed that way, such as one where
//! `.` must span multi-byte characters, falls back to Unicode semantics.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, OnceLock, RwLock};

use bigdecimal::{BigDecimal, Zero};
use regex::{Regex, RegexBuilder};
use thiserror::Error;

pub type ValidationFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type TransformationFn = Arc<dyn Fn(&str) -> String + Send + Sync>;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("invalid pattern: {0}")]
    InvalidPattern(#[from] regex::Error),
}

#[allow(clippy::unwrap_used)]
fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[A-Za-z0-9+_.-]+@(.+)$").unwrap())
}

#[allow(clippy::unwrap_used)]
fn decimal_pattern() -> &'static Regex {
    static DECIMAL: OnceLock<Regex> = OnceLock::new();
    DECIMAL.get_or_init(|| {
        Regex::new(r"^[+-]?(?:[0-9]+\.?[0-9]*|\.[0-9]+)(?:[eE][+-]?[0-9]+)?$").unwrap()
    })
}

/// Parse a plain decimal literal: optional sign, ASCII digits, optional
/// fraction and exponent
///
/// Digit separators and non-ASCII digits are rejected, matching what
/// PostgreSQL accepts for `NUMERIC`.
pub fn parse_decimal(value: &str) -> Option<BigDecimal> {
    if !decimal_pattern().is_match(value) {
        return None;
    }
    BigDecimal::from_str(value).ok()
}

fn is_decimal(value: &str) -> bool {
    parse_decimal(value).is_some()
}

fn is_positive_decimal(value: &str) -> bool {
    parse_decimal(value).is_some_and(|d| d > BigDecimal::zero())
}

fn compile_pattern(pattern: &str) -> Result<Regex, regex::Error> {
    let anchored = format!("^(?:{})$", pattern);
    RegexBuilder::new(&anchored)
        .unicode(false)
        .build()
        .or_else(|_| Regex::new(&anchored))
}

fn capitalize(value: &str) -> String {
    let mut chars = value.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.as_str().to_lowercase().chars())
            .collect(),
        None => String::new(),
    }
}

/// Registry of validation and transformation functions
pub struct RuleRegistry {
    validations: HashMap<String, ValidationFn>,
    transformations: HashMap<String, TransformationFn>,
    patterns: RwLock<HashMap<String, Regex>>,
}

impl std::fmt::Debug for RuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut validations: Vec<_> = self.validations.keys().collect();
        let mut transformations: Vec<_> = self.transformations.keys().collect();
        validations.sort();
        transformations.sort();
        f.debug_struct("RuleRegistry")
            .field("validations", &validations)
            .field("transformations", &transformations)
            .finish()
    }
}

impl Default for RuleRegistry {
    fn default() -> Self {
        Self::with_builtin_rules()
    }
}

impl RuleRegistry {
    /// A registry with no named rules; every validation rule is a pattern
    pub fn empty() -> Self {
        Self {
            validations: HashMap::new(),
            transformations: HashMap::new(),
            patterns: RwLock::new(HashMap::new()),
        }
    }

    pub fn with_builtin_rules() -> Self {
        let mut registry = Self::empty();

        registry.register_validation("NOT_NULL", |v| !v.is_empty());
        registry.register_validation("NUMERIC", is_decimal);
        registry.register_validation("EMAIL", |v| email_pattern().is_match(v));
        registry.register_validation("POSITIVE_NUMBER", is_positive_decimal);

        registry.register_transformation("UPPER", |v| v.to_uppercase());
        registry.register_transformation("LOWER", |v| v.to_lowercase());
        registry.register_transformation("TRIM", |v| v.trim().to_string());
        registry.register_transformation("CAPITALIZE", capitalize);
        registry.register_transformation("TRIM_UPPER", |v| v.trim().to_uppercase());

        registry
    }

    /// Add or replace a named validation; the name is case-insensitive
    pub fn register_validation<F>(&mut self, name: &str, rule: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validations.insert(name.to_uppercase(), Arc::new(rule));
    }

    /// Add or replace a named transformation; the name is case-insensitive
    pub fn register_transformation<F>(&mut self, name: &str, rule: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.transformations.insert(name.to_uppercase(), Arc::new(rule));
    }

    pub fn has_validation(&self, name: &str) -> bool {
        self.validations.contains_key(&name.to_uppercase())
    }

    /// Evaluate a validation rule against a value
    ///
    /// The value is trimmed first and null is evaluated as the empty string.
    /// A missing or blank rule always passes.
    pub fn validate(&self, rule: Option<&str>, value: Option<&str>) -> Result<bool, RuleError> {
        let rule = match rule.map(str::trim) {
            Some(r) if !r.is_empty() => r,
            _ => return Ok(true),
        };
        let value = value.unwrap_or("").trim();

        if let Some(named) = self.validations.get(&rule.to_uppercase()) {
            return Ok(named(value));
        }

        self.full_match(rule, value)
    }

    /// Apply a transformation rule
    ///
    /// A null value bypasses the rule and is replaced by `default`.
    pub fn transform(
        &self,
        rule: Option<&str>,
        value: Option<&str>,
        default: Option<&str>,
    ) -> Option<String> {
        let value = match value {
            Some(v) => v,
            None => return default.map(str::to_string),
        };

        let named = rule
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .and_then(|r| self.transformations.get(&r.to_uppercase()));

        match named {
            Some(transform) => Some(transform(value)),
            None => Some(value.to_string()),
        }
    }

    /// Compile a pattern rule ahead of use so a bad pattern fails early
    pub fn check_pattern(&self, rule: &str) -> Result<(), RuleError> {
        if self.has_validation(rule) {
            return Ok(());
        }
        self.full_match(rule.trim(), "").map(|_| ())
    }

    fn full_match(&self, pattern: &str, value: &str) -> Result<bool, RuleError> {
        {
            let cache = self.patterns.read().unwrap_or_else(|e| e.into_inner());
            if let Some(re) = cache.get(pattern) {
                return Ok(re.is_match(value));
            }
        }

        let re = compile_pattern(pattern)?;
        let matched = re.is_match(value);
        self.patterns
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(pattern.to_string(), re);
        Ok(matched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn check(rule: &str, value: &str) -> bool {
        RuleRegistry::default().validate(Some(rule), Some(value)).unwrap()
    }

    #[test]
    fn test_not_null() {
        assert!(check("NOT_NULL", "x"));
        assert!(!check("NOT_NULL", ""));
        assert!(!check("NOT_NULL", "   "));
        let registry = RuleRegistry::default();
        assert!(!registry.validate(Some("NOT_NULL"), None).unwrap());
    }

    #[test]
    fn test_numeric() {
        assert!(check("NUMERIC", "42"));
        assert!(check("NUMERIC", "-3.5"));
        assert!(check("NUMERIC", " 0.001 "));
        assert!(check("NUMERIC", "1e3"));
        assert!(!check("NUMERIC", "abc"));
        assert!(!check("NUMERIC", ""));
        assert!(check("NUMERIC", "+.5"));
        assert!(check("NUMERIC", "7."));
        assert!(!check("NUMERIC", "1_000"));
        assert!(!check("NUMERIC", "١٢٣"));
        assert!(!check("NUMERIC", "1e"));
        assert!(!check("NUMERIC", "."));
    }

    #[test]
    fn test_positive_number() {
        assert!(check("POSITIVE_NUMBER", "1"));
        assert!(check("POSITIVE_NUMBER", "0.5"));
        assert!(!check("POSITIVE_NUMBER", "0"));
        assert!(!check("POSITIVE_NUMBER", "-1"));
        assert!(!check("POSITIVE_NUMBER", "ten"));
        assert!(!check("POSITIVE_NUMBER", "1_000"));
        assert!(check("POSITIVE_NUMBER", "2.5E-3"));
    }

    #[test]
    fn test_email() {
        assert!(check("EMAIL", "a@x.io"));
        assert!(check("EMAIL", "first.last+tag@example.com"));
        assert!(!check("EMAIL", "bad"));
        assert!(!check("EMAIL", "@x.io"));
    }

    #[test]
    fn test_rule_names_are_case_insensitive() {
        assert!(check("numeric", "7"));
        assert!(!check("Email", "bad"));
    }

    #[test]
    fn test_pattern_rule_matches_whole_value() {
        assert!(check("[A-Z]{3}", "ABC"));
        assert!(!check("[A-Z]{3}", "ABCD"));
        assert!(!check("[A-Z]{3}", "xABC"));
        assert!(check("a|b", "b"));
        assert!(!check("a|b", "ab"));
    }

    #[test]
    fn test_pattern_classes_are_ascii() {
        assert!(check(r"\d+", "123"));
        assert!(!check(r"\d+", "١٢٣"));
        assert!(!check(r"\w+", "héllo"));
        assert!(check(r"(?i)abc", "ABC"));
        // `.` over multi-byte text needs the Unicode fallback.
        assert!(check(".+", "héllo"));
        assert!(check("[a-z]+é", "cafeé"));
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let registry = RuleRegistry::default();
        assert!(registry.validate(Some("[unclosed"), Some("x")).is_err());
        assert!(registry.check_pattern("[unclosed").is_err());
        assert!(registry.check_pattern("EMAIL").is_ok());
    }

    #[test]
    fn test_no_rule_passes() {
        let registry = RuleRegistry::default();
        assert!(registry.validate(None, Some("anything")).unwrap());
        assert!(registry.validate(Some(""), None).unwrap());
    }

    #[test]
    fn test_transformations() {
        let registry = RuleRegistry::default();
        let t = |rule: &str, v: &str| registry.transform(Some(rule), Some(v), None).unwrap();

        assert_eq!(t("UPPER", "ada"), "ADA");
        assert_eq!(t("lower", "ADA"), "ada");
        assert_eq!(t("TRIM", "  ada "), "ada");
        assert_eq!(t("TRIM_UPPER", "  ada "), "ADA");
        assert_eq!(t("CAPITALIZE", "hELLO"), "Hello");
        assert_eq!(t("CAPITALIZE", "a"), "A");
        assert_eq!(t("CAPITALIZE", ""), "");
        assert_eq!(t("REVERSE", "abc"), "abc");
    }

    #[test]
    fn test_null_value_takes_default() {
        let registry = RuleRegistry::default();
        assert_eq!(
            registry.transform(Some("UPPER"), None, Some("n/a")),
            Some("n/a".to_string())
        );
        assert_eq!(registry.transform(Some("UPPER"), None, None), None);
        assert_eq!(
            registry.transform(None, Some("keep"), Some("n/a")),
            Some("keep".to_string())
        );
    }

    #[test]
    fn test_custom_rules() {
        let mut registry = RuleRegistry::default();
        registry.register_validation("even_length", |v| v.len() % 2 == 0);
        registry.register_transformation("reverse", |v| v.chars().rev().collect());

        assert!(registry.validate(Some("EVEN_LENGTH"), Some("ab")).unwrap());
        assert!(!registry.validate(Some("even_length"), Some("abc")).unwrap());
        assert_eq!(
            registry.transform(Some("Reverse"), Some("abc"), None),
            Some("cba".to_string())
        );
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn upper_is_idempotent(s in "[ -~à-ÿ]{0,24}") {
                let registry = RuleRegistry::default();
                let once = registry.transform(Some("UPPER"), Some(&s), None).unwrap();
                let twice = registry.transform(Some("UPPER"), Some(&once), None).unwrap();
                prop_assert_eq!(once, twice);
            }

            #[test]
            fn trim_upper_is_upper_of_trim(s in "[ a-zA-Z0-9]{0,24}") {
                let registry = RuleRegistry::default();
                let combined = registry.transform(Some("TRIM_UPPER"), Some(&s), None).unwrap();
                let trimmed = registry.transform(Some("TRIM"), Some(&s), None).unwrap();
                let stepwise = registry.transform(Some("UPPER"), Some(&trimmed), None).unwrap();
                prop_assert_eq!(combined, stepwise);
            }

            #[test]
            fn numeric_accepts_any_decimal(n in any::<i64>(), frac in 0u32..10_000) {
                let value = format!("{}.{}", n, frac);
                prop_assert!(RuleRegistry::default().validate(Some("NUMERIC"), Some(&value)).unwrap());
            }
        }
    }
}
