//! Option lookup and total parse-with-default combinators.
//!
//! None of the parsers here fail: malformed input always resolves to the
//! supplied fallback, and numeric values are clamped into range.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

static INTEGER_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^-?[0-9]+$").unwrap());

static FLOAT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?[0-9]+(\.[0-9]+)?$").unwrap());

/// Source of raw option strings keyed by option identifier.
pub trait OptionSource: Send + Sync {
    /// Raw value for `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
}

impl OptionSource for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        HashMap::get(self, key).cloned()
    }
}

impl<T: OptionSource + ?Sized> OptionSource for std::sync::Arc<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

impl<T: OptionSource + ?Sized> OptionSource for Box<T> {
    fn get(&self, key: &str) -> Option<String> {
        (**self).get(key)
    }
}

/// Trimmed option value; absent and blank values are `None`.
pub fn option_string(source: &dyn OptionSource, key: &str) -> Option<String> {
    source
        .get(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse an integer option, clamped into `[min, max]`.
pub fn parse_integer_in_range(raw: Option<&str>, fallback: i64, min: i64, max: i64) -> i64 {
    let Some(raw) = raw.map(str::trim) else {
        return fallback;
    };
    if !INTEGER_PATTERN.is_match(raw) {
        return fallback;
    }

    match raw.parse::<i64>() {
        Ok(value) => value.clamp(min, max),
        // Only overflow can fail past the pattern check.
        Err(_) if raw.starts_with('-') => min,
        Err(_) => max,
    }
}

/// Parse a decimal option, clamped into `[min, max]`.
pub fn parse_float_in_range(raw: Option<&str>, fallback: f64, min: f64, max: f64) -> f64 {
    let Some(raw) = raw.map(str::trim) else {
        return fallback;
    };
    if !FLOAT_PATTERN.is_match(raw) {
        return fallback;
    }

    match raw.parse::<f64>() {
        Ok(value) if value.is_finite() => value.clamp(min, max),
        _ => fallback,
    }
}

/// Parse a `true`/`false` menu option (case-insensitive).
pub fn parse_menu_boolean(raw: Option<&str>, fallback: bool) -> bool {
    match raw.map(|s| s.trim().to_lowercase()).as_deref() {
        Some("true") => true,
        Some("false") => false,
        _ => fallback,
    }
}

/// Pick a value from a closed set of names (case-insensitive).
pub fn parse_choice<T: Copy>(raw: Option<&str>, choices: &[(&str, T)], fallback: T) -> T {
    let Some(raw) = raw.map(str::trim) else {
        return fallback;
    };
    choices
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case(raw))
        .map(|(_, value)| *value)
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_string_trims_and_drops_blank() {
        let mut map = HashMap::new();
        map.insert("a".to_string(), "  value ".to_string());
        map.insert("b".to_string(), "   ".to_string());

        assert_eq!(option_string(&map, "a").as_deref(), Some("value"));
        assert_eq!(option_string(&map, "b"), None);
        assert_eq!(option_string(&map, "missing"), None);
    }

    #[test]
    fn test_parse_integer() {
        assert_eq!(parse_integer_in_range(Some("45"), 30, 5, 180), 45);
        assert_eq!(parse_integer_in_range(Some(" 1 "), 30, 5, 180), 5);
        assert_eq!(parse_integer_in_range(Some("999"), 30, 5, 180), 180);
        assert_eq!(parse_integer_in_range(Some("-3"), 30, 5, 180), 5);
        assert_eq!(parse_integer_in_range(Some("12.5"), 30, 5, 180), 30);
        assert_eq!(parse_integer_in_range(Some("abc"), 30, 5, 180), 30);
        assert_eq!(parse_integer_in_range(None, 30, 5, 180), 30);
        assert_eq!(
            parse_integer_in_range(Some("99999999999999999999999"), 30, 5, 180),
            180
        );
    }

    #[test]
    fn test_parse_float() {
        assert_eq!(parse_float_in_range(Some("0.5"), 0.0, 0.0, 1.0), 0.5);
        assert_eq!(parse_float_in_range(Some("3"), 0.0, 0.0, 1.0), 1.0);
        assert_eq!(parse_float_in_range(Some("-0.2"), 0.0, 0.0, 1.0), 0.0);
        assert_eq!(parse_float_in_range(Some(".5"), 0.25, 0.0, 1.0), 0.25);
        assert_eq!(parse_float_in_range(Some("1e-3"), 0.25, 0.0, 1.0), 0.25);
        assert_eq!(parse_float_in_range(None, 0.25, 0.0, 1.0), 0.25);
    }

    #[test]
    fn test_parse_menu_boolean() {
        assert!(parse_menu_boolean(Some("TRUE"), false));
        assert!(!parse_menu_boolean(Some("false"), true));
        assert!(parse_menu_boolean(Some("yes"), true));
        assert!(!parse_menu_boolean(Some("1"), false));
        assert!(!parse_menu_boolean(None, false));
    }

    #[test]
    fn test_parse_choice() {
        let choices = [("high", 1), ("auto", 2), ("low", 3)];
        assert_eq!(parse_choice(Some("LOW"), &choices, 1), 3);
        assert_eq!(parse_choice(Some("medium"), &choices, 1), 1);
        assert_eq!(parse_choice(None, &choices, 2), 2);
    }
}
