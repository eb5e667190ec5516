//! Purpose: Build Airtable `filterByFormula` expressions.
//! Exports: `FilterFormula`, `build_filter`, `field_equals`, `escape_string_literal`.
//! Role: Pure string construction between input validation and the remote client.
//! Invariants: Every interpolated value sits inside exactly one double-quoted literal.
//! Invariants: Backslash, double quote and line breaks are always escaped.

use super::email::Email;
use super::error::{Error, ErrorKind};
use std::fmt;

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FilterFormula(String);

impl FilterFormula {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterFormula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `{<field>}="<email>"` for a validated email.
pub fn build_filter(field: &str, email: &Email) -> FilterFormula {
    field_equals(field, email.as_str())
}

/// Equality formula for an arbitrary value. Callers are expected to have
/// checked `field` with [`validate_field_name`].
pub fn field_equals(field: &str, value: &str) -> FilterFormula {
    FilterFormula(format!("{{{field}}}=\"{}\"", escape_string_literal(value)))
}

pub fn escape_string_literal(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(ch),
        }
    }
    out
}

pub fn validate_field_name(field: &str) -> Result<(), Error> {
    if field.trim().is_empty() {
        return Err(Error::new(ErrorKind::Config).with_message("field name must not be empty"));
    }
    if field.contains(['{', '}']) {
        return Err(Error::new(ErrorKind::Config)
            .with_message(format!("field name {field:?} must not contain braces")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{build_filter, escape_string_literal, field_equals, validate_field_name};
    use crate::core::email::Email;
    use crate::core::error::ErrorKind;

    /// Counts double quotes not preceded by an escaping backslash.
    fn unescaped_quotes(formula: &str) -> usize {
        let mut count = 0;
        let mut escaped = false;
        for ch in formula.chars() {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                count += 1;
            }
        }
        count
    }

    #[test]
    fn builds_double_quoted_equality() {
        let email = Email::parse("test1@test1.com").expect("email");
        let formula = build_filter("Email", &email);
        assert_eq!(formula.as_str(), "{Email}=\"test1@test1.com\"");
    }

    #[test]
    fn single_quote_stays_literal() {
        let email = Email::parse("o'brien@example.com").expect("email");
        let formula = build_filter("Email", &email);
        assert_eq!(formula.as_str(), "{Email}=\"o'brien@example.com\"");
    }

    #[test]
    fn quotes_cannot_close_the_literal() {
        let hostile = [
            "x\"=\"x\") , TRUE(), (\"",
            "a\"b@example.com",
            "trailing\\",
            "\\\"",
            "line\nbreak\r\"",
        ];
        for value in hostile {
            let formula = field_equals("Email", value);
            assert_eq!(unescaped_quotes(formula.as_str()), 2, "{value:?}");
            assert!(formula.as_str().starts_with("{Email}=\""));
            assert!(formula.as_str().ends_with('"'));
        }
    }

    #[test]
    fn escape_handles_backslash_before_quote() {
        assert_eq!(escape_string_literal("a\\\"b"), "a\\\\\\\"b");
        assert_eq!(escape_string_literal("plain"), "plain");
    }

    #[test]
    fn field_names_reject_braces_and_blank() {
        assert!(validate_field_name("Email").is_ok());
        assert!(validate_field_name("Contact Email").is_ok());
        for bad in ["", "  ", "Em}ail", "{Email"] {
            let err = validate_field_name(bad).expect_err(bad);
            assert_eq!(err.kind(), ErrorKind::Config);
        }
    }
}
