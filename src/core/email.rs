//! Purpose: Validate raw email strings into the `Email` newtype.
//! Exports: `Email`.
//! Role: Boundary check run before any upstream request is built.
//! Invariants: An `Email` value always satisfies `Email::parse` syntax rules.
//! Invariants: Validation is pure; no normalization beyond trimming whitespace.

use super::error::{Error, ErrorKind};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;
const MAX_LABEL_LEN: usize = 63;
const LOCAL_SPECIALS: &[u8] = b"!#$%&'*+/=?^_`{|}~-";

#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(invalid("email is empty"));
        }
        if value.len() > MAX_EMAIL_LEN {
            return Err(invalid("email is too long"));
        }
        let Some((local, domain)) = value.split_once('@') else {
            return Err(invalid("email is missing '@'"));
        };
        if domain.contains('@') {
            return Err(invalid("email contains more than one '@'"));
        }
        validate_local(local)?;
        validate_domain(domain)?;
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Serialize for Email {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Email {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Email::parse(&raw).map_err(serde::de::Error::custom)
    }
}

fn validate_local(local: &str) -> Result<(), Error> {
    if local.is_empty() || local.len() > MAX_LOCAL_LEN {
        return Err(invalid("email local part has invalid length"));
    }
    if local.starts_with('.') || local.ends_with('.') || local.contains("..") {
        return Err(invalid("email local part has misplaced '.'"));
    }
    let ok = local
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'.' || LOCAL_SPECIALS.contains(&b));
    if !ok {
        return Err(invalid("email local part contains invalid characters"));
    }
    Ok(())
}

fn validate_domain(domain: &str) -> Result<(), Error> {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return Err(invalid("email domain must contain a '.'"));
    }
    for label in &labels {
        if label.is_empty() || label.len() > MAX_LABEL_LEN {
            return Err(invalid("email domain label has invalid length"));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(invalid("email domain label must not start or end with '-'"));
        }
        if !label.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
            return Err(invalid("email domain contains invalid characters"));
        }
    }
    let tld = labels[labels.len() - 1];
    if tld.len() < 2 || !tld.bytes().all(|b| b.is_ascii_alphabetic()) {
        return Err(invalid("email top-level domain is invalid"));
    }
    Ok(())
}

fn invalid(message: &str) -> Error {
    Error::new(ErrorKind::InvalidInput)
        .with_message(message)
        .with_hint("Provide an address like name@example.com.")
}
