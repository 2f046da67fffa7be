//! Splits a raw token into fields and checks which ones are present.
//!
//! Nothing here interprets field values; that happens when a
//! [`SasToken`](super::SasToken) is built from the fields.

use std::collections::HashMap;

use crate::errors::SasError;

use super::grammar::{Field, FIELD_SEPARATOR, KEY_VALUE_SEPARATOR, SHARED_ACCESS_SIGNATURE};

/// Ordered key/value pairs from a token string.
///
/// Unknown keys are kept. A repeated key keeps the position of its first
/// occurrence and the value of its last.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenFields {
    entries: Vec<(String, String)>,
    index: HashMap<String, usize>,
}

impl TokenFields {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the replaced value when `key` was already present.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.index.get(&key) {
            Some(&position) => Some(std::mem::replace(&mut self.entries[position].1, value)),
            None => {
                self.index.insert(key.clone(), self.entries.len());
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, field: Field) -> Option<&str> {
        self.get_raw(field.as_str())
    }

    pub fn get_raw(&self, key: &str) -> Option<&str> {
        self.index
            .get(key)
            .map(|&position| self.entries[position].1.as_str())
    }

    pub fn contains(&self, field: Field) -> bool {
        self.get(field).is_some()
    }

    pub fn require(&self, field: Field) -> Result<&str, SasError> {
        self.get(field).ok_or(SasError::MissingField(field))
    }

    /// Checks presence of `order` front to back and reports the first gap.
    pub fn require_all(&self, order: &[Field]) -> Result<(), SasError> {
        for field in order {
            self.require(*field)?;
        }
        Ok(())
    }

    /// Keys outside the scheme's vocabulary, in input order.
    pub fn unknown_keys(&self) -> impl Iterator<Item = &str> {
        self.entries
            .iter()
            .map(|(k, _)| k.as_str())
            .filter(|k| Field::from_key(k).is_none())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Split `raw` into its fields.
///
/// A leading `SharedAccessSignature ` prefix is optional. Records are split on
/// `&`, then on the first `=`; empty records are skipped and a record without
/// `=` becomes a key with an empty value. Values are kept exactly as written.
pub fn extract_fields(raw: &str) -> Result<TokenFields, SasError> {
    let body = strip_prefix(raw.trim());
    if body.is_empty() {
        return Err(SasError::EmptyToken);
    }

    let mut fields = TokenFields::new();
    for record in body.split(FIELD_SEPARATOR) {
        if record.is_empty() {
            continue;
        }
        let (key, value) = record
            .split_once(KEY_VALUE_SEPARATOR)
            .unwrap_or((record, ""));
        if fields.insert(key, value).is_some() {
            tracing::debug!(key = key, "duplicate token field, keeping the last value");
        }
    }
    Ok(fields)
}

fn strip_prefix(raw: &str) -> &str {
    match raw.strip_prefix(SHARED_ACCESS_SIGNATURE) {
        Some(rest) if rest.is_empty() => rest,
        Some(rest) if rest.starts_with(char::is_whitespace) => rest.trim_start(),
        _ => raw,
    }
}
