//! Field names and fixed constants of the Shared Access Signature scheme.
//!
//! Every component that needs a field name goes through [`Field`] so the
//! parser and the serializer cannot drift apart.

use std::fmt;

use chrono::{DateTime, Utc};

/// Prefix of a serialized token, separated from the fields by one space.
pub const SHARED_ACCESS_SIGNATURE: &str = "SharedAccessSignature";

pub const FIELD_SEPARATOR: char = '&';
pub const KEY_VALUE_SEPARATOR: char = '=';

/// Separator between the audience and the expiry in the signed string.
pub const CANONICAL_SEPARATOR: char = '\n';

/// Zero point for `se` (seconds since 1970-01-01T00:00:00Z).
pub const EPOCH: DateTime<Utc> = DateTime::<Utc>::UNIX_EPOCH;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Field {
    /// `sr`: URL-encoded resource the token authorizes.
    Audience,
    /// `sig`: base64 MAC over the canonical string.
    Signature,
    /// `se`: expiry in whole seconds since [`EPOCH`].
    Expiry,
    /// `skn`: name of the policy key that signed the token.
    KeyName,
    /// `rid`: repository the token is scoped to.
    RepositoryId,
}

impl Field {
    pub const ALL: [Field; 5] = [
        Field::Audience,
        Field::Signature,
        Field::Expiry,
        Field::KeyName,
        Field::RepositoryId,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Field::Audience => "sr",
            Field::Signature => "sig",
            Field::Expiry => "se",
            Field::KeyName => "skn",
            Field::RepositoryId => "rid",
        }
    }

    /// Case-sensitive lookup of a wire key.
    pub fn from_key(key: &str) -> Option<Field> {
        Field::ALL.into_iter().find(|f| f.as_str() == key)
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Presence checks for a plain token, in the order they are reported.
/// `skn` is optional and not listed.
pub const BASE_REQUIRED_FIELDS: [Field; 3] = [Field::Signature, Field::Expiry, Field::Audience];

/// Presence checks for a repository-scoped token, in the order they are
/// reported.
pub const SCOPED_REQUIRED_FIELDS: [Field; 4] = [
    Field::Signature,
    Field::RepositoryId,
    Field::Expiry,
    Field::Audience,
];
