use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::sas::grammar::Field;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SasError {
    /// A caller-supplied argument was empty or whitespace.
    #[error("argument must not be blank: {0}")]
    BlankArgument(&'static str),

    #[error("invalid argument {argument}: {reason}")]
    InvalidArgument {
        argument: &'static str,
        reason: String,
    },

    #[error("token string is empty")]
    EmptyToken,

    #[error("Missing field: {0}")]
    MissingField(Field),

    #[error("Invalid field: {field}: {reason}")]
    InvalidField { field: Field, reason: String },

    #[error("signature mismatch")]
    SignatureMismatch,

    #[error("token expired at {expires_on}")]
    Expired { expires_on: DateTime<Utc> },

    #[error("invalid key: {0}")]
    InvalidKey(String),
}

impl SasError {
    /// True for errors caused by the token text itself rather than by the
    /// caller's arguments or by a trust failure.
    pub fn is_format_error(&self) -> bool {
        matches!(
            self,
            SasError::EmptyToken | SasError::MissingField(_) | SasError::InvalidField { .. }
        )
    }

    /// The field the error is about, when there is one.
    pub fn field(&self) -> Option<Field> {
        match self {
            SasError::MissingField(field) | SasError::InvalidField { field, .. } => Some(*field),
            _ => None,
        }
    }

    pub(crate) fn invalid(field: Field, reason: impl Into<String>) -> Self {
        SasError::InvalidField {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectionStringError {
    #[error("connection string is empty")]
    Empty,

    #[error("malformed connection string segment: '{0}'")]
    MalformedSegment(String),

    #[error("connection string is missing {0}")]
    MissingValue(&'static str),

    #[error("connection string must carry exactly one of SharedAccessKey or SharedAccessSignature")]
    AmbiguousCredential,

    #[error(transparent)]
    Token(#[from] SasError),
}
