use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::errors::SasError;

use super::grammar::{Field, SCOPED_REQUIRED_FIELDS};
use super::parser::extract_fields;
use super::token::{ensure_not_blank, ensure_wire_safe, non_empty};
use super::SasToken;

/// A [`SasToken`] bound to one repository through the `rid` field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScopedSasToken {
    #[serde(flatten)]
    token: SasToken,
    scope_id: String,
}

impl ScopedSasToken {
    /// Parse a repository-scoped token.
    ///
    /// Missing fields are reported in the order `sig`, `rid`, `se`, `sr`.
    pub fn parse(name: &str, raw: &str) -> Result<Self, SasError> {
        ensure_not_blank("name", name)?;
        ensure_not_blank("raw_token", raw)?;

        let fields = extract_fields(raw)?;
        fields.require_all(&SCOPED_REQUIRED_FIELDS)?;

        non_empty(&fields, Field::Signature)?;
        let scope_id = non_empty(&fields, Field::RepositoryId)?;

        let token = SasToken::from_fields(name, &fields)?;
        Ok(Self {
            token,
            scope_id: scope_id.to_string(),
        })
    }

    /// Bind an existing token to `scope_id`, which must not contain `&`, `=`
    /// or whitespace.
    pub fn from_token(token: SasToken, scope_id: &str) -> Result<Self, SasError> {
        ensure_not_blank("scope_id", scope_id)?;
        ensure_wire_safe("scope_id", scope_id)?;
        Ok(Self {
            token,
            scope_id: scope_id.to_string(),
        })
    }

    /// The repository id carried in `rid`.
    pub fn scope_id(&self) -> &str {
        &self.scope_id
    }

    pub fn token(&self) -> &SasToken {
        &self.token
    }

    pub fn into_inner(self) -> SasToken {
        self.token
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.token.expires_on()
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.token.is_expired(now)
    }

    pub fn to_wire_string(&self) -> String {
        format!(
            "{}&{}={}",
            self.token.to_wire_string(),
            Field::RepositoryId,
            self.scope_id
        )
    }

    pub fn authorization_value(&self) -> String {
        self.to_wire_string()
    }
}

impl fmt::Display for ScopedSasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    use crate::sas::{signing, SasTokenBuilder, SigningKey};

    const NAME: &str = "modelrepo";

    #[test]
    fn test_parse_scoped_token() {
        let token = ScopedSasToken::parse(
            NAME,
            "SharedAccessSignature sr=repo.azureiotrepository.com&sig=xyz&se=1700000000&skn=reader&rid=repo-42",
        )
        .unwrap();
        assert_eq!(token.scope_id(), "repo-42");
        assert_eq!(token.token().key_name(), Some("reader"));
        assert_eq!(token.token().encoded_audience(), "repo.azureiotrepository.com");
        assert_eq!(
            token.to_wire_string(),
            "SharedAccessSignature sr=repo.azureiotrepository.com&sig=xyz&se=1700000000&skn=reader&rid=repo-42"
        );
    }

    #[test]
    fn test_scope_required_even_when_base_parses() {
        let raw = "sr=abc&sig=xyz&se=1700000000";
        assert!(SasToken::parse(NAME, raw).is_ok());
        let err = ScopedSasToken::parse(NAME, raw).unwrap_err();
        assert_eq!(err, SasError::MissingField(Field::RepositoryId));
        assert_eq!(err.to_string(), "Missing field: rid");
    }

    #[test]
    fn test_scoped_missing_field_order() {
        let cases = [
            ("sr=a", Field::Signature),
            ("sr=a&rid=r&se=1", Field::Signature),
            ("sr=a&sig=s", Field::RepositoryId),
            ("sr=a&sig=s&se=1", Field::RepositoryId),
            ("sr=a&sig=s&rid=r", Field::Expiry),
            ("sig=s&rid=r&se=1", Field::Audience),
        ];
        for (raw, expected) in cases {
            assert_eq!(
                ScopedSasToken::parse(NAME, raw).unwrap_err(),
                SasError::MissingField(expected),
                "{}",
                raw
            );
        }
    }

    #[test]
    fn test_empty_scope_rejected() {
        let err = ScopedSasToken::parse(NAME, "sr=a&sig=s&se=1&rid=").unwrap_err();
        assert_eq!(err.field(), Some(Field::RepositoryId));
    }

    #[test]
    fn test_empty_signature_reported_before_empty_scope() {
        let err = ScopedSasToken::parse(NAME, "sr=a&sig=&se=1&rid=").unwrap_err();
        assert_eq!(err.field(), Some(Field::Signature));
    }

    #[test]
    fn test_from_token_rejects_injected_scope() {
        let token = SasToken::parse(NAME, "sr=a&sig=s&se=1").unwrap();
        let err = ScopedSasToken::from_token(token.clone(), "repo-1&rid=repo-2").unwrap_err();
        assert!(matches!(err, SasError::InvalidArgument { argument: "scope_id", .. }));

        let scoped = ScopedSasToken::from_token(token, "repo-1").unwrap();
        let reparsed = ScopedSasToken::parse(NAME, &scoped.to_wire_string()).unwrap();
        assert_eq!(reparsed, scoped);
    }

    #[test]
    fn test_scoped_blank_arguments() {
        assert_eq!(
            ScopedSasToken::parse(" ", "sr=a&sig=s&se=1&rid=r").unwrap_err(),
            SasError::BlankArgument("name")
        );
        assert_eq!(
            ScopedSasToken::parse(NAME, "").unwrap_err(),
            SasError::BlankArgument("raw_token")
        );
    }

    #[test]
    fn test_scoped_delegates_to_base() {
        let key = SigningKey::from_bytes(b"repo-key".to_vec()).unwrap();
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let scoped = SasTokenBuilder::new("repo.azureiotrepository.com", key.clone())
            .key_name("reader")
            .time_to_live(Duration::minutes(10))
            .build_scoped_at(now, "repo-42")
            .unwrap();

        assert!(!scoped.is_expired(now));
        assert!(scoped.is_expired(now + Duration::minutes(10)));
        assert!(signing::verify(scoped.token(), &key));

        let reparsed = ScopedSasToken::parse(NAME, &scoped.authorization_value()).unwrap();
        assert_eq!(reparsed.scope_id(), "repo-42");
        assert_eq!(reparsed.token().signature(), scoped.token().signature());
        assert!(signing::verify(reparsed.token(), &key));
    }
}
