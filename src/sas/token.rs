use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::errors::SasError;

use super::grammar::{
    Field, BASE_REQUIRED_FIELDS, EPOCH, FIELD_SEPARATOR, KEY_VALUE_SEPARATOR,
    SHARED_ACCESS_SIGNATURE,
};
use super::parser::{extract_fields, TokenFields};
use super::signing::{self, SigningKey};
use super::SasTokenBuilder;

/// A validated, immutable Shared Access Signature.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SasToken {
    policy_name: String,
    expires_on: DateTime<Utc>,
    expiry_raw: String,
    key_name: Option<String>,
    signature: String,
    encoded_audience: String,
}

impl SasToken {
    /// Parse a token string.
    ///
    /// `name` labels the policy the token came from and is not read from the
    /// string. A token that is already expired parses fine; use
    /// [`SasToken::is_expired`] to reject it.
    pub fn parse(name: &str, raw: &str) -> Result<Self, SasError> {
        ensure_not_blank("name", name)?;
        ensure_not_blank("raw_token", raw)?;

        let fields = extract_fields(raw)?;
        fields.require_all(&BASE_REQUIRED_FIELDS)?;
        Self::from_fields(name, &fields)
    }

    /// Build a token from fields whose presence has already been checked.
    pub(crate) fn from_fields(name: &str, fields: &TokenFields) -> Result<Self, SasError> {
        let signature = non_empty(fields, Field::Signature)?;
        let expiry_raw = fields.require(Field::Expiry)?;
        let expires_on = expiry_from_raw(expiry_raw)?;
        let encoded_audience = non_empty(fields, Field::Audience)?;
        let key_name = fields.get(Field::KeyName).map(str::to_string);

        Ok(Self {
            policy_name: name.to_string(),
            expires_on,
            expiry_raw: expiry_raw.to_string(),
            key_name,
            signature: signature.to_string(),
            encoded_audience: encoded_audience.to_string(),
        })
    }

    /// Sign a new token for `audience`, valid for `validity` from now.
    pub fn create(
        audience: &str,
        key: &SigningKey,
        validity: Duration,
        key_name: Option<&str>,
    ) -> Result<Self, SasError> {
        Self::create_at(Utc::now(), audience, key, validity, key_name)
    }

    /// Like [`SasToken::create`] with an explicit clock.
    pub fn create_at(
        now: DateTime<Utc>,
        audience: &str,
        key: &SigningKey,
        validity: Duration,
        key_name: Option<&str>,
    ) -> Result<Self, SasError> {
        let mut builder = SasTokenBuilder::new(audience, key.clone()).time_to_live(validity);
        if let Some(key_name) = key_name {
            builder = builder.key_name(key_name);
        }
        builder.build_at(now)
    }

    /// Assemble a signed token. Callers have already validated the inputs.
    pub(crate) fn signed(
        policy_name: String,
        encoded_audience: String,
        expiry_seconds: u64,
        key_name: Option<String>,
        key: &SigningKey,
    ) -> Result<Self, SasError> {
        let expiry_raw = expiry_seconds.to_string();
        let expires_on = expiry_from_raw(&expiry_raw)?;
        let canonical = signing::canonical_string(&encoded_audience, &expiry_raw);
        let signature = urlencoding::encode(&signing::sign(key, &canonical)).into_owned();

        Ok(Self {
            policy_name,
            expires_on,
            expiry_raw,
            key_name,
            signature,
            encoded_audience,
        })
    }

    pub fn policy_name(&self) -> &str {
        &self.policy_name
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    /// The `se` value exactly as it appeared in the token.
    pub fn expiry_raw(&self) -> &str {
        &self.expiry_raw
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    /// The `sig` value as it appears on the wire.
    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn encoded_audience(&self) -> &str {
        &self.encoded_audience
    }

    /// The resource URI with percent-encoding removed.
    pub fn decoded_audience(&self) -> Result<String, SasError> {
        urlencoding::decode(&self.encoded_audience)
            .map(|audience| audience.into_owned())
            .map_err(|e| SasError::invalid(Field::Audience, e.to_string()))
    }

    /// A token stops being valid at its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_on
    }

    pub fn ensure_not_expired(&self, now: DateTime<Utc>) -> Result<(), SasError> {
        if self.is_expired(now) {
            return Err(SasError::Expired {
                expires_on: self.expires_on,
            });
        }
        Ok(())
    }

    /// Validity left at `now`, zero once expired.
    pub fn remaining(&self, now: DateTime<Utc>) -> Duration {
        (self.expires_on - now).max(Duration::zero())
    }

    /// Check expiry, then the signature against `key`.
    pub fn authenticate(&self, key: &SigningKey, now: DateTime<Utc>) -> Result<(), SasError> {
        self.ensure_not_expired(now)?;
        if !signing::verify(self, key) {
            return Err(SasError::SignatureMismatch);
        }
        Ok(())
    }

    pub fn to_wire_string(&self) -> String {
        let mut wire = format!(
            "{} {}={}&{}={}&{}={}",
            SHARED_ACCESS_SIGNATURE,
            Field::Audience,
            self.encoded_audience,
            Field::Signature,
            self.signature,
            Field::Expiry,
            self.expiry_raw,
        );
        if let Some(key_name) = &self.key_name {
            wire.push_str(&format!("&{}={}", Field::KeyName, key_name));
        }
        wire
    }

    /// Value for an `Authorization` header or connection password.
    pub fn authorization_value(&self) -> String {
        self.to_wire_string()
    }
}

impl fmt::Display for SasToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_wire_string())
    }
}

pub(crate) fn ensure_not_blank(argument: &'static str, value: &str) -> Result<(), SasError> {
    if value.trim().is_empty() {
        return Err(SasError::BlankArgument(argument));
    }
    Ok(())
}

/// Rejects text that would split into extra records on the wire.
pub(crate) fn ensure_wire_safe(argument: &'static str, value: &str) -> Result<(), SasError> {
    let unsafe_char = |c: char| {
        c == FIELD_SEPARATOR || c == KEY_VALUE_SEPARATOR || c.is_whitespace()
    };
    if value.contains(unsafe_char) {
        return Err(SasError::InvalidArgument {
            argument,
            reason: format!(
                "must not contain '{}', '{}' or whitespace",
                FIELD_SEPARATOR, KEY_VALUE_SEPARATOR
            ),
        });
    }
    Ok(())
}

pub(crate) fn non_empty(fields: &TokenFields, field: Field) -> Result<&str, SasError> {
    let value = fields.require(field)?;
    if value.is_empty() {
        return Err(SasError::invalid(field, "value is empty"));
    }
    Ok(value)
}

fn expiry_from_raw(raw: &str) -> Result<DateTime<Utc>, SasError> {
    // u64::from_str would also take a leading '+'
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return Err(SasError::invalid(
            Field::Expiry,
            format!("'{}' is not a whole number of seconds", raw),
        ));
    }
    let seconds: u64 = raw
        .parse()
        .map_err(|_| SasError::invalid(Field::Expiry, format!("'{}' is out of range", raw)))?;
    i64::try_from(seconds)
        .ok()
        .and_then(|secs| EPOCH.checked_add_signed(Duration::try_seconds(secs)?))
        .ok_or_else(|| SasError::invalid(Field::Expiry, format!("'{}' is out of range", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const NAME: &str = "iothubowner";

    fn test_key() -> SigningKey {
        SigningKey::from_base64("dGVzdFN0cmluZzE=").unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    #[test]
    fn test_parse_without_key_name() {
        let token = SasToken::parse(NAME, "sr=abc&sig=xyz&se=1700000000").unwrap();
        assert_eq!(token.policy_name(), NAME);
        assert_eq!(token.encoded_audience(), "abc");
        assert_eq!(token.signature(), "xyz");
        assert_eq!(token.expiry_raw(), "1700000000");
        assert_eq!(token.key_name(), None);
        assert_eq!(token.expires_on(), at(1_700_000_000));
        assert!(!token.to_wire_string().contains("&skn="));
    }

    #[test]
    fn test_parse_with_key_name_and_prefix() {
        let token = SasToken::parse(
            NAME,
            "SharedAccessSignature sr=abc&sig=xyz&se=1700000000&skn=iothubowner",
        )
        .unwrap();
        assert_eq!(token.key_name(), Some("iothubowner"));
    }

    #[test]
    fn test_wire_string_field_order() {
        let token = SasToken::parse(NAME, "skn=owner&se=42&sig=xyz&sr=abc").unwrap();
        assert_eq!(
            token.to_wire_string(),
            "SharedAccessSignature sr=abc&sig=xyz&se=42&skn=owner"
        );
        assert_eq!(token.authorization_value(), token.to_wire_string());
        assert_eq!(token.to_string(), token.to_wire_string());
    }

    #[test]
    fn test_missing_signature_reported_first() {
        let err = SasToken::parse(NAME, "sr=abc").unwrap_err();
        assert_eq!(err, SasError::MissingField(Field::Signature));
        assert_eq!(err.to_string(), "Missing field: sig");
    }

    #[test]
    fn test_missing_expiry_then_audience() {
        assert_eq!(
            SasToken::parse(NAME, "sig=xyz").unwrap_err(),
            SasError::MissingField(Field::Expiry)
        );
        assert_eq!(
            SasToken::parse(NAME, "sig=xyz&se=1").unwrap_err(),
            SasError::MissingField(Field::Audience)
        );
    }

    #[test]
    fn test_blank_arguments_rejected_before_parsing() {
        assert_eq!(
            SasToken::parse("", "sr=a&sig=b&se=1").unwrap_err(),
            SasError::BlankArgument("name")
        );
        assert_eq!(
            SasToken::parse("name", "").unwrap_err(),
            SasError::BlankArgument("raw_token")
        );
        assert_eq!(
            SasToken::parse("name", " \t ").unwrap_err(),
            SasError::BlankArgument("raw_token")
        );
    }

    #[test]
    fn test_non_numeric_expiry() {
        for raw in ["sr=a&sig=b&se=soon", "sr=a&sig=b&se=-5", "sr=a&sig=b&se=1.5", "sr=a&sig=b&se=", "sr=a&sig=b&se=+5"] {
            let err = SasToken::parse(NAME, raw).unwrap_err();
            assert_eq!(err.field(), Some(Field::Expiry), "{}", raw);
            assert!(err.is_format_error());
        }
    }

    #[test]
    fn test_out_of_range_expiry() {
        let err = SasToken::parse(NAME, "sr=a&sig=b&se=18446744073709551615").unwrap_err();
        assert_eq!(err.field(), Some(Field::Expiry));
    }

    #[test]
    fn test_empty_signature_or_audience() {
        assert_eq!(
            SasToken::parse(NAME, "sr=a&sig=&se=1").unwrap_err().field(),
            Some(Field::Signature)
        );
        assert_eq!(
            SasToken::parse(NAME, "sr&sig=b&se=1").unwrap_err().field(),
            Some(Field::Audience)
        );
    }

    #[test]
    fn test_empty_values_reported_in_required_order() {
        assert_eq!(
            SasToken::parse(NAME, "sr=&sig=&se=x").unwrap_err().field(),
            Some(Field::Signature)
        );
        assert_eq!(
            SasToken::parse(NAME, "sr=&sig=b&se=x").unwrap_err().field(),
            Some(Field::Expiry)
        );
    }

    #[test]
    fn test_key_name_cannot_add_wire_fields() {
        for key_name in ["own&sr=evil", "own=x", "own er", "owner\n"] {
            let err = SasToken::create_at(
                at(1_700_000_000),
                "hub/devices/d1",
                &test_key(),
                Duration::hours(1),
                Some(key_name),
            )
            .unwrap_err();
            assert!(
                matches!(err, SasError::InvalidArgument { argument: "key_name", .. }),
                "{:?}",
                key_name
            );
        }
    }

    #[test]
    fn test_expiry_boundary_is_inclusive() {
        let token = SasToken::parse(NAME, "sr=a&sig=b&se=1000").unwrap();
        assert!(token.is_expired(at(1000)));
        assert!(!token.is_expired(at(999)));
        assert!(token.is_expired(at(1001)));
    }

    #[test]
    fn test_expired_token_still_parses() {
        let token = SasToken::parse(NAME, "sr=a&sig=b&se=1").unwrap();
        assert_eq!(
            token.ensure_not_expired(at(10)),
            Err(SasError::Expired { expires_on: at(1) })
        );
        assert_eq!(token.remaining(at(10)), Duration::zero());
    }

    #[test]
    fn test_remaining_validity() {
        let token = SasToken::parse(NAME, "sr=a&sig=b&se=1000").unwrap();
        assert_eq!(token.remaining(at(400)), Duration::seconds(600));
    }

    #[test]
    fn test_create_round_trips_through_parse() {
        let now = at(1_700_000_000);
        let token = SasToken::create_at(
            now,
            "myhub.azure-devices.net/devices/device1",
            &test_key(),
            Duration::hours(1),
            Some("device"),
        )
        .unwrap();

        assert_eq!(token.expiry_raw(), "1700003600");
        assert_eq!(token.expires_on(), at(1_700_003_600));
        assert_eq!(token.encoded_audience(), "myhub.azure-devices.net%2Fdevices%2Fdevice1");

        let parsed = SasToken::parse(token.policy_name(), &token.to_wire_string()).unwrap();
        assert_eq!(parsed, token);
    }

    #[test]
    fn test_created_token_authenticates() {
        let now = at(1_700_000_000);
        let token =
            SasToken::create_at(now, "myhub/devices/d1", &test_key(), Duration::minutes(5), None)
                .unwrap();
        assert!(signing::verify(&token, &test_key()));
        assert_eq!(token.authenticate(&test_key(), now), Ok(()));

        let other = SigningKey::from_bytes(b"someone else".to_vec()).unwrap();
        assert_eq!(
            token.authenticate(&other, now),
            Err(SasError::SignatureMismatch)
        );
        assert!(matches!(
            token.authenticate(&test_key(), now + Duration::minutes(5)),
            Err(SasError::Expired { .. })
        ));
    }

    #[test]
    fn test_tampered_signature_fails_verification_but_parses() {
        let token =
            SasToken::create_at(at(0), "hub/devices/d1", &test_key(), Duration::hours(1), None)
                .unwrap();
        let mut sig: Vec<u8> = token.signature().as_bytes().to_vec();
        sig[0] = if sig[0] == b'A' { b'B' } else { b'A' };
        let tampered = format!(
            "sr={}&sig={}&se={}",
            token.encoded_audience(),
            String::from_utf8(sig).unwrap(),
            token.expiry_raw()
        );

        let parsed = SasToken::parse(NAME, &tampered).unwrap();
        assert!(!signing::verify(&parsed, &test_key()));
    }

    #[test]
    fn test_unencoded_signature_still_verifies() {
        let token =
            SasToken::create_at(at(0), "hub/devices/d1", &test_key(), Duration::hours(1), None)
                .unwrap();
        let canonical = signing::canonical_string(token.encoded_audience(), token.expiry_raw());
        let plain = signing::sign(&test_key(), &canonical);
        let raw = format!(
            "sr={}&sig={}&se={}",
            token.encoded_audience(),
            plain,
            token.expiry_raw()
        );
        let parsed = SasToken::parse(NAME, &raw).unwrap();
        assert!(signing::verify(&parsed, &test_key()));
    }

    #[test]
    fn test_decoded_audience() {
        let token = SasToken::parse(NAME, "sr=hub%2Fdevices%2Fd1&sig=b&se=1").unwrap();
        assert_eq!(token.decoded_audience().unwrap(), "hub/devices/d1");
    }
}
