use chrono::{DateTime, Duration, Utc};

use crate::errors::SasError;

use super::grammar::SHARED_ACCESS_SIGNATURE;
use super::token::{ensure_not_blank, ensure_wire_safe};
use super::{SasToken, ScopedSasToken, SigningKey};

/// Default validity of a freshly signed token.
pub const DEFAULT_TIME_TO_LIVE_SECS: i64 = 3600;

/// Signs new tokens for one resource.
///
/// ```
/// use chrono::Duration;
/// use sastoken::sas::{SasTokenBuilder, SigningKey};
///
/// let key = SigningKey::from_base64("dGVzdFN0cmluZzE=").unwrap();
/// let token = SasTokenBuilder::new("myhub.azure-devices.net/devices/d1", key)
///     .key_name("device")
///     .time_to_live(Duration::minutes(30))
///     .build()
///     .unwrap();
/// assert!(token.authorization_value().starts_with("SharedAccessSignature sr="));
/// ```
#[derive(Debug, Clone)]
pub struct SasTokenBuilder {
    audience: String,
    key: SigningKey,
    key_name: Option<String>,
    policy_name: Option<String>,
    time_to_live: Duration,
}

impl SasTokenBuilder {
    /// `audience` is the plain resource URI; it is URL-encoded when signing.
    pub fn new(audience: impl Into<String>, key: SigningKey) -> Self {
        Self {
            audience: audience.into(),
            key,
            key_name: None,
            policy_name: None,
            time_to_live: Duration::seconds(DEFAULT_TIME_TO_LIVE_SECS),
        }
    }

    pub fn key_name(mut self, key_name: impl Into<String>) -> Self {
        self.key_name = Some(key_name.into());
        self
    }

    /// Label kept on the token. Defaults to the key name, or
    /// `SharedAccessSignature` when there is none.
    pub fn policy_name(mut self, policy_name: impl Into<String>) -> Self {
        self.policy_name = Some(policy_name.into());
        self
    }

    pub fn time_to_live(mut self, time_to_live: Duration) -> Self {
        self.time_to_live = time_to_live;
        self
    }

    pub fn build(&self) -> Result<SasToken, SasError> {
        self.build_at(Utc::now())
    }

    pub fn build_at(&self, now: DateTime<Utc>) -> Result<SasToken, SasError> {
        ensure_not_blank("audience", &self.audience)?;
        if self.time_to_live <= Duration::zero() {
            return Err(SasError::InvalidArgument {
                argument: "time_to_live",
                reason: "must be positive".to_string(),
            });
        }
        if let Some(key_name) = &self.key_name {
            ensure_not_blank("key_name", key_name)?;
            ensure_wire_safe("key_name", key_name)?;
        }

        // Whole seconds; sub-second parts of `now` are dropped.
        let expiry_seconds = now
            .checked_add_signed(self.time_to_live)
            .and_then(|expiry| u64::try_from(expiry.timestamp()).ok())
            .ok_or_else(|| SasError::InvalidArgument {
                argument: "time_to_live",
                reason: "expiry is out of range".to_string(),
            })?;

        let policy_name = self
            .policy_name
            .clone()
            .or_else(|| self.key_name.clone())
            .unwrap_or_else(|| SHARED_ACCESS_SIGNATURE.to_string());
        ensure_not_blank("policy_name", &policy_name)?;

        let encoded_audience = urlencoding::encode(&self.audience).into_owned();

        tracing::debug!(
            policy = %policy_name,
            audience = %self.audience,
            expiry = expiry_seconds,
            "signing shared access signature"
        );

        SasToken::signed(
            policy_name,
            encoded_audience,
            expiry_seconds,
            self.key_name.clone(),
            &self.key,
        )
    }

    pub fn build_scoped(&self, scope_id: &str) -> Result<ScopedSasToken, SasError> {
        self.build_scoped_at(Utc::now(), scope_id)
    }

    pub fn build_scoped_at(
        &self,
        now: DateTime<Utc>,
        scope_id: &str,
    ) -> Result<ScopedSasToken, SasError> {
        ensure_not_blank("scope_id", scope_id)?;
        ensure_wire_safe("scope_id", scope_id)?;
        let token = self.build_at(now)?;
        ScopedSasToken::from_token(token, scope_id)
    }
}
