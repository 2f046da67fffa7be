use chrono::{DateTime, Duration, Utc};

use crate::errors::SasError;

use super::SasToken;

pub const DEFAULT_BUFFER_PERCENT: u8 = 15;

/// Decides when a token should be replaced before it expires.
///
/// The last `buffer_percent` of a token's lifetime is the renewal window.
/// Nothing is scheduled here; callers ask whenever they are about to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshPolicy {
    buffer_percent: u8,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            buffer_percent: DEFAULT_BUFFER_PERCENT,
        }
    }
}

impl RefreshPolicy {
    pub fn new(buffer_percent: u8) -> Result<Self, SasError> {
        if buffer_percent >= 100 {
            return Err(SasError::InvalidArgument {
                argument: "buffer_percent",
                reason: format!("{} is not below 100", buffer_percent),
            });
        }
        Ok(Self { buffer_percent })
    }

    pub fn buffer_percent(&self) -> u8 {
        self.buffer_percent
    }

    /// Instant from which `token`, signed at `issued_at`, should be renewed.
    pub fn refresh_at(&self, issued_at: DateTime<Utc>, token: &SasToken) -> DateTime<Utc> {
        let lifetime = (token.expires_on() - issued_at).max(Duration::zero());
        let buffer = lifetime * i32::from(self.buffer_percent) / 100;
        token.expires_on() - buffer
    }

    pub fn should_refresh(
        &self,
        issued_at: DateTime<Utc>,
        token: &SasToken,
        now: DateTime<Utc>,
    ) -> bool {
        now >= self.refresh_at(issued_at, token)
    }
}
