//! Connection strings as handed out for devices, modules and hub policies:
//!
//! ```text
//! HostName=acme.azure-devices.net;DeviceId=dumpy;ModuleId=mongo-server;SharedAccessKey=dGVzdFN0cmluZzE=
//! ```
//!
//! They are the usual source of the signing key and the resource a token
//! is scoped to.

use chrono::{DateTime, Duration, Utc};

use crate::errors::ConnectionStringError;
use crate::sas::grammar::SHARED_ACCESS_SIGNATURE;
use crate::sas::{SasToken, SasTokenBuilder, SigningKey};

const SEGMENT_SEPARATOR: char = ';';

const HOST_NAME: &str = "HostName";
const DEVICE_ID: &str = "DeviceId";
const MODULE_ID: &str = "ModuleId";
const GATEWAY_HOST_NAME: &str = "GatewayHostName";
const SHARED_ACCESS_KEY_NAME: &str = "SharedAccessKeyName";
const SHARED_ACCESS_KEY: &str = "SharedAccessKey";
const SHARED_ACCESS_SIGNATURE_KEY: &str = "SharedAccessSignature";

#[derive(Debug, Clone)]
pub enum Credential {
    /// Symmetric key that signs new tokens.
    Key(SigningKey),
    /// A token issued elsewhere, used as-is until it expires.
    Signature(String),
}

#[derive(Debug, Clone)]
pub struct ConnectionString {
    host_name: String,
    gateway_host_name: Option<String>,
    device_id: Option<String>,
    module_id: Option<String>,
    key_name: Option<String>,
    credential: Credential,
}

impl ConnectionString {
    pub fn parse(raw: &str) -> Result<Self, ConnectionStringError> {
        if raw.trim().is_empty() {
            return Err(ConnectionStringError::Empty);
        }

        let mut host_name = None;
        let mut gateway_host_name = None;
        let mut device_id = None;
        let mut module_id = None;
        let mut key_name = None;
        let mut key = None;
        let mut signature = None;

        for segment in raw.split(SEGMENT_SEPARATOR).map(str::trim).filter(|s| !s.is_empty()) {
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| ConnectionStringError::MalformedSegment(segment.to_string()))?;
            let value = value.trim().to_string();
            match name.trim() {
                HOST_NAME => host_name = Some(value),
                GATEWAY_HOST_NAME => gateway_host_name = Some(value),
                DEVICE_ID => device_id = Some(value),
                MODULE_ID => module_id = Some(value),
                SHARED_ACCESS_KEY_NAME => key_name = Some(value),
                SHARED_ACCESS_KEY => key = Some(value),
                SHARED_ACCESS_SIGNATURE_KEY => signature = Some(value),
                other => tracing::debug!(segment = other, "ignoring unknown connection string segment"),
            }
        }

        let host_name = host_name
            .filter(|h| !h.is_empty())
            .ok_or(ConnectionStringError::MissingValue(HOST_NAME))?;

        if module_id.is_some() && device_id.is_none() {
            return Err(ConnectionStringError::MissingValue(DEVICE_ID));
        }

        let credential = match (key, signature) {
            (Some(key), None) => Credential::Key(SigningKey::from_base64(&key)?),
            (None, Some(signature)) if !signature.is_empty() => Credential::Signature(signature),
            (None, Some(_)) => return Err(ConnectionStringError::MissingValue(SHARED_ACCESS_SIGNATURE_KEY)),
            _ => return Err(ConnectionStringError::AmbiguousCredential),
        };

        Ok(Self {
            host_name,
            gateway_host_name,
            device_id,
            module_id,
            key_name,
            credential,
        })
    }

    pub fn host_name(&self) -> &str {
        &self.host_name
    }

    pub fn gateway_host_name(&self) -> Option<&str> {
        self.gateway_host_name.as_deref()
    }

    pub fn device_id(&self) -> Option<&str> {
        self.device_id.as_deref()
    }

    pub fn module_id(&self) -> Option<&str> {
        self.module_id.as_deref()
    }

    pub fn key_name(&self) -> Option<&str> {
        self.key_name.as_deref()
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    /// The resource tokens from this connection string are scoped to.
    pub fn resource_uri(&self) -> String {
        let mut uri = self.host_name.clone();
        if let Some(device_id) = &self.device_id {
            uri.push_str("/devices/");
            uri.push_str(device_id);
            if let Some(module_id) = &self.module_id {
                uri.push_str("/modules/");
                uri.push_str(module_id);
            }
        }
        uri
    }

    /// Name recorded on tokens produced from this connection string.
    pub fn policy_name(&self) -> &str {
        self.key_name.as_deref().unwrap_or(SHARED_ACCESS_SIGNATURE)
    }

    pub fn token(&self, time_to_live: Duration) -> Result<SasToken, ConnectionStringError> {
        self.token_at(Utc::now(), time_to_live)
    }

    /// Sign a token with the key, or parse the embedded signature.
    pub fn token_at(
        &self,
        now: DateTime<Utc>,
        time_to_live: Duration,
    ) -> Result<SasToken, ConnectionStringError> {
        let token = match &self.credential {
            Credential::Key(key) => {
                let mut builder = SasTokenBuilder::new(self.resource_uri(), key.clone())
                    .policy_name(self.policy_name())
                    .time_to_live(time_to_live);
                if let Some(key_name) = &self.key_name {
                    builder = builder.key_name(key_name.as_str());
                }
                builder.build_at(now)?
            }
            Credential::Signature(raw) => SasToken::parse(self.policy_name(), raw)?,
        };
        Ok(token)
    }
}
