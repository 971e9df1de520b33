//! Credential lookup for authenticated endpoints.
//!
//! Protocol definitions never carry secrets. Generated tools ask a
//! [`CredentialProvider`] at call time; the default provider reads
//! environment variables named after the protocol:
//!
//! | scheme         | variables                                  |
//! |----------------|--------------------------------------------|
//! | `api_key`      | `PROTOCOL_<NAME>_API_KEY`                  |
//! | `bearer_token` | `PROTOCOL_<NAME>_TOKEN`                    |
//! | `basic`        | `PROTOCOL_<NAME>_USERNAME`, `_PASSWORD`    |
//! | `oauth2`       | `PROTOCOL_<NAME>_ACCESS_TOKEN`             |
//!
//! `<NAME>` is the protocol name upper-cased with `-` replaced by `_`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::domains::protocols::Authentication;

/// A secret resolved for one protocol.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    ApiKey(String),
    Bearer(String),
    Basic { username: String, password: String },
    OAuth2AccessToken(String),
}

impl Credential {
    /// Whether this credential can satisfy `auth`.
    pub fn matches(&self, auth: &Authentication) -> bool {
        matches!(
            (self, auth),
            (Self::ApiKey(_), Authentication::ApiKey { .. })
                | (Self::Bearer(_), Authentication::BearerToken)
                | (Self::Basic { .. }, Authentication::Basic)
                | (Self::OAuth2AccessToken(_), Authentication::OAuth2 { .. })
        )
    }
}

/// Secrets never reach logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ApiKey(_) => f.write_str("ApiKey([REDACTED])"),
            Self::Bearer(_) => f.write_str("Bearer([REDACTED])"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
            Self::OAuth2AccessToken(_) => f.write_str("OAuth2AccessToken([REDACTED])"),
        }
    }
}

/// Source of credentials for generated tools.
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Resolve the credential `protocol` needs for `auth`, if configured.
    async fn credential(&self, protocol: &str, auth: &Authentication) -> Option<Credential>;
}

/// Reads credentials from environment variables.
#[derive(Debug, Clone)]
pub struct EnvCredentialProvider {
    prefix: String,
}

impl EnvCredentialProvider {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Variable name for `suffix`, e.g. `PROTOCOL_WEATHER_API_API_KEY`.
    pub fn variable(&self, protocol: &str, suffix: &str) -> String {
        format!(
            "{}_{}_{}",
            self.prefix,
            protocol.to_uppercase().replace('-', "_"),
            suffix
        )
    }

    fn read(&self, protocol: &str, suffix: &str) -> Option<String> {
        std::env::var(self.variable(protocol, suffix))
            .ok()
            .filter(|v| !v.is_empty())
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new("PROTOCOL")
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn credential(&self, protocol: &str, auth: &Authentication) -> Option<Credential> {
        match auth {
            Authentication::ApiKey { .. } => self.read(protocol, "API_KEY").map(Credential::ApiKey),
            Authentication::BearerToken => self.read(protocol, "TOKEN").map(Credential::Bearer),
            Authentication::Basic => Some(Credential::Basic {
                username: self.read(protocol, "USERNAME")?,
                password: self.read(protocol, "PASSWORD").unwrap_or_default(),
            }),
            Authentication::OAuth2 { .. } => self
                .read(protocol, "ACCESS_TOKEN")
                .map(Credential::OAuth2AccessToken),
        }
    }
}

/// Fixed credentials keyed by protocol name.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentialProvider {
    credentials: HashMap<String, Credential>,
}

impl StaticCredentialProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, protocol: impl Into<String>, credential: Credential) -> Self {
        self.credentials.insert(protocol.into(), credential);
        self
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn credential(&self, protocol: &str, auth: &Authentication) -> Option<Credential> {
        self.credentials
            .get(protocol)
            .filter(|c| c.matches(auth))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::protocols::ApiKeyLocation;

    fn api_key() -> Authentication {
        Authentication::ApiKey {
            location: ApiKeyLocation::Header,
            name: "X-Api-Key".to_string(),
        }
    }

    #[test]
    fn test_variable_names() {
        let provider = EnvCredentialProvider::default();
        assert_eq!(
            provider.variable("weather-api", "API_KEY"),
            "PROTOCOL_WEATHER_API_API_KEY"
        );
        assert_eq!(
            EnvCredentialProvider::new("ACME").variable("dex", "TOKEN"),
            "ACME_DEX_TOKEN"
        );
    }

    #[tokio::test]
    async fn test_env_provider_reads_scheme_variables() {
        let provider = EnvCredentialProvider::new("CREDTEST");
        unsafe {
            std::env::set_var("CREDTEST_SAMPLE_API_API_KEY", "k-123");
            std::env::set_var("CREDTEST_SAMPLE_API_USERNAME", "alice");
        }

        assert_eq!(
            provider.credential("sample-api", &api_key()).await,
            Some(Credential::ApiKey("k-123".to_string()))
        );
        assert_eq!(
            provider.credential("sample-api", &Authentication::Basic).await,
            Some(Credential::Basic {
                username: "alice".to_string(),
                password: String::new()
            })
        );
        assert_eq!(
            provider
                .credential("sample-api", &Authentication::BearerToken)
                .await,
            None
        );

        unsafe {
            std::env::remove_var("CREDTEST_SAMPLE_API_API_KEY");
            std::env::remove_var("CREDTEST_SAMPLE_API_USERNAME");
        }
    }

    #[tokio::test]
    async fn test_static_provider_checks_scheme() {
        let provider = StaticCredentialProvider::new()
            .with("weather-api", Credential::ApiKey("k".to_string()));
        assert!(provider.credential("weather-api", &api_key()).await.is_some());
        assert!(
            provider
                .credential("weather-api", &Authentication::BearerToken)
                .await
                .is_none()
        );
        assert!(provider.credential("other", &api_key()).await.is_none());
    }

    #[test]
    fn test_debug_redacts_secrets() {
        let debug = format!(
            "{:?} {:?}",
            Credential::Bearer("tok-secret".to_string()),
            Credential::Basic {
                username: "bob".to_string(),
                password: "hunter2".to_string()
            }
        );
        assert!(!debug.contains("tok-secret"));
        assert!(!debug.contains("hunter2"));
        assert!(debug.contains("bob"));
    }
}
