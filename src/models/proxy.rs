use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Transport scheme spoken to an egress proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProxyScheme {
    #[default]
    Http,
    Https,
}

impl ProxyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProxyScheme::Http => "http",
            ProxyScheme::Https => "https",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "http" => Some(ProxyScheme::Http),
            "https" => Some(ProxyScheme::Https),
            _ => None,
        }
    }

    /// The other scheme, used as the fallback transport
    pub fn other(&self) -> Self {
        match self {
            ProxyScheme::Http => ProxyScheme::Https,
            ProxyScheme::Https => ProxyScheme::Http,
        }
    }

    /// Native scheme first, then the fallback
    pub fn attempt_order(&self) -> [ProxyScheme; 2] {
        [*self, self.other()]
    }
}

impl fmt::Display for ProxyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Provider a proxy endpoint was sourced from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    #[default]
    Free,
    Premium,
    Rotating,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::Free => "free",
            ProviderType::Premium => "premium",
            ProviderType::Rotating => "rotating",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "free" => Some(ProviderType::Free),
            "premium" => Some(ProviderType::Premium),
            "rotating" => Some(ProviderType::Rotating),
            _ => None,
        }
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Coarse reliability grade attached by the provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Reliability {
    #[default]
    Low,
    Medium,
    High,
}

/// Provider-supplied metadata about an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ProxyMetadata {
    pub source: String,
    pub last_checked: Option<DateTime<Utc>>,
    pub reliability: Reliability,
}

/// Identity of an endpoint: two endpoints are the same proxy if address and port match
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EndpointId {
    pub address: String,
    pub port: u16,
}

impl fmt::Display for EndpointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.address, self.port)
    }
}

/// An egress proxy endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyEndpoint {
    pub address: String,
    pub port: u16,
    pub scheme: ProxyScheme,
    #[serde(default)]
    pub provider: ProviderType,
    #[serde(default)]
    pub metadata: ProxyMetadata,
}

impl ProxyEndpoint {
    pub fn new(address: impl Into<String>, port: u16, scheme: ProxyScheme) -> Self {
        Self {
            address: address.into(),
            port,
            scheme,
            provider: ProviderType::default(),
            metadata: ProxyMetadata::default(),
        }
    }

    pub fn with_provider(mut self, provider: ProviderType) -> Self {
        self.provider = provider;
        self
    }

    pub fn with_metadata(mut self, metadata: ProxyMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn id(&self) -> EndpointId {
        EndpointId {
            address: self.address.clone(),
            port: self.port,
        }
    }

    /// Proxy URL for the given scheme, e.g. `http://1.2.3.4:8080`
    pub fn url(&self, scheme: ProxyScheme) -> String {
        format!("{}://{}:{}", scheme, self.address, self.port)
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} ({})", self.address, self.port, self.scheme)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_proxy_scheme_parsing_and_fallback() {
        assert_eq!(ProxyScheme::from_str("HTTP"), Some(ProxyScheme::Http));
        assert_eq!(ProxyScheme::from_str("https"), Some(ProxyScheme::Https));
        assert_eq!(ProxyScheme::from_str("socks5"), None);

        assert_eq!(ProxyScheme::Http.other(), ProxyScheme::Https);
        assert_eq!(
            ProxyScheme::Https.attempt_order(),
            [ProxyScheme::Https, ProxyScheme::Http]
        );
    }

    #[test]
    fn test_provider_type_round_trip_names() {
        for provider in [ProviderType::Free, ProviderType::Premium, ProviderType::Rotating] {
            assert_eq!(ProviderType::from_str(provider.as_str()), Some(provider));
        }
        assert_eq!(ProviderType::from_str("paid"), None);
    }

    #[test]
    fn test_endpoint_identity_ignores_scheme() {
        let a = ProxyEndpoint::new("10.0.0.1", 8080, ProxyScheme::Http);
        let b = ProxyEndpoint::new("10.0.0.1", 8080, ProxyScheme::Https);
        assert_eq!(a.id(), b.id());
        assert_eq!(a.id().to_string(), "10.0.0.1:8080");
    }

    #[test]
    fn test_endpoint_url() {
        let endpoint = ProxyEndpoint::new("10.0.0.1", 3128, ProxyScheme::Http);
        assert_eq!(endpoint.url(ProxyScheme::Http), "http://10.0.0.1:3128");
        assert_eq!(endpoint.url(ProxyScheme::Https), "https://10.0.0.1:3128");
    }

    #[test]
    fn test_endpoint_deserializes_without_metadata() {
        let endpoint: ProxyEndpoint =
            serde_json::from_str(r#"{"address":"1.2.3.4","port":80,"scheme":"http"}"#).unwrap();
        assert_eq!(endpoint.provider, ProviderType::Free);
        assert_eq!(endpoint.metadata.reliability, Reliability::Low);
    }
}
