//! Engine configuration loading and types.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::profile::{CertProfile, CertProfileConfig};

/// Placeholder replaced by the issuer's key identifier in AIA URL templates.
pub const ISSUER_ID_PLACEHOLDER: &str = "${ISSUER_ID}";

/// Root engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaConfig {
    /// Cluster name, used in delegated issuer key labels.
    #[serde(default = "default_cluster_name")]
    pub cluster_name: String,

    /// Revoked certificates fetched per page while building a CRL.
    #[serde(default = "default_crl_page_size")]
    pub crl_page_size: u32,

    /// Distinct issuers pending CRL refresh before the queue refreshes every issuer.
    #[serde(default = "default_crl_queue_capacity")]
    pub crl_queue_capacity: usize,

    #[serde(default)]
    pub publisher: PublisherConfig,

    #[serde(default)]
    pub aia: AiaConfig,

    #[serde(default)]
    pub issuers: Vec<IssuerConfig>,

    /// Profiles keyed by name; `issuer_label` binds each one.
    #[serde(default)]
    pub profiles: BTreeMap<String, CertProfileConfig>,

    #[serde(default)]
    pub delegated_issuers: DelegatedIssuersConfig,

    /// PEM files of privately trusted roots.
    #[serde(default)]
    pub private_roots: Vec<PathBuf>,

    /// PEM files of publicly trusted roots.
    #[serde(default)]
    pub public_roots: Vec<PathBuf>,
}

fn default_cluster_name() -> String {
    "local".to_string()
}

fn default_crl_page_size() -> u32 {
    1000
}

fn default_crl_queue_capacity() -> usize {
    256
}

impl Default for CaConfig {
    fn default() -> Self {
        Self {
            cluster_name: default_cluster_name(),
            crl_page_size: default_crl_page_size(),
            crl_queue_capacity: default_crl_queue_capacity(),
            publisher: PublisherConfig::default(),
            aia: AiaConfig::default(),
            issuers: Vec::new(),
            profiles: BTreeMap::new(),
            delegated_issuers: DelegatedIssuersConfig::default(),
            private_roots: Vec::new(),
            public_roots: Vec::new(),
        }
    }
}

/// Where issued certificates and CRLs are published.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PublisherConfig {
    /// Public URL prefix reported as a certificate location.
    #[serde(default)]
    pub base_url: String,

    /// Directory for the file publisher; unset disables publication.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

/// Authority information access settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AiaConfig {
    #[serde(default)]
    pub issuer_url: String,

    #[serde(default)]
    pub crl_url: String,

    #[serde(default)]
    pub ocsp_url: String,

    /// Validity of generated CRLs.
    #[serde(with = "duration", default = "default_crl_expiry")]
    pub crl_expiry: Duration,

    /// Validity of OCSP responses.
    #[serde(with = "duration", default = "default_ocsp_expiry")]
    pub ocsp_expiry: Duration,

    /// Interval of the periodic CRL publisher; zero disables it.
    #[serde(with = "duration", default = "default_crl_renewal")]
    pub crl_renewal: Duration,
}

fn default_crl_expiry() -> Duration {
    Duration::from_secs(72 * 3600)
}

fn default_ocsp_expiry() -> Duration {
    Duration::from_secs(30 * 60)
}

fn default_crl_renewal() -> Duration {
    Duration::from_secs(12 * 3600)
}

impl Default for AiaConfig {
    fn default() -> Self {
        Self {
            issuer_url: String::new(),
            crl_url: String::new(),
            ocsp_url: String::new(),
            crl_expiry: default_crl_expiry(),
            ocsp_expiry: default_ocsp_expiry(),
            crl_renewal: default_crl_renewal(),
        }
    }
}

/// Kind of issuer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssuerKind {
    /// Statically configured.
    #[default]
    Root,
    /// Provisioned at runtime under a parent issuer.
    Delegated,
}

impl std::fmt::Display for IssuerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Root => write!(f, "root"),
            Self::Delegated => write!(f, "delegated"),
        }
    }
}

/// Configuration of one issuer.
///
/// Key material is given inline or by file path; inline values win. The same
/// document is persisted in the issuer record of a delegated issuer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IssuerConfig {
    pub label: String,

    #[serde(rename = "type", default)]
    pub kind: IssuerKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,

    /// Intermediates between this issuer and its root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_bundle_file: Option<PathBuf>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_bundle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_bundle_file: Option<PathBuf>,

    /// Overrides the engine-wide AIA settings.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aia: Option<AiaConfig>,

    /// Wildcard profiles this issuer accepts; empty accepts all of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_profiles: Vec<String>,

    /// Profiles carried by the issuer itself.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub profiles: BTreeMap<String, CertProfileConfig>,
}

/// PEM material of an issuer, resolved from inline values or files.
#[derive(Debug, Clone, Default)]
pub struct IssuerMaterial {
    pub cert_pem: String,
    pub key_pem: String,
    pub ca_bundle_pem: String,
    pub root_bundle_pem: String,
}

impl IssuerConfig {
    /// Resolve the certificate, key and bundles.
    ///
    /// The certificate and key are required; bundles default to empty.
    pub fn load_material(&self) -> Result<IssuerMaterial, ConfigError> {
        let cert_pem = read_inline_or_file(self.cert.as_deref(), self.cert_file.as_deref())?
            .ok_or_else(|| {
                ConfigError::invalid(format!("issuer {:?} has no certificate", self.label))
            })?;
        let key_pem = read_inline_or_file(self.key.as_deref(), self.key_file.as_deref())?
            .ok_or_else(|| ConfigError::invalid(format!("issuer {:?} has no key", self.label)))?;
        let ca_bundle_pem =
            read_inline_or_file(self.ca_bundle.as_deref(), self.ca_bundle_file.as_deref())?
                .unwrap_or_default();
        let root_bundle_pem =
            read_inline_or_file(self.root_bundle.as_deref(), self.root_bundle_file.as_deref())?
                .unwrap_or_default();

        Ok(IssuerMaterial {
            cert_pem,
            key_pem,
            ca_bundle_pem,
            root_bundle_pem,
        })
    }
}

fn read_inline_or_file(
    inline: Option<&str>,
    path: Option<&Path>,
) -> Result<Option<String>, ConfigError> {
    if let Some(value) = inline.filter(|v| !v.trim().is_empty()) {
        return Ok(Some(value.to_string()));
    }
    match path {
        Some(path) => std::fs::read_to_string(path)
            .map(Some)
            .map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        None => Ok(None),
    }
}

/// Delegated issuer provisioning settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DelegatedIssuersConfig {
    #[serde(default)]
    pub disabled: bool,

    /// Prefix of the label that scopes stored profiles: `<prefix><org_id>`.
    #[serde(default)]
    pub issuer_label_prefix: String,

    /// Crypto provider manufacturer; empty selects the default provider.
    #[serde(default)]
    pub crypto_provider: String,

    #[serde(default)]
    pub crypto_model: String,

    #[serde(default)]
    pub allowed_profiles: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aia: Option<AiaConfig>,
}

impl CaConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content =
            std::fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Io {
                path: path.as_ref().to_path_buf(),
                source,
            })?;

        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from a YAML string.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the configuration file path from environment or default.
    #[must_use]
    pub fn config_path() -> String {
        std::env::var("CA_CONFIG").unwrap_or_else(|_| "./config/ca.yaml".to_string())
    }

    /// Check labels, profiles and limits.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.crl_page_size == 0 {
            return Err(ConfigError::invalid("crl_page_size must be positive"));
        }
        if self.crl_queue_capacity == 0 {
            return Err(ConfigError::invalid("crl_queue_capacity must be positive"));
        }

        let mut labels = HashSet::new();
        for issuer in &self.issuers {
            if issuer.label.trim().is_empty() {
                return Err(ConfigError::invalid("issuer label is required"));
            }
            if !labels.insert(issuer.label.as_str()) {
                return Err(ConfigError::invalid(format!(
                    "duplicate issuer label: {}",
                    issuer.label
                )));
            }
            for (name, profile) in &issuer.profiles {
                CertProfile::compile(name, profile.clone())?;
            }
        }

        for (name, profile) in &self.profiles {
            CertProfile::compile(name, profile.clone())?;
            if profile.issuer_label.is_empty() {
                return Err(ConfigError::invalid(format!(
                    "profile {name:?} has no issuer_label"
                )));
            }
        }
        Ok(())
    }

    /// Profiles bound to `issuer`: its own, those naming its label, and the
    /// wildcard ones it allows.
    #[must_use]
    pub fn profiles_for(&self, issuer: &IssuerConfig) -> BTreeMap<String, CertProfileConfig> {
        let mut profiles = issuer.profiles.clone();
        for (name, profile) in &self.profiles {
            let bound = if profile.is_wildcard() {
                issuer.allowed_profiles.is_empty() || issuer.allowed_profiles.contains(name)
            } else {
                profile.issuer_label == issuer.label
            };
            if bound {
                profiles.entry(name.clone()).or_insert_with(|| profile.clone());
            }
        }
        profiles
    }
}

/// Serde adapter for `Duration` written as `8760h`, `30m`, `45s` or `1h30m`.
pub mod duration {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).map_err(serde::de::Error::custom)
    }

    /// Parse a compound duration. Units: `h`, `m`, `s`, `ms`.
    pub fn parse(input: &str) -> Result<Duration, String> {
        let input = input.trim();
        if input.is_empty() {
            return Err("empty duration".to_string());
        }
        if input == "0" {
            return Ok(Duration::ZERO);
        }

        let mut total = Duration::ZERO;
        let mut rest = input;
        while !rest.is_empty() {
            let digits = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
            if digits == 0 {
                return Err(format!("invalid duration: {input}"));
            }
            let value: u64 = rest[..digits]
                .parse()
                .map_err(|_| format!("invalid duration: {input}"))?;
            rest = &rest[digits..];

            let unit_len = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let part = match &rest[..unit_len] {
                "h" => Duration::from_secs(value.saturating_mul(3600)),
                "m" => Duration::from_secs(value.saturating_mul(60)),
                "s" => Duration::from_secs(value),
                "ms" => Duration::from_millis(value),
                unit => return Err(format!("unknown duration unit {unit:?} in {input}")),
            };
            total = total.saturating_add(part);
            rest = &rest[unit_len..];
        }
        Ok(total)
    }

    /// Format as the shortest compound form, `0s` for zero.
    #[must_use]
    pub fn format(value: Duration) -> String {
        let millis = value.subsec_millis();
        let secs = value.as_secs();
        if secs == 0 && millis == 0 {
            return "0s".to_string();
        }

        let mut out = String::new();
        let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
        if h > 0 {
            out.push_str(&format!("{h}h"));
        }
        if m > 0 {
            out.push_str(&format!("{m}m"));
        }
        if s > 0 {
            out.push_str(&format!("{s}s"));
        }
        if millis > 0 {
            out.push_str(&format!("{millis}ms"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let config = CaConfig::from_yaml("cluster_name: test\n").unwrap();
        assert_eq!(config.cluster_name, "test");
        assert_eq!(config.crl_page_size, 1000);
        assert_eq!(config.crl_queue_capacity, 256);
        assert_eq!(config.aia.crl_expiry, Duration::from_secs(72 * 3600));
        assert_eq!(config.aia.ocsp_expiry, Duration::from_secs(1800));
        assert!(config.issuers.is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
cluster_name: prod
crl_page_size: 500
publisher:
  base_url: https://certs.example.com
aia:
  issuer_url: https://certs.example.com/${ISSUER_ID}.crt
  crl_url: https://certs.example.com/${ISSUER_ID}.crl
  ocsp_url: https://ocsp.example.com
  crl_expiry: 24h
  crl_renewal: 1h30m
issuers:
  - label: root1
    cert_file: /etc/ca/root1.pem
    key_file: /etc/ca/root1.key
    allowed_profiles: [server]
  - label: delegated1
    type: delegated
    cert: inline
    key: inline
profiles:
  server:
    issuer_label: "*"
    usages: [signing, key encipherment, server auth]
    expiry: 2160h
  client:
    issuer_label: root1
    usages: [signing, client auth]
  peer:
    issuer_label: "*"
    usages: [signing, server auth, client auth]
delegated_issuers:
  issuer_label_prefix: org-
  allowed_profiles: [server]
"#;

        let config = CaConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.crl_page_size, 500);
        assert_eq!(config.aia.crl_expiry, Duration::from_secs(24 * 3600));
        assert_eq!(config.aia.crl_renewal, Duration::from_secs(5400));
        assert_eq!(config.issuers[1].kind, IssuerKind::Delegated);
        assert_eq!(config.delegated_issuers.issuer_label_prefix, "org-");

        let root1 = config.profiles_for(&config.issuers[0]);
        assert!(root1.contains_key("server"));
        assert!(root1.contains_key("client"));
        assert!(!root1.contains_key("peer"));

        let delegated = config.profiles_for(&config.issuers[1]);
        assert!(delegated.contains_key("server"));
        assert!(delegated.contains_key("peer"));
        assert!(!delegated.contains_key("client"));
    }

    #[test]
    fn test_duplicate_issuer_label_is_rejected() {
        let yaml = r#"
issuers:
  - label: a
  - label: a
"#;
        let err = CaConfig::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate issuer label"));
    }

    #[test]
    fn test_profile_without_issuer_label_is_rejected() {
        let yaml = r#"
profiles:
  server:
    usages: [signing]
"#;
        assert!(CaConfig::from_yaml(yaml).is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ca.yaml");
        std::fs::write(&path, "cluster_name: from-file\n").unwrap();

        let config = CaConfig::from_file(&path).unwrap();
        assert_eq!(config.cluster_name, "from-file");

        let missing = CaConfig::from_file(dir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_issuer_material_prefers_inline() {
        let dir = tempfile::tempdir().unwrap();
        let cert_file = dir.path().join("cert.pem");
        let key_file = dir.path().join("key.pem");
        std::fs::write(&cert_file, "from-file-cert").unwrap();
        std::fs::write(&key_file, "from-file-key").unwrap();

        let issuer = IssuerConfig {
            label: "x".to_string(),
            cert: Some("inline-cert".to_string()),
            cert_file: Some(cert_file),
            key_file: Some(key_file),
            ..Default::default()
        };
        let material = issuer.load_material().unwrap();
        assert_eq!(material.cert_pem, "inline-cert");
        assert_eq!(material.key_pem, "from-file-key");
        assert!(material.ca_bundle_pem.is_empty());
    }

    #[test]
    fn test_issuer_material_requires_key() {
        let issuer = IssuerConfig {
            label: "x".to_string(),
            cert: Some("cert".to_string()),
            ..Default::default()
        };
        assert!(issuer.load_material().is_err());
    }

    #[test]
    fn test_duration_parse_and_format() {
        assert_eq!(duration::parse("8760h"), Ok(Duration::from_secs(8760 * 3600)));
        assert_eq!(duration::parse("1h30m"), Ok(Duration::from_secs(5400)));
        assert_eq!(duration::parse("45s"), Ok(Duration::from_secs(45)));
        assert_eq!(duration::parse("250ms"), Ok(Duration::from_millis(250)));
        assert_eq!(duration::parse("0"), Ok(Duration::ZERO));
        assert!(duration::parse("").is_err());
        assert!(duration::parse("10d").is_err());
        assert!(duration::parse("h").is_err());

        assert_eq!(duration::format(Duration::from_secs(5400)), "1h30m");
        assert_eq!(duration::format(Duration::from_secs(600)), "10m");
        assert_eq!(duration::format(Duration::ZERO), "0s");
    }

    #[test]
    fn test_issuer_config_yaml_skips_empty_fields() {
        let issuer = IssuerConfig {
            label: "d1".to_string(),
            kind: IssuerKind::Delegated,
            cert: Some("c".to_string()),
            key: Some("k".to_string()),
            ..Default::default()
        };
        let yaml = serde_yaml::to_string(&issuer).unwrap();
        assert!(yaml.contains("type: delegated"));
        assert!(!yaml.contains("cert_file"));

        let back: IssuerConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.label, "d1");
        assert_eq!(back.kind, IssuerKind::Delegated);
    }
}
