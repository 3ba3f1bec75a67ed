//! Certificate profiles: the policy a signing request is checked against.
//!
//! A [`CertProfileConfig`] is the serialized form found in YAML and in stored
//! profile records. It is compiled once into a [`CertProfile`] when the owning
//! issuer is built, so signing never re-parses policy.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use xavyo_ca_db::ANY_ISSUER;

use crate::config::duration;
use crate::error::{CaError, CaResult, ConfigError};

/// Serialized profile policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertProfileConfig {
    #[serde(default)]
    pub description: String,

    /// Key usages and extended key usages by name, e.g. `signing`, `server auth`.
    #[serde(default)]
    pub usages: Vec<String>,

    #[serde(default)]
    pub ca_constraint: CaConstraint,

    #[serde(default)]
    pub ocsp_no_check: bool,

    #[serde(with = "duration", default = "default_expiry")]
    pub expiry: Duration,

    #[serde(with = "duration", default = "default_backdate")]
    pub backdate: Duration,

    /// Dotted OIDs of extensions a request may carry.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_extensions: Vec<String>,

    /// Pattern the common name must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_names: Option<String>,

    /// Pattern every DNS name must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_dns: Option<String>,

    /// Pattern every email address must match.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_email: Option<String>,

    /// Which request fields are honoured; unset honours all of them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_fields: Option<AllowedFields>,

    /// Owning issuer label, or `*` for any issuer.
    #[serde(default)]
    pub issuer_label: String,
}

fn default_expiry() -> Duration {
    Duration::from_secs(8760 * 3600)
}

fn default_backdate() -> Duration {
    Duration::from_secs(10 * 60)
}

impl Default for CertProfileConfig {
    fn default() -> Self {
        Self {
            description: String::new(),
            usages: Vec::new(),
            ca_constraint: CaConstraint::default(),
            ocsp_no_check: false,
            expiry: default_expiry(),
            backdate: default_backdate(),
            allowed_extensions: Vec::new(),
            allowed_names: None,
            allowed_dns: None,
            allowed_email: None,
            allowed_fields: None,
            issuer_label: String::new(),
        }
    }
}

impl CertProfileConfig {
    /// Whether the profile is usable by every issuer.
    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.issuer_label == ANY_ISSUER
    }
}

/// Basic constraints applied to issued certificates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaConstraint {
    #[serde(default)]
    pub is_ca: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_path_len: Option<u8>,
}

/// Request fields a profile lets the requester set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllowedFields {
    #[serde(default)]
    pub subject: bool,
    #[serde(default)]
    pub dns: bool,
    #[serde(default)]
    pub ip: bool,
    #[serde(default)]
    pub email: bool,
}

impl Default for AllowedFields {
    fn default() -> Self {
        Self {
            subject: true,
            dns: true,
            ip: true,
            email: true,
        }
    }
}

/// X.509 key usage bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyUsage {
    DigitalSignature,
    ContentCommitment,
    KeyEncipherment,
    DataEncipherment,
    KeyAgreement,
    CertSign,
    CrlSign,
    EncipherOnly,
    DecipherOnly,
}

/// X.509 extended key usages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExtKeyUsage {
    Any,
    ServerAuth,
    ClientAuth,
    CodeSigning,
    EmailProtection,
    TimeStamping,
    OcspSigning,
}

enum Usage {
    Key(KeyUsage),
    Extended(ExtKeyUsage),
}

fn parse_usage(name: &str) -> Option<Usage> {
    let usage = match name.trim().to_lowercase().as_str() {
        "signing" | "digital signature" => Usage::Key(KeyUsage::DigitalSignature),
        "content commitment" => Usage::Key(KeyUsage::ContentCommitment),
        "key encipherment" => Usage::Key(KeyUsage::KeyEncipherment),
        "data encipherment" => Usage::Key(KeyUsage::DataEncipherment),
        "key agreement" => Usage::Key(KeyUsage::KeyAgreement),
        "cert sign" => Usage::Key(KeyUsage::CertSign),
        "crl sign" => Usage::Key(KeyUsage::CrlSign),
        "encipher only" => Usage::Key(KeyUsage::EncipherOnly),
        "decipher only" => Usage::Key(KeyUsage::DecipherOnly),
        "any" => Usage::Extended(ExtKeyUsage::Any),
        "server auth" => Usage::Extended(ExtKeyUsage::ServerAuth),
        "client auth" => Usage::Extended(ExtKeyUsage::ClientAuth),
        "code signing" => Usage::Extended(ExtKeyUsage::CodeSigning),
        "email protection" | "s/mime" => Usage::Extended(ExtKeyUsage::EmailProtection),
        "timestamping" | "time stamping" => Usage::Extended(ExtKeyUsage::TimeStamping),
        "ocsp signing" => Usage::Extended(ExtKeyUsage::OcspSigning),
        _ => return None,
    };
    Some(usage)
}

/// Parse a dotted OID into its arcs.
pub fn parse_oid(oid: &str) -> Option<Vec<u64>> {
    let arcs: Vec<u64> = oid
        .trim()
        .split('.')
        .map(str::parse)
        .collect::<Result<_, _>>()
        .ok()?;
    (arcs.len() >= 2 && arcs[0] <= 2).then_some(arcs)
}

/// A compiled, immutable profile.
#[derive(Debug, Clone)]
pub struct CertProfile {
    name: String,
    config: CertProfileConfig,
    key_usages: Vec<KeyUsage>,
    ext_key_usages: Vec<ExtKeyUsage>,
    allowed_extensions: Vec<Vec<u64>>,
    allowed_names: Option<Regex>,
    allowed_dns: Option<Regex>,
    allowed_email: Option<Regex>,
}

fn compile_pattern(
    profile: &str,
    field: &str,
    pattern: Option<&str>,
) -> Result<Option<Regex>, ConfigError> {
    pattern
        .filter(|p| !p.is_empty())
        .map(|p| {
            Regex::new(p).map_err(|e| {
                ConfigError::invalid(format!("profile {profile:?}: invalid {field}: {e}"))
            })
        })
        .transpose()
}

impl CertProfile {
    /// Validate and compile a profile.
    pub fn compile(name: &str, config: CertProfileConfig) -> Result<Self, ConfigError> {
        if name.trim().is_empty() {
            return Err(ConfigError::invalid("profile name is required"));
        }
        if config.expiry.is_zero() {
            return Err(ConfigError::invalid(format!(
                "profile {name:?}: expiry must be positive"
            )));
        }
        if config.usages.is_empty() {
            return Err(ConfigError::invalid(format!(
                "profile {name:?}: at least one usage is required"
            )));
        }

        let mut key_usages = Vec::new();
        let mut ext_key_usages = Vec::new();
        for usage in &config.usages {
            match parse_usage(usage) {
                Some(Usage::Key(u)) if !key_usages.contains(&u) => key_usages.push(u),
                Some(Usage::Extended(u)) if !ext_key_usages.contains(&u) => ext_key_usages.push(u),
                Some(_) => {}
                None => {
                    return Err(ConfigError::invalid(format!(
                        "profile {name:?}: unknown usage {usage:?}"
                    )))
                }
            }
        }

        let allowed_extensions = config
            .allowed_extensions
            .iter()
            .map(|oid| {
                parse_oid(oid).ok_or_else(|| {
                    ConfigError::invalid(format!("profile {name:?}: invalid OID {oid:?}"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: name.to_string(),
            allowed_names: compile_pattern(name, "allowed_names", config.allowed_names.as_deref())?,
            allowed_dns: compile_pattern(name, "allowed_dns", config.allowed_dns.as_deref())?,
            allowed_email: compile_pattern(name, "allowed_email", config.allowed_email.as_deref())?,
            key_usages,
            ext_key_usages,
            allowed_extensions,
            config,
        })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn config(&self) -> &CertProfileConfig {
        &self.config
    }

    #[must_use]
    pub fn issuer_label(&self) -> &str {
        &self.config.issuer_label
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.config.is_wildcard()
    }

    #[must_use]
    pub fn key_usages(&self) -> &[KeyUsage] {
        &self.key_usages
    }

    #[must_use]
    pub fn ext_key_usages(&self) -> &[ExtKeyUsage] {
        &self.ext_key_usages
    }

    #[must_use]
    pub fn ca_constraint(&self) -> CaConstraint {
        self.config.ca_constraint
    }

    #[must_use]
    pub fn ocsp_no_check(&self) -> bool {
        self.config.ocsp_no_check
    }

    #[must_use]
    pub fn expiry(&self) -> chrono::Duration {
        to_chrono(self.config.expiry)
    }

    #[must_use]
    pub fn backdate(&self) -> chrono::Duration {
        to_chrono(self.config.backdate)
    }

    #[must_use]
    pub fn allowed_fields(&self) -> AllowedFields {
        self.config.allowed_fields.unwrap_or_default()
    }

    /// Whether a request may carry the extension `oid`.
    ///
    /// An empty allow-list places no restriction on CSR extensions.
    #[must_use]
    pub fn permits_csr_extension(&self, oid: &[u64]) -> bool {
        self.allowed_extensions.is_empty() || self.permits_extension(oid)
    }

    /// Whether the extension `oid` is explicitly allowed.
    #[must_use]
    pub fn permits_extension(&self, oid: &[u64]) -> bool {
        self.allowed_extensions.iter().any(|allowed| allowed == oid)
    }

    pub fn check_common_name(&self, cn: &str) -> CaResult<()> {
        check_pattern(self.allowed_names.as_ref(), cn, "common name")
    }

    pub fn check_dns_name(&self, name: &str) -> CaResult<()> {
        check_pattern(self.allowed_dns.as_ref(), name, "DNS name")
    }

    pub fn check_email(&self, email: &str) -> CaResult<()> {
        check_pattern(self.allowed_email.as_ref(), email, "email")
    }
}

fn check_pattern(pattern: Option<&Regex>, value: &str, what: &str) -> CaResult<()> {
    match pattern {
        Some(re) if !re.is_match(value) => Err(CaError::invalid_argument(format!(
            "{what} {value:?} is not allowed by profile"
        ))),
        _ => Ok(()),
    }
}

pub(crate) fn to_chrono(value: Duration) -> chrono::Duration {
    chrono::Duration::from_std(value).unwrap_or_else(|_| chrono::Duration::days(365 * 100))
}

/// Named set of compiled profiles.
#[derive(Debug, Clone, Default)]
pub struct ProfileCatalog {
    profiles: BTreeMap<String, Arc<CertProfile>>,
}

impl ProfileCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile every entry of a configuration map.
    pub fn compile(configs: &BTreeMap<String, CertProfileConfig>) -> Result<Self, ConfigError> {
        let mut catalog = Self::new();
        for (name, config) in configs {
            catalog.insert(CertProfile::compile(name, config.clone())?);
        }
        Ok(catalog)
    }

    /// Insert or replace a profile.
    pub fn insert(&mut self, profile: CertProfile) {
        self.profiles.insert(profile.name.clone(), Arc::new(profile));
    }

    /// Insert unless a profile of the same name is present.
    pub fn insert_if_absent(&mut self, profile: Arc<CertProfile>) {
        self.profiles
            .entry(profile.name.clone())
            .or_insert(profile);
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Arc<CertProfile>> {
        self.profiles.get(name)
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.profiles.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CertProfile>> {
        self.profiles.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// The serialized form of every profile.
    #[must_use]
    pub fn configs(&self) -> BTreeMap<String, CertProfileConfig> {
        self.profiles
            .iter()
            .map(|(name, p)| (name.clone(), p.config.clone()))
            .collect()
    }
}
