//! X.509 parsing helpers over `x509-parser`.

use chrono::{DateTime, Utc};
use sha1::Sha1;
use sha2::{Digest, Sha256};
use thiserror::Error;
use x509_parser::certificate::X509Certificate;
use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::{GeneralName, ParsedExtension};
use x509_parser::prelude::FromDer;
use x509_parser::x509::X509Name;

pub const PEM_CERTIFICATE: &str = "CERTIFICATE";
pub const PEM_CERTIFICATE_REQUEST: &str = "CERTIFICATE REQUEST";
pub const PEM_CRL: &str = "X509 CRL";

/// Subject alternative name extension.
pub const OID_SUBJECT_ALT_NAME: [u64; 4] = [2, 5, 29, 17];

#[derive(Debug, Error)]
pub enum X509Error {
    #[error("invalid PEM: {0}")]
    Pem(String),

    #[error("invalid certificate: {0}")]
    Certificate(String),

    #[error("invalid certificate request: {0}")]
    Request(String),
}

/// Fields of a certificate the engine records.
#[derive(Debug, Clone)]
pub struct CertificateInfo {
    pub subject: String,
    pub issuer: String,
    /// Decimal serial number.
    pub serial_number: String,
    /// Subject key identifier, lowercase hex.
    pub skid: String,
    /// Authority key identifier, lowercase hex.
    pub akid: Option<String>,
    pub not_before: DateTime<Utc>,
    pub not_after: DateTime<Utc>,
    /// SHA-256 of the DER, lowercase hex.
    pub sha256: String,
    /// Contents of the subjectPublicKey BIT STRING.
    pub public_key: Vec<u8>,
    /// DER of the subject name.
    pub raw_subject: Vec<u8>,
    pub is_ca: bool,
    pub der: Vec<u8>,
}

impl CertificateInfo {
    /// Whether subject and issuer name the same entity.
    #[must_use]
    pub fn is_self_signed(&self) -> bool {
        self.subject == self.issuer && self.akid.as_ref().map_or(true, |a| *a == self.skid)
    }
}

/// Decode the first PEM block labelled `label`.
pub fn pem_to_der(input: &str, label: &str) -> Result<Vec<u8>, X509Error> {
    pem::parse_many(input.as_bytes())
        .map_err(|e| X509Error::Pem(e.to_string()))?
        .into_iter()
        .find(|block| block.tag() == label)
        .map(pem::Pem::into_contents)
        .ok_or_else(|| X509Error::Pem(format!("no {label} block")))
}

/// Encode DER as a PEM block.
#[must_use]
pub fn der_to_pem(label: &str, der: &[u8]) -> String {
    pem::encode(&pem::Pem::new(label, der.to_vec()))
}

/// Concatenate PEM documents, one per line group.
#[must_use]
pub fn join_pem(parts: &[&str]) -> String {
    let mut out = String::new();
    for part in parts.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
        out.push_str(part);
        out.push('\n');
    }
    out
}

#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

#[must_use]
pub fn sha1_digest(bytes: &[u8]) -> Vec<u8> {
    Sha1::digest(bytes).to_vec()
}

fn to_datetime(ts: i64) -> Result<DateTime<Utc>, X509Error> {
    DateTime::from_timestamp(ts, 0)
        .ok_or_else(|| X509Error::Certificate(format!("timestamp out of range: {ts}")))
}

/// Parse a DER certificate.
pub fn certificate_info(der: &[u8]) -> Result<CertificateInfo, X509Error> {
    let (_, cert) =
        X509Certificate::from_der(der).map_err(|e| X509Error::Certificate(e.to_string()))?;

    let public_key = cert.public_key().subject_public_key.data.to_vec();
    let mut skid = None;
    let mut akid = None;
    for ext in cert.extensions() {
        match ext.parsed_extension() {
            ParsedExtension::SubjectKeyIdentifier(kid) => skid = Some(hex::encode(kid.0)),
            ParsedExtension::AuthorityKeyIdentifier(aki) => {
                akid = aki.key_identifier.as_ref().map(|kid| hex::encode(kid.0));
            }
            _ => {}
        }
    }

    Ok(CertificateInfo {
        subject: cert.subject().to_string(),
        issuer: cert.issuer().to_string(),
        serial_number: cert.serial.to_string(),
        skid: skid.unwrap_or_else(|| hex::encode(sha1_digest(&public_key))),
        akid,
        not_before: to_datetime(cert.validity().not_before.timestamp())?,
        not_after: to_datetime(cert.validity().not_after.timestamp())?,
        sha256: sha256_hex(der),
        raw_subject: cert.subject().as_raw().to_vec(),
        is_ca: cert.is_ca(),
        public_key,
        der: der.to_vec(),
    })
}

/// Parse the first certificate of a PEM document.
pub fn certificate_info_from_pem(input: &str) -> Result<CertificateInfo, X509Error> {
    certificate_info(&pem_to_der(input, PEM_CERTIFICATE)?)
}

/// Parse every certificate of a PEM bundle.
pub fn certificates_from_pem_bundle(input: &str) -> Result<Vec<CertificateInfo>, X509Error> {
    pem::parse_many(input.as_bytes())
        .map_err(|e| X509Error::Pem(e.to_string()))?
        .into_iter()
        .filter(|block| block.tag() == PEM_CERTIFICATE)
        .map(|block| certificate_info(block.contents()))
        .collect()
}

/// One subject attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameAttribute {
    CommonName,
    Country,
    Province,
    Locality,
    Organization,
    OrganizationalUnit,
}

impl NameAttribute {
    fn from_oid(arcs: &[u64]) -> Option<Self> {
        match arcs {
            [2, 5, 4, 3] => Some(Self::CommonName),
            [2, 5, 4, 6] => Some(Self::Country),
            [2, 5, 4, 8] => Some(Self::Province),
            [2, 5, 4, 7] => Some(Self::Locality),
            [2, 5, 4, 10] => Some(Self::Organization),
            [2, 5, 4, 11] => Some(Self::OrganizationalUnit),
            _ => None,
        }
    }
}

/// Subject alternative names split by kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAltNames {
    pub dns: Vec<String>,
    pub emails: Vec<String>,
    pub ips: Vec<std::net::IpAddr>,
    pub uris: Vec<String>,
}

impl SubjectAltNames {
    /// Classify free-form names: IP literals, `@` addresses, `scheme://` URIs,
    /// everything else DNS.
    #[must_use]
    pub fn classify<S: AsRef<str>>(names: &[S]) -> Self {
        let mut sans = Self::default();
        for name in names.iter().map(|n| n.as_ref().trim()).filter(|n| !n.is_empty()) {
            if let Ok(ip) = name.parse() {
                sans.ips.push(ip);
            } else if name.contains("://") {
                sans.uris.push(name.to_string());
            } else if name.contains('@') {
                sans.emails.push(name.to_string());
            } else {
                sans.dns.push(name.to_string());
            }
        }
        sans
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.dns.is_empty() && self.emails.is_empty() && self.ips.is_empty() && self.uris.is_empty()
    }
}

/// Fields of a certificate signing request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub subject: Vec<(NameAttribute, String)>,
    pub sans: SubjectAltNames,
    /// OIDs of the requested extensions.
    pub extension_oids: Vec<Vec<u64>>,
    pub public_key: Vec<u8>,
}

impl RequestInfo {
    #[must_use]
    pub fn common_name(&self) -> Option<&str> {
        self.subject
            .iter()
            .find(|(attr, _)| *attr == NameAttribute::CommonName)
            .map(|(_, value)| value.as_str())
    }
}

fn name_attributes(name: &X509Name<'_>) -> Vec<(NameAttribute, String)> {
    name.iter_attributes()
        .filter_map(|attr| {
            let arcs: Vec<u64> = attr.attr_type().iter()?.collect();
            let kind = NameAttribute::from_oid(&arcs)?;
            let value = attr.as_str().ok()?;
            Some((kind, value.to_string()))
        })
        .collect()
}

/// Parse a PEM CSR and verify its self-signature.
pub fn parse_request(csr_pem: &str) -> Result<RequestInfo, X509Error> {
    let der = pem_to_der(csr_pem, PEM_CERTIFICATE_REQUEST)?;
    let (_, csr) = X509CertificationRequest::from_der(&der)
        .map_err(|e| X509Error::Request(e.to_string()))?;
    csr.verify_signature()
        .map_err(|_| X509Error::Request("signature does not verify".to_string()))?;

    let mut extension_oids = Vec::new();
    let mut sans = SubjectAltNames::default();
    if let Some(extensions) = csr.requested_extensions() {
        for ext in extensions {
            if let ParsedExtension::SubjectAlternativeName(san) = ext {
                for name in &san.general_names {
                    match name {
                        GeneralName::DNSName(dns) => sans.dns.push((*dns).to_string()),
                        GeneralName::RFC822Name(email) => sans.emails.push((*email).to_string()),
                        GeneralName::URI(uri) => sans.uris.push((*uri).to_string()),
                        GeneralName::IPAddress(bytes) => {
                            if let Some(ip) = ip_from_bytes(bytes) {
                                sans.ips.push(ip);
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
    }
    for attr in csr.certification_request_info.iter_attributes() {
        if let x509_parser::cri_attributes::ParsedCriAttribute::ExtensionRequest(req) =
            attr.parsed_attribute()
        {
            for ext in &req.extensions {
                if let Some(arcs) = ext.oid.iter() {
                    extension_oids.push(arcs.collect());
                }
            }
        }
    }

    Ok(RequestInfo {
        subject: name_attributes(&csr.certification_request_info.subject),
        sans,
        extension_oids,
        public_key: csr
            .certification_request_info
            .subject_pki
            .subject_public_key
            .data
            .to_vec(),
    })
}

fn ip_from_bytes(bytes: &[u8]) -> Option<std::net::IpAddr> {
    match bytes.len() {
        4 => <[u8; 4]>::try_from(bytes).ok().map(std::net::IpAddr::from),
        16 => <[u8; 16]>::try_from(bytes).ok().map(std::net::IpAddr::from),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{CertificateParams, DnType, KeyPair, SanType};

    fn self_signed() -> (String, KeyPair) {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::new(vec!["ca.example.com".to_string()]).unwrap();
        params
            .distinguished_name
            .push(DnType::CommonName, "Test Root");
        params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        let cert = params.self_signed(&key).unwrap();
        (cert.pem(), key)
    }

    #[test]
    fn test_certificate_info_from_pem() {
        let (pem, _) = self_signed();
        let info = certificate_info_from_pem(&pem).unwrap();
        assert!(info.subject.contains("CN=Test Root"));
        assert_eq!(info.subject, info.issuer);
        assert_eq!(info.skid.len(), 40);
        assert_eq!(info.sha256.len(), 64);
        assert!(info.is_ca);
        assert!(info.is_self_signed());
        assert!(info.not_before < info.not_after);
    }

    #[test]
    fn test_pem_to_der_requires_label() {
        let (pem, _) = self_signed();
        assert!(pem_to_der(&pem, PEM_CERTIFICATE_REQUEST).is_err());
        assert!(pem_to_der("garbage", PEM_CERTIFICATE).is_err());
    }

    #[test]
    fn test_parse_request_extracts_subject_and_sans() {
        let key = KeyPair::generate().unwrap();
        let mut params = CertificateParams::default();
        params.distinguished_name = rcgen::DistinguishedName::new();
        params.distinguished_name.push(DnType::CommonName, "svc");
        params.distinguished_name.push(DnType::OrganizationName, "Acme");
        params.subject_alt_names = vec![
            SanType::DnsName("svc.example.com".try_into().unwrap()),
            SanType::IpAddress("10.0.0.1".parse().unwrap()),
        ];
        let csr = params.serialize_request(&key).unwrap().pem().unwrap();

        let info = parse_request(&csr).unwrap();
        assert_eq!(info.common_name(), Some("svc"));
        assert!(info
            .subject
            .contains(&(NameAttribute::Organization, "Acme".to_string())));
        assert_eq!(info.sans.dns, vec!["svc.example.com".to_string()]);
        assert_eq!(info.sans.ips, vec!["10.0.0.1".parse::<std::net::IpAddr>().unwrap()]);
        assert!(info.extension_oids.contains(&OID_SUBJECT_ALT_NAME.to_vec()));
    }

    #[test]
    fn test_classify_sans() {
        let sans = SubjectAltNames::classify(&[
            "a.example.com",
            "10.1.2.3",
            "::1",
            "ops@example.com",
            "spiffe://example/ns/x",
            " ",
        ]);
        assert_eq!(sans.dns, vec!["a.example.com".to_string()]);
        assert_eq!(sans.ips.len(), 2);
        assert_eq!(sans.emails, vec!["ops@example.com".to_string()]);
        assert_eq!(sans.uris, vec!["spiffe://example/ns/x".to_string()]);
    }

    #[test]
    fn test_join_pem_skips_empty_parts() {
        assert_eq!(join_pem(&["a\n", "", "  ", "b"]), "a\nb\n");
    }
}
