//! Software crypto backend: `rcgen` for certificates, CSRs and CRLs, `ring`
//! for raw OCSP signatures. Keys are PKCS#8 PEM.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rcgen::{
    BasicConstraints, CertificateParams, CertificateRevocationListParams,
    CertificateSigningRequestParams, CrlDistributionPoint, CustomExtension, DistinguishedName,
    DnType, ExtendedKeyUsagePurpose, Ia5String, IsCa, KeyIdMethod, KeyPair, KeyUsagePurpose,
    RevocationReason as RcgenRevocationReason, RevokedCertParams, SanType, SerialNumber,
    PKCS_ECDSA_P256_SHA256, PKCS_ECDSA_P384_SHA384, PKCS_ED25519, PKCS_RSA_SHA256,
};
use ring::rand::SystemRandom;
use ring::signature::{
    EcdsaKeyPair, Ed25519KeyPair, RsaKeyPair, ECDSA_P256_SHA256_ASN1_SIGNING,
    ECDSA_P384_SHA384_ASN1_SIGNING, RSA_PKCS1_SHA256,
};
use time::OffsetDateTime;
use tracing::debug;
use xavyo_ca_db::RevocationReason;
use yasna::models::ObjectIdentifier;
use yasna::Tag;

use super::{
    CertificateTemplate, CryptoBackend, CryptoError, CryptoResult, GeneratedKey, IssuerSigner,
    KeyAlgorithm, RevokedEntry, SignedCertificate,
};
use crate::ocsp::SignatureAlgorithm;
use crate::profile::{ExtKeyUsage, KeyUsage};
use crate::x509::{self, NameAttribute};

const OID_AUTHORITY_INFO_ACCESS: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 1, 1];
const OID_AD_OCSP: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1];
const OID_AD_CA_ISSUERS: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 2];
const OID_OCSP_NO_CHECK: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 5];

/// In-process keys.
#[derive(Debug, Default, Clone, Copy)]
pub struct SoftwareBackend;

impl SoftwareBackend {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CryptoBackend for SoftwareBackend {
    fn name(&self) -> &str {
        "software"
    }

    async fn signer_from_key_material(
        &self,
        key_pem: &str,
        cert_pem: &str,
    ) -> CryptoResult<Arc<dyn IssuerSigner>> {
        Ok(Arc::new(SoftwareSigner::new(key_pem, cert_pem)?))
    }

    async fn generate_key_and_request(
        &self,
        key_label: &str,
        algorithm: KeyAlgorithm,
        common_name: &str,
    ) -> CryptoResult<GeneratedKey> {
        let key = generate_key(algorithm)?;

        let mut params = CertificateParams::default();
        params.distinguished_name = DistinguishedName::new();
        params
            .distinguished_name
            .push(DnType::CommonName, common_name);
        let csr_pem = params
            .serialize_request(&key)
            .and_then(|csr| csr.pem())
            .map_err(|e| CryptoError::Encoding(format!("failed to create request: {e}")))?;

        debug!(key_label = %key_label, ?algorithm, "Generated key pair");
        Ok(GeneratedKey {
            key_label: key_label.to_string(),
            csr_pem,
            key_pem: key.serialize_pem(),
        })
    }
}

fn generate_key(algorithm: KeyAlgorithm) -> CryptoResult<KeyPair> {
    let alg = match algorithm {
        KeyAlgorithm::EcdsaP256 => &PKCS_ECDSA_P256_SHA256,
        KeyAlgorithm::EcdsaP384 => &PKCS_ECDSA_P384_SHA384,
        KeyAlgorithm::Ed25519 => &PKCS_ED25519,
    };
    KeyPair::generate_for(alg)
        .map_err(|e| CryptoError::InvalidKey(format!("failed to generate key pair: {e}")))
}

/// Create a self-signed root; returns `(cert_pem, key_pem)`.
pub fn create_root_ca(
    common_name: &str,
    algorithm: KeyAlgorithm,
    validity: chrono::Duration,
) -> CryptoResult<(String, String)> {
    let key = generate_key(algorithm)?;

    let mut params = CertificateParams::default();
    params.distinguished_name = DistinguishedName::new();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);

    let now = Utc::now();
    params.not_before = to_offset(now - chrono::Duration::minutes(5))?;
    params.not_after = to_offset(now + validity)?;
    params.serial_number = Some(SerialNumber::from_slice(&random_serial()));
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::CrlSign,
        KeyUsagePurpose::DigitalSignature,
    ];

    let cert = params
        .self_signed(&key)
        .map_err(|e| CryptoError::Signing(format!("failed to create root certificate: {e}")))?;
    Ok((cert.pem(), key.serialize_pem()))
}

/// 16 random bytes with the top bit clear.
#[must_use]
pub fn random_serial() -> Vec<u8> {
    let mut bytes = uuid::Uuid::new_v4().as_bytes().to_vec();
    bytes[0] &= 0x7f;
    bytes
}

fn to_offset(at: DateTime<Utc>) -> CryptoResult<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(at.timestamp())
        .map_err(|e| CryptoError::Encoding(format!("time out of range: {e}")))
}

enum OcspKey {
    Ecdsa(EcdsaKeyPair),
    Ed25519(Ed25519KeyPair),
    Rsa(RsaKeyPair),
}

/// Signer over an in-memory key.
pub struct SoftwareSigner {
    key: KeyPair,
    issuer: rcgen::Certificate,
    key_id: Vec<u8>,
    algorithm: SignatureAlgorithm,
    ocsp_key: OcspKey,
    rng: SystemRandom,
}

impl std::fmt::Debug for SoftwareSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftwareSigner")
            .field("key_id", &hex::encode(&self.key_id))
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SoftwareSigner {
    /// Bind a PKCS#8 key to its certificate.
    ///
    /// Fails when the key does not match the certificate's public key.
    pub fn new(key_pem: &str, cert_pem: &str) -> CryptoResult<Self> {
        let key = KeyPair::from_pem(key_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("failed to parse key: {e}")))?;
        let info = x509::certificate_info_from_pem(cert_pem)
            .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        if info.public_key != key.public_key_raw() {
            return Err(CryptoError::InvalidKey(
                "key does not match certificate".to_string(),
            ));
        }

        let rng = SystemRandom::new();
        let pkcs8 = key.serialize_der();
        let alg = key.algorithm();
        let (algorithm, ocsp_key) = if alg == &PKCS_ECDSA_P256_SHA256 {
            let k = EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_ASN1_SIGNING, &pkcs8, &rng)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            (SignatureAlgorithm::EcdsaSha256, OcspKey::Ecdsa(k))
        } else if alg == &PKCS_ECDSA_P384_SHA384 {
            let k = EcdsaKeyPair::from_pkcs8(&ECDSA_P384_SHA384_ASN1_SIGNING, &pkcs8, &rng)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            (SignatureAlgorithm::EcdsaSha384, OcspKey::Ecdsa(k))
        } else if alg == &PKCS_ED25519 {
            let k = Ed25519KeyPair::from_pkcs8_maybe_unchecked(&pkcs8)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            (SignatureAlgorithm::Ed25519, OcspKey::Ed25519(k))
        } else if alg == &PKCS_RSA_SHA256 {
            let k = RsaKeyPair::from_pkcs8(&pkcs8)
                .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
            (SignatureAlgorithm::RsaSha256, OcspKey::Rsa(k))
        } else {
            return Err(CryptoError::Unsupported(format!("key algorithm {alg:?}")));
        };

        let key_id = hex::decode(&info.skid).map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
        let mut params = CertificateParams::from_ca_cert_pem(cert_pem)
            .map_err(|e| CryptoError::InvalidKey(format!("failed to load certificate: {e}")))?;
        params.key_identifier_method = KeyIdMethod::PreSpecified(key_id.clone());
        let issuer = params
            .self_signed(&key)
            .map_err(|e| CryptoError::InvalidKey(format!("failed to load issuer: {e}")))?;

        Ok(Self {
            key,
            issuer,
            key_id,
            algorithm,
            ocsp_key,
            rng,
        })
    }

    fn certificate_params(&self, template: &CertificateTemplate) -> CryptoResult<CertificateParams> {
        let mut params = CertificateParams::default();

        params.distinguished_name = DistinguishedName::new();
        for (attr, value) in &template.subject {
            params
                .distinguished_name
                .push(dn_type(*attr), value.as_str());
        }

        let mut sans = Vec::new();
        for dns in &template.sans.dns {
            sans.push(SanType::DnsName(ia5(dns)?));
        }
        for email in &template.sans.emails {
            sans.push(SanType::Rfc822Name(ia5(email)?));
        }
        for uri in &template.sans.uris {
            sans.push(SanType::URI(ia5(uri)?));
        }
        sans.extend(template.sans.ips.iter().copied().map(SanType::IpAddress));
        params.subject_alt_names = sans;

        params.serial_number = Some(SerialNumber::from_slice(&template.serial));
        params.not_before = to_offset(template.not_before)?;
        params.not_after = to_offset(template.not_after)?;

        params.key_usages = template.key_usages.iter().map(|u| key_usage(*u)).collect();
        params.extended_key_usages = template
            .ext_key_usages
            .iter()
            .map(|u| ext_key_usage(*u))
            .collect();

        params.is_ca = if template.is_ca {
            IsCa::Ca(match template.max_path_len {
                Some(len) => BasicConstraints::Constrained(len),
                None => BasicConstraints::Unconstrained,
            })
        } else {
            IsCa::ExplicitNoCa
        };
        params.use_authority_key_identifier_extension = true;

        if !template.crl_urls.is_empty() {
            params.crl_distribution_points = vec![CrlDistributionPoint {
                uris: template.crl_urls.clone(),
            }];
        }

        let mut extensions = Vec::new();
        if !template.issuer_urls.is_empty() || !template.ocsp_urls.is_empty() {
            extensions.push(CustomExtension::from_oid_content(
                OID_AUTHORITY_INFO_ACCESS,
                encode_authority_info_access(&template.ocsp_urls, &template.issuer_urls),
            ));
        }
        if template.ocsp_no_check {
            extensions.push(CustomExtension::from_oid_content(
                OID_OCSP_NO_CHECK,
                vec![0x05, 0x00],
            ));
        }
        for ext in &template.extensions {
            let mut custom = CustomExtension::from_oid_content(&ext.oid, ext.value.clone());
            custom.set_criticality(ext.critical);
            extensions.push(custom);
        }
        params.custom_extensions = extensions;

        Ok(params)
    }
}

#[async_trait]
impl IssuerSigner for SoftwareSigner {
    fn signature_algorithm(&self) -> SignatureAlgorithm {
        self.algorithm
    }

    async fn sign_certificate(
        &self,
        template: &CertificateTemplate,
    ) -> CryptoResult<SignedCertificate> {
        let mut csr = CertificateSigningRequestParams::from_pem(&template.csr_pem)
            .map_err(|e| CryptoError::InvalidRequest(e.to_string()))?;
        csr.params = self.certificate_params(template)?;

        let cert = csr
            .signed_by(&self.issuer, &self.key)
            .map_err(|e| CryptoError::Signing(format!("failed to sign certificate: {e}")))?;

        Ok(SignedCertificate {
            der: cert.der().to_vec(),
            pem: cert.pem(),
        })
    }

    async fn create_crl(
        &self,
        entries: &[RevokedEntry],
        this_update: DateTime<Utc>,
        next_update: DateTime<Utc>,
        crl_number: u64,
    ) -> CryptoResult<Vec<u8>> {
        let mut revoked_certs = Vec::with_capacity(entries.len());
        for entry in entries {
            // removeFromCRL entries are left out of a full CRL.
            if entry.reason == RevocationReason::RemoveFromCrl {
                continue;
            }
            revoked_certs.push(RevokedCertParams {
                serial_number: SerialNumber::from_slice(&entry.serial),
                revocation_time: to_offset(entry.revoked_at)?,
                reason_code: crl_reason(entry.reason),
                invalidity_date: None,
            });
        }

        let params = CertificateRevocationListParams {
            this_update: to_offset(this_update)?,
            next_update: to_offset(next_update)?,
            crl_number: SerialNumber::from_slice(&crl_number.to_be_bytes()),
            issuing_distribution_point: None,
            revoked_certs,
            key_identifier_method: KeyIdMethod::PreSpecified(self.key_id.clone()),
        };

        let crl = params
            .signed_by(&self.issuer, &self.key)
            .map_err(|e| CryptoError::Signing(format!("failed to sign CRL: {e}")))?;
        Ok(crl.der().to_vec())
    }

    async fn sign_message(&self, message: &[u8]) -> CryptoResult<Vec<u8>> {
        match &self.ocsp_key {
            OcspKey::Ecdsa(key) => key
                .sign(&self.rng, message)
                .map(|sig| sig.as_ref().to_vec())
                .map_err(|e| CryptoError::Signing(e.to_string())),
            OcspKey::Ed25519(key) => Ok(key.sign(message).as_ref().to_vec()),
            OcspKey::Rsa(key) => {
                let mut signature = vec![0; key.public().modulus_len()];
                key.sign(&RSA_PKCS1_SHA256, &self.rng, message, &mut signature)
                    .map_err(|e| CryptoError::Signing(e.to_string()))?;
                Ok(signature)
            }
        }
    }
}

fn ia5(value: &str) -> CryptoResult<Ia5String> {
    Ia5String::try_from(value)
        .map_err(|e| CryptoError::InvalidRequest(format!("invalid IA5String {value:?}: {e}")))
}

fn dn_type(attr: NameAttribute) -> DnType {
    match attr {
        NameAttribute::CommonName => DnType::CommonName,
        NameAttribute::Country => DnType::CountryName,
        NameAttribute::Province => DnType::StateOrProvinceName,
        NameAttribute::Locality => DnType::LocalityName,
        NameAttribute::Organization => DnType::OrganizationName,
        NameAttribute::OrganizationalUnit => DnType::OrganizationalUnitName,
    }
}

fn key_usage(usage: KeyUsage) -> KeyUsagePurpose {
    match usage {
        KeyUsage::DigitalSignature => KeyUsagePurpose::DigitalSignature,
        KeyUsage::ContentCommitment => KeyUsagePurpose::ContentCommitment,
        KeyUsage::KeyEncipherment => KeyUsagePurpose::KeyEncipherment,
        KeyUsage::DataEncipherment => KeyUsagePurpose::DataEncipherment,
        KeyUsage::KeyAgreement => KeyUsagePurpose::KeyAgreement,
        KeyUsage::CertSign => KeyUsagePurpose::KeyCertSign,
        KeyUsage::CrlSign => KeyUsagePurpose::CrlSign,
        KeyUsage::EncipherOnly => KeyUsagePurpose::EncipherOnly,
        KeyUsage::DecipherOnly => KeyUsagePurpose::DecipherOnly,
    }
}

fn ext_key_usage(usage: ExtKeyUsage) -> ExtendedKeyUsagePurpose {
    match usage {
        ExtKeyUsage::Any => ExtendedKeyUsagePurpose::Any,
        ExtKeyUsage::ServerAuth => ExtendedKeyUsagePurpose::ServerAuth,
        ExtKeyUsage::ClientAuth => ExtendedKeyUsagePurpose::ClientAuth,
        ExtKeyUsage::CodeSigning => ExtendedKeyUsagePurpose::CodeSigning,
        ExtKeyUsage::EmailProtection => ExtendedKeyUsagePurpose::EmailProtection,
        ExtKeyUsage::TimeStamping => ExtendedKeyUsagePurpose::TimeStamping,
        ExtKeyUsage::OcspSigning => ExtendedKeyUsagePurpose::OcspSigning,
    }
}

fn crl_reason(reason: RevocationReason) -> Option<RcgenRevocationReason> {
    match reason {
        RevocationReason::Unspecified | RevocationReason::RemoveFromCrl => None,
        RevocationReason::KeyCompromise => Some(RcgenRevocationReason::KeyCompromise),
        RevocationReason::CaCompromise => Some(RcgenRevocationReason::CaCompromise),
        RevocationReason::AffiliationChanged => Some(RcgenRevocationReason::AffiliationChanged),
        RevocationReason::Superseded => Some(RcgenRevocationReason::Superseded),
        RevocationReason::CessationOfOperation => {
            Some(RcgenRevocationReason::CessationOfOperation)
        }
        RevocationReason::CertificateHold => Some(RcgenRevocationReason::CertificateHold),
        RevocationReason::PrivilegeWithdrawn => Some(RcgenRevocationReason::PrivilegeWithdrawn),
        RevocationReason::AaCompromise => Some(RcgenRevocationReason::AaCompromise),
    }
}

/// `AuthorityInfoAccessSyntax` with OCSP entries first.
fn encode_authority_info_access(ocsp_urls: &[String], issuer_urls: &[String]) -> Vec<u8> {
    let entries = ocsp_urls
        .iter()
        .map(|url| (OID_AD_OCSP, url))
        .chain(issuer_urls.iter().map(|url| (OID_AD_CA_ISSUERS, url)));

    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            for (method, url) in entries {
                w.next().write_sequence(|w| {
                    w.next().write_oid(&ObjectIdentifier::from_slice(method));
                    // uniformResourceIdentifier [6] IMPLICIT IA5String
                    w.next()
                        .write_tagged_implicit(Tag::context(6), |w| w.write_ia5_string(url));
                });
            }
        });
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x509::SubjectAltNames;
    use x509_parser::prelude::{FromDer, X509Certificate};
    use x509_parser::revocation_list::CertificateRevocationList;

    fn root() -> (String, String) {
        create_root_ca("Software Root", KeyAlgorithm::EcdsaP256, chrono::Duration::days(365))
            .unwrap()
    }

    fn template(csr_pem: String) -> CertificateTemplate {
        let now = Utc::now();
        CertificateTemplate {
            csr_pem,
            subject: vec![(NameAttribute::CommonName, "leaf.example.com".to_string())],
            sans: SubjectAltNames::classify(&["leaf.example.com", "10.0.0.7"]),
            serial: random_serial(),
            not_before: now - chrono::Duration::minutes(10),
            not_after: now + chrono::Duration::days(30),
            key_usages: vec![KeyUsage::DigitalSignature],
            ext_key_usages: vec![ExtKeyUsage::ServerAuth],
            is_ca: false,
            max_path_len: None,
            ocsp_no_check: true,
            issuer_urls: vec!["http://certs.example.com/root.crt".to_string()],
            ocsp_urls: vec!["http://ocsp.example.com".to_string()],
            crl_urls: vec!["http://certs.example.com/root.crl".to_string()],
            extensions: vec![],
        }
    }

    #[tokio::test]
    async fn test_sign_certificate_chains_to_issuer() {
        let (cert_pem, key_pem) = root();
        let backend = SoftwareBackend::new();
        let signer = backend
            .signer_from_key_material(&key_pem, &cert_pem)
            .await
            .unwrap();
        let generated = backend
            .generate_key_and_request("leaf", KeyAlgorithm::EcdsaP256, "leaf.example.com")
            .await
            .unwrap();

        let signed = signer
            .sign_certificate(&template(generated.csr_pem))
            .await
            .unwrap();

        let root_info = x509::certificate_info_from_pem(&cert_pem).unwrap();
        let leaf = x509::certificate_info(&signed.der).unwrap();
        assert_eq!(leaf.issuer, root_info.subject);
        assert_eq!(leaf.akid.as_deref(), Some(root_info.skid.as_str()));
        assert!(leaf.subject.contains("leaf.example.com"));
        assert!(!leaf.is_ca);

        let (_, parsed) = X509Certificate::from_der(&signed.der).unwrap();
        let (_, issuer) = X509Certificate::from_der(&root_info.der).unwrap();
        assert!(parsed.verify_signature(Some(issuer.public_key())).is_ok());
        let oids: Vec<String> = parsed.extensions().iter().map(|e| e.oid.to_id_string()).collect();
        assert!(oids.contains(&"1.3.6.1.5.5.7.1.1".to_string()));
        assert!(oids.contains(&"1.3.6.1.5.5.7.48.1.5".to_string()));
        assert!(oids.contains(&"2.5.29.31".to_string()));
    }

    #[tokio::test]
    async fn test_mismatched_key_is_rejected() {
        let (cert_pem, _) = root();
        let (_, other_key) = root();
        let err = SoftwareSigner::new(&other_key, &cert_pem).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_create_crl_lists_entries() {
        let (cert_pem, key_pem) = root();
        let signer = SoftwareSigner::new(&key_pem, &cert_pem).unwrap();
        let now = Utc::now();
        let entries = vec![
            RevokedEntry {
                serial: vec![0x01, 0x02],
                revoked_at: now,
                reason: RevocationReason::KeyCompromise,
            },
            RevokedEntry {
                serial: vec![0x03],
                revoked_at: now,
                reason: RevocationReason::Unspecified,
            },
            RevokedEntry {
                serial: vec![0x04],
                revoked_at: now,
                reason: RevocationReason::RemoveFromCrl,
            },
        ];

        let der = signer
            .create_crl(&entries, now, now + chrono::Duration::hours(1), 42)
            .await
            .unwrap();
        let (_, crl) = CertificateRevocationList::from_der(&der).unwrap();
        assert_eq!(crl.iter_revoked_certificates().count(), 2);
        let root_info = x509::certificate_info_from_pem(&cert_pem).unwrap();
        assert_eq!(crl.issuer().to_string(), root_info.subject);
    }

    #[tokio::test]
    async fn test_sign_message_verifies_with_ring() {
        for algorithm in [KeyAlgorithm::EcdsaP256, KeyAlgorithm::EcdsaP384, KeyAlgorithm::Ed25519] {
            let (cert_pem, key_pem) =
                create_root_ca("Algo Root", algorithm, chrono::Duration::days(1)).unwrap();
            let signer = SoftwareSigner::new(&key_pem, &cert_pem).unwrap();
            let signature = signer.sign_message(b"payload").await.unwrap();

            let info = x509::certificate_info_from_pem(&cert_pem).unwrap();
            let verify_alg: &dyn ring::signature::VerificationAlgorithm = match algorithm {
                KeyAlgorithm::EcdsaP256 => &ring::signature::ECDSA_P256_SHA256_ASN1,
                KeyAlgorithm::EcdsaP384 => &ring::signature::ECDSA_P384_SHA384_ASN1,
                KeyAlgorithm::Ed25519 => &ring::signature::ED25519,
            };
            ring::signature::UnparsedPublicKey::new(verify_alg, &info.public_key)
                .verify(b"payload", &signature)
                .unwrap();
        }
    }

    #[test]
    fn test_random_serial_is_positive() {
        for _ in 0..32 {
            let serial = random_serial();
            assert_eq!(serial.len(), 16);
            assert!(serial[0] < 0x80);
        }
    }

    #[test]
    fn test_authority_info_access_encoding() {
        let der = encode_authority_info_access(
            &["http://o".to_string()],
            &["http://c".to_string()],
        );
        // SEQUENCE { SEQUENCE { ocsp, [6] "http://o" }, SEQUENCE { caIssuers, [6] "http://c" } }
        assert_eq!(der[0], 0x30);
        let ocsp = der.windows(10).position(|w| w == [0x86, 0x08, b'h', b't', b't', b'p', b':', b'/', b'/', b'o']);
        assert!(ocsp.is_some());
    }
}
