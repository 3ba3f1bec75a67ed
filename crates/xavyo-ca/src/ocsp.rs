//! OCSP (RFC 6960) DER codec.
//!
//! Covers what a responder needs: parsing requests, encoding signed basic
//! responses and the fixed error responses. Response parsing and request
//! encoding are provided for clients and tests.
//!
//! Elements are read generically (`read_der`) and dispatched on their tag
//! byte, so optional and context-tagged fields never depend on speculative
//! parsing.

use chrono::{DateTime, NaiveDateTime, Utc};
use num_bigint::BigUint;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha384, Sha512};
use thiserror::Error;
use xavyo_ca_db::RevocationReason;
use yasna::models::ObjectIdentifier;
use yasna::tags::TAG_GENERALIZEDTIME;
use yasna::{DERWriter, Tag};

/// `OCSPResponse` with status malformedRequest.
pub const MALFORMED_REQUEST_RESPONSE: &[u8] = &[0x30, 0x03, 0x0A, 0x01, 0x01];
/// `OCSPResponse` with status internalError.
pub const INTERNAL_ERROR_RESPONSE: &[u8] = &[0x30, 0x03, 0x0A, 0x01, 0x02];
/// `OCSPResponse` with status unauthorized.
pub const UNAUTHORIZED_RESPONSE: &[u8] = &[0x30, 0x03, 0x0A, 0x01, 0x06];

/// id-pkix-ocsp-basic
const OID_BASIC_RESPONSE: &[u64] = &[1, 3, 6, 1, 5, 5, 7, 48, 1, 1];

const TAG_SEQUENCE: u8 = 0x30;
const TAG_GENERALIZED_TIME: u8 = 0x18;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum OcspError {
    #[error("malformed OCSP message: {0}")]
    Malformed(String),

    #[error("unsupported hash algorithm: {0}")]
    UnsupportedHash(String),
}

impl From<yasna::ASN1Error> for OcspError {
    fn from(err: yasna::ASN1Error) -> Self {
        Self::Malformed(err.to_string())
    }
}

/// `OCSPResponseStatus` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Successful,
    MalformedRequest,
    InternalError,
    TryLater,
    SigRequired,
    Unauthorized,
}

impl ResponseStatus {
    fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Successful),
            1 => Some(Self::MalformedRequest),
            2 => Some(Self::InternalError),
            3 => Some(Self::TryLater),
            5 => Some(Self::SigRequired),
            6 => Some(Self::Unauthorized),
            _ => None,
        }
    }
}

/// Hash algorithms accepted in a `CertID`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlgorithm {
    Sha1,
    Sha256,
    Sha384,
    Sha512,
}

impl HashAlgorithm {
    pub const ALL: [Self; 4] = [Self::Sha1, Self::Sha256, Self::Sha384, Self::Sha512];

    #[must_use]
    pub fn oid(&self) -> &'static [u64] {
        match self {
            Self::Sha1 => &[1, 3, 14, 3, 2, 26],
            Self::Sha256 => &[2, 16, 840, 1, 101, 3, 4, 2, 1],
            Self::Sha384 => &[2, 16, 840, 1, 101, 3, 4, 2, 2],
            Self::Sha512 => &[2, 16, 840, 1, 101, 3, 4, 2, 3],
        }
    }

    #[must_use]
    pub fn from_oid(arcs: &[u64]) -> Option<Self> {
        Self::ALL.into_iter().find(|alg| alg.oid() == arcs)
    }

    #[must_use]
    pub fn digest(&self, data: &[u8]) -> Vec<u8> {
        match self {
            Self::Sha1 => Sha1::digest(data).to_vec(),
            Self::Sha256 => Sha256::digest(data).to_vec(),
            Self::Sha384 => Sha384::digest(data).to_vec(),
            Self::Sha512 => Sha512::digest(data).to_vec(),
        }
    }
}

/// Identifies the certificate a request asks about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertId {
    pub hash_algorithm: HashAlgorithm,
    pub issuer_name_hash: Vec<u8>,
    pub issuer_key_hash: Vec<u8>,
    pub serial_number: BigUint,
}

impl CertId {
    /// Build a `CertID` from the issuer's raw subject and public key bits.
    #[must_use]
    pub fn new(
        hash_algorithm: HashAlgorithm,
        issuer_raw_subject: &[u8],
        issuer_public_key: &[u8],
        serial_number: BigUint,
    ) -> Self {
        Self {
            hash_algorithm,
            issuer_name_hash: hash_algorithm.digest(issuer_raw_subject),
            issuer_key_hash: hash_algorithm.digest(issuer_public_key),
            serial_number,
        }
    }
}

/// A parsed request. Only the first entry of the request list is answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcspRequest {
    pub cert_id: CertId,
}

/// Status reported for one certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CertStatus {
    Good,
    Revoked {
        revoked_at: DateTime<Utc>,
        reason: Option<RevocationReason>,
    },
    Unknown,
}

/// Input of a signed response.
#[derive(Debug, Clone)]
pub struct OcspSignRequest {
    pub cert_id: CertId,
    pub status: CertStatus,
    pub produced_at: DateTime<Utc>,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
    /// SHA-1 of the responder's public key bits.
    pub responder_key_hash: Vec<u8>,
}

/// Algorithms a responder signs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    EcdsaSha256,
    EcdsaSha384,
    Ed25519,
    RsaSha256,
}

impl SignatureAlgorithm {
    #[must_use]
    pub fn oid(&self) -> &'static [u64] {
        match self {
            Self::EcdsaSha256 => &[1, 2, 840, 10045, 4, 3, 2],
            Self::EcdsaSha384 => &[1, 2, 840, 10045, 4, 3, 3],
            Self::Ed25519 => &[1, 3, 101, 112],
            Self::RsaSha256 => &[1, 2, 840, 113_549, 1, 1, 11],
        }
    }

    fn write_identifier(self, w: DERWriter) {
        w.write_sequence(|w| {
            w.next().write_oid(&ObjectIdentifier::from_slice(self.oid()));
            if self == Self::RsaSha256 {
                w.next().write_null();
            }
        });
    }
}

// Encoding

fn write_time(w: DERWriter, at: DateTime<Utc>) {
    let text = at.format("%Y%m%d%H%M%SZ").to_string();
    w.write_tagged_implicit(TAG_GENERALIZEDTIME, |w| w.write_bytes(text.as_bytes()));
}

fn write_cert_id(w: DERWriter, id: &CertId) {
    w.write_sequence(|w| {
        w.next().write_sequence(|w| {
            w.next()
                .write_oid(&ObjectIdentifier::from_slice(id.hash_algorithm.oid()));
            w.next().write_null();
        });
        w.next().write_bytes(&id.issuer_name_hash);
        w.next().write_bytes(&id.issuer_key_hash);
        w.next().write_biguint(&id.serial_number);
    });
}

/// Encode the `ResponseData` to be signed.
#[must_use]
pub fn encode_response_data(req: &OcspSignRequest) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            // responderID byKey
            w.next()
                .write_tagged(Tag::context(2), |w| w.write_bytes(&req.responder_key_hash));
            write_time(w.next(), req.produced_at);
            w.next().write_sequence(|w| {
                w.next().write_sequence(|w| {
                    write_cert_id(w.next(), &req.cert_id);
                    match &req.status {
                        CertStatus::Good => {
                            w.next()
                                .write_tagged_implicit(Tag::context(0), |w| w.write_null());
                        }
                        CertStatus::Revoked { revoked_at, reason } => {
                            w.next().write_tagged_implicit(Tag::context(1), |w| {
                                w.write_sequence(|w| {
                                    write_time(w.next(), *revoked_at);
                                    if let Some(reason) = reason {
                                        w.next().write_tagged(Tag::context(0), |w| {
                                            w.write_enum(i64::from(reason.as_i16()));
                                        });
                                    }
                                });
                            });
                        }
                        CertStatus::Unknown => {
                            w.next()
                                .write_tagged_implicit(Tag::context(2), |w| w.write_null());
                        }
                    }
                    write_time(w.next(), req.this_update);
                    if let Some(next_update) = req.next_update {
                        w.next()
                            .write_tagged(Tag::context(0), |w| write_time(w, next_update));
                    }
                });
            });
        });
    })
}

/// Wrap signed `ResponseData` into a successful `OCSPResponse`.
#[must_use]
pub fn encode_basic_response(
    response_data: &[u8],
    algorithm: SignatureAlgorithm,
    signature: &[u8],
) -> Vec<u8> {
    let basic = yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_der(response_data);
            algorithm.write_identifier(w.next());
            w.next().write_bitvec_bytes(signature, signature.len() * 8);
        });
    });

    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_enum(0);
            w.next().write_tagged(Tag::context(0), |w| {
                w.write_sequence(|w| {
                    w.next()
                        .write_oid(&ObjectIdentifier::from_slice(OID_BASIC_RESPONSE));
                    w.next().write_bytes(&basic);
                });
            });
        });
    })
}

/// Encode an unsigned request for one certificate.
#[must_use]
pub fn encode_request(cert_id: &CertId) -> Vec<u8> {
    yasna::construct_der(|w| {
        w.write_sequence(|w| {
            w.next().write_sequence(|w| {
                w.next().write_sequence(|w| {
                    w.next().write_sequence(|w| write_cert_id(w.next(), cert_id));
                });
            });
        });
    })
}

// Decoding

/// The elements of a SEQUENCE, each as raw DER.
fn sequence_elements(der: &[u8]) -> Result<Vec<Vec<u8>>, OcspError> {
    Ok(yasna::parse_der(der, |r| {
        r.read_sequence(|r| {
            let mut elements = Vec::new();
            while let Some(element) = r.read_optional(|r| r.read_der())? {
                elements.push(element);
            }
            Ok(elements)
        })
    })?)
}

fn tag_of(element: &[u8]) -> u8 {
    element.first().copied().unwrap_or(0)
}

fn explicit_inner(element: &[u8], tag: u64) -> Result<Vec<u8>, OcspError> {
    Ok(yasna::parse_der(element, |r| {
        r.read_tagged(Tag::context(tag), |r| r.read_der())
    })?)
}

fn parse_time(element: &[u8]) -> Result<DateTime<Utc>, OcspError> {
    let raw = yasna::parse_der(element, |r| {
        r.read_tagged_implicit(TAG_GENERALIZEDTIME, |r| r.read_bytes())
    })?;
    let text = String::from_utf8(raw).map_err(|e| OcspError::Malformed(e.to_string()))?;
    // Fractional seconds are dropped.
    let text = match text.find('.') {
        Some(dot) => format!("{}Z", &text[..dot]),
        None => text,
    };
    NaiveDateTime::parse_from_str(&text, "%Y%m%d%H%M%SZ")
        .map(|naive| naive.and_utc())
        .map_err(|e| OcspError::Malformed(format!("invalid time {text:?}: {e}")))
}

fn parse_cert_id(element: &[u8]) -> Result<CertId, OcspError> {
    let (oid, issuer_name_hash, issuer_key_hash, serial_number) =
        yasna::parse_der(element, |r| {
            r.read_sequence(|r| {
                let oid = r.next().read_sequence(|r| {
                    let oid = r.next().read_oid()?;
                    let _params = r.read_optional(|r| r.read_der())?;
                    Ok(oid)
                })?;
                let name_hash = r.next().read_bytes()?;
                let key_hash = r.next().read_bytes()?;
                let serial = r.next().read_biguint()?;
                Ok((oid, name_hash, key_hash, serial))
            })
        })?;

    let hash_algorithm = HashAlgorithm::from_oid(oid.components())
        .ok_or_else(|| OcspError::UnsupportedHash(oid.to_string()))?;

    Ok(CertId {
        hash_algorithm,
        issuer_name_hash,
        issuer_key_hash,
        serial_number,
    })
}

/// Parse a DER `OCSPRequest`.
pub fn parse_request(der: &[u8]) -> Result<OcspRequest, OcspError> {
    let outer = sequence_elements(der)?;
    let tbs = outer
        .first()
        .ok_or_else(|| OcspError::Malformed("empty request".to_string()))?;

    // version [0], requestorName [1] and requestExtensions [2] are skipped.
    let request_list = sequence_elements(tbs)?
        .into_iter()
        .find(|element| tag_of(element) == TAG_SEQUENCE)
        .ok_or_else(|| OcspError::Malformed("missing request list".to_string()))?;

    let request = sequence_elements(&request_list)?
        .into_iter()
        .next()
        .ok_or_else(|| OcspError::Malformed("empty request list".to_string()))?;

    let cert_id = sequence_elements(&request)?
        .into_iter()
        .next()
        .ok_or_else(|| OcspError::Malformed("missing certificate ID".to_string()))?;

    Ok(OcspRequest {
        cert_id: parse_cert_id(&cert_id)?,
    })
}

/// A decoded `OCSPResponse`.
#[derive(Debug, Clone)]
pub struct OcspResponse {
    pub status: ResponseStatus,
    pub basic: Option<BasicResponse>,
}

/// A decoded `BasicOCSPResponse`.
#[derive(Debug, Clone)]
pub struct BasicResponse {
    /// DER of the signed `ResponseData`.
    pub response_data: Vec<u8>,
    pub signature_algorithm: Vec<u64>,
    pub signature: Vec<u8>,
    pub responder_key_hash: Option<Vec<u8>>,
    pub produced_at: DateTime<Utc>,
    pub responses: Vec<SingleResponse>,
}

#[derive(Debug, Clone)]
pub struct SingleResponse {
    pub cert_id: CertId,
    pub status: CertStatus,
    pub this_update: DateTime<Utc>,
    pub next_update: Option<DateTime<Utc>>,
}

fn parse_cert_status(element: &[u8]) -> Result<CertStatus, OcspError> {
    match tag_of(element) {
        0x80 => Ok(CertStatus::Good),
        0x82 => Ok(CertStatus::Unknown),
        0xA1 => {
            let (time, reason) = yasna::parse_der(element, |r| {
                r.read_tagged_implicit(Tag::context(1), |r| {
                    r.read_sequence(|r| {
                        let time = r.next().read_der()?;
                        let reason = r.read_optional(|r| r.read_der())?;
                        Ok((time, reason))
                    })
                })
            })?;
            let reason = match reason {
                Some(element) => {
                    let code = yasna::parse_der(&element, |r| {
                        r.read_tagged(Tag::context(0), |r| r.read_enum())
                    })?;
                    let reason = i16::try_from(code)
                        .ok()
                        .and_then(RevocationReason::from_i16)
                        .ok_or_else(|| OcspError::Malformed(format!("invalid reason {code}")))?;
                    Some(reason)
                }
                None => None,
            };
            Ok(CertStatus::Revoked {
                revoked_at: parse_time(&time)?,
                reason,
            })
        }
        other => Err(OcspError::Malformed(format!("invalid status tag {other:#04x}"))),
    }
}

fn parse_single_response(element: &[u8]) -> Result<SingleResponse, OcspError> {
    let elements = sequence_elements(element)?;
    if elements.len() < 3 {
        return Err(OcspError::Malformed("truncated single response".to_string()));
    }
    let next_update = elements[3..]
        .iter()
        .find(|e| tag_of(e) == 0xA0)
        .map(|e| explicit_inner(e, 0).and_then(|inner| parse_time(&inner)))
        .transpose()?;

    Ok(SingleResponse {
        cert_id: parse_cert_id(&elements[0])?,
        status: parse_cert_status(&elements[1])?,
        this_update: parse_time(&elements[2])?,
        next_update,
    })
}

fn parse_basic_response(der: &[u8]) -> Result<BasicResponse, OcspError> {
    let (response_data, signature_algorithm, signature) = yasna::parse_der(der, |r| {
        r.read_sequence(|r| {
            let tbs = r.next().read_der()?;
            let algorithm = r.next().read_sequence(|r| {
                let oid = r.next().read_oid()?;
                let _params = r.read_optional(|r| r.read_der())?;
                Ok(oid)
            })?;
            let (signature, _bits) = r.next().read_bitvec_bytes()?;
            let _certs = r.read_optional(|r| r.read_der())?;
            Ok((tbs, algorithm, signature))
        })
    })?;

    let mut responder_key_hash = None;
    let mut produced_at = None;
    let mut responses = Vec::new();
    for element in sequence_elements(&response_data)? {
        match tag_of(&element) {
            0xA2 if produced_at.is_none() => {
                responder_key_hash = Some(yasna::parse_der(&element, |r| {
                    r.read_tagged(Tag::context(2), |r| r.read_bytes())
                })?);
            }
            TAG_GENERALIZED_TIME => produced_at = Some(parse_time(&element)?),
            TAG_SEQUENCE => {
                for single in sequence_elements(&element)? {
                    responses.push(parse_single_response(&single)?);
                }
            }
            // version, responderID byName, extensions
            _ => {}
        }
    }

    Ok(BasicResponse {
        signature_algorithm: signature_algorithm.components().clone(),
        signature,
        responder_key_hash,
        produced_at: produced_at
            .ok_or_else(|| OcspError::Malformed("missing producedAt".to_string()))?,
        responses,
        response_data,
    })
}

/// Parse a DER `OCSPResponse`.
pub fn parse_response(der: &[u8]) -> Result<OcspResponse, OcspError> {
    let (code, bytes) = yasna::parse_der(der, |r| {
        r.read_sequence(|r| {
            let code = r.next().read_enum()?;
            let bytes = r.read_optional(|r| r.read_der())?;
            Ok((code, bytes))
        })
    })?;
    let status = ResponseStatus::from_code(code)
        .ok_or_else(|| OcspError::Malformed(format!("invalid response status {code}")))?;

    let basic = match bytes {
        Some(element) => {
            let (oid, body) = yasna::parse_der(&element, |r| {
                r.read_tagged(Tag::context(0), |r| {
                    r.read_sequence(|r| {
                        let oid = r.next().read_oid()?;
                        let body = r.next().read_bytes()?;
                        Ok((oid, body))
                    })
                })
            })?;
            if oid.components().as_slice() != OID_BASIC_RESPONSE {
                return Err(OcspError::Malformed(format!("unsupported response type {oid}")));
            }
            Some(parse_basic_response(&body)?)
        }
        None => None,
    };

    Ok(OcspResponse { status, basic })
}
