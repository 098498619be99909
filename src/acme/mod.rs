//! Wire-facing value types for the ACME dialogue.
//!
//! These mirror the subset of RFC 8555 objects the renewal engine consumes.
//! The protocol transport (JWS signing, nonce handling, HTTPS) lives behind
//! the [`client::AcmeTransport`] contract.

pub mod client;

pub use client::{AcmeClient, AcmeError, AcmeTransport};

use serde::{Deserialize, Serialize};

/// RFC 7807 problem document attached to server-side failures.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Problem {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
}

impl std::fmt::Display for Problem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.kind, &self.detail) {
            (Some(kind), Some(detail)) => write!(f, "{kind}: {detail}"),
            (Some(kind), None) => write!(f, "{kind}"),
            (None, Some(detail)) => write!(f, "{detail}"),
            (None, None) => write!(f, "unspecified ACME problem"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorizationStatus {
    Pending,
    Valid,
    Invalid,
    Deactivated,
    Expired,
    Revoked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeStatus {
    Pending,
    Processing,
    Valid,
    Invalid,
}

/// One CA-offered way to prove control of an identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Challenge {
    /// Challenge type string, e.g. `http-01` or `dns-01`.
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub status: ChallengeStatus,
    pub token: String,
    #[serde(default)]
    pub error: Option<Problem>,
}

impl Challenge {
    /// Synthesizes a valid challenge for authorizations the CA already
    /// considers valid, where no challenge needs answering.
    pub fn cached_valid(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            url: String::new(),
            status: ChallengeStatus::Valid,
            token: String::new(),
            error: None,
        }
    }

    /// Synthesizes a terminal invalid challenge for failures that happen on
    /// this side of the wire (plugin errors, timeouts).
    pub fn local_failure(detail: impl Into<String>) -> Self {
        Self {
            kind: String::new(),
            url: String::new(),
            status: ChallengeStatus::Invalid,
            token: String::new(),
            error: Some(Problem {
                kind: None,
                detail: Some(detail.into()),
                status: None,
            }),
        }
    }
}

/// CA-issued permission-to-issue proof for one identifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    pub identifier: String,
    pub status: AuthorizationStatus,
    pub challenges: Vec<Challenge>,
}

/// Opaque handle for a certificate request covering a set of identifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    pub url: String,
    pub authorization_urls: Vec<String>,
    pub finalize_url: String,
}

/// Everything a validation plugin needs to stage the proof for one
/// challenge. The key authorization and DNS proof value are computed by the
/// transport, which owns the account key.
#[derive(Debug, Clone)]
pub struct ChallengeDetails {
    pub kind: String,
    pub identifier: String,
    pub token: String,
    pub key_authorization: String,
    /// Digest value for `_acme-challenge` TXT records (dns-01 only).
    pub dns_proof: Option<String>,
}
