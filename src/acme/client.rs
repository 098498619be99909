use std::collections::BTreeSet;

use log::debug;
use thiserror::Error;

use super::{Authorization, Challenge, ChallengeDetails, Order, Problem};

/// Errors surfaced by the ACME client wrapper. Server-side rejections carry
/// the problem document verbatim so the driver can log it unchanged.
#[derive(Debug, Error)]
pub enum AcmeError {
    #[error("acme transport error: {0}")]
    Transport(String),
    #[error("acme server rejected the request: {0}")]
    Protocol(Problem),
}

/// Contract over the protocol transport. Implementations own JWS signing,
/// nonce handling and the HTTPS stack, and must refuse to negotiate below
/// TLS 1.2 (a rustls-backed client satisfies this by construction; rustls
/// does not speak older protocol versions).
pub trait AcmeTransport: Send + Sync {
    fn new_order(&self, identifiers: &[String]) -> Result<Order, AcmeError>;
    fn fetch_authorization(&self, url: &str) -> Result<Authorization, AcmeError>;
    fn challenge_details(
        &self,
        authorization: &Authorization,
        challenge: &Challenge,
    ) -> Result<ChallengeDetails, AcmeError>;
    fn answer_challenge(&self, challenge: &Challenge) -> Result<Challenge, AcmeError>;
    fn fetch_challenge(&self, url: &str) -> Result<Challenge, AcmeError>;
}

/// The only component of the engine that performs network I/O. Thin calls
/// through to the transport with logging at the seam.
pub struct AcmeClient {
    transport: Box<dyn AcmeTransport>,
}

impl AcmeClient {
    pub fn new(transport: Box<dyn AcmeTransport>) -> Self {
        Self { transport }
    }

    /// Places a new order covering the identifier set. The set is ordered so
    /// the same host collection always produces the same request.
    pub fn create_order(&self, identifiers: &BTreeSet<String>) -> Result<Order, AcmeError> {
        let identifiers: Vec<String> = identifiers.iter().cloned().collect();
        debug!("[acme] creating order for {} identifier(s)", identifiers.len());
        self.transport.new_order(&identifiers)
    }

    pub fn get_authorization_details(&self, url: &str) -> Result<Authorization, AcmeError> {
        debug!("[acme] fetching authorization {url}");
        self.transport.fetch_authorization(url)
    }

    /// Resolves the opaque object a validation plugin needs to prepare the
    /// proof for one challenge.
    pub fn get_challenge_details(
        &self,
        authorization: &Authorization,
        challenge: &Challenge,
    ) -> Result<ChallengeDetails, AcmeError> {
        self.transport.challenge_details(authorization, challenge)
    }

    /// Tells the CA the proof is in place and verification may start.
    pub fn submit_challenge_answer(&self, challenge: &Challenge) -> Result<Challenge, AcmeError> {
        debug!("[acme] answering {} challenge {}", challenge.kind, challenge.url);
        self.transport.answer_challenge(challenge)
    }

    /// Re-fetches challenge status while the CA is verifying.
    pub fn decode_challenge(&self, url: &str) -> Result<Challenge, AcmeError> {
        self.transport.fetch_challenge(url)
    }
}
