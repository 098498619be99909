use std::thread;

use anyhow::{Context, Result};
use log::{debug, error, info, warn};

use super::context::{IdentifierContext, RenewalContext};
use crate::acme::{Authorization, AuthorizationStatus, Challenge, ChallengeStatus};
use crate::types::{ScheduledRenewal, Target};

/// Drives validation for a single identifier. The returned challenge is
/// terminal: its status is either valid or invalid, never pending.
///
/// Anything that goes wrong on this side of the wire is caught here, logged
/// and classified as invalid; the renewal driver only looks at the status.
pub fn authorize_identifier(
    context: &RenewalContext<'_>,
    renewal: &ScheduledRenewal,
    sub_target: &Target,
    authorization: &Authorization,
) -> Challenge {
    match try_authorize(context, renewal, sub_target, authorization) {
        Ok(challenge) => challenge,
        Err(err) => {
            error!(
                "[authorization] {} failed: {err:#}",
                authorization.identifier
            );
            Challenge::local_failure(err.to_string())
        }
    }
}

fn try_authorize(
    context: &RenewalContext<'_>,
    renewal: &ScheduledRenewal,
    sub_target: &Target,
    authorization: &Authorization,
) -> Result<Challenge> {
    let identifier = &authorization.identifier;
    let client = &context.services.client;

    // A still-valid authorization needs no work, except in test mode where
    // the full path is always exercised.
    if authorization.status == AuthorizationStatus::Valid && !renewal.test_mode {
        info!("[authorization] {identifier} still valid, skipping validation");
        return Ok(Challenge::cached_valid(
            context.validation_factory.challenge_type(),
        ));
    }

    let mut scope = match IdentifierContext::build(context, renewal, sub_target, identifier) {
        Ok(scope) => scope,
        Err(err) => {
            error!("[authorization] {identifier}: {err}");
            return Ok(Challenge::local_failure(err.to_string()));
        }
    };

    let wanted = context.validation_factory.challenge_type();
    let challenge = match authorization
        .challenges
        .iter()
        .find(|challenge| challenge.kind == wanted)
    {
        Some(challenge) => challenge.clone(),
        None => {
            error!("[authorization] expected challenge type {wanted} not available for {identifier}");
            return Ok(Challenge::local_failure(format!(
                "expected challenge type {wanted} not available"
            )));
        }
    };

    if challenge.status == ChallengeStatus::Valid {
        info!("[authorization] {wanted} challenge for {identifier} already valid");
        return Ok(challenge);
    }

    let details = client
        .get_challenge_details(authorization, &challenge)
        .context("failed to resolve challenge details")?;
    if let Err(err) = scope.prepare_challenge(&details) {
        error!("[authorization] failed to prepare {wanted} challenge for {identifier}: {err:#}");
        return Ok(Challenge::local_failure(err.to_string()));
    }

    let mut answered = client
        .submit_challenge_answer(&challenge)
        .context("failed to submit challenge answer")?;

    // The CA verifies asynchronously; poll a bounded number of times. One
    // more pending observation once the cap is reached counts as a timeout.
    let interval = context.services.settings.poll_interval;
    let max_tries = context.services.settings.poll_max_tries;
    let mut tries = 0;
    while matches!(
        answered.status,
        ChallengeStatus::Pending | ChallengeStatus::Processing
    ) {
        if tries >= max_tries {
            warn!("[authorization] {identifier} timed out after {max_tries} poll(s)");
            return Ok(Challenge::local_failure("authorization timed out"));
        }
        thread::sleep(interval);
        answered = client
            .decode_challenge(&challenge.url)
            .context("failed to poll challenge status")?;
        tries += 1;
        debug!(
            "[authorization] {identifier} poll {tries}/{max_tries}: {:?}",
            answered.status
        );
    }

    match answered.status {
        ChallengeStatus::Valid => {
            info!("[authorization] {identifier} validated");
            Ok(answered)
        }
        status => {
            error!("[authorization] {identifier} finished with status {status:?}");
            Ok(answered)
        }
    }
}
