use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result, anyhow};
use log::{debug, info, warn};
use serde_json::Value;

use super::{ValidationPlugin, ValidationPluginFactory};
use crate::acme::ChallengeDetails;
use crate::options::Options;
use crate::services::InputService;
use crate::types::{RunLevel, ScheduledRenewal, Target};

const PROPAGATION_TIMEOUT: Duration = Duration::from_secs(30);
const INITIAL_WAIT: Duration = Duration::from_secs(1);
const MAX_WAIT: Duration = Duration::from_secs(8);

/// dns-01 validation for operator-managed zones: the proof record is placed
/// out of band and this plugin confirms it is visible from public DNS
/// before the CA is asked to look.
pub struct ManualDnsValidationFactory;

impl ValidationPluginFactory for ManualDnsValidationFactory {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn description(&self) -> &'static str {
        "Operator-placed TXT record, checked over DNS-over-HTTPS before submission"
    }

    fn challenge_type(&self) -> &'static str {
        "dns-01"
    }

    fn can_validate(&self, _target: &Target) -> bool {
        true
    }

    fn default(&self, _target: &mut Target, _options: &Options) -> Result<()> {
        Ok(())
    }

    fn acquire(
        &self,
        target: &mut Target,
        options: &Options,
        _input: &dyn InputService,
        _run_level: RunLevel,
    ) -> Result<()> {
        self.default(target, options)
    }

    fn instance(
        &self,
        _renewal: &ScheduledRenewal,
        _target: &Target,
        identifier: &str,
    ) -> Result<Box<dyn ValidationPlugin>> {
        Ok(Box::new(ManualDnsValidation {
            identifier: identifier.to_string(),
            placed: None,
        }))
    }
}

struct ManualDnsValidation {
    identifier: String,
    placed: Option<String>,
}

impl ManualDnsValidation {
    /// Waits until the proof record resolves with the expected value. A
    /// record that resolves with other values fails right away; everything
    /// else is retried with a doubling wait until the deadline passes.
    fn await_propagation(&self, resolver: &DohResolver, record: &str, proof: &str) -> Result<()> {
        let deadline = Instant::now() + PROPAGATION_TIMEOUT;
        let mut wait = INITIAL_WAIT;

        loop {
            match resolver.lookup_txt(record) {
                Ok(TxtLookup::Records(values)) if values.iter().any(|value| value == proof) => {
                    debug!("[dns-01] {record} resolves with the expected proof");
                    return Ok(());
                }
                Ok(TxtLookup::Records(values)) if !values.is_empty() => {
                    return Err(anyhow!(
                        "TXT record {record} resolves with unexpected values {values:?}"
                    ));
                }
                Ok(TxtLookup::Records(_)) => {
                    debug!("[dns-01] {record} has no TXT data yet");
                }
                Ok(TxtLookup::NameMissing) => {
                    debug!("[dns-01] {record} does not resolve yet");
                }
                // Resolver hiccups are treated like a record that has not
                // shown up yet; the deadline bounds them too.
                Err(err) => warn!("[dns-01] lookup of {record} failed: {err:#}"),
            }

            if Instant::now() + wait > deadline {
                return Err(anyhow!(
                    "TXT record {record} not visible after {}s",
                    PROPAGATION_TIMEOUT.as_secs()
                ));
            }
            thread::sleep(wait);
            wait = (wait * 2).min(MAX_WAIT);
        }
    }
}

impl ValidationPlugin for ManualDnsValidation {
    fn prepare_challenge(&mut self, details: &ChallengeDetails) -> Result<()> {
        let proof = details
            .dns_proof
            .as_deref()
            .ok_or_else(|| anyhow!("dns-01 challenge details are missing the record value"))?;
        let record = record_name(&self.identifier);

        info!("[dns-01] create a TXT record {record} with value {proof}");
        self.placed = Some(record.clone());

        self.await_propagation(&DohResolver::new(), &record, proof)
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(record) = self.placed.take() {
            info!("[dns-01] the TXT record {record} can be removed now");
        }
        Ok(())
    }
}

/// Name of the proof record for one identifier. Wildcard labels are proven
/// at the base name.
pub fn record_name(identifier: &str) -> String {
    let base = identifier.trim_start_matches("*.").trim_end_matches('.');
    format!("_acme-challenge.{base}")
}

/// What public DNS currently says about a TXT name: either the set of
/// values it resolves to (possibly empty while propagation is underway), or
/// that the name does not exist at all.
enum TxtLookup {
    Records(Vec<String>),
    NameMissing,
}

/// Minimal DNS-over-HTTPS client for TXT lookups against dns.google.
struct DohResolver {
    agent: ureq::Agent,
}

impl DohResolver {
    fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .build(),
        }
    }

    fn lookup_txt(&self, name: &str) -> Result<TxtLookup> {
        let url = format!("https://dns.google/resolve?name={name}&type=TXT&random_padding=x");
        let body = self
            .agent
            .get(&url)
            .call()
            .with_context(|| format!("dns query failed for {name}"))?
            .into_string()?;
        let reply: Value = serde_json::from_str(&body)
            .with_context(|| format!("failed to parse dns reply for {name}"))?;
        parse_txt_reply(&reply)
    }
}

fn parse_txt_reply(reply: &Value) -> Result<TxtLookup> {
    let rcode = reply
        .get("Status")
        .and_then(Value::as_u64)
        .ok_or_else(|| anyhow!("dns reply carries no status"))?;
    match rcode {
        // NOERROR; the answer section may still be absent while the record
        // propagates.
        0 => {
            let values = reply
                .get("Answer")
                .and_then(Value::as_array)
                .map(|answers| {
                    answers
                        .iter()
                        .filter_map(|answer| answer.get("data").and_then(Value::as_str))
                        .map(unquote_txt)
                        .collect()
                })
                .unwrap_or_default();
            Ok(TxtLookup::Records(values))
        }
        // NXDOMAIN
        3 => Ok(TxtLookup::NameMissing),
        other => Err(anyhow!("dns reply has unexpected status {other}")),
    }
}

/// TXT data arrives wrapped in quotes; strip them only when they enclose
/// the whole value.
fn unquote_txt(data: &str) -> String {
    let trimmed = data.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|rest| rest.strip_suffix('"'))
        .unwrap_or(trimmed)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_name_strips_wildcard_label() {
        assert_eq!(record_name("*.example.com"), "_acme-challenge.example.com");
        assert_eq!(record_name("example.com."), "_acme-challenge.example.com");
    }

    #[test]
    fn unquotes_txt_data() {
        assert_eq!(unquote_txt("\"abc123\""), "abc123");
        assert_eq!(unquote_txt(" abc123 "), "abc123");
        assert_eq!(unquote_txt("\"unterminated"), "\"unterminated");
    }

    #[test]
    fn reply_with_answers_yields_their_values() {
        let reply = json!({
            "Status": 0,
            "Answer": [
                { "data": "\"proof-one\"" },
                { "data": "\"proof-two\"" },
            ],
        });
        match parse_txt_reply(&reply).unwrap() {
            TxtLookup::Records(values) => assert_eq!(values, vec!["proof-one", "proof-two"]),
            TxtLookup::NameMissing => panic!("expected records"),
        }
    }

    #[test]
    fn reply_without_answer_section_is_empty_not_missing() {
        let reply = json!({ "Status": 0 });
        match parse_txt_reply(&reply).unwrap() {
            TxtLookup::Records(values) => assert!(values.is_empty()),
            TxtLookup::NameMissing => panic!("NOERROR without answers is still resolvable"),
        }
    }

    #[test]
    fn nxdomain_reply_is_name_missing() {
        let reply = json!({ "Status": 3 });
        assert!(matches!(parse_txt_reply(&reply).unwrap(), TxtLookup::NameMissing));
    }

    #[test]
    fn unexpected_rcode_is_an_error() {
        let reply = json!({ "Status": 2 });
        assert!(parse_txt_reply(&reply).is_err());
        assert!(parse_txt_reply(&json!({})).is_err());
    }

    #[test]
    fn factory_accepts_wildcard_targets() {
        let target = Target::new("*.example.com".into(), vec![]);
        assert!(ManualDnsValidationFactory.can_validate(&target));
    }
}
