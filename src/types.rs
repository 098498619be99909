use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How a run was started. Interactive runs may ask the input service for
/// choices; unattended runs resolve everything from options and fail fast.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunLevel {
    Unattended,
    Interactive,
}

/// The certificate subject description: a primary host, the ordered
/// alternative names, and the plugin coordinates that were used to build it.
///
/// A target is frozen once handed to the renewal driver; the owning target
/// plugin may hand back a refreshed copy on each renewal when host
/// enumeration changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Target {
    pub primary_host: String,
    pub alternative_names: Vec<String>,
    /// Name of the target plugin that owns this binding.
    pub target_plugin: String,
    /// Validation plugin coordinate, qualified by challenge type
    /// (e.g. `http-01.filesystem`).
    pub validation_plugin: String,
    pub ssl_port: Option<u16>,
    pub ssl_ip_address: Option<String>,
    pub validation_port: Option<u16>,
    /// Web root used by file-drop validation, when applicable.
    pub validation_path: Option<PathBuf>,
}

impl Target {
    pub fn new(primary_host: String, alternative_names: Vec<String>) -> Self {
        Self {
            primary_host,
            alternative_names,
            target_plugin: String::new(),
            validation_plugin: String::new(),
            ssl_port: None,
            ssl_ip_address: None,
            validation_port: None,
            validation_path: None,
        }
    }

    /// Hosts covered by this target. With `primary_only` the list collapses
    /// to the primary host; otherwise the primary host is followed by the
    /// alternative names, deduplicated while keeping order.
    pub fn get_hosts(&self, primary_only: bool) -> Vec<String> {
        if primary_only {
            return vec![self.primary_host.clone()];
        }
        let mut hosts = vec![self.primary_host.clone()];
        for name in &self.alternative_names {
            if !hosts.contains(name) {
                hosts.push(name.clone());
            }
        }
        hosts
    }

    /// Challenge type part of the validation plugin coordinate.
    pub fn challenge_type(&self) -> &str {
        self.validation_plugin
            .split_once('.')
            .map(|(kind, _)| kind)
            .unwrap_or(&self.validation_plugin)
    }

    /// Targets match when their primary host and plugin coordinates agree;
    /// this is the registry identity.
    pub fn matches(&self, other: &Target) -> bool {
        self.primary_host == other.primary_host
            && self.target_plugin == other.target_plugin
            && self.validation_plugin == other.validation_plugin
    }
}

/// The persistent record pairing a target with its run history, store and
/// installation selection, and next due date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledRenewal {
    pub binding: Target,
    pub last_run: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    /// True until the first successful run is persisted.
    pub is_new: bool,
    /// True when an existing record was replaced during construction.
    pub updated: bool,
    pub test_mode: bool,
    pub script: Option<PathBuf>,
    pub script_parameters: Option<String>,
    pub central_ssl_store: Option<PathBuf>,
    pub certificate_store: Option<String>,
    pub keep_existing: Option<bool>,
    pub installation_plugin_names: Vec<String>,
    pub warmup: bool,
    /// Thumbprint of the certificate the record currently points at; the
    /// next run treats it as the old certificate.
    pub certificate_thumbprint: Option<String>,
}

impl ScheduledRenewal {
    pub fn new(binding: Target) -> Self {
        Self {
            binding,
            last_run: None,
            due_date: None,
            is_new: true,
            updated: false,
            test_mode: false,
            script: None,
            script_parameters: None,
            central_ssl_store: None,
            certificate_store: None,
            keep_existing: None,
            installation_plugin_names: Vec::new(),
            warmup: false,
            certificate_thumbprint: None,
        }
    }
}

impl std::fmt::Display for ScheduledRenewal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.binding.primary_host)?;
        if !self.binding.alternative_names.is_empty() {
            write!(f, " (+{} names)", self.binding.alternative_names.len())?;
        }
        if let Some(due) = self.due_date {
            write!(f, " due {}", due.format("%Y-%m-%d"))?;
        }
        Ok(())
    }
}

/// A newly issued or previously stored certificate. The store plugin owns
/// the record; the renewal driver holds a borrowed view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CertificateInfo {
    /// Stable fingerprint of the issued certificate, the store key.
    pub thumbprint: String,
    /// Certificate bytes as handed over by the certificate service.
    pub pem: String,
    pub hosts: Vec<String>,
    /// Reference to the store currently holding this certificate.
    pub store: Option<String>,
}

/// Outcome of one renewal attempt, persisted alongside the registry record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenewResult {
    pub success: bool,
    pub error_message: Option<String>,
    pub thumbprint: Option<String>,
    pub date: DateTime<Utc>,
}

impl RenewResult {
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error_message: Some(message.into()),
            thumbprint: None,
            date: Utc::now(),
        }
    }

    pub fn success(certificate: &CertificateInfo) -> Self {
        Self {
            success: true,
            error_message: None,
            thumbprint: Some(certificate.thumbprint.clone()),
            date: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn target(primary: &str, alts: &[&str]) -> Target {
        Target::new(
            primary.to_string(),
            alts.iter().map(|s| s.to_string()).collect(),
        )
    }

    #[test]
    fn get_hosts_dedupes_and_keeps_primary_first() {
        let t = target("example.com", &["www.example.com", "example.com"]);
        assert_eq!(t.get_hosts(false), vec!["example.com", "www.example.com"]);
        assert_eq!(t.get_hosts(true), vec!["example.com"]);
    }

    #[test]
    fn challenge_type_comes_from_qualified_coordinate() {
        let mut t = target("example.com", &[]);
        t.validation_plugin = "http-01.filesystem".to_string();
        assert_eq!(t.challenge_type(), "http-01");
    }

    #[test]
    fn identity_ignores_alternative_names() {
        let mut a = target("example.com", &["www.example.com"]);
        a.target_plugin = "manual".into();
        a.validation_plugin = "http-01.filesystem".into();
        let mut b = target("example.com", &[]);
        b.target_plugin = "manual".into();
        b.validation_plugin = "http-01.filesystem".into();
        assert!(a.matches(&b));
        b.validation_plugin = "dns-01.manual".into();
        assert!(!a.matches(&b));
    }
}
