use std::fs;
use std::io::Write as _;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use log::{debug, info, warn};
use sha2::{Digest, Sha256};

use crate::acme::{AcmeClient, Order};
use crate::plugins::PluginRegistry;
use crate::settings::Settings;
use crate::storage::RenewalStore;
use crate::types::{CertificateInfo, Target};

/// Read-mostly container handed by reference through the engine. Holds the
/// selected implementations of every external contract plus the plugin
/// registry and renewal registry.
pub struct Services {
    pub settings: Settings,
    pub registry: PluginRegistry,
    pub renewals: RenewalStore,
    pub client: AcmeClient,
    pub certificates: Box<dyn CertificateService>,
    pub task_scheduler: Box<dyn TaskScheduler>,
    pub input: Box<dyn InputService>,
}

/// Interactive input contract. Menu navigation lives outside the engine;
/// these three calls are everything the core asks of a user.
pub trait InputService: Send + Sync {
    fn prompt_yes_no(&self, question: &str) -> bool;
    /// Free-form entry; `None` means the user aborted.
    fn request_string(&self, prompt: &str) -> Option<String>;
    /// Index into `choices`; `None` means the user aborted.
    fn choose_from_list(&self, prompt: &str, choices: &[String]) -> Option<usize>;
}

/// Unattended stand-in: answers yes to confirmations and declines anything
/// that would require typing.
pub struct AutoInput;

impl InputService for AutoInput {
    fn prompt_yes_no(&self, _question: &str) -> bool {
        true
    }

    fn request_string(&self, _prompt: &str) -> Option<String> {
        None
    }

    fn choose_from_list(&self, _prompt: &str, _choices: &[String]) -> Option<usize> {
        None
    }
}

/// Line-oriented stdin implementation for interactive runs.
pub struct StdinInput;

impl StdinInput {
    fn read_line(&self) -> Option<String> {
        let mut line = String::new();
        std::io::stdin().read_line(&mut line).ok()?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl InputService for StdinInput {
    fn prompt_yes_no(&self, question: &str) -> bool {
        print!("{question} [y/n]: ");
        let _ = std::io::stdout().flush();
        matches!(self.read_line().as_deref(), Some("y") | Some("yes") | Some("Y"))
    }

    fn request_string(&self, prompt: &str) -> Option<String> {
        print!("{prompt}: ");
        let _ = std::io::stdout().flush();
        self.read_line()
    }

    fn choose_from_list(&self, prompt: &str, choices: &[String]) -> Option<usize> {
        println!("{prompt}");
        for (index, choice) in choices.iter().enumerate() {
            println!("  {}: {}", index + 1, choice);
        }
        print!("choice (empty to abort): ");
        let _ = std::io::stdout().flush();
        let picked: usize = self.read_line()?.parse().ok()?;
        if picked >= 1 && picked <= choices.len() {
            Some(picked - 1)
        } else {
            None
        }
    }
}

/// Turns a finalized order into certificate bytes. CSR construction, key
/// handling and X.509 decoding all live behind this contract; the engine
/// only sees the thumbprint and the bytes.
pub trait CertificateService: Send + Sync {
    fn request_certificate(&self, binding: &Target, order: &Order)
        -> Result<Option<CertificateInfo>>;
}

/// Decorator that caches issued bytes on disk, keyed by the hash of the
/// sorted identifier set, so a reissue inside the cache window reuses the
/// previous certificate instead of hitting the CA again.
pub struct CachingCertificateService {
    inner: Box<dyn CertificateService>,
    cache_dir: PathBuf,
    cache_window: Duration,
}

impl CachingCertificateService {
    pub fn new(inner: Box<dyn CertificateService>, settings: &Settings) -> Self {
        Self {
            inner,
            cache_dir: settings.config_dir.join("certificate-cache"),
            cache_window: Duration::from_secs(
                settings.certificate_cache_days.max(0) as u64 * 24 * 3600,
            ),
        }
    }

    fn cache_key(binding: &Target) -> String {
        let mut hosts = binding.get_hosts(false);
        hosts.sort();
        let mut hasher = Sha256::new();
        for host in &hosts {
            hasher.update(host.as_bytes());
            hasher.update(b"\n");
        }
        hex::encode(hasher.finalize())
    }

    fn cached(&self, key: &str) -> Option<CertificateInfo> {
        let path = self.cache_dir.join(format!("{key}.json"));
        let modified = fs::metadata(&path).ok()?.modified().ok()?;
        let age = SystemTime::now().duration_since(modified).ok()?;
        if age > self.cache_window {
            return None;
        }
        let raw = fs::read_to_string(&path).ok()?;
        serde_json::from_str(&raw).ok()
    }

    fn remember(&self, key: &str, certificate: &CertificateInfo) -> Result<()> {
        fs::create_dir_all(&self.cache_dir)
            .with_context(|| format!("failed to create {}", self.cache_dir.display()))?;
        let path = self.cache_dir.join(format!("{key}.json"));
        let raw = serde_json::to_string(certificate)
            .context("failed to serialize certificate for cache")?;
        fs::write(&path, raw).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

impl CertificateService for CachingCertificateService {
    fn request_certificate(
        &self,
        binding: &Target,
        order: &Order,
    ) -> Result<Option<CertificateInfo>> {
        let key = Self::cache_key(binding);
        if let Some(cached) = self.cached(&key) {
            info!(
                "[certificates] reusing cached certificate {} for {}",
                cached.thumbprint, binding.primary_host
            );
            return Ok(Some(cached));
        }

        let issued = self.inner.request_certificate(binding, order)?;
        if let Some(certificate) = &issued {
            if let Err(err) = self.remember(&key, certificate) {
                warn!("[certificates] failed to cache issued certificate: {err:#}");
            } else {
                debug!("[certificates] cached certificate under key {key}");
            }
        }
        Ok(issued)
    }
}

/// OS-level scheduled task creation, behind a contract. Called once after
/// the first successful renewal unless suppressed.
pub trait TaskScheduler: Send + Sync {
    fn ensure_task_scheduler(&self) -> Result<()>;
}

/// Default implementation for platforms where the operator wires cron or a
/// service manager manually: log the invocation the task should run.
pub struct ManualTaskScheduler;

impl TaskScheduler for ManualTaskScheduler {
    fn ensure_task_scheduler(&self) -> Result<()> {
        info!(
            "[scheduler] no task scheduler integration on this platform; \
             schedule `certkeeper --renew` to run daily"
        );
        Ok(())
    }
}
