use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use log::{debug, warn};

use super::{ValidationPlugin, ValidationPluginFactory};
use crate::acme::ChallengeDetails;
use crate::domain::is_wildcard;
use crate::options::Options;
use crate::services::InputService;
use crate::types::{RunLevel, ScheduledRenewal, Target};

const WELL_KNOWN_PATH: &str = ".well-known/acme-challenge";

/// http-01 validation by dropping the token file into a served web root.
pub struct FileSystemValidationFactory;

impl ValidationPluginFactory for FileSystemValidationFactory {
    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn description(&self) -> &'static str {
        "Write the http-01 token into a web root served by an existing web server"
    }

    fn challenge_type(&self) -> &'static str {
        "http-01"
    }

    fn can_validate(&self, target: &Target) -> bool {
        // Wildcard identifiers can only be proven over dns-01.
        !target.get_hosts(false).iter().any(|host| is_wildcard(host))
    }

    fn default(&self, target: &mut Target, options: &Options) -> Result<()> {
        if target.validation_path.is_none() {
            target.validation_path = options.validation_path.clone();
        }
        if target.validation_port.is_none() {
            target.validation_port = options.validation_port;
        }
        target
            .validation_path
            .as_ref()
            .ok_or_else(|| anyhow!("filesystem validation requires a web root (--validation-path)"))?;
        Ok(())
    }

    fn acquire(
        &self,
        target: &mut Target,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> Result<()> {
        if run_level == RunLevel::Interactive
            && target.validation_path.is_none()
            && options.validation_path.is_none()
        {
            target.validation_path = input
                .request_string("Web root that serves /.well-known/acme-challenge")
                .map(PathBuf::from);
        }
        self.default(target, options)
    }

    fn instance(
        &self,
        renewal: &ScheduledRenewal,
        target: &Target,
        identifier: &str,
    ) -> Result<Box<dyn ValidationPlugin>> {
        let web_root = target
            .validation_path
            .clone()
            .ok_or_else(|| anyhow!("filesystem validation requires a web root"))?;
        Ok(Box::new(FileSystemValidation {
            web_root,
            identifier: identifier.to_string(),
            validation_port: target.validation_port,
            warmup: renewal.warmup,
            written: None,
        }))
    }
}

struct FileSystemValidation {
    web_root: PathBuf,
    identifier: String,
    validation_port: Option<u16>,
    warmup: bool,
    written: Option<PathBuf>,
}

impl FileSystemValidation {
    fn challenge_url(&self, token: &str) -> String {
        match self.validation_port {
            Some(port) => format!("http://{}:{}/{}/{}", self.identifier, port, WELL_KNOWN_PATH, token),
            None => format!("http://{}/{}/{}", self.identifier, WELL_KNOWN_PATH, token),
        }
    }

    /// Fetches the challenge URL through the front door before the CA does.
    /// A failed warmup is logged, not fatal: the CA resolves the name from
    /// the outside and may still reach a host this machine cannot.
    fn warmup_fetch(&self, token: &str, expected: &str) {
        let url = self.challenge_url(token);
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(10))
            .build();
        match agent.get(&url).call() {
            Ok(response) => match response.into_string() {
                Ok(body) if body.trim() == expected => {
                    debug!("[http-01] warmup fetch of {url} returned the expected token");
                }
                Ok(_) => warn!("[http-01] warmup fetch of {url} returned unexpected content"),
                Err(err) => warn!("[http-01] warmup fetch of {url} unreadable: {err}"),
            },
            Err(err) => warn!("[http-01] warmup fetch of {url} failed: {err}"),
        }
    }
}

impl ValidationPlugin for FileSystemValidation {
    fn prepare_challenge(&mut self, details: &ChallengeDetails) -> Result<()> {
        let dir = self.web_root.join(WELL_KNOWN_PATH);
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create {}", dir.display()))?;
        let path = dir.join(&details.token);
        fs::write(&path, &details.key_authorization)
            .with_context(|| format!("failed to write {}", path.display()))?;
        debug!(
            "[http-01] wrote token for {} to {}",
            self.identifier,
            path.display()
        );
        self.written = Some(path);

        if self.warmup {
            self.warmup_fetch(&details.token, &details.key_authorization);
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        if let Some(path) = self.written.take() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            debug!("[http-01] removed token file {}", path.display());
            // Leave the .well-known directory in place; the web server may
            // serve other content from it.
        }
        Ok(())
    }
}
