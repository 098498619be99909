use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result, anyhow};
use log::{debug, info};

use crate::options::Options;
use crate::services::InputService;
use crate::types::{CertificateInfo, RunLevel, ScheduledRenewal};

/// Builds installation steps for one renewal. The null factory is always
/// registered so a non-empty selection list is guaranteed on success.
pub trait InstallationPluginFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Null factories are carried in selection lists but skipped by the
    /// install phase.
    fn is_null(&self) -> bool {
        false
    }
    /// Unattended configuration of the renewal's installation parameters.
    fn default(&self, renewal: &mut ScheduledRenewal, options: &Options) -> Result<()>;
    /// Interactive configuration; failures surface as invalid-input errors.
    fn acquire(
        &self,
        renewal: &mut ScheduledRenewal,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> Result<()>;
    fn instance(&self, renewal: &ScheduledRenewal) -> Result<Box<dyn InstallationPlugin>>;
}

/// One installation step, fed the new certificate and whatever the renewal
/// record pointed at before.
pub trait InstallationPlugin: Send {
    fn install(&self, new: &CertificateInfo, old: Option<&CertificateInfo>) -> Result<()>;
}

/// The do-nothing installer, also the sentinel for "store only".
pub struct NullInstallerFactory;

impl InstallationPluginFactory for NullInstallerFactory {
    fn name(&self) -> &'static str {
        "none"
    }

    fn description(&self) -> &'static str {
        "Store the certificate without installing it anywhere"
    }

    fn is_null(&self) -> bool {
        true
    }

    fn default(&self, _renewal: &mut ScheduledRenewal, _options: &Options) -> Result<()> {
        Ok(())
    }

    fn acquire(
        &self,
        _renewal: &mut ScheduledRenewal,
        _options: &Options,
        _input: &dyn InputService,
        _run_level: RunLevel,
    ) -> Result<()> {
        Ok(())
    }

    fn instance(&self, _renewal: &ScheduledRenewal) -> Result<Box<dyn InstallationPlugin>> {
        Ok(Box::new(NullInstaller))
    }
}

struct NullInstaller;

impl InstallationPlugin for NullInstaller {
    fn install(&self, _new: &CertificateInfo, _old: Option<&CertificateInfo>) -> Result<()> {
        Ok(())
    }
}

/// Runs the renewal's post-install script with placeholder substitution.
pub struct ScriptInstallerFactory;

impl InstallationPluginFactory for ScriptInstallerFactory {
    fn name(&self) -> &'static str {
        "script"
    }

    fn description(&self) -> &'static str {
        "Run a script after the certificate is stored"
    }

    fn default(&self, renewal: &mut ScheduledRenewal, options: &Options) -> Result<()> {
        if renewal.script.is_none() {
            renewal.script = options.script.clone();
        }
        if renewal.script_parameters.is_none() {
            renewal.script_parameters = options.script_parameters.clone();
        }
        renewal
            .script
            .as_ref()
            .ok_or_else(|| anyhow!("script installation requires a script path (--script)"))?;
        Ok(())
    }

    fn acquire(
        &self,
        renewal: &mut ScheduledRenewal,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> Result<()> {
        if run_level == RunLevel::Interactive
            && renewal.script.is_none()
            && options.script.is_none()
        {
            renewal.script = input
                .request_string("Script to run after installation")
                .map(PathBuf::from);
        }
        self.default(renewal, options)
    }

    fn instance(&self, renewal: &ScheduledRenewal) -> Result<Box<dyn InstallationPlugin>> {
        let script = renewal
            .script
            .clone()
            .ok_or_else(|| anyhow!("script installation requires a script path"))?;
        Ok(Box::new(ScriptInstaller {
            script,
            parameters: renewal.script_parameters.clone(),
        }))
    }
}

struct ScriptInstaller {
    script: PathBuf,
    parameters: Option<String>,
}

impl ScriptInstaller {
    /// Expands `{thumbprint}`, `{old_thumbprint}`, `{host}` and `{store}`
    /// in the configured parameter string.
    fn arguments(&self, new: &CertificateInfo, old: Option<&CertificateInfo>) -> Vec<String> {
        let raw = match &self.parameters {
            Some(raw) => raw,
            None => return Vec::new(),
        };
        let expanded = raw
            .replace("{thumbprint}", &new.thumbprint)
            .replace(
                "{old_thumbprint}",
                old.map(|c| c.thumbprint.as_str()).unwrap_or(""),
            )
            .replace("{host}", new.hosts.first().map(String::as_str).unwrap_or(""))
            .replace("{store}", new.store.as_deref().unwrap_or(""));
        expanded.split_whitespace().map(str::to_string).collect()
    }
}

impl InstallationPlugin for ScriptInstaller {
    fn install(&self, new: &CertificateInfo, old: Option<&CertificateInfo>) -> Result<()> {
        let arguments = self.arguments(new, old);
        info!(
            "[install] running {} {}",
            self.script.display(),
            arguments.join(" ")
        );
        let output = Command::new(&self.script)
            .args(&arguments)
            .output()
            .with_context(|| format!("failed to start {}", self.script.display()))?;
        debug!(
            "[install] script output: {}",
            String::from_utf8_lossy(&output.stdout).trim()
        );
        if !output.status.success() {
            return Err(anyhow!(
                "script {} exited with {}: {}",
                self.script.display(),
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Target;

    #[test]
    fn script_factory_requires_path() {
        let mut renewal = ScheduledRenewal::new(Target::new("example.com".into(), vec![]));
        assert!(ScriptInstallerFactory
            .default(&mut renewal, &Options::default())
            .is_err());

        let options = Options {
            script: Some(PathBuf::from("/usr/local/bin/reload-web")),
            script_parameters: Some("{thumbprint} {host}".into()),
            ..Default::default()
        };
        ScriptInstallerFactory.default(&mut renewal, &options).unwrap();
        assert!(renewal.script.is_some());
        assert_eq!(renewal.script_parameters.as_deref(), Some("{thumbprint} {host}"));
    }

    #[test]
    fn placeholders_expand_into_arguments() {
        let installer = ScriptInstaller {
            script: PathBuf::from("/bin/true"),
            parameters: Some("{thumbprint} {old_thumbprint} {host} {store}".into()),
        };
        let new = CertificateInfo {
            thumbprint: "new1".into(),
            pem: String::new(),
            hosts: vec!["example.com".into()],
            store: Some("WebHosting".into()),
        };
        let old = CertificateInfo {
            thumbprint: "old1".into(),
            pem: String::new(),
            hosts: vec![],
            store: None,
        };
        assert_eq!(
            installer.arguments(&new, Some(&old)),
            vec!["new1", "old1", "example.com", "WebHosting"]
        );
        // Missing old certificate leaves its slot empty.
        assert_eq!(installer.arguments(&new, None), vec!["new1", "example.com", "WebHosting"]);
    }

    #[test]
    fn null_factory_is_null() {
        assert!(NullInstallerFactory.is_null());
        assert!(!ScriptInstallerFactory.is_null());
    }
}
