use anyhow::Result;
use log::warn;

use crate::domain::{normalize_host, normalize_host_list};
use crate::options::Options;
use crate::services::InputService;
use crate::types::{RunLevel, Target};

/// Upper bound on identifiers per ACME order; larger targets are split into
/// sub-targets that each stay under this limit.
pub const MAX_IDENTIFIERS_PER_ORDER: usize = 100;

/// Produces and maintains certificate targets. `refresh` re-enumerates the
/// hosts on every renewal because the underlying source may have changed.
pub trait TargetPlugin: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// Unattended construction from options; `None` when the options don't
    /// describe a target for this plugin.
    fn default(&self, options: &Options) -> Result<Option<Target>>;
    /// Interactive construction; `None` models user cancellation.
    fn acquire(
        &self,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> Result<Option<Target>>;
    /// Re-enumerates hosts for an existing binding; `None` when the target
    /// no longer exists.
    fn refresh(&self, binding: &Target) -> Result<Option<Target>>;
    /// Splits a binding into sub-targets, each carrying a subset of hosts.
    /// The union of hosts across sub-targets equals the identifier set.
    fn split(&self, binding: &Target) -> Result<Vec<Target>>;
}

/// Target plugin fed by an explicit host list (`--host` or typed in).
pub struct ManualTargetPlugin;

impl ManualTargetPlugin {
    fn target_from_hosts(mut hosts: Vec<String>, options: &Options) -> Target {
        let primary = hosts.remove(0);
        let mut target = Target::new(primary, hosts);
        target.ssl_port = options.ssl_port;
        target.ssl_ip_address = options.ssl_ip_address.clone();
        target.validation_port = options.validation_port;
        target.validation_path = options.validation_path.clone();
        target
    }
}

impl TargetPlugin for ManualTargetPlugin {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn description(&self) -> &'static str {
        "Manually entered host names"
    }

    fn default(&self, options: &Options) -> Result<Option<Target>> {
        let raw = match options.host.as_deref() {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let hosts = normalize_host_list(raw)?;
        Ok(Some(Self::target_from_hosts(hosts, options)))
    }

    fn acquire(
        &self,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> Result<Option<Target>> {
        if run_level == RunLevel::Unattended || options.host.is_some() {
            return self.default(options);
        }
        let raw = match input.request_string("Host names, comma separated (first is primary)") {
            Some(raw) => raw,
            None => return Ok(None),
        };
        let hosts = normalize_host_list(&raw)?;
        Ok(Some(Self::target_from_hosts(hosts, options)))
    }

    fn refresh(&self, binding: &Target) -> Result<Option<Target>> {
        // Manual hosts have no external source; refreshing re-normalizes the
        // stored names and drops ones that stopped being valid DNS names.
        let mut refreshed = binding.clone();
        refreshed.primary_host = match normalize_host(&binding.primary_host) {
            Ok(host) => host,
            Err(err) => {
                warn!("[target] primary host {} no longer valid: {err}", binding.primary_host);
                return Ok(None);
            }
        };
        refreshed.alternative_names = binding
            .alternative_names
            .iter()
            .filter_map(|name| match normalize_host(name) {
                Ok(host) => Some(host),
                Err(err) => {
                    warn!("[target] dropping alternative name {name}: {err}");
                    None
                }
            })
            .collect();
        Ok(Some(refreshed))
    }

    fn split(&self, binding: &Target) -> Result<Vec<Target>> {
        let hosts = binding.get_hosts(false);
        if hosts.len() <= MAX_IDENTIFIERS_PER_ORDER {
            return Ok(vec![binding.clone()]);
        }
        let mut parts = Vec::new();
        for chunk in hosts.chunks(MAX_IDENTIFIERS_PER_ORDER) {
            let mut part = binding.clone();
            part.primary_host = chunk[0].clone();
            part.alternative_names = chunk[1..].to_vec();
            parts.push(part);
        }
        Ok(parts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::AutoInput;

    #[test]
    fn default_builds_target_from_host_option() -> Result<()> {
        let options = Options {
            host: Some("Example.com, www.example.com".into()),
            ssl_port: Some(443),
            ..Default::default()
        };
        let target = ManualTargetPlugin.default(&options)?.expect("target");
        assert_eq!(target.primary_host, "example.com");
        assert_eq!(target.alternative_names, vec!["www.example.com"]);
        assert_eq!(target.ssl_port, Some(443));
        Ok(())
    }

    #[test]
    fn default_returns_none_without_hosts() -> Result<()> {
        assert!(ManualTargetPlugin.default(&Options::default())?.is_none());
        Ok(())
    }

    #[test]
    fn acquire_unattended_without_hosts_yields_none() -> Result<()> {
        let picked =
            ManualTargetPlugin.acquire(&Options::default(), &AutoInput, RunLevel::Unattended)?;
        assert!(picked.is_none());
        Ok(())
    }

    #[test]
    fn split_chunks_large_host_sets() -> Result<()> {
        let names: Vec<String> = (1..250).map(|i| format!("h{i}.example.com")).collect();
        let binding = Target::new("h0.example.com".into(), names);
        let parts = ManualTargetPlugin.split(&binding)?;
        assert_eq!(parts.len(), 3);
        let total: usize = parts.iter().map(|p| p.get_hosts(false).len()).sum();
        assert_eq!(total, 250);
        for part in &parts {
            assert!(part.get_hosts(false).len() <= MAX_IDENTIFIERS_PER_ORDER);
        }
        Ok(())
    }

    #[test]
    fn small_target_splits_into_itself() -> Result<()> {
        let binding = Target::new("example.com".into(), vec!["www.example.com".into()]);
        let parts = ManualTargetPlugin.split(&binding)?;
        assert_eq!(parts.len(), 1);
        assert_eq!(parts[0].get_hosts(false), binding.get_hosts(false));
        Ok(())
    }
}
