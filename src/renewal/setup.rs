use anyhow::{Context, Result, anyhow};
use log::{info, warn};

use crate::errors::RenewalError;
use crate::options::Options;
use crate::plugins::PluginChoice;
use crate::services::Services;
use crate::types::{RunLevel, ScheduledRenewal};

/// Builds the `ScheduledRenewal` record for a new certificate request.
/// Interactive and unattended construction both funnel through here; the
/// result is what the renewal driver consumes and the registry persists.
///
/// Returns `None` when the user backed out of a choice.
pub fn create_renewal(
    services: &Services,
    options: &Options,
    run_level: RunLevel,
) -> Result<Option<ScheduledRenewal>> {
    let input = services.input.as_ref();

    let target_plugin = match services.registry.target_plugin(options, input, run_level) {
        PluginChoice::Selected(plugin) => plugin,
        PluginChoice::Cancelled => return Ok(None),
        PluginChoice::Unavailable(reason) => {
            warn!("[setup] {reason}");
            return Err(anyhow!(RenewalError::PluginUnavailable("target")));
        }
    };

    let mut target = match target_plugin
        .acquire(options, input, run_level)
        .context("target acquisition failed")?
    {
        Some(target) => target,
        None => return Ok(None),
    };
    target.target_plugin = target_plugin.name().to_string();

    let validation_factory =
        match services
            .registry
            .validation_factory_for(&target, options, input, run_level)
        {
            PluginChoice::Selected(factory) => factory,
            PluginChoice::Cancelled => return Ok(None),
            PluginChoice::Unavailable(reason) => {
                warn!("[setup] {reason}");
                return Err(anyhow!(RenewalError::PluginUnavailable("validation")));
            }
        };
    validation_factory
        .acquire(&mut target, options, input, run_level)
        .map_err(|err| {
            warn!("[setup] validation configuration failed: {err:#}");
            anyhow!(RenewalError::InvalidInput("validation"))
        })?;
    target.validation_plugin = validation_factory.coordinate();

    let mut renewal = ScheduledRenewal::new(target);
    renewal.test_mode = options.test;
    renewal.script = options.script.clone();
    renewal.script_parameters = options.script_parameters.clone();
    renewal.central_ssl_store = options.central_ssl_store.clone();
    renewal.certificate_store = options.certificate_store.clone();
    renewal.keep_existing = options.keep_existing;
    renewal.warmup = options.warmup;

    let installation_factories =
        match services
            .registry
            .installation_factories(&options.installation, input, run_level)
        {
            PluginChoice::Selected(factories) => factories,
            PluginChoice::Cancelled => return Ok(None),
            PluginChoice::Unavailable(reason) => {
                warn!("[setup] {reason}");
                return Err(anyhow!(RenewalError::PluginUnavailable("installation")));
            }
        };
    for factory in &installation_factories {
        factory
            .acquire(&mut renewal, options, input, run_level)
            .map_err(|err| {
                warn!("[setup] installation configuration failed: {err:#}");
                anyhow!(RenewalError::InvalidInput("installation"))
            })?;
    }
    renewal.installation_plugin_names = installation_factories
        .iter()
        .map(|factory| factory.name().to_string())
        .collect();

    // A record for this target identity may already exist; the new record
    // replaces it in place but keeps its run history.
    if let Some(existing) = services.renewals.find(&renewal.binding)? {
        info!(
            "[setup] replacing existing renewal for {}",
            renewal.binding.primary_host
        );
        renewal.updated = true;
        renewal.is_new = existing.is_new;
        renewal.last_run = existing.last_run;
        renewal.due_date = existing.due_date;
        renewal.certificate_thumbprint = existing.certificate_thumbprint;
    }

    Ok(Some(renewal))
}

/// Resolves the target the same way `create_renewal` does and removes the
/// matching registry record. Does not interrupt anything in flight; there
/// is nothing in flight in a cancel invocation.
pub fn cancel_renewal(
    services: &Services,
    options: &Options,
    run_level: RunLevel,
) -> Result<bool> {
    let renewal = match create_renewal(services, options, run_level)? {
        Some(renewal) => renewal,
        None => return Ok(false),
    };
    match services.renewals.find(&renewal.binding)? {
        Some(existing) => {
            services.renewals.cancel(&existing)?;
            Ok(true)
        }
        None => {
            warn!(
                "[setup] no scheduled renewal found for {}",
                renewal.binding.primary_host
            );
            Ok(false)
        }
    }
}
