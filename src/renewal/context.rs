use log::warn;

use crate::errors::RenewalError;
use crate::plugins::{
    InstallationPluginFactory, PluginChoice, StorePlugin, TargetPlugin, ValidationPlugin,
    ValidationPluginFactory,
};
use crate::services::Services;
use crate::types::{RunLevel, ScheduledRenewal, Target};

/// Per-renewal scope: the plugins selected for one `ScheduledRenewal`,
/// resolved once and carried through the whole attempt.
pub struct RenewalContext<'a> {
    pub services: &'a Services,
    pub run_level: RunLevel,
    pub target_plugin: &'a dyn TargetPlugin,
    pub validation_factory: &'a dyn ValidationPluginFactory,
    pub store: Box<dyn StorePlugin>,
    pub installation_factories: Vec<&'a dyn InstallationPluginFactory>,
}

impl<'a> RenewalContext<'a> {
    /// Binds the plugins named by the renewal record. Any coordinate that no
    /// longer resolves fails the renewal before network traffic happens.
    pub fn build(
        services: &'a Services,
        renewal: &ScheduledRenewal,
        run_level: RunLevel,
    ) -> Result<Self, RenewalError> {
        let target_plugin = services
            .registry
            .target_plugin_by_name(&renewal.binding.target_plugin)
            .ok_or(RenewalError::PluginUnavailable("target"))?;

        let validation_factory = services
            .registry
            .validation_factory(&renewal.binding.validation_plugin)
            .ok_or(RenewalError::PluginUnavailable("validation"))?;

        let store = match services.registry.store_factory(renewal) {
            PluginChoice::Selected(factory) => factory
                .create(renewal, &services.settings)
                .map_err(|_| RenewalError::PluginUnavailable("store"))?,
            PluginChoice::Cancelled | PluginChoice::Unavailable(_) => {
                return Err(RenewalError::PluginUnavailable("store"));
            }
        };

        let installation_factories = match services.registry.installation_factories(
            &renewal.installation_plugin_names,
            services.input.as_ref(),
            run_level,
        ) {
            PluginChoice::Selected(factories) => factories,
            PluginChoice::Cancelled | PluginChoice::Unavailable(_) => {
                return Err(RenewalError::PluginUnavailable("installation"));
            }
        };

        Ok(Self {
            services,
            run_level,
            target_plugin,
            validation_factory,
            store,
            installation_factories,
        })
    }
}

/// Per-identifier scope: the validation plugin specialized for one DNS name.
/// Dropping the scope releases whatever the plugin staged, on every exit
/// path including timeouts and early returns.
pub struct IdentifierContext<'a, 'b> {
    pub parent: &'b RenewalContext<'a>,
    pub identifier: String,
    validator: Option<Box<dyn ValidationPlugin>>,
}

impl<'a, 'b> IdentifierContext<'a, 'b> {
    pub fn build(
        parent: &'b RenewalContext<'a>,
        renewal: &ScheduledRenewal,
        sub_target: &Target,
        identifier: &str,
    ) -> Result<Self, RenewalError> {
        let validator = parent
            .validation_factory
            .instance(renewal, sub_target, identifier)
            .map_err(|err| {
                warn!("[authorization] could not build validation plugin for {identifier}: {err:#}");
                RenewalError::PluginUnavailable("validation")
            })?;
        Ok(Self {
            parent,
            identifier: identifier.to_string(),
            validator: Some(validator),
        })
    }

    /// Stages the proof through the scoped validation plugin.
    pub fn prepare_challenge(&mut self, details: &crate::acme::ChallengeDetails) -> anyhow::Result<()> {
        match self.validator.as_mut() {
            Some(validator) => validator.prepare_challenge(details),
            None => Err(anyhow::anyhow!("validation plugin already released")),
        }
    }
}

impl Drop for IdentifierContext<'_, '_> {
    fn drop(&mut self) {
        if let Some(mut validator) = self.validator.take() {
            if let Err(err) = validator.cleanup() {
                warn!(
                    "[authorization] failed to release challenge artifacts for {}: {err:#}",
                    self.identifier
                );
            }
        }
    }
}
