//! Plugin registry: target, validation, store and installation families.
//!
//! Selection distinguishes "nothing matched" from "the user backed out";
//! the renewal driver matches on the returned tag instead of inspecting
//! sentinel objects.

pub mod install;
pub mod store;
pub mod target;
pub mod validation;

pub use install::{InstallationPlugin, InstallationPluginFactory, NullInstallerFactory, ScriptInstallerFactory};
pub use store::{StoreError, StorePlugin, StorePluginFactory};
pub use target::{ManualTargetPlugin, TargetPlugin};
pub use validation::{ValidationPlugin, ValidationPluginFactory};

use log::debug;

use crate::options::Options;
use crate::services::InputService;
use crate::storage::InventoryStore;
use crate::types::{RunLevel, ScheduledRenewal, Target};

/// Outcome of a plugin selection.
pub enum PluginChoice<T> {
    Selected(T),
    /// The user backed out of an interactive choice.
    Cancelled,
    /// No factory matched; carries the reason for the log.
    Unavailable(String),
}

const DEFAULT_TARGET_PLUGIN: &str = "manual";
const DEFAULT_VALIDATION_COORDINATE: &str = "http-01.filesystem";

#[derive(Default)]
pub struct PluginRegistry {
    targets: Vec<Box<dyn TargetPlugin>>,
    validation: Vec<Box<dyn ValidationPluginFactory>>,
    stores: Vec<Box<dyn StorePluginFactory>>,
    installation: Vec<Box<dyn InstallationPluginFactory>>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in plugin set.
    pub fn with_defaults(inventory: InventoryStore) -> Self {
        let mut registry = Self::new();
        registry.register_target(Box::new(target::ManualTargetPlugin));
        registry.register_validation(Box::new(validation::FileSystemValidationFactory));
        registry.register_validation(Box::new(validation::ManualDnsValidationFactory));
        registry.register_store(Box::new(store::CentralSslStoreFactory));
        registry.register_store(Box::new(store::SqliteStoreFactory::new(inventory)));
        registry.register_installation(Box::new(install::NullInstallerFactory));
        registry.register_installation(Box::new(install::ScriptInstallerFactory));
        registry
    }

    pub fn register_target(&mut self, plugin: Box<dyn TargetPlugin>) {
        self.targets.push(plugin);
    }

    pub fn register_validation(&mut self, factory: Box<dyn ValidationPluginFactory>) {
        self.validation.push(factory);
    }

    pub fn register_store(&mut self, factory: Box<dyn StorePluginFactory>) {
        self.stores.push(factory);
    }

    pub fn register_installation(&mut self, factory: Box<dyn InstallationPluginFactory>) {
        self.installation.push(factory);
    }

    /// Resolves a target plugin by name, case-insensitively.
    pub fn target_plugin_by_name(&self, name: &str) -> Option<&dyn TargetPlugin> {
        self.targets
            .iter()
            .find(|plugin| plugin.name().eq_ignore_ascii_case(name))
            .map(|factory| factory.as_ref())
    }

    /// Selects the target plugin for a run. Unattended runs match the
    /// `--plugin` option (defaulting to the manual plugin); interactive runs
    /// without an option present the list.
    pub fn target_plugin(
        &self,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> PluginChoice<&dyn TargetPlugin> {
        if let Some(name) = options.plugin.as_deref() {
            return match self.target_plugin_by_name(name) {
                Some(plugin) => PluginChoice::Selected(plugin),
                None => PluginChoice::Unavailable(format!("unknown target plugin {name}")),
            };
        }
        match run_level {
            RunLevel::Unattended => match self.target_plugin_by_name(DEFAULT_TARGET_PLUGIN) {
                Some(plugin) => PluginChoice::Selected(plugin),
                None => PluginChoice::Unavailable("no target plugin registered".to_string()),
            },
            RunLevel::Interactive => {
                let labels: Vec<String> = self
                    .targets
                    .iter()
                    .map(|p| format!("{}: {}", p.name(), p.description()))
                    .collect();
                match input.choose_from_list("How shall we determine the host names?", &labels) {
                    Some(index) => PluginChoice::Selected(self.targets[index].as_ref()),
                    None => PluginChoice::Cancelled,
                }
            }
        }
    }

    /// Resolves a validation factory by its stored coordinate
    /// (`challenge-type.name`), case-insensitively.
    pub fn validation_factory(&self, coordinate: &str) -> Option<&dyn ValidationPluginFactory> {
        self.validation
            .iter()
            .find(|factory| factory.coordinate().eq_ignore_ascii_case(coordinate))
            .map(|factory| factory.as_ref())
    }

    /// Selects the validation factory for a new target. Only factories whose
    /// `can_validate` accepts the target qualify.
    pub fn validation_factory_for(
        &self,
        target: &Target,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> PluginChoice<&dyn ValidationPluginFactory> {
        if let Some(coordinate) = options.validation_coordinate() {
            return match self.validation_factory(&coordinate) {
                Some(factory) if factory.can_validate(target) => PluginChoice::Selected(factory),
                Some(_) => PluginChoice::Unavailable(format!(
                    "validation plugin {coordinate} cannot validate {}",
                    target.primary_host
                )),
                None => {
                    PluginChoice::Unavailable(format!("unknown validation plugin {coordinate}"))
                }
            };
        }

        let candidates: Vec<&dyn ValidationPluginFactory> = self
            .validation
            .iter()
            .map(|factory| factory.as_ref())
            .filter(|factory| factory.can_validate(target))
            .collect();
        if candidates.is_empty() {
            return PluginChoice::Unavailable(format!(
                "no validation plugin can validate {}",
                target.primary_host
            ));
        }

        match run_level {
            RunLevel::Unattended => {
                let default = candidates
                    .iter()
                    .find(|f| f.coordinate().eq_ignore_ascii_case(DEFAULT_VALIDATION_COORDINATE))
                    .copied()
                    .unwrap_or(candidates[0]);
                debug!("[registry] defaulting to validation plugin {}", default.coordinate());
                PluginChoice::Selected(default)
            }
            RunLevel::Interactive => {
                let labels: Vec<String> = candidates
                    .iter()
                    .map(|f| format!("[{}] {}: {}", f.challenge_type(), f.name(), f.description()))
                    .collect();
                match input.choose_from_list("How would you like to validate this certificate?", &labels)
                {
                    Some(index) => PluginChoice::Selected(candidates[index]),
                    None => PluginChoice::Cancelled,
                }
            }
        }
    }

    /// Picks the store factory serving this renewal's selection fields.
    pub fn store_factory(&self, renewal: &ScheduledRenewal) -> PluginChoice<&dyn StorePluginFactory> {
        match self
            .stores
            .iter()
            .find(|factory| factory.handles(renewal))
            .map(|factory| factory.as_ref())
        {
            Some(factory) => PluginChoice::Selected(factory),
            None => PluginChoice::Unavailable(format!(
                "no store plugin handles renewal for {}",
                renewal.binding.primary_host
            )),
        }
    }

    pub fn installation_factory(&self, name: &str) -> Option<&dyn InstallationPluginFactory> {
        self.installation
            .iter()
            .find(|factory| factory.name().eq_ignore_ascii_case(name))
            .map(|factory| factory.as_ref())
    }

    /// Resolves the ordered installation factory list for a renewal. An
    /// empty name list falls back to the null installer unattended, or to an
    /// interactive choice; `Cancelled` is reported when the user backs out,
    /// so an empty list never reaches the driver.
    pub fn installation_factories(
        &self,
        names: &[String],
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> PluginChoice<Vec<&dyn InstallationPluginFactory>> {
        if !names.is_empty() {
            let mut selected = Vec::with_capacity(names.len());
            for name in names {
                match self.installation_factory(name) {
                    Some(factory) => selected.push(factory),
                    None => {
                        return PluginChoice::Unavailable(format!(
                            "unknown installation plugin {name}"
                        ));
                    }
                }
            }
            return PluginChoice::Selected(selected);
        }

        match run_level {
            RunLevel::Unattended => match self.installation_factory("none") {
                Some(factory) => PluginChoice::Selected(vec![factory]),
                None => {
                    PluginChoice::Unavailable("null installation plugin not registered".to_string())
                }
            },
            RunLevel::Interactive => {
                let labels: Vec<String> = self
                    .installation
                    .iter()
                    .map(|f| format!("{}: {}", f.name(), f.description()))
                    .collect();
                match input.choose_from_list("Which installation steps should run?", &labels) {
                    Some(index) => PluginChoice::Selected(vec![self.installation[index].as_ref()]),
                    None => PluginChoice::Cancelled,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::AutoInput;
    use crate::storage::Db;
    use std::fs;
    use uuid::Uuid;

    fn registry() -> (PluginRegistry, std::path::PathBuf) {
        let mut dir = std::env::temp_dir();
        dir.push(format!("certkeeper_registry_plugins_{}", Uuid::new_v4().as_simple()));
        let inventory = InventoryStore::initialize(Db::initialize(&dir).unwrap()).unwrap();
        (PluginRegistry::with_defaults(inventory), dir)
    }

    #[test]
    fn unattended_target_selection_matches_case_insensitively() {
        let (registry, dir) = registry();
        let options = Options {
            plugin: Some("Manual".into()),
            ..Default::default()
        };
        match registry.target_plugin(&options, &AutoInput, RunLevel::Unattended) {
            PluginChoice::Selected(plugin) => assert_eq!(plugin.name(), "manual"),
            _ => panic!("expected manual plugin"),
        }

        let unknown = Options {
            plugin: Some("iis".into()),
            ..Default::default()
        };
        assert!(matches!(
            registry.target_plugin(&unknown, &AutoInput, RunLevel::Unattended),
            PluginChoice::Unavailable(_)
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn validation_selection_respects_can_validate() {
        let (registry, dir) = registry();
        let wildcard = Target::new("*.example.com".into(), vec![]);

        // filesystem cannot serve a wildcard; the unattended default falls
        // through to the first factory that can.
        match registry.validation_factory_for(
            &wildcard,
            &Options::default(),
            &AutoInput,
            RunLevel::Unattended,
        ) {
            PluginChoice::Selected(factory) => assert_eq!(factory.coordinate(), "dns-01.manual"),
            _ => panic!("expected dns-01.manual"),
        }

        let forced = Options {
            validation: Some("filesystem".into()),
            ..Default::default()
        };
        assert!(matches!(
            registry.validation_factory_for(&wildcard, &forced, &AutoInput, RunLevel::Unattended),
            PluginChoice::Unavailable(_)
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn empty_installation_list_defaults_to_null_installer() {
        let (registry, dir) = registry();
        match registry.installation_factories(&[], &AutoInput, RunLevel::Unattended) {
            PluginChoice::Selected(factories) => {
                assert_eq!(factories.len(), 1);
                assert!(factories[0].is_null());
            }
            _ => panic!("expected null installer"),
        }

        let named = vec!["script".to_string(), "none".to_string()];
        match registry.installation_factories(&named, &AutoInput, RunLevel::Unattended) {
            PluginChoice::Selected(factories) => {
                assert_eq!(factories.len(), 2);
                assert_eq!(factories[0].name(), "script");
            }
            _ => panic!("expected both factories"),
        }

        let unknown = vec!["iis".to_string()];
        assert!(matches!(
            registry.installation_factories(&unknown, &AutoInput, RunLevel::Unattended),
            PluginChoice::Unavailable(_)
        ));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn interactive_cancellation_is_distinguished() {
        let (registry, dir) = registry();
        // AutoInput declines every list choice, modelling a user backing out.
        assert!(matches!(
            registry.target_plugin(&Options::default(), &AutoInput, RunLevel::Interactive),
            PluginChoice::Cancelled
        ));
        assert!(matches!(
            registry.installation_factories(&[], &AutoInput, RunLevel::Interactive),
            PluginChoice::Cancelled
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
