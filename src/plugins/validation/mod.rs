pub mod dns;
pub mod http;

pub use dns::ManualDnsValidationFactory;
pub use http::FileSystemValidationFactory;

use anyhow::Result;

use crate::acme::ChallengeDetails;
use crate::options::Options;
use crate::services::InputService;
use crate::types::{RunLevel, ScheduledRenewal, Target};

/// Describes a way of proving control of an identifier and builds instances
/// specialized for one DNS name.
pub trait ValidationPluginFactory: Send + Sync {
    fn name(&self) -> &'static str;
    fn description(&self) -> &'static str;
    /// ACME challenge type this plugin answers, e.g. `http-01`.
    fn challenge_type(&self) -> &'static str;
    /// Coordinate stored on the target, qualified by challenge type.
    fn coordinate(&self) -> String {
        format!("{}.{}", self.challenge_type(), self.name())
    }
    fn can_validate(&self, target: &Target) -> bool;
    /// Unattended configuration of the target's validation parameters.
    fn default(&self, target: &mut Target, options: &Options) -> Result<()>;
    /// Interactive configuration; failures surface as invalid-input errors.
    fn acquire(
        &self,
        target: &mut Target,
        options: &Options,
        input: &dyn InputService,
        run_level: RunLevel,
    ) -> Result<()>;
    /// Builds the plugin instance for one identifier of one renewal.
    fn instance(
        &self,
        renewal: &ScheduledRenewal,
        target: &Target,
        identifier: &str,
    ) -> Result<Box<dyn ValidationPlugin>>;
}

/// A validation plugin stages the proof for one challenge and tears it down
/// again when its identifier scope closes.
pub trait ValidationPlugin: Send {
    fn prepare_challenge(&mut self, details: &ChallengeDetails) -> Result<()>;
    /// Releases whatever `prepare_challenge` left behind. Runs on every exit
    /// path of the identifier scope, including timeouts.
    fn cleanup(&mut self) -> Result<()>;
}
