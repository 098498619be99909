//! Shared test doubles: a scripted ACME transport, recording store and
//! installation plugins, and a harness that wires them into a service
//! container backed by a throwaway database.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, anyhow};

use certkeeper::acme::{
    AcmeClient, AcmeError, AcmeTransport, Authorization, AuthorizationStatus, Challenge,
    ChallengeDetails, ChallengeStatus, Order,
};
use certkeeper::options::Options;
use certkeeper::plugins::{
    InstallationPlugin, InstallationPluginFactory, NullInstallerFactory, PluginRegistry,
    StoreError, StorePlugin, StorePluginFactory, ValidationPlugin, ValidationPluginFactory,
};
use certkeeper::plugins::target::ManualTargetPlugin;
use certkeeper::services::{
    CertificateService, InputService, Services, TaskScheduler,
};
use certkeeper::settings::Settings;
use certkeeper::storage::{Db, RenewalStore};
use certkeeper::types::{CertificateInfo, RunLevel, ScheduledRenewal, Target};

pub const TEST_VALIDATION: &str = "http-01.test";

pub fn pem(thumbprint: &str) -> String {
    format!("-----BEGIN CERTIFICATE-----\n{thumbprint}\n-----END CERTIFICATE-----\n")
}

pub fn certificate(thumbprint: &str) -> CertificateInfo {
    CertificateInfo {
        thumbprint: thumbprint.to_string(),
        pem: pem(thumbprint),
        hosts: vec!["example.com".to_string()],
        store: None,
    }
}

pub fn challenge(kind: &str, status: ChallengeStatus) -> Challenge {
    Challenge {
        kind: kind.to_string(),
        url: "https://ca.test/challenge/0".to_string(),
        status,
        token: "token-0".to_string(),
        error: None,
    }
}

pub fn authorization(identifier: &str, status: AuthorizationStatus) -> Authorization {
    let challenge_status = match status {
        AuthorizationStatus::Valid => ChallengeStatus::Valid,
        _ => ChallengeStatus::Pending,
    };
    Authorization {
        identifier: identifier.to_string(),
        status,
        challenges: vec![challenge("http-01", challenge_status)],
    }
}

pub fn renewal(primary: &str) -> ScheduledRenewal {
    let mut target = Target::new(primary.to_string(), vec![]);
    target.target_plugin = "manual".to_string();
    target.validation_plugin = TEST_VALIDATION.to_string();
    let mut renewal = ScheduledRenewal::new(target);
    renewal.installation_plugin_names = vec!["none".to_string()];
    renewal
}

#[derive(Default)]
pub struct TransportCounts {
    pub orders: Mutex<u32>,
    pub authorization_fetches: Mutex<u32>,
    pub details: Mutex<u32>,
    pub answers: Mutex<u32>,
    pub decodes: Mutex<u32>,
    pub order_identifiers: Mutex<Vec<String>>,
}

/// Transport double fed with canned authorizations and poll responses.
pub struct ScriptedTransport {
    pub authorizations: Vec<Authorization>,
    pub submit_status: ChallengeStatus,
    pub poll_responses: Mutex<VecDeque<Challenge>>,
    /// Returned by every poll once `poll_responses` runs dry.
    pub default_poll: Challenge,
    pub counts: Arc<TransportCounts>,
}

impl ScriptedTransport {
    pub fn new(authorizations: Vec<Authorization>) -> Self {
        Self {
            authorizations,
            submit_status: ChallengeStatus::Pending,
            poll_responses: Mutex::new(VecDeque::new()),
            default_poll: challenge("http-01", ChallengeStatus::Pending),
            counts: Arc::new(TransportCounts::default()),
        }
    }

    pub fn with_poll_responses(mut self, responses: Vec<Challenge>) -> Self {
        self.poll_responses = Mutex::new(responses.into());
        self
    }
}

impl AcmeTransport for ScriptedTransport {
    fn new_order(&self, identifiers: &[String]) -> Result<Order, AcmeError> {
        *self.counts.orders.lock().unwrap() += 1;
        *self.counts.order_identifiers.lock().unwrap() = identifiers.to_vec();
        Ok(Order {
            url: "https://ca.test/order/1".to_string(),
            authorization_urls: (0..self.authorizations.len())
                .map(|index| format!("https://ca.test/authz/{index}"))
                .collect(),
            finalize_url: "https://ca.test/finalize/1".to_string(),
        })
    }

    fn fetch_authorization(&self, url: &str) -> Result<Authorization, AcmeError> {
        *self.counts.authorization_fetches.lock().unwrap() += 1;
        let index: usize = url
            .rsplit('/')
            .next()
            .and_then(|raw| raw.parse().ok())
            .ok_or_else(|| AcmeError::Transport(format!("bad authorization url {url}")))?;
        self.authorizations
            .get(index)
            .cloned()
            .ok_or_else(|| AcmeError::Transport(format!("unknown authorization {url}")))
    }

    fn challenge_details(
        &self,
        authorization: &Authorization,
        challenge: &Challenge,
    ) -> Result<ChallengeDetails, AcmeError> {
        *self.counts.details.lock().unwrap() += 1;
        Ok(ChallengeDetails {
            kind: challenge.kind.clone(),
            identifier: authorization.identifier.clone(),
            token: challenge.token.clone(),
            key_authorization: format!("{}.account-thumb", challenge.token),
            dns_proof: Some("proof-value".to_string()),
        })
    }

    fn answer_challenge(&self, challenge: &Challenge) -> Result<Challenge, AcmeError> {
        *self.counts.answers.lock().unwrap() += 1;
        let mut answered = challenge.clone();
        answered.status = self.submit_status;
        Ok(answered)
    }

    fn fetch_challenge(&self, _url: &str) -> Result<Challenge, AcmeError> {
        *self.counts.decodes.lock().unwrap() += 1;
        let mut responses = self.poll_responses.lock().unwrap();
        Ok(responses.pop_front().unwrap_or_else(|| self.default_poll.clone()))
    }
}

#[derive(Default)]
pub struct StoreState {
    pub certificates: HashMap<String, CertificateInfo>,
    pub save_calls: u32,
    pub delete_calls: u32,
    pub fail_save: bool,
    pub fail_delete: bool,
}

/// In-memory store shared between the factory and the test body.
#[derive(Clone, Default)]
pub struct SharedStore {
    pub state: Arc<Mutex<StoreState>>,
}

impl SharedStore {
    pub fn seed(&self, certificate: CertificateInfo) {
        self.state
            .lock()
            .unwrap()
            .certificates
            .insert(certificate.thumbprint.clone(), certificate);
    }
}

impl StorePlugin for SharedStore {
    fn name(&self) -> String {
        "test-store".to_string()
    }

    fn find_by_thumbprint(&self, thumbprint: &str) -> Result<Option<CertificateInfo>, StoreError> {
        Ok(self.state.lock().unwrap().certificates.get(thumbprint).cloned())
    }

    fn save(&self, certificate: &mut CertificateInfo) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.save_calls += 1;
        if state.fail_save {
            return Err(StoreError::Store("simulated save failure".to_string()));
        }
        certificate.store = Some(self.name());
        state
            .certificates
            .insert(certificate.thumbprint.clone(), certificate.clone());
        Ok(())
    }

    fn delete(&self, certificate: &CertificateInfo) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls += 1;
        if state.fail_delete {
            return Err(StoreError::Store("simulated delete failure".to_string()));
        }
        state
            .certificates
            .remove(&certificate.thumbprint)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(certificate.thumbprint.clone()))
    }
}

pub struct SharedStoreFactory(pub SharedStore);

impl StorePluginFactory for SharedStoreFactory {
    fn name(&self) -> &'static str {
        "test-store"
    }

    fn description(&self) -> &'static str {
        "in-memory store for tests"
    }

    fn handles(&self, _renewal: &ScheduledRenewal) -> bool {
        true
    }

    fn create(
        &self,
        _renewal: &ScheduledRenewal,
        _settings: &Settings,
    ) -> Result<Box<dyn StorePlugin>, StoreError> {
        Ok(Box::new(self.0.clone()))
    }
}

#[derive(Default)]
pub struct ValidationCounts {
    pub prepares: Mutex<u32>,
    pub cleanups: Mutex<u32>,
}

/// http-01 validation double that records prepare and cleanup calls.
pub struct TestValidationFactory {
    pub counts: Arc<ValidationCounts>,
    pub fail_prepare: bool,
}

impl TestValidationFactory {
    pub fn new() -> Self {
        Self {
            counts: Arc::new(ValidationCounts::default()),
            fail_prepare: false,
        }
    }
}

impl ValidationPluginFactory for TestValidationFactory {
    fn name(&self) -> &'static str {
        "test"
    }

    fn description(&self) -> &'static str {
        "recording validation plugin"
    }

    fn challenge_type(&self) -> &'static str {
        "http-01"
    }

    fn can_validate(&self, _target: &Target) -> bool {
        true
    }

    fn default(&self, _target: &mut Target, _options: &Options) -> Result<()> {
        Ok(())
    }

    fn acquire(
        &self,
        _target: &mut Target,
        _options: &Options,
        _input: &dyn InputService,
        _run_level: RunLevel,
    ) -> Result<()> {
        Ok(())
    }

    fn instance(
        &self,
        _renewal: &ScheduledRenewal,
        _target: &Target,
        _identifier: &str,
    ) -> Result<Box<dyn ValidationPlugin>> {
        Ok(Box::new(TestValidation {
            counts: self.counts.clone(),
            fail_prepare: self.fail_prepare,
        }))
    }
}

struct TestValidation {
    counts: Arc<ValidationCounts>,
    fail_prepare: bool,
}

impl ValidationPlugin for TestValidation {
    fn prepare_challenge(&mut self, _details: &ChallengeDetails) -> Result<()> {
        *self.counts.prepares.lock().unwrap() += 1;
        if self.fail_prepare {
            return Err(anyhow!("simulated prepare failure"));
        }
        Ok(())
    }

    fn cleanup(&mut self) -> Result<()> {
        *self.counts.cleanups.lock().unwrap() += 1;
        Ok(())
    }
}

/// Installation step double; entries land in a shared log as
/// `name:new-thumbprint:old-thumbprint-or-dash`.
pub struct TestInstallerFactory {
    pub plugin_name: &'static str,
    pub log: Arc<Mutex<Vec<String>>>,
    pub fail: bool,
}

impl InstallationPluginFactory for TestInstallerFactory {
    fn name(&self) -> &'static str {
        self.plugin_name
    }

    fn description(&self) -> &'static str {
        "recording installer"
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
        Ok(Box::new(TestInstaller {
            plugin_name: self.plugin_name,
            log: self.log.clone(),
            fail: self.fail,
        }))
    }
}

struct TestInstaller {
    plugin_name: &'static str,
    log: Arc<Mutex<Vec<String>>>,
    fail: bool,
}

impl InstallationPlugin for TestInstaller {
    fn install(&self, new: &CertificateInfo, old: Option<&CertificateInfo>) -> Result<()> {
        self.log.lock().unwrap().push(format!(
            "{}:{}:{}",
            self.plugin_name,
            new.thumbprint,
            old.map(|c| c.thumbprint.as_str()).unwrap_or("-")
        ));
        if self.fail {
            return Err(anyhow!("simulated install failure"));
        }
        Ok(())
    }
}

/// Certificate service double issuing a fixed thumbprint.
pub struct StubCertificateService {
    pub thumbprint: Option<String>,
    pub requests: Arc<Mutex<u32>>,
}

impl StubCertificateService {
    pub fn issuing(thumbprint: &str) -> Self {
        Self {
            thumbprint: Some(thumbprint.to_string()),
            requests: Arc::new(Mutex::new(0)),
        }
    }

    pub fn empty() -> Self {
        Self {
            thumbprint: None,
            requests: Arc::new(Mutex::new(0)),
        }
    }
}

impl CertificateService for StubCertificateService {
    fn request_certificate(
        &self,
        binding: &Target,
        _order: &Order,
    ) -> Result<Option<CertificateInfo>> {
        *self.requests.lock().unwrap() += 1;
        Ok(self.thumbprint.as_ref().map(|thumbprint| CertificateInfo {
            thumbprint: thumbprint.clone(),
            pem: pem(thumbprint),
            hosts: binding.get_hosts(false),
            store: None,
        }))
    }
}

pub struct CountingScheduler {
    pub calls: Arc<Mutex<u32>>,
}

impl TaskScheduler for CountingScheduler {
    fn ensure_task_scheduler(&self) -> Result<()> {
        *self.calls.lock().unwrap() += 1;
        Ok(())
    }
}

/// Input double with a fixed yes/no answer.
pub struct FixedInput {
    pub yes: bool,
}

impl InputService for FixedInput {
    fn prompt_yes_no(&self, _question: &str) -> bool {
        self.yes
    }

    fn request_string(&self, _prompt: &str) -> Option<String> {
        None
    }

    fn choose_from_list(&self, _prompt: &str, _choices: &[String]) -> Option<usize> {
        None
    }
}

/// Fully wired service container over test doubles plus handles to every
/// recorded counter.
pub struct Harness {
    pub services: Services,
    pub dir: PathBuf,
    pub store: SharedStore,
    pub transport_counts: Arc<TransportCounts>,
    pub validation_counts: Arc<ValidationCounts>,
    pub install_log: Arc<Mutex<Vec<String>>>,
    pub certificate_requests: Arc<Mutex<u32>>,
    pub scheduler_calls: Arc<Mutex<u32>>,
}

impl Harness {
    pub fn close(self) {
        drop(self.services);
        let _ = std::fs::remove_dir_all(&self.dir);
    }
}

pub struct HarnessBuilder {
    transport: ScriptedTransport,
    certificates: StubCertificateService,
    installers: Vec<TestInstallerFactory>,
    fail_prepare: bool,
    input_yes: bool,
    install_log: Arc<Mutex<Vec<String>>>,
}

impl HarnessBuilder {
    pub fn new(transport: ScriptedTransport) -> Self {
        Self {
            transport,
            certificates: StubCertificateService::issuing("new-thumb"),
            installers: Vec::new(),
            fail_prepare: false,
            input_yes: true,
            install_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn certificates(mut self, certificates: StubCertificateService) -> Self {
        self.certificates = certificates;
        self
    }

    pub fn installer(mut self, plugin_name: &'static str, fail: bool) -> Self {
        self.installers.push(TestInstallerFactory {
            plugin_name,
            log: self.install_log.clone(),
            fail,
        });
        self
    }

    pub fn fail_prepare(mut self) -> Self {
        self.fail_prepare = true;
        self
    }

    pub fn answering_no(mut self) -> Self {
        self.input_yes = false;
        self
    }

    pub fn build(self) -> Harness {
        let mut dir = std::env::temp_dir();
        dir.push(format!(
            "certkeeper_harness_{}",
            uuid::Uuid::new_v4().as_simple()
        ));
        let db = Db::initialize(&dir).expect("temp database");
        let mut settings = Settings::defaults(dir.clone());
        settings.poll_interval = Duration::from_millis(1);
        let renewals = RenewalStore::initialize(db, settings.renewal_days).expect("registry");

        let store = SharedStore::default();
        let mut validation = TestValidationFactory::new();
        validation.fail_prepare = self.fail_prepare;
        let validation_counts = validation.counts.clone();

        let mut registry = PluginRegistry::new();
        registry.register_target(Box::new(ManualTargetPlugin));
        registry.register_validation(Box::new(validation));
        registry.register_store(Box::new(SharedStoreFactory(store.clone())));
        registry.register_installation(Box::new(NullInstallerFactory));
        for installer in self.installers {
            registry.register_installation(Box::new(installer));
        }

        let transport_counts = self.transport.counts.clone();
        let certificate_requests = self.certificates.requests.clone();
        let scheduler_calls = Arc::new(Mutex::new(0));

        let services = Services {
            settings,
            registry,
            renewals,
            client: AcmeClient::new(Box::new(self.transport)),
            certificates: Box::new(self.certificates),
            task_scheduler: Box::new(CountingScheduler {
                calls: scheduler_calls.clone(),
            }),
            input: Box::new(FixedInput { yes: self.input_yes }),
        };

        Harness {
            services,
            dir,
            store,
            transport_counts,
            validation_counts,
            install_log: self.install_log,
            certificate_requests,
            scheduler_calls,
        }
    }
}
