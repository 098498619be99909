use std::env;
use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use log::{error, info};

use certkeeper::acme::{
    AcmeClient, AcmeError, AcmeTransport, Authorization, Challenge, ChallengeDetails, Order,
};
use certkeeper::errors::RenewalError;
use certkeeper::options::Options;
use certkeeper::plugins::PluginRegistry;
use certkeeper::renewal::{RenewalDriver, cancel_renewal, create_renewal, process_renewals};
use certkeeper::services::{
    AutoInput, CachingCertificateService, CertificateService, InputService, ManualTaskScheduler,
    Services, StdinInput,
};
use certkeeper::settings::Settings;
use certkeeper::storage::{Db, InventoryStore, RenewalStore};
use certkeeper::types::{CertificateInfo, RenewResult, RunLevel, Target};

fn main() {
    certkeeper::init_logging();
    let options = Options::parse();
    let code = match run(&options) {
        Ok(code) => code,
        Err(err) => {
            error!("[main] {err:#}");
            RenewalError::code_for_message(&err.to_string())
        }
    };
    std::process::exit(code);
}

fn run(options: &Options) -> Result<i32> {
    let config_dir = config_dir();
    let db = Db::initialize(&config_dir)?;
    let settings = Settings::load(config_dir, &db)?;
    let inventory = InventoryStore::initialize(db.clone())?;
    let renewals = RenewalStore::initialize(db, settings.renewal_days)?;
    let registry = PluginRegistry::with_defaults(inventory);

    // Unattended whenever the run can be resolved from options alone.
    let run_level = if options.renew || options.host.is_some() {
        RunLevel::Unattended
    } else {
        RunLevel::Interactive
    };
    let input: Box<dyn InputService> = match run_level {
        RunLevel::Unattended => Box::new(AutoInput),
        RunLevel::Interactive => Box::new(StdinInput),
    };

    let certificates = Box::new(CachingCertificateService::new(
        Box::new(UnconfiguredCertificateService),
        &settings,
    ));
    let services = Services {
        settings,
        registry,
        renewals,
        client: AcmeClient::new(Box::new(UnconfiguredTransport)),
        certificates,
        task_scheduler: Box::new(ManualTaskScheduler),
        input,
    };

    if options.cancel {
        return if cancel_renewal(&services, options, run_level)? {
            Ok(0)
        } else {
            Ok(RenewalError::TargetGone.exit_code())
        };
    }

    if options.renew {
        let results = process_renewals(&services, options)?;
        return Ok(exit_code_for(&results));
    }

    // Default action: construct a renewal from options or interactively and
    // run it once.
    let mut renewal = match create_renewal(&services, options, run_level)? {
        Some(renewal) => renewal,
        None => {
            info!("[main] cancelled");
            return Ok(0);
        }
    };
    let driver = RenewalDriver::new(&services, options);
    let result = driver.renew(&mut renewal, run_level);
    services.renewals.save(&mut renewal, &result)?;
    Ok(exit_code_for(std::slice::from_ref(&result)))
}

fn exit_code_for(results: &[RenewResult]) -> i32 {
    results
        .iter()
        .filter(|result| !result.success)
        .filter_map(|result| result.error_message.as_deref())
        .map(RenewalError::code_for_message)
        .next_back()
        .unwrap_or(0)
}

fn config_dir() -> PathBuf {
    if let Ok(dir) = env::var("CERTKEEPER_HOME") {
        return PathBuf::from(dir);
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home).join(".certkeeper");
    }
    PathBuf::from(".certkeeper")
}

/// The protocol transport and CSR machinery are supplied by the embedding
/// application; the bare binary manages the registry and reports clearly
/// when asked to talk to a CA it has not been wired to.
struct UnconfiguredTransport;

impl AcmeTransport for UnconfiguredTransport {
    fn new_order(&self, _identifiers: &[String]) -> Result<Order, AcmeError> {
        Err(AcmeError::Transport(
            "no ACME endpoint configured; supply an AcmeTransport when embedding certkeeper"
                .to_string(),
        ))
    }

    fn fetch_authorization(&self, _url: &str) -> Result<Authorization, AcmeError> {
        Err(AcmeError::Transport("no ACME endpoint configured".to_string()))
    }

    fn challenge_details(
        &self,
        _authorization: &Authorization,
        _challenge: &Challenge,
    ) -> Result<ChallengeDetails, AcmeError> {
        Err(AcmeError::Transport("no ACME endpoint configured".to_string()))
    }

    fn answer_challenge(&self, _challenge: &Challenge) -> Result<Challenge, AcmeError> {
        Err(AcmeError::Transport("no ACME endpoint configured".to_string()))
    }

    fn fetch_challenge(&self, _url: &str) -> Result<Challenge, AcmeError> {
        Err(AcmeError::Transport("no ACME endpoint configured".to_string()))
    }
}

struct UnconfiguredCertificateService;

impl CertificateService for UnconfiguredCertificateService {
    fn request_certificate(
        &self,
        _binding: &Target,
        _order: &Order,
    ) -> Result<Option<CertificateInfo>> {
        Err(anyhow!(
            "no certificate service configured; supply a CertificateService when embedding certkeeper"
        ))
    }
}
