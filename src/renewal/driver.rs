use std::collections::BTreeSet;

use anyhow::{Context, Result};
use log::{error, info, warn};

use super::authorization::authorize_identifier;
use super::context::RenewalContext;
use crate::acme::{Authorization, Challenge, ChallengeStatus};
use crate::errors::RenewalError;
use crate::options::Options;
use crate::plugins::StoreError;
use crate::services::Services;
use crate::types::{CertificateInfo, RenewResult, RunLevel, ScheduledRenewal, Target};

/// Drives one scheduled renewal end to end: refresh the target, prove
/// control of every identifier, obtain the certificate, store and install
/// it, prune the predecessor and register the schedule.
pub struct RenewalDriver<'a> {
    services: &'a Services,
    options: &'a Options,
}

impl<'a> RenewalDriver<'a> {
    pub fn new(services: &'a Services, options: &'a Options) -> Self {
        Self { services, options }
    }

    /// Runs the pipeline. Never panics through; whatever escapes the
    /// pipeline is folded into the result, preserving a thumbprint that was
    /// already recorded.
    pub fn renew(&self, renewal: &mut ScheduledRenewal, run_level: RunLevel) -> RenewResult {
        let mut partial: Option<RenewResult> = None;
        match self.try_renew(renewal, run_level, &mut partial) {
            Ok(result) => result,
            Err(err) => {
                error!(
                    "[renewal] unexpected failure for {}: {err:#}",
                    renewal.binding.primary_host
                );
                match partial.take() {
                    Some(mut result) => {
                        result.success = false;
                        result.error_message = Some(err.to_string());
                        result
                    }
                    None => RenewResult::error(err.to_string()),
                }
            }
        }
    }

    fn try_renew(
        &self,
        renewal: &mut ScheduledRenewal,
        run_level: RunLevel,
        partial: &mut Option<RenewResult>,
    ) -> Result<RenewResult> {
        info!("[renewal] renewing certificate for {renewal}");

        let context = match RenewalContext::build(self.services, renewal, run_level) {
            Ok(context) => context,
            Err(err) => {
                error!("[renewal] {err}");
                return Ok(RenewResult::error(err.to_string()));
            }
        };

        // The host enumeration behind the target may have changed since the
        // record was written; a vanished target aborts with the original
        // binding restored.
        let original_binding = renewal.binding.clone();
        match context
            .target_plugin
            .refresh(&renewal.binding)
            .context("target refresh failed")?
        {
            Some(refreshed) => renewal.binding = refreshed,
            None => {
                renewal.binding = original_binding;
                error!("[renewal] {}", RenewalError::TargetGone);
                return Ok(RenewResult::error(RenewalError::TargetGone.to_string()));
            }
        }

        let sub_targets = context
            .target_plugin
            .split(&renewal.binding)
            .context("target split failed")?;
        renewal.binding.alternative_names = sub_targets
            .iter()
            .flat_map(|sub| sub.alternative_names.iter().cloned())
            .collect();
        let identifiers: BTreeSet<String> = sub_targets
            .iter()
            .flat_map(|sub| sub.get_hosts(false))
            .collect();

        let order = self
            .services
            .client
            .create_order(&identifiers)
            .context("order creation failed")?;
        let mut authorizations = Vec::with_capacity(order.authorization_urls.len());
        for url in &order.authorization_urls {
            authorizations.push(
                self.services
                    .client
                    .get_authorization_details(url)
                    .context("failed to fetch authorization")?,
            );
        }

        for authorization in &authorizations {
            let challenge = self.authorize(&context, renewal, &sub_targets, authorization);
            if challenge.status != ChallengeStatus::Valid {
                self.on_renew_fail(&challenge);
                return Ok(RenewResult::error(
                    RenewalError::AuthorizationFailed.to_string(),
                ));
            }
        }

        let mut new_certificate = match self
            .services
            .certificates
            .request_certificate(&renewal.binding, &order)?
        {
            Some(certificate) => certificate,
            None => {
                error!("[renewal] {}", RenewalError::CertificateMissing);
                return Ok(RenewResult::error(
                    RenewalError::CertificateMissing.to_string(),
                ));
            }
        };

        let mut result = RenewResult::success(&new_certificate);
        *partial = Some(result.clone());

        // First runs in test mode confirm before touching anything; a "no"
        // is still a successful dry run.
        if renewal.test_mode
            && renewal.is_new
            && !self
                .services
                .input
                .prompt_yes_no("Do you want to install the certificate?")
        {
            return Ok(result);
        }

        let old_certificate = match self.store_certificate(&context, renewal, &mut new_certificate)
        {
            Ok(old) => old,
            Err(err) => {
                error!("[renewal] {}", RenewalError::StoreFailed(err.to_string()));
                result.success = false;
                result.error_message = Some(RenewalError::StoreFailed(err.to_string()).to_string());
                return Ok(result);
            }
        };

        if let Err(err) = self.install(&context, renewal, &new_certificate, old_certificate.as_ref())
        {
            error!("[renewal] {}", RenewalError::InstallFailed(format!("{err:#}")));
            result.success = false;
            result.error_message =
                Some(RenewalError::InstallFailed(err.to_string()).to_string());
            // A failed installation leaves the old certificate in place and
            // does not register the schedule.
            return Ok(result);
        }

        self.prune_old(&context, renewal, &new_certificate, old_certificate.as_ref(), &mut result);

        if renewal.is_new
            && !self.options.no_task_scheduler
            && (!renewal.test_mode
                || self
                    .services
                    .input
                    .prompt_yes_no("Do you want to add a renewal task to the scheduler?"))
        {
            self.services
                .task_scheduler
                .ensure_task_scheduler()
                .context("failed to register scheduled task")?;
        }

        Ok(result)
    }

    fn authorize(
        &self,
        context: &RenewalContext<'_>,
        renewal: &ScheduledRenewal,
        sub_targets: &[Target],
        authorization: &Authorization,
    ) -> Challenge {
        let sub_target = sub_targets.iter().find(|sub| {
            sub.get_hosts(false)
                .iter()
                .any(|host| host == &authorization.identifier)
        });
        match sub_target {
            Some(sub_target) => authorize_identifier(context, renewal, sub_target, authorization),
            None => {
                error!(
                    "[renewal] no sub-target covers identifier {}",
                    authorization.identifier
                );
                Challenge::local_failure(format!(
                    "no sub-target covers identifier {}",
                    authorization.identifier
                ))
            }
        }
    }

    fn on_renew_fail(&self, challenge: &Challenge) {
        if let Some(problem) = &challenge.error {
            error!("[renewal] validation failed: {problem}");
        } else {
            error!("[renewal] validation failed without a server error");
        }
    }

    /// Stores the certificate unless a record with the same thumbprint
    /// already exists, in which case its store reference is adopted.
    /// Returns the certificate the record previously pointed at, if any.
    fn store_certificate(
        &self,
        context: &RenewalContext<'_>,
        renewal: &ScheduledRenewal,
        new_certificate: &mut CertificateInfo,
    ) -> Result<Option<CertificateInfo>, StoreError> {
        match context
            .store
            .find_by_thumbprint(&new_certificate.thumbprint)?
        {
            Some(existing) => {
                info!(
                    "[renewal] certificate {} already in store {}",
                    new_certificate.thumbprint,
                    context.store.name()
                );
                new_certificate.store = existing.store;
            }
            None => context.store.save(new_certificate)?,
        }

        let old_certificate = match renewal.certificate_thumbprint.as_deref() {
            Some(thumbprint) => context.store.find_by_thumbprint(thumbprint)?,
            None => None,
        };
        Ok(old_certificate)
    }

    /// Runs every non-null installation step in list order. The first error
    /// aborts the phase; it is caught once around the loop by the caller.
    fn install(
        &self,
        context: &RenewalContext<'_>,
        renewal: &ScheduledRenewal,
        new_certificate: &CertificateInfo,
        old_certificate: Option<&CertificateInfo>,
    ) -> Result<()> {
        let steps: Vec<_> = context
            .installation_factories
            .iter()
            .filter(|factory| !factory.is_null())
            .collect();
        let total = steps.len();
        for (index, factory) in steps.into_iter().enumerate() {
            info!(
                "[renewal] installation step {}/{} ({})",
                index + 1,
                total,
                factory.name()
            );
            let plugin = factory.instance(renewal)?;
            plugin.install(new_certificate, old_certificate)?;
        }
        Ok(())
    }

    /// Removes the superseded certificate. Failure is recorded on the result
    /// while the renewal still counts as successful.
    fn prune_old(
        &self,
        context: &RenewalContext<'_>,
        renewal: &ScheduledRenewal,
        new_certificate: &CertificateInfo,
        old_certificate: Option<&CertificateInfo>,
        result: &mut RenewResult,
    ) {
        if renewal.keep_existing.unwrap_or(false) {
            return;
        }
        let old = match old_certificate {
            Some(old) if old.thumbprint != new_certificate.thumbprint => old,
            _ => return,
        };
        if let Err(err) = context.store.delete(old) {
            warn!(
                "[renewal] could not remove old certificate {}: {err}",
                old.thumbprint
            );
            result.error_message = Some(RenewalError::PruneFailed(err.to_string()).to_string());
        } else {
            info!("[renewal] removed old certificate {}", old.thumbprint);
        }
    }
}
