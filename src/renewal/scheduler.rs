use anyhow::Result;
use chrono::Utc;
use log::{error, info, warn};

use super::driver::RenewalDriver;
use crate::options::Options;
use crate::services::Services;
use crate::types::{RenewResult, RunLevel};

/// Walks the renewal registry, processes every record that is due (or all
/// of them under `--force-renewal`) and persists each outcome. One failing
/// record never aborts the batch.
pub fn process_renewals(services: &Services, options: &Options) -> Result<Vec<RenewResult>> {
    let driver = RenewalDriver::new(services, options);
    let renewals = services.renewals.renewals()?;
    if renewals.is_empty() {
        info!("[scheduler] no scheduled renewals");
        return Ok(Vec::new());
    }

    let now = Utc::now();
    let mut results = Vec::new();
    for mut renewal in renewals {
        if !options.force_renewal {
            if let Some(due) = renewal.due_date {
                if due >= now {
                    info!(
                        "[scheduler] renewal for {} is due after {}",
                        renewal.binding.primary_host,
                        due.format("%Y-%m-%d %H:%M")
                    );
                    continue;
                }
            }
        }

        info!("[scheduler] processing renewal for {}", renewal.binding.primary_host);
        let result = driver.renew(&mut renewal, RunLevel::Unattended);
        if !result.success {
            warn!(
                "[scheduler] renewal for {} failed: {}",
                renewal.binding.primary_host,
                result.error_message.as_deref().unwrap_or("unknown error")
            );
        }
        if let Err(err) = services.renewals.save(&mut renewal, &result) {
            error!(
                "[scheduler] could not persist result for {}, will retry on next run: {err:#}",
                renewal.binding.primary_host
            );
        }
        results.push(result);
    }
    Ok(results)
}
