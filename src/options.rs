use clap::Parser;
use std::path::PathBuf;

/// Command line surface consumed by the renewal engine. Interactive menu
/// navigation lives outside this crate; everything here can also drive a
/// fully unattended run.
#[derive(Debug, Clone, Parser, Default)]
#[command(name = "certkeeper", version, about = "ACME certificate renewal engine")]
pub struct Options {
    /// Process scheduled renewals that are due.
    #[arg(long)]
    pub renew: bool,

    /// Process all scheduled renewals regardless of due date.
    #[arg(long)]
    pub force_renewal: bool,

    /// Target plugin name for unattended target construction.
    #[arg(long)]
    pub plugin: Option<String>,

    /// Cancel the scheduled renewal matching the constructed target.
    #[arg(long)]
    pub cancel: bool,

    /// Validation plugin name (qualified by --validation-mode).
    #[arg(long)]
    pub validation: Option<String>,

    /// Challenge type qualifying --validation (default http-01).
    #[arg(long)]
    pub validation_mode: Option<String>,

    /// Installation plugin names, comma separated, applied in order.
    #[arg(long, value_delimiter = ',')]
    pub installation: Vec<String>,

    /// Script to run after installation.
    #[arg(long)]
    pub script: Option<PathBuf>,

    /// Parameters passed to the post-install script.
    #[arg(long)]
    pub script_parameters: Option<String>,

    /// Directory of the central SSL store; mutually exclusive with
    /// --certificate-store in practice.
    #[arg(long)]
    pub central_ssl_store: Option<PathBuf>,

    /// Name of the system certificate store.
    #[arg(long)]
    pub certificate_store: Option<String>,

    /// Keep the previous certificate in the store after a renewal.
    #[arg(long)]
    pub keep_existing: Option<bool>,

    /// Fetch the challenge URL locally before asking the CA to validate.
    #[arg(long)]
    pub warmup: bool,

    /// Test mode: always re-validate and confirm before installing.
    #[arg(long)]
    pub test: bool,

    /// Exit without waiting when the run finishes.
    #[arg(long)]
    pub close_on_finish: bool,

    #[arg(long)]
    pub ssl_port: Option<u16>,

    #[arg(long)]
    pub ssl_ip_address: Option<String>,

    /// Port the validation listener or web root is served on.
    #[arg(long)]
    pub validation_port: Option<u16>,

    /// Web root for http-01 file-drop validation.
    #[arg(long)]
    pub validation_path: Option<PathBuf>,

    /// Do not register a scheduled task after the first successful renewal.
    #[arg(long)]
    pub no_task_scheduler: bool,

    /// Hosts for the manual target plugin, comma separated; the first entry
    /// becomes the primary host.
    #[arg(long)]
    pub host: Option<String>,
}

impl Options {
    /// Validation plugin coordinate qualified by challenge type, when a
    /// validation plugin was named.
    pub fn validation_coordinate(&self) -> Option<String> {
        let name = self.validation.as_deref()?;
        let mode = self.validation_mode.as_deref().unwrap_or("http-01");
        Some(format!("{}.{}", mode.to_lowercase(), name.to_lowercase()))
    }
}
