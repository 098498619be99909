pub mod acme;
pub mod domain;
pub mod errors;
pub mod options;
pub mod plugins;
pub mod renewal;
pub mod services;
pub mod settings;
pub mod storage;
pub mod types;

use std::sync::Once;

/// Initializes the logging backend once. Defaults to info with the HTTP
/// client quieted; override via RUST_LOG (e.g. RUST_LOG=debug,ureq=debug).
pub fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let env = env_logger::Env::default().default_filter_or("info");
        let mut builder = env_logger::Builder::from_env(env);
        builder.filter_module("rustls", log::LevelFilter::Warn);
        builder.filter_module("ureq", log::LevelFilter::Warn);
        builder.filter_module("ureq::stream", log::LevelFilter::Warn);
        builder.filter_module("ureq::unit", log::LevelFilter::Warn);
        builder.filter_module("ureq::pool", log::LevelFilter::Warn);
        builder.filter_module("ureq::response", log::LevelFilter::Warn);
        builder.format_timestamp_millis().init();
    });
}
