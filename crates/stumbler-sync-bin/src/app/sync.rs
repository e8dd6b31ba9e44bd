use clap::ValueEnum;
use report_database::Database;
use report_upload_worker::{
    HttpTransport, ReportUploader, RunReport, SyncGate, TransportConfig, UploaderConfig,
};
use std::time::Duration;
use stumbler_config_and_utils::{Config, Paths, RunLock};
use tracing::info;

/// Network the host is currently on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum NetworkKind {
    Unmetered,
    Metered,
    Offline,
}

impl NetworkKind {
    /// Whether uploads are allowed on this network without forcing.
    pub fn acceptable(self, wifi_only: bool) -> bool {
        match self {
            NetworkKind::Unmetered => true,
            NetworkKind::Metered => !wifi_only,
            NetworkKind::Offline => false,
        }
    }
}

/// Run one drain pass against the configured endpoint.
pub async fn run_sync(
    config: &Config,
    paths: &Paths,
    network: NetworkKind,
    force: bool,
) -> Result<RunReport, Box<dyn std::error::Error>> {
    let _lock = RunLock::acquire(&paths.lock_file())?;
    let db = Database::open(&paths.database_file())?;

    let transport = HttpTransport::new(TransportConfig {
        api_key: config.api_key.clone(),
        nickname: config.nickname.clone(),
        timeout: Duration::from_secs(config.request_timeout_secs),
        ..TransportConfig::new(config.endpoint_url()?)
    })?;

    let uploader = ReportUploader::new(
        UploaderConfig {
            batch_size: config.batch_size,
            max_retry_count: config.max_retry_count,
            use_compression: config.use_compression,
        },
        &db,
        transport,
    );

    let gate = SyncGate {
        network_acceptable: network.acceptable(config.wifi_only),
        force,
    };
    info!(?network, force, wifi_only = config.wifi_only, "Starting sync");

    Ok(uploader.run(gate).await)
}
