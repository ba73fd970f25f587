use std::sync::Arc;

use spectra_device::configs::settings::Settings;
use spectra_device::run;
use spectra_device::services::scheduler_service::LocalClock;

fn main() {
    // Read the UTC offset while the process still has a single thread.
    let clock = Arc::new(LocalClock::detect());
    let settings = Arc::new(Settings::new().expect("Failed to load settings."));

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = settings.logger.level.as_str();

            format!("spectra_device={level},spectra_api={level}").into()
        }))
        .init();

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to start runtime.");

    if let Err(e) = runtime.block_on(run(&settings, clock)) {
        tracing::error!("{e}");
        std::process::exit(1);
    }
}
