use std::sync::Arc;

use spectra_controller::configs::settings::Settings;
use spectra_controller::run;

#[tokio::main]
async fn main() {
    let settings = Arc::new(Settings::new().expect("Failed to load settings."));

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            let level = settings.logger.level.as_str();

            format!("spectra_controller={level},spectra_api={level}").into()
        }))
        .init();

    if let Err(e) = run(&settings).await {
        tracing::error!("{e}");
        std::process::exit(e.exit_code());
    }
}
