use anyhow::{Context, Result};
use std::fs::File;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod cert_dialog;
mod chromedriver_manager;
mod config;
mod export;
mod models;
mod net;
mod scraper;
mod sso;

use chromedriver_manager::ChromeDriverManager;
use scraper::browser::BrowserSession;
use scraper::ScraperEngine;

#[tokio::main]
async fn main() -> Result<()> {
    let log_path = init_logging()?;
    info!("FAP extraction starting (log file: {})", log_path);

    if config::VALIDATE_PINS_BEFORE && !config::HOST_IP_PINS.is_empty() {
        net::validate_host_pins(config::HOST_IP_PINS)
            .await
            .context("Host pin validation failed; aborting before any automation")?;
    }

    let driver_manager = ChromeDriverManager::new();
    driver_manager
        .start_driver(config::CHROMEDRIVER_PORT)
        .await?;

    let session = match config::ATTACH_DEBUGGER {
        Some(addr) => BrowserSession::attach(addr).await?,
        None => BrowserSession::launch(config::HOST_IP_PINS, config::PROXY_URL).await?,
    };

    let outcome = run(session).await;

    driver_manager.stop_driver().await?;
    outcome
}

async fn run(session: BrowserSession) -> Result<()> {
    let engine = ScraperEngine::new(session);
    let result = extract_all(&engine).await;

    // The WebDriver session always ends here. With KEEP_OPEN the browser
    // itself survives: it is externally owned when attached, detached when
    // launched by us.
    if let Err(e) = engine.session().quit().await {
        warn!("Could not end the WebDriver session cleanly: {:#}", e);
    }
    result
}

async fn extract_all(engine: &ScraperEngine) -> Result<()> {
    if config::SSO_LOGIN {
        let watcher = config::ACCEPT_NATIVE_CERT_DIALOG
            .then(|| cert_dialog::CertDialogWatcher::spawn(Duration::from_secs(40)));

        let login = sso::login_with_certificate(engine.session()).await;
        if let Some(watcher) = watcher {
            watcher.stop();
        }
        login.context("gov.br certificate login failed")?;
    }

    engine.run_extraction().await?;
    Ok(())
}

/// Sends every event to the console and to a per-run log file named after
/// the start timestamp, like `fap_scraper_20250131_143000.log`.
fn init_logging() -> Result<String> {
    let file_name = format!(
        "fap_scraper_{}.log",
        chrono::Local::now().format("%Y%m%d_%H%M%S")
    );
    let log_file = File::create(&file_name)
        .with_context(|| format!("Failed to create log file {}", file_name))?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(Arc::new(log_file)).with_ansi(false))
        .init();

    Ok(file_name)
}
