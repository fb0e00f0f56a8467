pub mod browser;
pub mod dropdown;
pub mod extractor;
pub mod selectors;

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use tokio::time::{sleep, Duration};
use tracing::{error, info, warn};

use crate::config;
use crate::export;
use browser::BrowserSession;
use selectors::form;

/// Outcome counters for one full run.
#[derive(Debug, Default)]
pub struct ExtractionStats {
    pub rows_written: usize,
    pub failures: usize,
}

/// Drives the consulta page end to end: sweep vigências, their CNPJ roots
/// and establishments, submit each combination and append the scraped
/// result row.
pub struct ScraperEngine {
    session: BrowserSession,
}

impl ScraperEngine {
    pub fn new(session: BrowserSession) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &BrowserSession {
        &self.session
    }

    pub async fn run_extraction(&self) -> Result<ExtractionStats> {
        info!("Navigating to {}", config::TARGET_URL);
        self.session
            .goto(config::TARGET_URL)
            .await
            .context("Navigation to the consulta page failed")?;

        let mut stats = ExtractionStats::default();
        for year in config::TARGET_YEARS {
            if let Err(e) = self.run_year(year, &mut stats).await {
                error!("Vigência {} aborted: {:#}", year, e);
                stats.failures += 1;
            }
        }

        info!(
            "Extraction finished: {} rows written, {} failures",
            stats.rows_written, stats.failures
        );
        Ok(stats)
    }

    async fn run_year(&self, year: &str, stats: &mut ExtractionStats) -> Result<()> {
        info!("Selecting vigência {}", year);
        if !dropdown::select_value(&self.session, form::YEAR_INPUT, year).await {
            bail!("Could not select vigência {}", year);
        }
        // Brief settle so the backend reloads the CNPJ list for this year.
        sleep(Duration::from_millis(300)).await;

        let cnpj_roots = dropdown::list_options(&self.session, form::CNPJ_ROOT_INPUT)
            .await
            .context("CNPJ root enumeration failed")?;
        info!("Vigência {}: {} CNPJ roots", year, cnpj_roots.len());

        for cnpj in &cnpj_roots {
            if !dropdown::select_value(&self.session, form::CNPJ_ROOT_INPUT, cnpj).await {
                warn!("Skipping CNPJ {}: selection failed", cnpj);
                stats.failures += 1;
                continue;
            }
            sleep(Duration::from_secs(config::ESTABLISHMENT_LOAD_DELAY)).await;

            let establishments =
                match dropdown::list_options(&self.session, form::ESTABLISHMENT_INPUT).await {
                    Ok(list) => list,
                    Err(e) => {
                        warn!("CNPJ {}: establishment enumeration failed: {:#}", cnpj, e);
                        stats.failures += 1;
                        continue;
                    }
                };
            info!("CNPJ {}: {} establishments", cnpj, establishments.len());

            for establishment in &establishments {
                match self.consult_one(year, establishment).await {
                    Ok(path) => {
                        stats.rows_written += 1;
                        info!(
                            "Row appended to {} ({} / {} / {})",
                            path.display(),
                            year,
                            cnpj,
                            establishment
                        );
                    }
                    Err(e) => {
                        warn!("{} / {} failed: {:#}", cnpj, establishment, e);
                        stats.failures += 1;
                    }
                }
            }
        }
        Ok(())
    }

    /// Select one establishment, fire the consulta and persist the scraped
    /// row. Fails only on selection or submit problems; scraping itself is
    /// best-effort.
    async fn consult_one(&self, year: &str, establishment: &str) -> Result<PathBuf> {
        if !dropdown::select_value(&self.session, form::ESTABLISHMENT_INPUT, establishment).await
        {
            bail!("Establishment selection failed");
        }
        dropdown::close_overlays(&self.session).await;

        let button = self
            .session
            .wait_clickable(form::CONSULTAR_BUTTON, config::TIMEOUT_CLICK)
            .await
            .context("Consultar button never became clickable")?;
        let _ = self.session.scroll_into_center(&button).await;
        match button.click().await {
            Ok(()) => sleep(Duration::from_secs(5)).await,
            Err(_) => self
                .session
                .js_click(&button)
                .await
                .context("Consultar click failed even via script")?,
        }
        sleep(Duration::from_secs(config::RESULT_SETTLE_DELAY)).await;

        let record = extractor::extract_result_data(&self.session, year).await;
        export::append_record(Path::new(config::REPORT_PATH), &record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Needs a browser running with --remote-debugging-port=9222 and a
    // chromedriver on the configured port; run with -- --ignored.
    #[tokio::test]
    #[ignore]
    async fn lists_cnpj_roots_on_live_portal() {
        let session = BrowserSession::attach("127.0.0.1:9222").await.unwrap();
        session.goto(config::TARGET_URL).await.unwrap();
        let options = dropdown::list_options(&session, form::CNPJ_ROOT_INPUT)
            .await
            .unwrap();
        assert!(!options.is_empty());
    }
}
