//! Provisions and supervises the local chromedriver process.
//!
//! The driver binary is looked up next to the executable and downloaded
//! from the chrome-for-testing archive when missing, so a fresh machine
//! only needs the browser itself installed.

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

const READINESS_TIMEOUT_SECS: u64 = 15;

#[cfg(windows)]
const DRIVER_FILE_NAME: &str = "chromedriver.exe";
#[cfg(not(windows))]
const DRIVER_FILE_NAME: &str = "chromedriver";

pub struct ChromeDriverManager {
    driver_path: PathBuf,
    process: Arc<Mutex<Option<Child>>>,
}

impl ChromeDriverManager {
    pub fn new() -> Self {
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(|d| d.to_path_buf()))
            .unwrap_or_else(|| PathBuf::from("."));

        Self {
            driver_path: exe_dir.join(DRIVER_FILE_NAME),
            process: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn ensure_driver_available(&self) -> Result<()> {
        if self.driver_path.exists() {
            debug!("chromedriver found at {:?}", self.driver_path);
            return Ok(());
        }
        info!(
            "chromedriver not found at {:?}, downloading latest stable build",
            self.driver_path
        );
        self.download_chromedriver()
            .await
            .context("Failed to download chromedriver. Check your internet connection.")
    }

    pub async fn start_driver(&self, port: u16) -> Result<()> {
        self.ensure_driver_available().await?;

        let mut process_guard = self.process.lock().await;
        if process_guard.is_some() {
            debug!("chromedriver is already running on port {}", port);
            return Ok(());
        }

        info!("Starting chromedriver on port {}", port);
        let mut cmd = Command::new(&self.driver_path);
        cmd.arg(format!("--port={}", port))
            .stdout(Stdio::null())
            .stderr(Stdio::null());

        let child = cmd
            .spawn()
            .with_context(|| format!("Failed to start chromedriver from {:?}", self.driver_path))?;
        *process_guard = Some(child);

        if !self.wait_for_readiness(port, READINESS_TIMEOUT_SECS).await? {
            bail!(
                "chromedriver did not become ready on port {} within {}s",
                port,
                READINESS_TIMEOUT_SECS
            );
        }

        info!("chromedriver ready on port {}", port);
        Ok(())
    }

    pub async fn stop_driver(&self) -> Result<()> {
        let mut process_guard = self.process.lock().await;
        if let Some(mut child) = process_guard.take() {
            let _ = child.kill();
            let _ = child.wait();
            info!("chromedriver stopped");
        }
        Ok(())
    }

    async fn download_chromedriver(&self) -> Result<()> {
        let version = self.get_latest_version().await?;
        let platform = platform_slug();
        info!("Downloading chromedriver {} ({})", version, platform);

        let download_url = format!(
            "https://edgedl.me.gvt1.com/edgedl/chrome/chrome-for-testing/{}/{}/chromedriver-{}.zip",
            version, platform, platform
        );

        let response = reqwest::get(&download_url)
            .await
            .with_context(|| format!("Request to {} failed", download_url))?;
        if !response.status().is_success() {
            bail!("chromedriver download returned HTTP {}", response.status());
        }
        let zip_data = response.bytes().await?;

        let zip_path = std::env::temp_dir().join("chromedriver.zip");
        fs::write(&zip_path, &zip_data)
            .with_context(|| format!("Failed to write {:?}", zip_path))?;

        self.extract_driver(&zip_path)?;
        let _ = fs::remove_file(&zip_path);

        info!("chromedriver installed at {:?}", self.driver_path);
        Ok(())
    }

    fn extract_driver(&self, zip_path: &PathBuf) -> Result<()> {
        let file = fs::File::open(zip_path)?;
        let mut archive = zip::ZipArchive::new(file).context("Invalid chromedriver archive")?;

        // The archive nests the binary under chromedriver-<platform>/.
        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            let name = entry.name().to_string();
            if name.ends_with(DRIVER_FILE_NAME) && !name.ends_with('/') {
                debug!("Extracting {}", name);
                let mut outfile = fs::File::create(&self.driver_path)
                    .with_context(|| format!("Failed to create {:?}", self.driver_path))?;
                std::io::copy(&mut entry, &mut outfile)?;
                self.mark_executable()?;
                return Ok(());
            }
        }
        bail!("chromedriver binary not found inside the downloaded archive");
    }

    #[cfg(unix)]
    fn mark_executable(&self) -> Result<()> {
        use std::os::unix::fs::PermissionsExt;
        let mut perms = fs::metadata(&self.driver_path)?.permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&self.driver_path, perms)?;
        Ok(())
    }

    #[cfg(not(unix))]
    fn mark_executable(&self) -> Result<()> {
        Ok(())
    }

    async fn wait_for_readiness(&self, port: u16, timeout_secs: u64) -> Result<bool> {
        let client = reqwest::Client::new();
        let url = format!("http://localhost:{}/status", port);
        let timeout = tokio::time::Duration::from_secs(timeout_secs);
        let start = tokio::time::Instant::now();

        while start.elapsed() < timeout {
            match client.get(&url).send().await {
                Ok(response) if response.status().is_success() => return Ok(true),
                Ok(_) | Err(_) => {}
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
        }
        warn!("chromedriver /status never answered on port {}", port);
        Ok(false)
    }

    async fn get_latest_version(&self) -> Result<String> {
        // chrome-for-testing publishes a plain-text stable version marker.
        let response = reqwest::get(
            "https://googlechromelabs.github.io/chrome-for-testing/LATEST_RELEASE_STABLE",
        )
        .await
        .context("Failed to query the chrome-for-testing release channel")?;
        let version = response.text().await?.trim().to_string();
        if version.is_empty() {
            bail!("chrome-for-testing release channel returned an empty version");
        }
        debug!("Latest stable chromedriver version: {}", version);
        Ok(version)
    }
}

fn platform_slug() -> &'static str {
    if cfg!(target_os = "windows") {
        "win64"
    } else if cfg!(target_os = "macos") {
        if cfg!(target_arch = "aarch64") {
            "mac-arm64"
        } else {
            "mac-x64"
        }
    } else {
        "linux64"
    }
}

impl Drop for ChromeDriverManager {
    fn drop(&mut self) {
        if let Ok(mut process_guard) = self.process.try_lock() {
            if let Some(mut child) = process_guard.take() {
                let _ = child.kill();
                let _ = child.wait();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_slug_is_a_known_archive_suffix() {
        let slug = platform_slug();
        assert!(["win64", "linux64", "mac-x64", "mac-arm64"].contains(&slug));
    }

    #[tokio::test]
    async fn readiness_poll_gives_up_on_a_dead_port() {
        let manager = ChromeDriverManager::new();
        let ready = manager.wait_for_readiness(1, 1).await.unwrap();
        assert!(!ready);
    }
}
