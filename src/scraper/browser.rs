use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use thirtyfour::prelude::*;
use thirtyfour::ChromeCapabilities;
use tokio::time::{sleep, Duration};
use tracing::{info, warn};

use crate::config;

const CONNECT_ATTEMPTS: u32 = 3;

/// WebDriver session against the externally-owned browser. `attach` is the
/// production path; `launch` starts a fresh instance with the pinned-host
/// resolver rules and the configured profile.
pub struct BrowserSession {
    driver: WebDriver,
}

impl BrowserSession {
    /// Attach to a browser already running with remote debugging enabled.
    /// Fatal when the DevTools endpoint does not answer.
    pub async fn attach(addr: &str) -> Result<Self> {
        if !devtools_ready(addr).await {
            bail!(
                "DevTools endpoint {} is unreachable. Start the browser with \
                 --remote-debugging-port and run again.",
                addr
            );
        }
        info!("Attaching to browser DevTools at {}", addr);

        let mut caps = DesiredCapabilities::chrome();
        caps.add_experimental_option("debuggerAddress", addr)?;

        let driver = Self::connect(caps).await?;
        Ok(Self { driver })
    }

    /// Start our own browser instance with the active profile.
    pub async fn launch(pins: &[(&str, &str)], proxy: Option<&str>) -> Result<Self> {
        let binary = brave_binary();
        info!("Launching browser binary {}", binary);

        let mut caps = DesiredCapabilities::chrome();
        caps.set_binary(binary)?;
        caps.add_arg(&format!("--user-data-dir={}", brave_user_data_dir().display()))?;
        caps.add_arg(&format!("--profile-directory={}", config::PROFILE_DIR))?;
        if !pins.is_empty() {
            caps.add_arg(&format!("--host-resolver-rules={}", host_resolver_rules(pins)))?;
        }
        if let Some(proxy) = proxy {
            caps.add_arg(&format!("--proxy-server={}", proxy))?;
        }
        if config::KEEP_OPEN {
            // Launched browser outlives the WebDriver session, like the
            // attached one does.
            caps.add_experimental_option("detach", true)?;
        }

        let driver = Self::connect(caps).await?;
        Ok(Self { driver })
    }

    async fn connect(caps: ChromeCapabilities) -> Result<WebDriver> {
        let url = format!("http://localhost:{}", config::CHROMEDRIVER_PORT);
        for attempt in 1..CONNECT_ATTEMPTS {
            match WebDriver::new(&url, caps.clone()).await {
                Ok(driver) => return Ok(driver),
                Err(e) => {
                    warn!(
                        "chromedriver connection attempt {}/{} failed: {}",
                        attempt, CONNECT_ATTEMPTS, e
                    );
                    sleep(Duration::from_millis(1000)).await;
                }
            }
        }
        WebDriver::new(&url, caps).await.with_context(|| {
            format!("Failed to connect to chromedriver at {url} after {CONNECT_ATTEMPTS} attempts")
        })
    }

    pub fn driver(&self) -> &WebDriver {
        &self.driver
    }

    pub async fn goto(&self, url: &str) -> Result<()> {
        self.driver.goto(url).await?;
        Ok(())
    }

    pub async fn current_url(&self) -> Result<String> {
        Ok(self.driver.current_url().await?.to_string())
    }

    pub async fn page_source(&self) -> Result<String> {
        Ok(self.driver.source().await?)
    }

    pub async fn find(&self, xpath: &str) -> Result<WebElement> {
        Ok(self.driver.find(By::XPath(xpath)).await?)
    }

    pub async fn find_all(&self, xpath: &str) -> Result<Vec<WebElement>> {
        Ok(self.driver.find_all(By::XPath(xpath)).await?)
    }

    /// Poll until the element exists in the DOM, displayed or not.
    pub async fn wait_present(&self, xpath: &str, timeout_secs: u64) -> Result<WebElement> {
        let timeout = Duration::from_secs(timeout_secs);
        let start = std::time::Instant::now();

        loop {
            if let Ok(element) = self.driver.find(By::XPath(xpath)).await {
                return Ok(element);
            }

            if start.elapsed() > timeout {
                bail!("Timed out after {}s waiting for presence of {}", timeout_secs, xpath);
            }

            sleep(Duration::from_millis(250)).await;
        }
    }

    /// Poll until the element exists and is displayed.
    pub async fn wait_visible(&self, xpath: &str, timeout_secs: u64) -> Result<WebElement> {
        let timeout = Duration::from_secs(timeout_secs);
        let start = std::time::Instant::now();

        loop {
            if let Ok(element) = self.driver.find(By::XPath(xpath)).await {
                if element.is_displayed().await.unwrap_or(false) {
                    return Ok(element);
                }
            }

            if start.elapsed() > timeout {
                bail!("Timed out after {}s waiting for {}", timeout_secs, xpath);
            }

            sleep(Duration::from_millis(250)).await;
        }
    }

    /// Poll until the element is displayed and enabled.
    pub async fn wait_clickable(&self, xpath: &str, timeout_secs: u64) -> Result<WebElement> {
        let timeout = Duration::from_secs(timeout_secs);
        let start = std::time::Instant::now();

        loop {
            if let Ok(element) = self.driver.find(By::XPath(xpath)).await {
                if element.is_displayed().await.unwrap_or(false)
                    && element.is_enabled().await.unwrap_or(false)
                {
                    return Ok(element);
                }
            }

            if start.elapsed() > timeout {
                bail!("Timed out after {}s waiting for clickable {}", timeout_secs, xpath);
            }

            sleep(Duration::from_millis(250)).await;
        }
    }

    /// Text of the element, or "" when it never shows up. Panel fields are
    /// optional, a missing one must not abort the run.
    pub async fn safe_text(&self, xpath: &str) -> String {
        if let Ok(element) = self.wait_visible(xpath, 10).await {
            if let Ok(text) = element.text().await {
                return text.trim().to_string();
            }
        }
        match self.driver.find(By::XPath(xpath)).await {
            Ok(element) => match element.text().await {
                Ok(text) => text.trim().to_string(),
                Err(_) => String::new(),
            },
            Err(_) => String::new(),
        }
    }

    /// Current value of an input, or "" when absent.
    pub async fn input_value(&self, xpath: &str) -> String {
        match self.driver.find(By::XPath(xpath)).await {
            Ok(element) => match element.prop("value").await {
                Ok(Some(value)) => value.trim().to_string(),
                _ => String::new(),
            },
            Err(_) => String::new(),
        }
    }

    pub async fn scroll_into_center(&self, element: &WebElement) -> Result<()> {
        self.driver
            .execute(
                "arguments[0].scrollIntoView({block:'center', inline:'center'});",
                vec![serde_json::json!(element)],
            )
            .await?;
        Ok(())
    }

    pub async fn js_click(&self, element: &WebElement) -> Result<()> {
        self.driver
            .execute("arguments[0].click();", vec![serde_json::json!(element)])
            .await?;
        Ok(())
    }

    pub async fn execute_json(
        &self,
        script: &str,
        args: Vec<serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let ret = self.driver.execute(script, args).await?;
        Ok(ret.json().clone())
    }

    pub async fn quit(&self) -> Result<()> {
        let driver = self.driver.clone();
        driver.quit().await?;
        Ok(())
    }
}

/// True when `http://{addr}/json/version` answers with JSON.
pub async fn devtools_ready(addr: &str) -> bool {
    let url = format!("http://{addr}/json/version");
    let response = reqwest::Client::new()
        .get(&url)
        .timeout(Duration::from_secs(config::DEVTOOLS_PROBE_TIMEOUT))
        .send()
        .await;
    match response {
        Ok(response) => response.json::<serde_json::Value>().await.is_ok(),
        Err(_) => false,
    }
}

/// `--host-resolver-rules` value for the pinned hosts.
pub fn host_resolver_rules(pins: &[(&str, &str)]) -> String {
    let mut parts: Vec<String> = pins
        .iter()
        .map(|(host, ip)| format!("MAP {host} {ip}"))
        .collect();
    parts.push("EXCLUDE localhost".to_string());
    parts.join(",")
}

fn brave_binary() -> &'static str {
    config::BRAVE_PATHS
        .iter()
        .copied()
        .find(|p| Path::new(p).exists())
        .unwrap_or(config::BRAVE_PATHS[0])
}

fn brave_user_data_dir() -> PathBuf {
    PathBuf::from(std::env::var("LOCALAPPDATA").unwrap_or_default())
        .join("BraveSoftware")
        .join("Brave-Browser")
        .join("User Data")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolver_rules_map_every_pin_and_exclude_localhost() {
        let rules = host_resolver_rules(&[
            ("sso.acesso.gov.br", "161.148.168.40"),
            ("fap.dataprev.gov.br", "200.152.35.17"),
        ]);
        assert_eq!(
            rules,
            "MAP sso.acesso.gov.br 161.148.168.40,MAP fap.dataprev.gov.br 200.152.35.17,EXCLUDE localhost"
        );
    }

    #[test]
    fn resolver_rules_with_no_pins_still_excludes_localhost() {
        assert_eq!(host_resolver_rules(&[]), "EXCLUDE localhost");
    }

    #[tokio::test]
    async fn devtools_probe_fails_fast_on_closed_port() {
        assert!(!devtools_ready("127.0.0.1:1").await);
    }
}
