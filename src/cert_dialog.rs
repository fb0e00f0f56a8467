//! Native certificate-dialog watcher. The certificate picker is an OS-level
//! dialog that WebDriver cannot see, so a side thread polls the desktop and
//! accepts it while the SSO flow runs in the foreground.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info};

const POLL_INTERVAL: Duration = Duration::from_millis(400);
const JOIN_TIMEOUT: Duration = Duration::from_millis(500);

pub struct CertDialogWatcher {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl CertDialogWatcher {
    /// Spawn the watcher; it exits on its own once the dialog was accepted
    /// or `timeout` passed.
    pub fn spawn(timeout: Duration) -> Self {
        info!(
            "Watching for the native certificate dialog (expected issuer: {})",
            crate::config::CERT_ISSUER_CN
        );
        let stop = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&stop);
        let handle = std::thread::spawn(move || watch_loop(flag, timeout));
        Self {
            stop,
            handle: Some(handle),
        }
    }

    /// Signal the thread and wait briefly for it. A dialog API call can
    /// block past the deadline; the thread is then left to die with the
    /// process instead of holding up shutdown.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let deadline = Instant::now() + JOIN_TIMEOUT;
            while !handle.is_finished() && Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(50));
            }
            if handle.is_finished() {
                let _ = handle.join();
            } else {
                debug!("Certificate-dialog watcher still busy, detaching");
            }
        }
    }
}

fn watch_loop(stop: Arc<AtomicBool>, timeout: Duration) {
    if !platform::SUPPORTED {
        debug!("Native dialog automation is not available on this platform");
        return;
    }
    let deadline = Instant::now() + timeout;
    while !stop.load(Ordering::Relaxed) && Instant::now() < deadline {
        if platform::try_accept_dialog() {
            info!("Accepted the native certificate dialog");
            return;
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

#[cfg(windows)]
mod platform {
    use uiautomation::controls::ControlType;
    use uiautomation::UIAutomation;

    pub(super) const SUPPORTED: bool = true;

    const DIALOG_TITLES: [&str; 5] = [
        "Selecione um certificado",
        "Selecionar certificado",
        "Select a certificate",
        "Confirmar certificado",
        "Escolher certificado",
    ];

    const ACCEPT_BUTTONS: [&str; 6] = ["OK", "Ok", "Continuar", "Selecionar", "Select", "Permitir"];

    /// One scan of the desktop. True when a dialog was found and accepted.
    pub(super) fn try_accept_dialog() -> bool {
        let automation = match UIAutomation::new() {
            Ok(automation) => automation,
            Err(_) => return false,
        };

        for title in DIALOG_TITLES {
            let dialog = match automation
                .create_matcher()
                .contains_name(title)
                .timeout(200)
                .find_first()
            {
                Ok(dialog) => dialog,
                Err(_) => continue,
            };
            let _ = dialog.set_focus();

            for button_name in ACCEPT_BUTTONS {
                let button = automation
                    .create_matcher()
                    .from(dialog.clone())
                    .control_type(ControlType::Button)
                    .name(button_name)
                    .timeout(100)
                    .find_first();
                if let Ok(button) = button {
                    if button.click().is_ok() {
                        return true;
                    }
                }
            }

            // No known button label; Enter confirms the default choice.
            if dialog.send_keys("{enter}", 10).is_ok() {
                return true;
            }
        }
        false
    }
}

#[cfg(not(windows))]
mod platform {
    pub(super) const SUPPORTED: bool = false;

    pub(super) fn try_accept_dialog() -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_returns_promptly_while_watcher_is_polling() {
        let watcher = CertDialogWatcher::spawn(Duration::from_secs(30));
        let started = Instant::now();
        watcher.stop();
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn watcher_with_zero_timeout_finishes_on_its_own() {
        let watcher = CertDialogWatcher::spawn(Duration::from_millis(0));
        std::thread::sleep(Duration::from_millis(100));
        watcher.stop();
    }
}
