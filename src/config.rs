//! Fixed run configuration. There are no CLI flags: everything the tool
//! needs is pinned here, the same way the target page pins its DOM.

/// Consulta page. The portal redirects to the gov.br SSO when the session
/// has no certificate, see [`crate::sso`].
pub const TARGET_URL: &str = "https://fap.dataprev.gov.br/consultar-fap";

/// SSO entry point, used only when `SSO_LOGIN` is on.
pub const SSO_URL: &str = "https://sso.acesso.gov.br";

/// Fiscal years (vigências) to sweep, in order.
pub const TARGET_YEARS: &[&str] = &["2025", "2026"];

/// Output artifact. The CSV fallback lands next to it as `relatorio_fap.csv`.
pub const REPORT_PATH: &str = "relatorio_fap.xlsx";

/// Hosts pinned to fixed IPs. Validated up front when `VALIDATE_PINS_BEFORE`
/// is set, and turned into `--host-resolver-rules` when the browser is
/// launched by us instead of attached.
pub const HOST_IP_PINS: &[(&str, &str)] = &[
    ("sso.acesso.gov.br", "161.148.168.40"),
    ("fap.dataprev.gov.br", "200.152.35.17"),
];

/// Probe each pinned host/IP pair before touching the browser.
pub const VALIDATE_PINS_BEFORE: bool = true;

/// DevTools endpoint of an already-running browser. `None` switches to the
/// launch path (own browser instance with `BRAVE_PATHS` + profile).
pub const ATTACH_DEBUGGER: Option<&str> = Some("127.0.0.1:9222");

/// Port the provisioned chromedriver listens on.
pub const CHROMEDRIVER_PORT: u16 = 9516;

/// Leave the (externally owned) browser running on exit.
pub const KEEP_OPEN: bool = true;

/// Optional `--proxy-server` value for the launch path.
pub const PROXY_URL: Option<&str> = None;

/// Browser binary candidates for the launch path, first match wins.
pub const BRAVE_PATHS: &[&str] = &[
    r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
    r"C:\Program Files (x86)\BraveSoftware\Brave-Browser\Application\brave.exe",
];

/// Profile directory inside the browser user-data dir.
pub const PROFILE_DIR: &str = "Pessoal";

/// Run the gov.br certificate login before the consulta flow. The portal
/// session used in production is already authenticated, so this stays off.
pub const SSO_LOGIN: bool = false;

/// Watch for and accept the native certificate-selection dialog during SSO.
pub const ACCEPT_NATIVE_CERT_DIALOG: bool = true;

/// Issuer CN of the client certificate to pick in the native dialog.
pub const CERT_ISSUER_CN: &str = "AC SOLUTI Multipla v5";

// Timeouts (seconds)
pub const TIMEOUT_CLICK: u64 = 20;
pub const TIMEOUT_PANEL: u64 = 15;
pub const TIMEOUT_DROPDOWN: u64 = 12;
pub const TIMEOUT_LEAVE_SSO: u64 = 60;
pub const DEVTOOLS_PROBE_TIMEOUT: u64 = 3;

// Settle delays (seconds). The portal reloads the establishment list from
// the backend after a CNPJ root is picked, there is no DOM signal for it.
pub const ESTABLISHMENT_LOAD_DELAY: u64 = 5;
pub const RESULT_SETTLE_DELAY: u64 = 2;
