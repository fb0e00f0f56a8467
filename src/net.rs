//! Pre-flight TLS probe for the pinned host/IP pairs. Connects to the fixed
//! IP with SNI set to the hostname, keeps chain verification on but skips
//! the built-in hostname check so the SAN list can be inspected and logged
//! before deciding.

use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{error, info};
use x509_parser::prelude::*;

const PROBE_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Error)]
pub enum PinError {
    #[error("TCP connect to {ip}:443 for {host} failed: {source}")]
    Connect {
        host: String,
        ip: String,
        #[source]
        source: std::io::Error,
    },
    #[error("TLS handshake with {host} at {ip} failed: {source}")]
    Handshake {
        host: String,
        ip: String,
        #[source]
        source: native_tls::Error,
    },
    #[error("could not read peer certificate for {host}: {detail}")]
    Certificate { host: String, detail: String },
    #[error("HTTP probe of {host} failed: {source}")]
    Request {
        host: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{host} is not covered by certificate SANs {sans:?}")]
    SanMismatch { host: String, sans: Vec<String> },
}

/// What one successful probe saw.
#[derive(Debug)]
pub struct PinProbe {
    pub subject: String,
    pub sans: Vec<String>,
    pub handshake_ms: u128,
    pub status_line: String,
}

/// Handshake with `ip:443` pretending to be `host` and issue a HEAD request.
pub async fn probe_tls_http(host: &str, ip: &str) -> Result<PinProbe, PinError> {
    let connect_err = |source| PinError::Connect {
        host: host.to_string(),
        ip: ip.to_string(),
        source,
    };

    let tcp = tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect((ip, 443)))
        .await
        .map_err(|_| {
            connect_err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "connect timed out",
            ))
        })?
        .map_err(connect_err)?;

    let handshake_err = |source| PinError::Handshake {
        host: host.to_string(),
        ip: ip.to_string(),
        source,
    };

    // Chain verification stays on; only the hostname check is ours.
    let connector = native_tls::TlsConnector::builder()
        .danger_accept_invalid_hostnames(true)
        .build()
        .map_err(handshake_err)?;
    let connector = tokio_native_tls::TlsConnector::from(connector);

    let started = Instant::now();
    let mut tls = connector.connect(host, tcp).await.map_err(handshake_err)?;
    let handshake_ms = started.elapsed().as_millis();

    let cert_err = |detail: String| PinError::Certificate {
        host: host.to_string(),
        detail,
    };
    let der = tls
        .get_ref()
        .peer_certificate()
        .map_err(|e| cert_err(e.to_string()))?
        .ok_or_else(|| cert_err("no certificate presented".into()))?
        .to_der()
        .map_err(|e| cert_err(e.to_string()))?;

    let (_, cert) =
        X509Certificate::from_der(&der).map_err(|e| cert_err(e.to_string()))?;
    let subject = cert.subject().to_string();
    let mut sans = Vec::new();
    if let Ok(Some(ext)) = cert.subject_alternative_name() {
        for name in &ext.value.general_names {
            if let GeneralName::DNSName(dns) = name {
                sans.push(dns.to_string());
            }
        }
    }

    let request_err = |source| PinError::Request {
        host: host.to_string(),
        source,
    };
    let request = format!("HEAD / HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    tls.write_all(request.as_bytes()).await.map_err(request_err)?;

    let status_line = read_status_line(host, &mut tls, PROBE_TIMEOUT).await?;

    Ok(PinProbe {
        subject,
        sans,
        handshake_ms,
        status_line,
    })
}

/// First line of the response, read within `deadline`. A server that closes
/// without answering yields an empty line; one that stays silent past the
/// deadline fails the probe.
async fn read_status_line<R>(
    host: &str,
    stream: &mut R,
    deadline: Duration,
) -> Result<String, PinError>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let request_err = |source| PinError::Request {
        host: host.to_string(),
        source,
    };

    let mut buf = vec![0u8; 1024];
    let n = tokio::time::timeout(deadline, stream.read(&mut buf))
        .await
        .map_err(|_| {
            request_err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                "response read timed out",
            ))
        })?
        .map_err(request_err)?;
    let head = String::from_utf8_lossy(&buf[..n]);
    Ok(head.lines().next().unwrap_or("").trim().to_string())
}

/// Probe every pinned pair and fail the run if any certificate does not
/// cover its hostname.
pub async fn validate_host_pins(pins: &[(&str, &str)]) -> Result<(), PinError> {
    for (host, ip) in pins {
        info!("Probing {} via pinned IP {}", host, ip);
        let probe = probe_tls_http(host, ip).await?;
        info!(
            "{}: handshake {} ms, subject {}, response \"{}\"",
            host, probe.handshake_ms, probe.subject, probe.status_line
        );
        if !probe.sans.iter().any(|san| host_matches_san(host, san)) {
            error!(
                "Certificate served at {} does not cover {} (SANs: {:?})",
                ip, host, probe.sans
            );
            return Err(PinError::SanMismatch {
                host: host.to_string(),
                sans: probe.sans,
            });
        }
        info!("{} -> {} pin accepted ({} SAN entries)", host, ip, probe.sans.len());
    }
    Ok(())
}

/// Case-insensitive SAN match. A leading `*.` wildcard covers exactly one
/// label, per RFC 6125.
pub fn host_matches_san(host: &str, san: &str) -> bool {
    let host = host.to_ascii_lowercase();
    let san = san.to_ascii_lowercase();
    if let Some(suffix) = san.strip_prefix("*.") {
        match host.split_once('.') {
            Some((label, rest)) => !label.is_empty() && rest == suffix,
            None => false,
        }
    } else {
        host == san
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn san_exact_match_ignores_case() {
        assert!(host_matches_san("fap.dataprev.gov.br", "fap.dataprev.gov.br"));
        assert!(host_matches_san("fap.dataprev.gov.br", "FAP.Dataprev.GOV.br"));
        assert!(!host_matches_san("fap.dataprev.gov.br", "dataprev.gov.br"));
    }

    #[test]
    fn san_wildcard_covers_one_label() {
        assert!(host_matches_san("sso.acesso.gov.br", "*.acesso.gov.br"));
        assert!(!host_matches_san("a.b.acesso.gov.br", "*.acesso.gov.br"));
        assert!(!host_matches_san("acesso.gov.br", "*.acesso.gov.br"));
        assert!(!host_matches_san("sso", "*.acesso.gov.br"));
    }

    #[test]
    fn mismatch_error_names_host_and_sans() {
        let err = PinError::SanMismatch {
            host: "fap.dataprev.gov.br".into(),
            sans: vec!["outro.gov.br".into()],
        };
        let text = err.to_string();
        assert!(text.contains("fap.dataprev.gov.br"));
        assert!(text.contains("outro.gov.br"));
    }

    #[tokio::test]
    async fn status_line_is_the_first_response_line() {
        let (mut client, mut server) = tokio::io::duplex(1024);
        server
            .write_all(b"HTTP/1.1 200 OK\r\nServer: x\r\n\r\n")
            .await
            .unwrap();
        drop(server);

        let line = read_status_line("fap.dataprev.gov.br", &mut client, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(line, "HTTP/1.1 200 OK");
    }

    #[tokio::test]
    async fn closed_connection_yields_an_empty_status_line() {
        let (mut client, server) = tokio::io::duplex(64);
        drop(server);

        let line = read_status_line("fap.dataprev.gov.br", &mut client, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(line, "");
    }

    #[tokio::test]
    async fn silent_server_times_out_as_a_request_error() {
        let (mut client, _server) = tokio::io::duplex(64);

        let err = read_status_line("fap.dataprev.gov.br", &mut client, Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            PinError::Request { source, .. } => {
                assert_eq!(source.kind(), std::io::ErrorKind::TimedOut)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
