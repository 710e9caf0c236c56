use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use url::{Host, Url};

use super::errors::{CrlError, CrlResult};
use super::types::ParsedCrl;
use crate::config::CrlConfig;

/// Retrieves and parses a CRL from a distribution point.
///
/// Recoverable errors (see [`CrlError::is_recoverable`]) are local to the URL and move the
/// caller on to the next distribution point. Any other error aborts the walk.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrlFetcher: Send + Sync + 'static {
    async fn fetch(&self, url: &str) -> CrlResult<ParsedCrl>;
}

/// HTTP(S) CRL fetcher with a per-request timeout and a response size cap.
#[derive(Debug, Clone)]
pub struct HttpCrlFetcher {
    client: Client,
    request_timeout: Duration,
    max_response_bytes: usize,
    allow_private_hosts: bool,
}

impl HttpCrlFetcher {
    /// Returns an error if the HTTP client cannot be initialized
    pub fn new(config: &CrlConfig) -> CrlResult<Self> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder().timeout(request_timeout).build()?;

        Ok(Self {
            client,
            request_timeout,
            max_response_bytes: config.max_response_bytes,
            allow_private_hosts: config.allow_private_hosts,
        })
    }
}

#[async_trait]
impl CrlFetcher for HttpCrlFetcher {
    async fn fetch(&self, url: &str) -> CrlResult<ParsedCrl> {
        if !is_valid_crl_url(url, self.allow_private_hosts) {
            return Err(CrlError::InvalidUrl(url.to_string()));
        }

        debug!("Fetching CRL from: {}", url);

        let mut response = match timeout(self.request_timeout, self.client.get(url).send()).await
        {
            Ok(result) => result.map_err(transport_error)?,
            Err(_) => return Err(CrlError::Timeout),
        };

        if !response.status().is_success() {
            return Err(CrlError::Custom(format!(
                "HTTP error {}: failed to fetch CRL from {}",
                response.status(),
                url
            )));
        }

        if response
            .content_length()
            .is_some_and(|len| len > self.max_response_bytes as u64)
        {
            return Err(CrlError::ResponseTooLarge {
                limit: self.max_response_bytes,
            });
        }

        // The body is read in chunks so a missing or lying Content-Length cannot exceed the cap
        let mut body = Vec::new();
        loop {
            let chunk = match timeout(self.request_timeout, response.chunk()).await {
                Ok(result) => result.map_err(transport_error)?,
                Err(_) => return Err(CrlError::Timeout),
            };
            let Some(chunk) = chunk else {
                break;
            };
            if body.len() + chunk.len() > self.max_response_bytes {
                return Err(CrlError::ResponseTooLarge {
                    limit: self.max_response_bytes,
                });
            }
            body.extend_from_slice(&chunk);
        }

        let crl = ParsedCrl::from_bytes(&body)?;
        info!("Fetched CRL from {} ({} bytes)", url, body.len());
        Ok(crl)
    }
}

/// The client's own timeout surfaces as a reqwest error.
fn transport_error(error: reqwest::Error) -> CrlError {
    if error.is_timeout() {
        CrlError::Timeout
    } else {
        CrlError::Http(error)
    }
}

/// Validate that a URL is suitable for fetching a CRL.
///
/// Only http and https with a host are accepted. Unless private hosts are allowed, this
/// rejects:
/// - localhost
/// - loopback, unspecified and private IPv4 addresses (10/8, 172.16/12, 192.168/16)
/// - link-local addresses (169.254/16, fe80::/10)
/// - IPv6 loopback, unspecified and unique local (fc00::/7) addresses
/// - IPv4-mapped IPv6 forms of any rejected IPv4 address
pub fn is_valid_crl_url(url: &str, allow_private_hosts: bool) -> bool {
    let Ok(parsed_url) = Url::parse(url) else {
        return false;
    };

    if !matches!(parsed_url.scheme(), "http" | "https") {
        return false;
    }

    let Some(host) = parsed_url.host() else {
        return false;
    };

    if allow_private_hosts {
        return true;
    }

    let rejected = match host {
        Host::Domain(domain) => {
            let domain = domain.trim_end_matches('.').to_ascii_lowercase();
            domain == "localhost" || domain.ends_with(".localhost")
        }
        Host::Ipv4(ip) => is_restricted_ipv4(ip),
        Host::Ipv6(ip) => is_restricted_ipv6(ip),
    };

    if rejected {
        warn!("Rejecting CRL URL on a local or private host: {}", url);
        return false;
    }

    true
}

fn is_restricted_ipv4(ip: Ipv4Addr) -> bool {
    ip.is_loopback() || ip.is_private() || ip.is_link_local() || ip.is_unspecified()
}

fn is_restricted_ipv6(ip: Ipv6Addr) -> bool {
    if let Some(mapped) = ip.to_ipv4_mapped() {
        return is_restricted_ipv4(mapped);
    }

    let first_segment = ip.segments()[0];
    ip.is_loopback()
        || ip.is_unspecified()
        || (first_segment & 0xffc0) == 0xfe80
        || (first_segment & 0xfe00) == 0xfc00
}
