//! Shared HTTP client construction.

use std::time::Duration;

use anyhow::Result;
use reqwest::Client;

/// `User-Agent` sent with every registry request.
pub const USER_AGENT: &str = "dephealth/0.1.0";

const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Build the process-wide HTTP client. One client is cloned into every
/// resolver so they share its connection pool.
///
/// `verify_tls = false` disables certificate validation for every request
/// made through the returned client.
pub fn build_client(verify_tls: bool) -> Result<Client> {
    let client = Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .danger_accept_invalid_certs(!verify_tls)
        .build()?;
    Ok(client)
}
