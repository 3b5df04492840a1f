use crate::error::{Result, SourceError};
use reqwest::{Client, Response};
use std::time::Duration;
use tracing::debug;

pub const USER_AGENT: &str = concat!("poimap/", env!("CARGO_PKG_VERSION"));

/// Shared HTTP client setup for every collaborator.
pub fn build_client(timeout_secs: u64) -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .connect_timeout(Duration::from_secs((timeout_secs / 2).max(1)))
        .pool_idle_timeout(Duration::from_secs(90))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()?;
    Ok(client)
}

/// Turn a non-success status into [`SourceError::Status`].
pub(crate) fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    // Query strings may carry access tokens.
    let mut url = response.url().clone();
    url.set_query(None);
    debug!("{} answered {}", url, status);
    Err(SourceError::Status {
        url: url.to_string(),
        status: status.as_u16(),
    })
}
