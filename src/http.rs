use crate::config::env_parse;
use reqwest::Client;
use std::time::Duration;

/// Client for request/response calls, bounded by `HTTP_TIMEOUT_SECS`.
pub fn build_client() -> Client {
    let timeout = env_parse::<u64>("HTTP_TIMEOUT_SECS").unwrap_or(15);
    Client::builder()
        .timeout(Duration::from_secs(timeout))
        .connect_timeout(connect_timeout())
        .build()
        .unwrap_or_else(|_| Client::new())
}

/// Client for long-lived streamed responses. Only the connect phase is
/// bounded; the body is consumed until the remote side closes it.
pub fn build_streaming_client() -> Client {
    Client::builder()
        .connect_timeout(connect_timeout())
        .build()
        .unwrap_or_else(|_| Client::new())
}

fn connect_timeout() -> Duration {
    Duration::from_secs(env_parse::<u64>("HTTP_CONNECT_TIMEOUT_SECS").unwrap_or(5))
}
