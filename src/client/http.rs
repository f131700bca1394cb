//! Shared HTTP clients with connection pooling.
//!
//! One lazy client per workload so TLS sessions and TCP connections are
//! reused across the whole fan-out instead of rebuilt per request.

use once_cell::sync::Lazy;
use reqwest::Client;
use std::time::Duration;

/// Client for the text-generation endpoints. 90s timeout covers the slowest
/// academic-mode responses.
static GENERATION_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(90))
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create generation HTTP client")
});

/// Client for image generation. Longer timeout; provider renders can be slow.
static IMAGE_CLIENT: Lazy<Client> = Lazy::new(|| {
    Client::builder()
        .timeout(Duration::from_secs(120))
        .pool_max_idle_per_host(8)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .tcp_nodelay(true)
        .build()
        .expect("Failed to create image HTTP client")
});

#[inline]
pub(crate) fn generation_client() -> &'static Client {
    &GENERATION_CLIENT
}

#[inline]
pub(crate) fn image_client() -> &'static Client {
    &IMAGE_CLIENT
}
