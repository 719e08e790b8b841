// ABOUTME: HTTP client factory handed to steps that perform web requests
// ABOUTME: Default implementation caches reqwest clients for both TLS modes

use super::error::Result;

/// Abstracts HTTP client creation so hosts can inject pooling, proxies or
/// instrumentation.
pub trait HttpClientFactory: Send + Sync {
    fn http_client(&self, disable_cert_validation: bool) -> reqwest::Client;
}

/// Factory returning shared reqwest clients.
pub struct DefaultHttpClientFactory {
    standard: reqwest::Client,
    insecure: reqwest::Client,
}

impl DefaultHttpClientFactory {
    pub fn new() -> Result<Self> {
        Ok(Self {
            standard: reqwest::Client::builder().build()?,
            insecure: reqwest::Client::builder()
                .danger_accept_invalid_certs(true)
                .build()?,
        })
    }
}

impl HttpClientFactory for DefaultHttpClientFactory {
    fn http_client(&self, disable_cert_validation: bool) -> reqwest::Client {
        if disable_cert_validation {
            self.insecure.clone()
        } else {
            self.standard.clone()
        }
    }
}
