use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::Name;
use rustls::ClientConfig;
use tracing::debug;

use super::Upstream;
use crate::dns::{build_query, parse_response, DnsResponse};
use crate::error::UpstreamError;

/// Expected content type for DNS-over-HTTPS messages (RFC 8484 §4.2.1)
const DNS_MESSAGE_CONTENT_TYPE: &str = "application/dns-message";

/// ALPN offered for DoH, HTTP/2 first
pub const DOH_ALPN: &[&[u8]] = &[b"h2", b"http/1.1"];

/// Build an HTTP client on top of a prepared rustls configuration.
///
/// Certificate checks come from `tls`, so `--insecure` is carried by its
/// verifier. Each client owns its own connection pool.
pub fn build_client(tls: &ClientConfig, timeout: Duration) -> Result<reqwest::Client, UpstreamError> {
	let client = reqwest::Client::builder()
		.use_preconfigured_tls(tls.clone())
		.timeout(timeout)
		.pool_max_idle_per_host(1)
		.build()?;
	Ok(client)
}

/// DNS-over-HTTPS transport (RFC 8484, POST).
///
/// Every handle has a private client, so workers never share a pooled
/// connection and a replaced handle starts on a fresh one.
pub struct HttpsUpstream {
	client: reqwest::Client,
	url: String,
	timeout: Duration,
}

impl HttpsUpstream {
	pub fn connect(url: String, tls: &ClientConfig, timeout: Duration) -> Result<Self, UpstreamError> {
		let client = build_client(tls, timeout)?;
		Ok(Self { client, url, timeout })
	}
}

#[async_trait]
impl Upstream for HttpsUpstream {
	async fn exchange(&mut self, name: &Name) -> Result<DnsResponse, UpstreamError> {
		// RFC 8484 §4.1: use ID 0 so responses stay cache friendly
		let query_bytes = build_query(name, 0)?;

		let exchange = async {
			let response = self.client
				.post(&self.url)
				.header("Content-Type", DNS_MESSAGE_CONTENT_TYPE)
				.header("Accept", DNS_MESSAGE_CONTENT_TYPE)
				.body(query_bytes)
				.send()
				.await?;

			let status = response.status();
			if !status.is_success() {
				return Err(UpstreamError::HttpStatus(status.as_u16()));
			}
			let body = response.bytes().await?;
			debug!(url = %self.url, response_len = body.len(), "DoH response received");
			Ok::<_, UpstreamError>(body)
		};

		let body = tokio::time::timeout(self.timeout, exchange)
			.await
			.map_err(|_| UpstreamError::Timeout(self.timeout))??;

		parse_response(&body, 0)
	}
}
