pub mod https;
pub mod quic;
pub mod tcp;
#[cfg(test)]
pub(crate) mod testing;
pub mod tls;
pub mod udp;

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use hickory_proto::rr::Name;
use rustls::ClientConfig;

use crate::dns::DnsResponse;
use crate::error::UpstreamError;
use crate::resolver::parse_upstream;
use crate::transport::{Protocol, UpstreamAddr, UpstreamOptions};

/// A live handle to the resolver under test, owned by exactly one worker.
#[async_trait]
pub trait Upstream: Send {
	/// Send one A query for `name` and wait for a validated response,
	/// bounded by the configured timeout.
	async fn exchange(&mut self, name: &Name) -> Result<DnsResponse, UpstreamError>;
}

/// Produces fresh upstream handles; called again to replace a broken one.
#[async_trait]
pub trait Connector: Send + Sync {
	async fn connect(&self) -> Result<Box<dyn Upstream>, UpstreamError>;
}

/// Connector for a parsed upstream address.
///
/// Holds the per-run pieces prepared up front (the parsed address and TLS
/// configuration). Every `connect` builds a new, unshared handle.
pub struct UpstreamConnector {
	addr: UpstreamAddr,
	options: UpstreamOptions,
	tls: Option<Arc<ClientConfig>>,
}

/// Validate an address and build a connector for it.
///
/// No network I/O happens here; this is the pre-flight check run once
/// before any worker starts.
pub fn resolve(address: &str, options: UpstreamOptions) -> Result<UpstreamConnector, UpstreamError> {
	let addr = parse_upstream(address)?;

	let tls = match addr.protocol {
		Protocol::Tls => Some(tls::client_config(options.skip_verify, &[])?),
		Protocol::Quic => Some(tls::client_config(options.skip_verify, &[quic::DOQ_ALPN])?),
		Protocol::Https => Some(tls::client_config(options.skip_verify, https::DOH_ALPN)?),
		Protocol::Udp | Protocol::Tcp => None,
	};

	Ok(UpstreamConnector {
		addr,
		options,
		tls,
	})
}

impl UpstreamConnector {
	pub const fn addr(&self) -> &UpstreamAddr {
		&self.addr
	}

	fn tls_config(&self) -> Result<Arc<ClientConfig>, UpstreamError> {
		self.tls.clone()
			.ok_or_else(|| UpstreamError::Config("missing TLS configuration".to_string()))
	}
}

#[async_trait]
impl Connector for UpstreamConnector {
	async fn connect(&self) -> Result<Box<dyn Upstream>, UpstreamError> {
		let timeout = self.options.timeout;
		let upstream: Box<dyn Upstream> = match self.addr.protocol {
			Protocol::Udp => {
				let server = lookup(&self.addr).await?;
				Box::new(udp::UdpUpstream::connect(server, timeout).await?)
			}
			Protocol::Tcp => {
				let server = lookup(&self.addr).await?;
				Box::new(tcp::TcpUpstream::connect(server, timeout).await?)
			}
			Protocol::Tls => {
				let server = lookup(&self.addr).await?;
				Box::new(tls::TlsUpstream::connect(
					server, &self.addr.host, self.tls_config()?, timeout,
				).await?)
			}
			Protocol::Https => {
				let url = self.addr.url.clone().unwrap_or_else(|| self.addr.to_string());
				Box::new(https::HttpsUpstream::connect(url, &*self.tls_config()?, timeout)?)
			}
			Protocol::Quic => {
				let server = lookup(&self.addr).await?;
				Box::new(quic::QuicUpstream::connect(
					server, &self.addr.host, self.tls_config()?, timeout,
				).await?)
			}
		};
		Ok(upstream)
	}
}

/// Resolve the upstream host to a socket address, preferring the first
/// address the system returns.
async fn lookup(addr: &UpstreamAddr) -> Result<SocketAddr, UpstreamError> {
	let mut addrs = tokio::net::lookup_host((addr.host.as_str(), addr.port))
		.await
		.map_err(|source| UpstreamError::Resolve {
			host: addr.host.clone(),
			source,
		})?;
	addrs.next().ok_or_else(|| UpstreamError::NoAddress {
		host: addr.host.clone(),
	})
}

/// Unspecified local address of the same family as `server`
fn bind_addr(server: SocketAddr) -> SocketAddr {
	if server.is_ipv4() {
		SocketAddr::from(([0, 0, 0, 0], 0))
	} else {
		SocketAddr::from(([0u16; 8], 0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::time::Duration;

	use crate::dns::parse_name;
	use crate::upstream::testing::{
		spawn_doh_responder, spawn_doq_responder, spawn_dot_responder, spawn_tcp_responder,
	};

	fn options() -> UpstreamOptions {
		UpstreamOptions {
			timeout: Duration::from_secs(2),
			skip_verify: false,
		}
	}

	fn insecure() -> UpstreamOptions {
		UpstreamOptions {
			skip_verify: true,
			..options()
		}
	}

	async fn exchange_all(connector: &UpstreamConnector, rounds: usize) -> Result<(), UpstreamError> {
		let name = parse_name("example.org")?;
		let mut upstream = connector.connect().await?;
		for _ in 0..rounds {
			upstream.exchange(&name).await?;
		}
		Ok(())
	}

	#[test]
	fn test_resolve_every_scheme() {
		for (address, protocol) in [
			("127.0.0.1:53", Protocol::Udp),
			("tcp://127.0.0.1:53", Protocol::Tcp),
			("tls://dns.google", Protocol::Tls),
			("https://dns.google/dns-query", Protocol::Https),
			("quic://dns.adguard-dns.com", Protocol::Quic),
		] {
			let connector = resolve(address, options()).unwrap();
			assert_eq!(connector.addr().protocol, protocol, "{}", address);
		}
	}

	#[test]
	fn test_resolve_prepares_tls_only_when_needed() {
		let udp = resolve("udp://127.0.0.1", options()).unwrap();
		assert!(udp.tls.is_none());

		let tls = resolve("tls://127.0.0.1", options()).unwrap();
		assert!(tls.tls.as_ref().unwrap().alpn_protocols.is_empty());

		let doh = resolve("https://127.0.0.1/dns-query", options()).unwrap();
		assert_eq!(doh.tls.as_ref().unwrap().alpn_protocols[0], b"h2".to_vec());
	}

	#[test]
	fn test_resolve_rejects_bad_address() {
		assert!(resolve("ftp://127.0.0.1", options()).is_err());
		assert!(resolve("", options()).is_err());
	}

	#[tokio::test]
	async fn test_lookup_ip_literal() {
		let addr = parse_upstream("tcp://127.0.0.1:5353").unwrap();
		let server = lookup(&addr).await.unwrap();
		assert_eq!(server, "127.0.0.1:5353".parse::<SocketAddr>().unwrap());
	}

	#[test]
	fn test_bind_addr_matches_family() {
		let v4: SocketAddr = "1.1.1.1:53".parse().unwrap();
		let v6: SocketAddr = "[2606:4700::1111]:53".parse().unwrap();
		assert!(bind_addr(v4).is_ipv4());
		assert!(bind_addr(v6).is_ipv6());
	}

	#[tokio::test]
	async fn test_tcp_through_resolve() {
		let server = spawn_tcp_responder().await;
		let connector = resolve(&format!("tcp://{}", server), options()).unwrap();
		exchange_all(&connector, 3).await.unwrap();
	}

	#[tokio::test]
	async fn test_dot_insecure_accepts_self_signed() {
		let server = spawn_dot_responder().await;
		let connector = resolve(&format!("tls://{}", server), insecure()).unwrap();
		exchange_all(&connector, 3).await.unwrap();
	}

	#[tokio::test]
	async fn test_dot_verification_rejects_self_signed() {
		let server = spawn_dot_responder().await;
		let connector = resolve(&format!("tls://{}", server), options()).unwrap();
		assert!(connector.connect().await.is_err());
	}

	#[tokio::test]
	async fn test_doq_insecure_accepts_self_signed() {
		let server = spawn_doq_responder();
		let connector = resolve(&format!("quic://{}", server), insecure()).unwrap();
		exchange_all(&connector, 3).await.unwrap();
	}

	#[tokio::test]
	async fn test_doq_verification_rejects_self_signed() {
		let server = spawn_doq_responder();
		let connector = resolve(&format!("quic://{}", server), options()).unwrap();
		assert!(connector.connect().await.is_err());
	}

	#[tokio::test]
	async fn test_doh_insecure_accepts_self_signed() {
		let server = spawn_doh_responder(true, false).await;
		let connector = resolve(&server.url, insecure()).unwrap();
		exchange_all(&connector, 3).await.unwrap();
	}

	#[tokio::test]
	async fn test_doh_verification_rejects_self_signed() {
		let server = spawn_doh_responder(true, false).await;
		let connector = resolve(&server.url, options()).unwrap();
		let result = exchange_all(&connector, 1).await;
		assert!(matches!(result, Err(UpstreamError::Http(_))));
	}

	#[tokio::test]
	async fn test_doh_handles_do_not_share_connections() {
		let server = spawn_doh_responder(false, true).await;
		let connector = UpstreamConnector {
			addr: UpstreamAddr {
				protocol: Protocol::Https,
				host: "127.0.0.1".to_string(),
				port: 0,
				url: Some(server.url.clone()),
			},
			options: options(),
			tls: Some(tls::client_config(false, https::DOH_ALPN).unwrap()),
		};
		let name = parse_name("example.org").unwrap();

		let mut failed = connector.connect().await.unwrap();
		let first = failed.exchange(&name).await;
		assert!(matches!(first, Err(UpstreamError::HttpStatus(500))));
		drop(failed);

		// The replacement and a second worker's handle each dial their own
		let mut replacement = connector.connect().await.unwrap();
		replacement.exchange(&name).await.unwrap();
		let mut other = connector.connect().await.unwrap();
		other.exchange(&name).await.unwrap();
		replacement.exchange(&name).await.unwrap();

		assert_eq!(server.connections(), 3);
	}
}
