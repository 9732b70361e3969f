use std::fmt;
use std::time::Duration;

use crate::domains::QuerySource;

/// Transport used to reach the upstream resolver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
	Udp,
	Tcp,
	Tls,
	Https,
	Quic,
}

impl Protocol {
	/// Port used when the address does not name one.
	pub const fn default_port(self) -> u16 {
		match self {
			Protocol::Udp | Protocol::Tcp => 53,
			Protocol::Tls | Protocol::Quic => 853,
			Protocol::Https => 443,
		}
	}

	pub const fn name(self) -> &'static str {
		match self {
			Protocol::Udp => "UDP",
			Protocol::Tcp => "TCP",
			Protocol::Tls => "TLS",
			Protocol::Https => "HTTPS",
			Protocol::Quic => "QUIC",
		}
	}
}

impl fmt::Display for Protocol {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.name())
	}
}

/// A parsed, scheme-qualified upstream address.
///
/// `host` is either an IP literal (without brackets) or a name that is
/// looked up when a connection is made. `url` is only set for DoH.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAddr {
	pub protocol: Protocol,
	pub host: String,
	pub port: u16,
	pub url: Option<String>,
}

impl fmt::Display for UpstreamAddr {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		if let Some(url) = &self.url {
			return f.write_str(url);
		}
		let scheme = match self.protocol {
			Protocol::Udp => "udp",
			Protocol::Tcp => "tcp",
			Protocol::Tls => "tls",
			Protocol::Https => "https",
			Protocol::Quic => "quic",
		};
		if self.host.contains(':') {
			write!(f, "{}://[{}]:{}", scheme, self.host, self.port)
		} else {
			write!(f, "{}://{}:{}", scheme, self.host, self.port)
		}
	}
}

/// Options handed to the upstream client for every connection it makes
#[derive(Debug, Clone, Copy)]
pub struct UpstreamOptions {
	pub timeout: Duration,
	pub skip_verify: bool,
}

/// Immutable run configuration, built once from validated input
#[derive(Debug, Clone)]
pub struct RunConfig {
	pub address: String,
	pub connections: usize,
	pub queries: QuerySource,
	pub timeout: Duration,
	pub budget: u64,
	/// Queries per second ceiling; 0 means unlimited
	pub rate: u32,
	pub skip_verify: bool,
}

impl RunConfig {
	pub const fn upstream_options(&self) -> UpstreamOptions {
		UpstreamOptions {
			timeout: self.timeout,
			skip_verify: self.skip_verify,
		}
	}
}
