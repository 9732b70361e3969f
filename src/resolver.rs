use std::net::Ipv6Addr;

use crate::error::UpstreamError;
use crate::transport::{Protocol, UpstreamAddr};

/// Path used for DoH when the URL does not name one (RFC 8484 §3)
const DEFAULT_DOH_PATH: &str = "/dns-query";

/// Parse an upstream address string into an UpstreamAddr.
///
/// Supports formats:
///   "1.1.1.1"                       -- plain UDP, default port 53
///   "1.1.1.1:5353"                  -- plain UDP with explicit port
///   "2606:4700::1111"               -- bare IPv6, default port
///   "[2606:4700::1111]:53"          -- bracketed IPv6 with port
///   "udp://host[:port]"             -- plain UDP
///   "tcp://host[:port]"             -- plain TCP
///   "tls://host[:port]"             -- DNS-over-TLS, default port 853
///   "https://host[:port]/path"      -- DNS-over-HTTPS
///   "quic://host[:port]"            -- DNS-over-QUIC, default port 853
pub fn parse_upstream(input: &str) -> Result<UpstreamAddr, UpstreamError> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(invalid(input, "empty upstream address"));
	}

	let (protocol, rest) = match trimmed.split_once("://") {
		Some((scheme, rest)) => (scheme_protocol(scheme)?, rest),
		None => (Protocol::Udp, trimmed),
	};

	if protocol == Protocol::Https {
		return parse_https(trimmed);
	}

	let rest = rest.trim_end_matches('/');
	if rest.is_empty() {
		return Err(invalid(trimmed, "missing host"));
	}
	if rest.contains('/') {
		return Err(invalid(trimmed, "unexpected path for this scheme"));
	}

	let (host, port) = split_host_port(rest, protocol.default_port())
		.map_err(|reason| invalid(trimmed, &reason))?;

	Ok(UpstreamAddr {
		protocol,
		host,
		port,
		url: None,
	})
}

fn scheme_protocol(scheme: &str) -> Result<Protocol, UpstreamError> {
	match scheme.to_ascii_lowercase().as_str() {
		"udp" => Ok(Protocol::Udp),
		"tcp" => Ok(Protocol::Tcp),
		"tls" => Ok(Protocol::Tls),
		"https" => Ok(Protocol::Https),
		"quic" => Ok(Protocol::Quic),
		_ => Err(UpstreamError::UnsupportedScheme {
			scheme: scheme.to_string(),
		}),
	}
}

fn parse_https(input: &str) -> Result<UpstreamAddr, UpstreamError> {
	let mut url = reqwest::Url::parse(input)
		.map_err(|e| invalid(input, &e.to_string()))?;

	let host = url.host_str()
		.map(|h| h.trim_start_matches('[').trim_end_matches(']').to_string())
		.filter(|h| !h.is_empty())
		.ok_or_else(|| invalid(input, "missing host"))?;
	let port = url.port_or_known_default()
		.unwrap_or(Protocol::Https.default_port());

	if url.path().is_empty() || url.path() == "/" {
		url.set_path(DEFAULT_DOH_PATH);
	}

	Ok(UpstreamAddr {
		protocol: Protocol::Https,
		host,
		port,
		url: Some(url.to_string()),
	})
}

/// Split "host[:port]" into its parts, handling bracketed and bare IPv6.
fn split_host_port(input: &str, default_port: u16) -> Result<(String, u16), String> {
	if let Some(stripped) = input.strip_prefix('[') {
		// Bracketed IPv6 with optional port: [::1] or [::1]:53
		let (ip, tail) = stripped.split_once(']')
			.ok_or_else(|| "unterminated '[' in address".to_string())?;
		let ip: Ipv6Addr = ip.parse()
			.map_err(|e| format!("invalid IPv6 address '{}': {}", ip, e))?;
		let port = if tail.is_empty() {
			default_port
		} else {
			let port = tail.strip_prefix(':')
				.ok_or_else(|| format!("unexpected '{}' after IPv6 address", tail))?;
			parse_port(port)?
		};
		return Ok((ip.to_string(), port));
	}

	if input.matches(':').count() > 1 {
		// Bare IPv6 address without port
		let ip: Ipv6Addr = input.parse()
			.map_err(|e| format!("invalid IPv6 address '{}': {}", input, e))?;
		return Ok((ip.to_string(), default_port));
	}

	let (host, port) = match input.rsplit_once(':') {
		Some((host, port)) => (host, parse_port(port)?),
		None => (input, default_port),
	};
	if !is_valid_host(host) {
		return Err(format!("invalid host '{}'", host));
	}
	Ok((host.to_string(), port))
}

fn parse_port(input: &str) -> Result<u16, String> {
	match input.parse::<u16>() {
		Ok(0) => Err("port must not be 0".to_string()),
		Ok(port) => Ok(port),
		Err(e) => Err(format!("invalid port '{}': {}", input, e)),
	}
}

fn is_valid_host(host: &str) -> bool {
	!host.is_empty()
		&& host.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'))
}

fn invalid(address: &str, reason: &str) -> UpstreamError {
	UpstreamError::InvalidAddress {
		address: address.to_string(),
		reason: reason.to_string(),
	}
}
