use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::Name;
use quinn::crypto::rustls::QuicClientConfig;
use quinn::{Connection, Endpoint, VarInt};
use rustls::ClientConfig;

use super::{bind_addr, Upstream};
use crate::dns::{build_query, parse_response, DnsResponse};
use crate::error::UpstreamError;

/// ALPN token for DNS-over-QUIC (RFC 9250 §4.1.1)
pub const DOQ_ALPN: &[u8] = b"doq";

/// Largest reply accepted on a stream: 2-byte length prefix plus a
/// maximum-size DNS message
const MAX_STREAM_READ: usize = 2 + u16::MAX as usize;

/// DoQ error code for an orderly close (RFC 9250 §4.3)
const DOQ_NO_ERROR: u32 = 0;

/// DNS-over-QUIC (RFC 9250) over one connection, one bidirectional stream
/// per query
pub struct QuicUpstream {
	endpoint: Endpoint,
	connection: Connection,
	timeout: Duration,
}

impl QuicUpstream {
	pub async fn connect(
		server: SocketAddr,
		host: &str,
		tls: Arc<ClientConfig>,
		timeout: Duration,
	) -> Result<Self, UpstreamError> {
		let crypto = QuicClientConfig::try_from(tls)
			.map_err(|e| UpstreamError::Config(e.to_string()))?;
		let client_config = quinn::ClientConfig::new(Arc::new(crypto));

		let mut endpoint = Endpoint::client(bind_addr(server))?;
		endpoint.set_default_client_config(client_config);

		let connecting = endpoint.connect(server, host)?;
		let connection = tokio::time::timeout(timeout, connecting)
			.await
			.map_err(|_| UpstreamError::Timeout(timeout))??;

		Ok(Self {
			endpoint,
			connection,
			timeout,
		})
	}

	async fn roundtrip(&self, query: &[u8]) -> Result<Vec<u8>, UpstreamError> {
		let len = u16::try_from(query.len())
			.map_err(|_| UpstreamError::Malformed(format!("query too large: {} bytes", query.len())))?;

		let (mut send, mut recv) = self.connection.open_bi().await?;
		let mut framed = Vec::with_capacity(query.len() + 2);
		framed.extend_from_slice(&len.to_be_bytes());
		framed.extend_from_slice(query);
		send.write_all(&framed).await?;
		// The client signals the end of its query with STREAM FIN
		send.finish()?;

		let reply = recv.read_to_end(MAX_STREAM_READ).await?;
		let (prefix, message) = reply.split_at_checked(2)
			.ok_or_else(|| UpstreamError::Malformed("DoQ reply shorter than its length prefix".to_string()))?;
		let declared = usize::from(u16::from_be_bytes([prefix[0], prefix[1]]));
		if declared != message.len() {
			return Err(UpstreamError::Malformed(format!(
				"DoQ reply length prefix {} does not match {} bytes received",
				declared,
				message.len(),
			)));
		}
		Ok(message.to_vec())
	}
}

#[async_trait]
impl Upstream for QuicUpstream {
	async fn exchange(&mut self, name: &Name) -> Result<DnsResponse, UpstreamError> {
		// RFC 9250 §4.2.1: the message ID must be 0
		let query_bytes = build_query(name, 0)?;

		let reply = tokio::time::timeout(self.timeout, self.roundtrip(&query_bytes))
			.await
			.map_err(|_| UpstreamError::Timeout(self.timeout))??;

		parse_response(&reply, 0)
	}
}

impl Drop for QuicUpstream {
	fn drop(&mut self) {
		self.connection.close(VarInt::from_u32(DOQ_NO_ERROR), b"");
		self.endpoint.close(VarInt::from_u32(DOQ_NO_ERROR), b"");
	}
}
