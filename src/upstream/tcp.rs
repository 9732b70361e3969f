use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::Name;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;

use super::Upstream;
use crate::dns::{build_query, parse_response, DnsResponse};
use crate::error::UpstreamError;

/// Open a TCP connection, bounded by `timeout`.
pub(super) async fn connect_tcp(server: SocketAddr, timeout: Duration) -> Result<TcpStream, UpstreamError> {
	let stream = tokio::time::timeout(timeout, TcpStream::connect(server))
		.await
		.map_err(|_| UpstreamError::Timeout(timeout))?
		.map_err(|source| UpstreamError::Connect { addr: server, source })?;
	stream.set_nodelay(true)?;
	Ok(stream)
}

/// Write one length-prefixed DNS message and read the length-prefixed
/// reply (RFC 1035 §4.2.2). Shared by plain TCP and DoT.
pub(super) async fn framed_exchange<S>(stream: &mut S, query: &[u8]) -> Result<Vec<u8>, UpstreamError>
where
	S: AsyncRead + AsyncWrite + Unpin + Send,
{
	let len = u16::try_from(query.len())
		.map_err(|_| UpstreamError::Malformed(format!("query too large: {} bytes", query.len())))?;

	let mut framed = Vec::with_capacity(query.len() + 2);
	framed.extend_from_slice(&len.to_be_bytes());
	framed.extend_from_slice(query);
	stream.write_all(&framed).await?;
	stream.flush().await?;

	let reply_len = stream.read_u16().await?;
	let mut reply = vec![0u8; usize::from(reply_len)];
	stream.read_exact(&mut reply).await?;
	Ok(reply)
}

/// Plain DNS over one persistent TCP connection
pub struct TcpUpstream {
	stream: TcpStream,
	timeout: Duration,
}

impl TcpUpstream {
	pub async fn connect(server: SocketAddr, timeout: Duration) -> Result<Self, UpstreamError> {
		let stream = connect_tcp(server, timeout).await?;
		Ok(Self { stream, timeout })
	}
}

#[async_trait]
impl Upstream for TcpUpstream {
	async fn exchange(&mut self, name: &Name) -> Result<DnsResponse, UpstreamError> {
		let txid: u16 = rand::random();
		let query_bytes = build_query(name, txid)?;

		let reply = tokio::time::timeout(self.timeout, framed_exchange(&mut self.stream, &query_bytes))
			.await
			.map_err(|_| UpstreamError::Timeout(self.timeout))??;

		parse_response(&reply, txid)
	}
}
