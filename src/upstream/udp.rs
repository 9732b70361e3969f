use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::Name;
use tokio::net::UdpSocket;
use tokio::time::Instant;
use tracing::debug;

use super::{bind_addr, Upstream};
use crate::dns::{build_query, parse_response, DnsResponse};
use crate::error::UpstreamError;

/// Maximum UDP DNS response size with EDNS(0)
const MAX_UDP_RESPONSE_SIZE: usize = 4096;

/// Plain DNS over a connected UDP socket.
///
/// The socket is reused for every query on this handle; stale or foreign
/// datagrams are skipped by transaction ID until the deadline.
pub struct UdpUpstream {
	socket: UdpSocket,
	server: SocketAddr,
	timeout: Duration,
	buf: Vec<u8>,
}

impl UdpUpstream {
	pub async fn connect(server: SocketAddr, timeout: Duration) -> Result<Self, UpstreamError> {
		let socket = UdpSocket::bind(bind_addr(server)).await?;
		socket.connect(server).await
			.map_err(|source| UpstreamError::Connect { addr: server, source })?;
		Ok(Self {
			socket,
			server,
			timeout,
			buf: vec![0u8; MAX_UDP_RESPONSE_SIZE],
		})
	}
}

#[async_trait]
impl Upstream for UdpUpstream {
	async fn exchange(&mut self, name: &Name) -> Result<DnsResponse, UpstreamError> {
		let txid: u16 = rand::random();
		let query_bytes = build_query(name, txid)?;

		let deadline = Instant::now() + self.timeout;
		tokio::time::timeout_at(deadline, self.socket.send(&query_bytes))
			.await
			.map_err(|_| UpstreamError::Timeout(self.timeout))??;

		loop {
			let len = tokio::time::timeout_at(deadline, self.socket.recv(&mut self.buf))
				.await
				.map_err(|_| UpstreamError::Timeout(self.timeout))??;

			match parse_response(&self.buf[..len], txid) {
				Ok(response) => return Ok(response),
				Err(UpstreamError::TxidMismatch { expected, actual }) => {
					// Late answer to an earlier, timed-out query
					debug!(server = %self.server, expected, actual, "discarding stale UDP response");
				}
				Err(e) => return Err(e),
			}
		}
	}
}
