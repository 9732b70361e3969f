//! Loopback resolvers for transport tests: plain and TLS stream framing,
//! DoH over HTTP/1.1 and DoQ, all answering with `dns::reply_to`.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use quinn::crypto::rustls::QuicServerConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use rustls::ServerConfig;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

use super::quic::DOQ_ALPN;
use crate::dns::reply_to;

/// Self-signed server configuration for "localhost" with the given ALPN.
pub fn server_tls_config(alpn: &[&[u8]]) -> ServerConfig {
	let rcgen::CertifiedKey { cert, key_pair } =
		rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
	let certs: Vec<CertificateDer<'static>> = vec![cert.der().clone()];
	let key = PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(key_pair.serialize_der()));

	let provider = Arc::new(rustls::crypto::ring::default_provider());
	let mut config = ServerConfig::builder_with_provider(provider)
		.with_safe_default_protocol_versions()
		.unwrap()
		.with_no_client_auth()
		.with_single_cert(certs, key)
		.unwrap();
	config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
	config
}

/// Answer length-prefixed queries until the peer hangs up.
pub async fn serve_framed<S>(mut stream: S)
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	loop {
		let Ok(len) = stream.read_u16().await else {
			return;
		};
		let mut query = vec![0u8; usize::from(len)];
		if stream.read_exact(&mut query).await.is_err() {
			return;
		}
		let reply = reply_to(&query);
		let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
		framed.extend_from_slice(&reply);
		if stream.write_all(&framed).await.is_err() {
			return;
		}
	}
}

/// Plain TCP resolver on an ephemeral port.
pub async fn spawn_tcp_responder() -> SocketAddr {
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		while let Ok((stream, _)) = listener.accept().await {
			tokio::spawn(serve_framed(stream));
		}
	});
	addr
}

/// DNS-over-TLS resolver with a self-signed certificate.
pub async fn spawn_dot_responder() -> SocketAddr {
	let acceptor = TlsAcceptor::from(Arc::new(server_tls_config(&[])));
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	tokio::spawn(async move {
		while let Ok((stream, _)) = listener.accept().await {
			let acceptor = acceptor.clone();
			tokio::spawn(async move {
				// Clients that reject the certificate abort the handshake
				if let Ok(tls) = acceptor.accept(stream).await {
					serve_framed(tls).await;
				}
			});
		}
	});
	addr
}

/// DNS-over-QUIC resolver with a self-signed certificate.
pub fn spawn_doq_responder() -> SocketAddr {
	let crypto = QuicServerConfig::try_from(server_tls_config(&[DOQ_ALPN])).unwrap();
	let config = quinn::ServerConfig::with_crypto(Arc::new(crypto));
	let endpoint = quinn::Endpoint::server(config, "127.0.0.1:0".parse().unwrap()).unwrap();
	let addr = endpoint.local_addr().unwrap();
	tokio::spawn(async move {
		while let Some(incoming) = endpoint.accept().await {
			tokio::spawn(async move {
				let Ok(connection) = incoming.await else {
					return;
				};
				while let Ok((mut send, mut recv)) = connection.accept_bi().await {
					let Ok(framed_query) = recv.read_to_end(usize::from(u16::MAX) + 2).await else {
						return;
					};
					let reply = reply_to(&framed_query[2..]);
					let mut framed = (reply.len() as u16).to_be_bytes().to_vec();
					framed.extend_from_slice(&reply);
					if send.write_all(&framed).await.is_err() {
						return;
					}
					let _ = send.finish();
				}
			});
		}
	});
	addr
}

/// DoH responder handle.
pub struct DohResponder {
	pub url: String,
	/// TCP connections accepted so far
	pub connections: Arc<AtomicUsize>,
}

impl DohResponder {
	pub fn connections(&self) -> usize {
		self.connections.load(Ordering::SeqCst)
	}
}

/// Keep-alive HTTP/1.1 DoH responder, over TLS when `tls` is set. With
/// `fail_first` the very first request is answered with a 500.
pub async fn spawn_doh_responder(tls: bool, fail_first: bool) -> DohResponder {
	let acceptor = tls.then(|| TlsAcceptor::from(Arc::new(server_tls_config(&[b"http/1.1"]))));
	let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
	let addr = listener.local_addr().unwrap();
	let connections = Arc::new(AtomicUsize::new(0));
	let requests = Arc::new(AtomicUsize::new(0));

	let accepted = Arc::clone(&connections);
	tokio::spawn(async move {
		while let Ok((stream, _)) = listener.accept().await {
			accepted.fetch_add(1, Ordering::SeqCst);
			let acceptor = acceptor.clone();
			let requests = Arc::clone(&requests);
			tokio::spawn(async move {
				match acceptor {
					Some(acceptor) => {
						if let Ok(tls) = acceptor.accept(stream).await {
							serve_http(tls, requests, fail_first).await;
						}
					}
					None => serve_http(stream, requests, fail_first).await,
				}
			});
		}
	});

	let scheme = if tls { "https" } else { "http" };
	DohResponder {
		url: format!("{}://{}/dns-query", scheme, addr),
		connections,
	}
}

async fn serve_http<S>(mut stream: S, requests: Arc<AtomicUsize>, fail_first: bool)
where
	S: AsyncRead + AsyncWrite + Unpin,
{
	let mut pending = Vec::new();
	let mut chunk = vec![0u8; 4096];
	loop {
		let body = loop {
			if let Some((consumed, body)) = take_request(&pending) {
				pending.drain(..consumed);
				break body;
			}
			match stream.read(&mut chunk).await {
				Ok(0) | Err(_) => return,
				Ok(n) => pending.extend_from_slice(&chunk[..n]),
			}
		};

		let seen = requests.fetch_add(1, Ordering::SeqCst);
		let status = if fail_first && seen == 0 {
			"HTTP/1.1 500 Internal Server Error"
		} else {
			"HTTP/1.1 200 OK"
		};
		let reply = reply_to(&body);
		let head = format!(
			"{}\r\ncontent-type: application/dns-message\r\ncontent-length: {}\r\n\r\n",
			status,
			reply.len(),
		);
		if stream.write_all(head.as_bytes()).await.is_err() || stream.write_all(&reply).await.is_err() {
			return;
		}
		let _ = stream.flush().await;
	}
}

/// Split one complete request off the front of `buf`, returning the bytes
/// it used and its body.
fn take_request(buf: &[u8]) -> Option<(usize, Vec<u8>)> {
	let end = buf.windows(4).position(|w| w == b"\r\n\r\n")?;
	let head = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
	let length = head.lines()
		.find_map(|line| line.strip_prefix("content-length:"))
		.and_then(|v| v.trim().parse::<usize>().ok())
		.unwrap_or(0);
	let total = end + 4 + length;
	(buf.len() >= total).then(|| (total, buf[end + 4..total].to_vec()))
}
