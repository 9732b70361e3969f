use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hickory_proto::rr::Name;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::crypto::{verify_tls12_signature, verify_tls13_signature, CryptoProvider};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, RootCertStore, SignatureScheme};
use tokio::net::TcpStream;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

use super::tcp::{connect_tcp, framed_exchange};
use super::Upstream;
use crate::dns::{build_query, parse_response, DnsResponse};
use crate::error::UpstreamError;

/// Build the rustls client configuration shared by DoT and DoQ.
///
/// With `skip_verify` any server certificate is accepted; otherwise the
/// webpki root set is trusted.
pub fn client_config(skip_verify: bool, alpn: &[&[u8]]) -> Result<Arc<ClientConfig>, UpstreamError> {
	let provider = Arc::new(rustls::crypto::ring::default_provider());
	let builder = ClientConfig::builder_with_provider(Arc::clone(&provider))
		.with_safe_default_protocol_versions()?;

	let mut config = if skip_verify {
		builder
			.dangerous()
			.with_custom_certificate_verifier(Arc::new(NoCertificateVerification(provider)))
			.with_no_client_auth()
	} else {
		let mut roots = RootCertStore::empty();
		roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
		builder
			.with_root_certificates(roots)
			.with_no_client_auth()
	};
	config.alpn_protocols = alpn.iter().map(|p| p.to_vec()).collect();
	Ok(Arc::new(config))
}

/// Accepts any certificate; handshake signatures are still checked so the
/// session keys are sound.
#[derive(Debug)]
struct NoCertificateVerification(Arc<CryptoProvider>);

impl ServerCertVerifier for NoCertificateVerification {
	fn verify_server_cert(
		&self,
		_end_entity: &CertificateDer<'_>,
		_intermediates: &[CertificateDer<'_>],
		_server_name: &ServerName<'_>,
		_ocsp_response: &[u8],
		_now: UnixTime,
	) -> Result<ServerCertVerified, rustls::Error> {
		Ok(ServerCertVerified::assertion())
	}

	fn verify_tls12_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		verify_tls12_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn verify_tls13_signature(
		&self,
		message: &[u8],
		cert: &CertificateDer<'_>,
		dss: &DigitallySignedStruct,
	) -> Result<HandshakeSignatureValid, rustls::Error> {
		verify_tls13_signature(message, cert, dss, &self.0.signature_verification_algorithms)
	}

	fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
		self.0.signature_verification_algorithms.supported_schemes()
	}
}

/// Parse the TLS server name for `host`, which may be an IP literal.
pub(super) fn server_name(host: &str) -> Result<ServerName<'static>, UpstreamError> {
	ServerName::try_from(host.to_string())
		.map_err(|_| UpstreamError::ServerName(host.to_string()))
}

/// DNS-over-TLS (RFC 7858) over one persistent session
pub struct TlsUpstream {
	stream: TlsStream<TcpStream>,
	timeout: Duration,
}

impl TlsUpstream {
	pub async fn connect(
		server: SocketAddr,
		host: &str,
		config: Arc<ClientConfig>,
		timeout: Duration,
	) -> Result<Self, UpstreamError> {
		let name = server_name(host)?;
		let tcp = connect_tcp(server, timeout).await?;
		let connector = TlsConnector::from(config);
		let stream = tokio::time::timeout(timeout, connector.connect(name, tcp))
			.await
			.map_err(|_| UpstreamError::Timeout(timeout))?
			.map_err(|source| UpstreamError::Connect { addr: server, source })?;
		Ok(Self { stream, timeout })
	}
}

#[async_trait]
impl Upstream for TlsUpstream {
	async fn exchange(&mut self, name: &Name) -> Result<DnsResponse, UpstreamError> {
		let txid: u16 = rand::random();
		let query_bytes = build_query(name, txid)?;

		let reply = tokio::time::timeout(self.timeout, framed_exchange(&mut self.stream, &query_bytes))
			.await
			.map_err(|_| UpstreamError::Timeout(self.timeout))??;

		parse_response(&reply, txid)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_client_config_sets_alpn() {
		let config = client_config(false, &[b"doq"]).unwrap();
		assert_eq!(config.alpn_protocols, vec![b"doq".to_vec()]);

		let plain = client_config(true, &[]).unwrap();
		assert!(plain.alpn_protocols.is_empty());
	}

	#[test]
	fn test_server_name_accepts_ip_and_host() {
		assert!(server_name("dns.google").is_ok());
		assert!(server_name("1.1.1.1").is_ok());
		assert!(server_name("2606:4700::1111").is_ok());
		assert!(server_name("not a name").is_err());
	}

	#[test]
	fn test_insecure_verifier_accepts_anything() {
		let provider = Arc::new(rustls::crypto::ring::default_provider());
		let verifier = NoCertificateVerification(provider);
		let cert = CertificateDer::from(vec![0u8; 8]);
		let name = server_name("example.org").unwrap();
		let verified = verifier.verify_server_cert(&cert, &[], &name, &[], UnixTime::now());
		assert!(verified.is_ok());
		assert!(!verifier.supported_verify_schemes().is_empty());
	}

	#[tokio::test]
	async fn test_exchange_over_tls_session() {
		let server = crate::upstream::testing::spawn_dot_responder().await;
		let config = client_config(true, &[]).unwrap();
		let mut upstream = TlsUpstream::connect(server, "localhost", config, Duration::from_secs(2))
			.await
			.unwrap();
		let name = crate::dns::parse_name("example.org").unwrap();
		for _ in 0..3 {
			upstream.exchange(&name).await.unwrap();
		}
	}
}
