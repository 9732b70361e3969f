use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised by the DNS upstream client, from address parsing through
/// a single query exchange.
#[derive(Debug, Error)]
pub enum UpstreamError {
	#[error("invalid upstream address '{address}': {reason}")]
	InvalidAddress { address: String, reason: String },
	#[error("unsupported upstream scheme '{scheme}' (use udp://, tcp://, tls://, https://, or quic://)")]
	UnsupportedScheme { scheme: String },
	#[error("failed to resolve upstream host '{host}': {source}")]
	Resolve {
		host: String,
		#[source]
		source: io::Error,
	},
	#[error("upstream host '{host}' resolved to no addresses")]
	NoAddress { host: String },
	#[error("failed to connect to {addr}: {source}")]
	Connect {
		addr: SocketAddr,
		#[source]
		source: io::Error,
	},
	#[error("I/O error talking to upstream: {0}")]
	Io(#[from] io::Error),
	#[error("query timed out after {0:?}")]
	Timeout(Duration),
	#[error("TLS configuration error: {0}")]
	Tls(#[from] rustls::Error),
	#[error("invalid TLS server name '{0}'")]
	ServerName(String),
	#[error("DoH request failed: {0}")]
	Http(#[from] reqwest::Error),
	#[error("DoH server returned HTTP {0}")]
	HttpStatus(u16),
	#[error("upstream client configuration error: {0}")]
	Config(String),
	#[error("QUIC connect failed: {0}")]
	QuicConnect(#[from] quinn::ConnectError),
	#[error("QUIC connection failed: {0}")]
	QuicConnection(#[from] quinn::ConnectionError),
	#[error("QUIC stream write failed: {0}")]
	QuicWrite(#[from] quinn::WriteError),
	#[error("QUIC stream read failed: {0}")]
	QuicRead(#[from] quinn::ReadToEndError),
	#[error("QUIC stream already closed: {0}")]
	QuicClosed(#[from] quinn::ClosedStream),
	#[error("invalid domain name '{name}': {reason}")]
	InvalidName { name: String, reason: String },
	#[error("malformed DNS message: {0}")]
	Malformed(String),
	#[error("txid mismatch: expected {expected}, got {actual}")]
	TxidMismatch { expected: u16, actual: u16 },
	#[error("received a query instead of a response")]
	NotAResponse,
}

/// Errors that stop a run before or during worker startup.
#[derive(Debug, Error)]
pub enum BenchError {
	#[error("failed to read query file '{path}': {source}")]
	ReadQueryFile {
		path: PathBuf,
		#[source]
		source: io::Error,
	},
	#[error("query file '{path}' contains no query names")]
	EmptyQueryFile { path: PathBuf },
	#[error("query list is empty")]
	EmptyQueryList,
	#[error("invalid query name '{name}': {reason}")]
	InvalidQueryName { name: String, reason: String },
	#[error("worker {worker} could not establish its initial connection: {source}")]
	InitialConnect {
		worker: usize,
		#[source]
		source: UpstreamError,
	},
}
