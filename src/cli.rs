use std::path::PathBuf;

use clap::builder::RangedU64ValueParser;
use clap::Parser;

use crate::domains::DEFAULT_QUERY;

/// DNS load generator
#[derive(Parser, Debug)]
#[command(name = "dnsload", version)]
#[command(about = "Load-test a DNS resolver over UDP, TCP, DoT, DoH or DoQ")]
pub struct Cli {
	/// Upstream address, e.g. 8.8.8.8, tcp://8.8.8.8, tls://dns.google,
	/// https://dns.google/dns-query or quic://dns.adguard-dns.com
	#[arg(short = 'a', long = "address")]
	pub address: String,

	/// Number of parallel connections
	#[arg(short = 'p', long = "parallel", default_value_t = 1,
		value_parser = RangedU64ValueParser::<usize>::new().range(1..))]
	pub parallel: usize,

	/// Name to query
	#[arg(short = 'q', long = "query", default_value = DEFAULT_QUERY)]
	pub query: String,

	/// File with names to query, one per line; overrides --query
	#[arg(short = 'f', long = "queries-file")]
	pub queries_file: Option<PathBuf>,

	/// Query timeout in seconds
	#[arg(short = 't', long = "timeout", default_value_t = 10,
		value_parser = clap::value_parser!(u64).range(1..))]
	pub timeout: u64,

	/// Maximum queries per second, 0 for unlimited
	#[arg(short = 'r', long = "rate", default_value_t = 0)]
	pub rate: u32,

	/// Total number of queries to send
	#[arg(short = 'c', long = "count", default_value_t = 10000,
		value_parser = clap::value_parser!(u64).range(1..))]
	pub count: u64,

	/// Enable debug logging
	#[arg(short = 'v', long = "verbose")]
	pub verbose: bool,

	/// Append logs to this file instead of stdout
	#[arg(short = 'o', long = "output")]
	pub output: Option<PathBuf>,

	/// Skip TLS certificate verification
	#[arg(long = "insecure")]
	pub insecure: bool,

	/// Also write the final report to this CSV file
	#[arg(long = "csv")]
	pub csv: Option<PathBuf>,
}
