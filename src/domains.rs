use std::path::Path;
use std::sync::Arc;

use hickory_proto::rr::Name;

use crate::dns::parse_name;
use crate::error::BenchError;

/// Query name used when neither --query nor --queries-file is given.
pub const DEFAULT_QUERY: &str = "example.org";

/// Produces the sequence of names a worker queries.
///
/// A list source is shared read-only between workers; each clone carries
/// its own cursor, so workers never synchronize on it. Use
/// [`QuerySource::for_worker`] to start workers at distinct offsets.
#[derive(Debug, Clone)]
pub enum QuerySource {
	Single(Name),
	List {
		names: Arc<[Name]>,
		cursor: usize,
	},
}

impl QuerySource {
	/// A source that always yields the same name.
	pub fn single(domain: &str) -> Result<Self, BenchError> {
		let name = parse_query_name(domain)?;
		Ok(QuerySource::Single(name))
	}

	/// A round-robin source over the given names, starting at the first.
	pub fn list(domains: &[String]) -> Result<Self, BenchError> {
		if domains.is_empty() {
			return Err(BenchError::EmptyQueryList);
		}
		let names = domains.iter()
			.map(|d| parse_query_name(d))
			.collect::<Result<Vec<_>, _>>()?;
		Ok(QuerySource::List {
			names: names.into(),
			cursor: 0,
		})
	}

	/// Read a round-robin source from a file, one name per line.
	pub fn from_file(path: &Path) -> Result<Self, BenchError> {
		let domains = read_domain_file(path)?;
		if domains.is_empty() {
			return Err(BenchError::EmptyQueryFile {
				path: path.to_path_buf(),
			});
		}
		Self::list(&domains)
	}

	/// A copy of this source whose cursor starts `worker` entries in.
	pub fn for_worker(&self, worker: usize) -> Self {
		match self {
			QuerySource::Single(name) => QuerySource::Single(name.clone()),
			QuerySource::List { names, .. } => QuerySource::List {
				names: Arc::clone(names),
				cursor: worker % names.len(),
			},
		}
	}

	/// Next name to query, wrapping to the start after the last entry.
	pub fn next_name(&mut self) -> &Name {
		match self {
			QuerySource::Single(name) => name,
			QuerySource::List { names, cursor } => {
				let idx = *cursor % names.len();
				*cursor = (idx + 1) % names.len();
				&names[idx]
			}
		}
	}

	/// Short description for the configuration summary.
	pub fn describe(&self) -> String {
		match self {
			QuerySource::Single(name) => name.to_ascii(),
			QuerySource::List { names, .. } => format!("{} names (round-robin)", names.len()),
		}
	}
}

fn parse_query_name(domain: &str) -> Result<Name, BenchError> {
	parse_name(domain).map_err(|e| BenchError::InvalidQueryName {
		name: domain.to_string(),
		reason: e.to_string(),
	})
}

/// Read domains from a file, one per line.
///
/// Blank lines and lines starting with '#' are skipped.
pub fn read_domain_file(path: &Path) -> Result<Vec<String>, BenchError> {
	let content = std::fs::read_to_string(path)
		.map_err(|source| BenchError::ReadQueryFile {
			path: path.to_path_buf(),
			source,
		})?;
	let domains: Vec<String> = content.lines()
		.map(|line| line.trim().to_string())
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.collect();
	Ok(domains)
}
