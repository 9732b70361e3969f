use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn env_filter(verbose: bool) -> EnvFilter {
	std::env::var("RUST_LOG").map_or_else(
		|_| {
			if verbose {
				EnvFilter::new("debug")
			} else {
				EnvFilter::new("info")
			}
		},
		|value| EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
	)
}

/// Open `path` for appending, creating it if needed.
pub fn open_log_file(path: &Path) -> io::Result<File> {
	OpenOptions::new().create(true).append(true).open(path)
}

/// Install the global tracing subscriber.
///
/// Logs go to stdout, or are appended to `output` without colors. `RUST_LOG`
/// overrides the level chosen by `verbose`.
pub fn init_logging(verbose: bool, output: Option<&Path>) -> io::Result<()> {
	let filter = env_filter(verbose);

	let result = match output {
		Some(path) => {
			let file = open_log_file(path)?;
			let subscriber = FmtSubscriber::builder()
				.with_env_filter(filter)
				.with_ansi(false)
				.with_writer(Mutex::new(file))
				.finish();
			tracing::subscriber::set_global_default(subscriber)
		}
		None => {
			let subscriber = FmtSubscriber::builder()
				.with_env_filter(filter)
				.with_writer(io::stdout)
				.finish();
			tracing::subscriber::set_global_default(subscriber)
		}
	};

	if let Err(err) = result {
		eprintln!("Failed to set global default subscriber: {}", err);
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_init_logging_is_idempotent() {
		init_logging(false, None).unwrap();
		init_logging(true, None).unwrap();
	}

	#[test]
	fn test_log_file_is_appended() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("dnsload.log");
		writeln!(open_log_file(&path).unwrap(), "first").unwrap();
		writeln!(open_log_file(&path).unwrap(), "second").unwrap();
		let contents = std::fs::read_to_string(&path).unwrap();
		assert_eq!(contents, "first\nsecond\n");
	}

	#[test]
	fn test_unwritable_log_path_is_an_error() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("missing").join("dnsload.log");
		assert!(init_logging(false, Some(&path)).is_err());
	}
}
