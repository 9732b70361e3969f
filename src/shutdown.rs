use tracing::{info, warn};

#[cfg(unix)]
use tokio::signal::unix::{signal, SignalKind};

/// Resolve once the process receives SIGINT (Ctrl+C) or, on unix, SIGTERM.
///
/// If a handler cannot be registered that signal is ignored and the future
/// waits on the other one.
pub async fn wait_for_signal() {
	let ctrl_c = async {
		if let Err(err) = tokio::signal::ctrl_c().await {
			warn!("Failed to listen for Ctrl+C: {}", err);
			std::future::pending::<()>().await;
		}
	};

	#[cfg(unix)]
	let terminate = async {
		match signal(SignalKind::terminate()) {
			Ok(mut term) => {
				term.recv().await;
			}
			Err(err) => {
				warn!("Failed to register SIGTERM handler: {}", err);
				std::future::pending::<()>().await;
			}
		}
	};

	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		() = ctrl_c => info!("Received interrupt signal"),
		() = terminate => info!("Received terminate signal"),
	}
}
