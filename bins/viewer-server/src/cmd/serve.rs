use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::{ServeArgs, ServerConfig};
use crate::error::ServerError;
use viewer_api_server::{ApiServerError, WsChannelHub};
use viewer_engine::{load_dataset, DataViewerService};

pub async fn run(args: ServeArgs) -> Result<(), ServerError> {
    tracing::info!("viewer-server starting");

    // --- Load config ---
    let config = ServerConfig::load(&args.config)?;
    tracing::info!(config = %args.config, "loaded config");

    if config.datasets.is_empty() {
        return Err(ServerError::NoComponents("[[datasets]]"));
    }

    // --- CancellationToken for graceful shutdown ---
    let token = CancellationToken::new();

    // --- Register datasets ---
    let hub = Arc::new(WsChannelHub::new(config.ws_buffer));
    let service = DataViewerService::new(config.target_name.clone(), hub.clone());

    for source in &config.datasets {
        let dataset = load_dataset(source)?;
        let id = service.register_dataset(dataset)?;
        tracing::info!(
            dataset = %id,
            path = %source.path.display(),
            target = %config.target_name,
            "serving dataset"
        );
    }

    // --- API server (HTTP + WS) ---
    let api_handle = tokio::spawn(viewer_api_server::run(
        config.api_port,
        service.clone(),
        hub,
        token.clone(),
    ));

    tracing::info!(port = config.api_port, "api server (http+ws) listening");
    tracing::info!("server ready");

    until_stopped(tokio::signal::ctrl_c(), api_handle, &service, &token).await
}

/// Wait for `signal` or the api server stopping on its own, then shut down:
/// close viewer channels, cancel `token`, drain the api task.
///
/// The shutdown sequence runs even when `signal` fails; that error is
/// returned afterwards.
async fn until_stopped(
    signal: impl Future<Output = std::io::Result<()>>,
    mut api_handle: JoinHandle<Result<(), ApiServerError>>,
    service: &DataViewerService,
    token: &CancellationToken,
) -> Result<(), ServerError> {
    let mut signal_error = None;
    let early_exit = tokio::select! {
        signal = signal => {
            if let Err(e) = signal {
                tracing::error!(error = %e, "failed to listen for ctrl+c");
                signal_error = Some(e);
            }
            None
        }
        joined = &mut api_handle => Some(joined),
    };
    tracing::info!("shutting down...");

    // Close viewer channels first so connected clients get a close frame.
    let report = service.shutdown();
    if !report.failures.is_empty() {
        tracing::warn!(failed = report.failures.len(), "some viewer channels did not close cleanly");
    }

    token.cancel();

    // Drain: give open connections up to 5s to finish
    let joined = match early_exit {
        Some(joined) => Some(joined),
        None => match tokio::time::timeout(Duration::from_secs(5), &mut api_handle).await {
            Ok(joined) => Some(joined),
            Err(_) => {
                api_handle.abort();
                None
            }
        },
    };

    match joined {
        Some(Ok(Err(e))) => return Err(e.into()),
        Some(Err(e)) => tracing::error!(error = %e, "api server task failed"),
        _ => {}
    }

    if let Some(e) = signal_error {
        return Err(ServerError::Signal(e));
    }

    tracing::info!("shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewer_engine::DatasetSource;

    async fn serving() -> (Arc<DataViewerService>, JoinHandle<Result<(), ApiServerError>>, CancellationToken, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cities.csv");
        std::fs::write(&path, "city\nOslo\nLima\n").unwrap();

        let hub = Arc::new(WsChannelHub::new(8));
        let service = DataViewerService::new("viewer", hub.clone());
        service
            .register_dataset(load_dataset(&DatasetSource::new(&path)).unwrap())
            .unwrap();

        let token = CancellationToken::new();
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let api = tokio::spawn(viewer_api_server::serve(listener, service.clone(), hub, token.clone()));
        (service, api, token, dir)
    }

    #[tokio::test]
    async fn signal_failure_still_shuts_down() {
        let (service, api, token, _dir) = serving().await;
        let failing = async { Err(std::io::Error::other("no signal handler")) };

        let result = until_stopped(failing, api, &service, &token).await;

        assert!(matches!(result, Err(ServerError::Signal(_))));
        assert!(service.datasets().is_empty());
        assert!(token.is_cancelled());
    }

    #[tokio::test]
    async fn signal_shuts_down_cleanly() {
        let (service, api, token, _dir) = serving().await;

        let result = until_stopped(async { Ok(()) }, api, &service, &token).await;

        assert!(result.is_ok());
        assert!(service.datasets().is_empty());
        assert!(token.is_cancelled());
    }
}
