mod http;
pub mod hub;
mod ws;

use std::sync::Arc;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use viewer_engine::DataViewerService;

pub use hub::{WsChannel, WsChannelHub};

#[derive(Clone)]
pub(crate) struct AppState {
    service: Arc<DataViewerService>,
    hub: Arc<WsChannelHub>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApiServerError {
    #[error("bind api :{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("axum serve: {0}")]
    Serve(#[source] std::io::Error),
}

fn router(service: Arc<DataViewerService>, hub: Arc<WsChannelHub>) -> Router {
    Router::new()
        .route("/api/datasets", get(http::handle_list_datasets))
        .route("/ws/{id}", get(ws::handle_ws))
        .with_state(AppState { service, hub })
}

/// Data viewer HTTP + WebSocket API server.
///
/// `hub` must be the ChannelFactory `service` registers datasets with.
pub async fn run(
    port: u16,
    service: Arc<DataViewerService>,
    hub: Arc<WsChannelHub>,
    shutdown: CancellationToken,
) -> Result<(), ApiServerError> {
    let listener = TcpListener::bind(format!("0.0.0.0:{port}"))
        .await
        .map_err(|source| ApiServerError::Bind { port, source })?;
    serve(listener, service, hub, shutdown).await
}

/// Like [`run`], on an already bound listener.
pub async fn serve(
    listener: TcpListener,
    service: Arc<DataViewerService>,
    hub: Arc<WsChannelHub>,
    shutdown: CancellationToken,
) -> Result<(), ApiServerError> {
    axum::serve(listener, router(service, hub))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(ApiServerError::Serve)
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::json;
    use tokio_tungstenite::tungstenite::Message;
    use viewer_api::{CellValue, DataColumn, Dataset};

    type Client = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    struct Fixture {
        addr: std::net::SocketAddr,
        service: Arc<DataViewerService>,
        token: CancellationToken,
    }

    async fn start() -> Fixture {
        start_with(16, 3).await
    }

    /// Server with one dataset `d1` whose column `x` holds `1..=rows`.
    async fn start_with(buffer: usize, rows: i64) -> Fixture {
        let hub = Arc::new(WsChannelHub::new(buffer));
        let service = DataViewerService::new("viewer", hub.clone());
        let xs: Vec<CellValue> = (1..=rows).map(CellValue::Int).collect();
        service
            .register_dataset(Dataset::new(
                "d1",
                "Data",
                vec![DataColumn::new("x", "int", xs)],
                rows as usize,
            ))
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let token = CancellationToken::new();
        tokio::spawn(serve(listener, service.clone(), hub, token.clone()));
        Fixture { addr, service, token }
    }

    async fn connect(addr: std::net::SocketAddr, id: &str) -> Client {
        let (client, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/{id}"))
            .await
            .unwrap();
        client
    }

    async fn next_json(client: &mut Client) -> serde_json::Value {
        loop {
            let frame = tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .unwrap();
            if let Message::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    async fn send_json(client: &mut Client, value: serde_json::Value) {
        client.send(Message::Text(value.to_string().into())).await.unwrap();
    }

    #[tokio::test]
    async fn paging_over_websocket() {
        let fx = start().await;
        let mut client = connect(fx.addr, "d1").await;

        assert_eq!(
            next_json(&mut client).await,
            json!({"msg_type": "comm_open", "target_name": "viewer", "comm_id": "d1", "data": {"title": "Data"}})
        );

        send_json(&mut client, json!({"msg_type": "ready"})).await;
        let reply = next_json(&mut client).await;
        assert_eq!(reply["msg_type"], "initial_data");
        assert_eq!(reply["data"]["columns"][0]["data"], json!([1, 2, 3]));

        send_json(&mut client, json!({"msg_type": "request_rows", "start_row": 1, "fetch_size": 1})).await;
        let reply = next_json(&mut client).await;
        assert_eq!(reply["msg_type"], "receive_rows");
        assert_eq!(reply["start_row"], 1);
        assert_eq!(reply["data"]["columns"][0]["data"], json!([2]));

        send_json(&mut client, json!({"msg_type": "request_rows", "start_row": 5, "fetch_size": 1})).await;
        assert_eq!(
            next_json(&mut client).await,
            json!({"msg_type": "error", "error": "Invalid start row: 5"})
        );

        fx.token.cancel();
    }

    #[tokio::test]
    async fn request_burst_larger_than_buffer_is_fully_answered() {
        let fx = start_with(4, 50).await;
        let mut client = connect(fx.addr, "d1").await;

        // Fire everything before reading anything.
        for start in 0..40 {
            send_json(&mut client, json!({"msg_type": "request_rows", "start_row": start, "fetch_size": 1})).await;
        }
        send_json(&mut client, json!({"msg_type": "request_rows", "start_row": 99})).await;
        send_json(&mut client, json!({"msg_type": "refresh"})).await;

        assert_eq!(next_json(&mut client).await["msg_type"], "comm_open");
        for start in 0..40 {
            let reply = next_json(&mut client).await;
            assert_eq!(reply["msg_type"], "receive_rows");
            assert_eq!(reply["start_row"], start);
            assert_eq!(reply["data"]["columns"][0]["data"], json!([start + 1]));
        }
        assert_eq!(
            next_json(&mut client).await,
            json!({"msg_type": "error", "error": "Invalid start row: 99"})
        );
        assert_eq!(
            next_json(&mut client).await,
            json!({"msg_type": "error", "error": "Unknown message type 'refresh'"})
        );

        fx.token.cancel();
    }

    #[tokio::test]
    async fn unparsable_frame_gets_error() {
        let fx = start().await;
        let mut client = connect(fx.addr, "d1").await;
        let _open = next_json(&mut client).await;

        client.send(Message::Text("not json".to_string().into())).await.unwrap();
        let reply = next_json(&mut client).await;
        assert_eq!(reply["msg_type"], "error");
        assert!(reply["error"].as_str().unwrap().starts_with("Malformed message"));

        fx.token.cancel();
    }

    #[tokio::test]
    async fn unknown_channel_is_not_found() {
        let fx = start().await;
        let result = tokio_tungstenite::connect_async(format!("ws://{}/ws/missing", fx.addr)).await;
        assert!(result.is_err());
        fx.token.cancel();
    }

    #[tokio::test]
    async fn shutdown_closes_connection() {
        let fx = start().await;
        let mut client = connect(fx.addr, "d1").await;
        let _open = next_json(&mut client).await;

        let report = fx.service.shutdown();
        assert_eq!(report.closed, 1);

        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for close");
        assert!(matches!(frame, Some(Ok(Message::Close(_))) | None | Some(Err(_))));

        fx.token.cancel();
    }

    #[tokio::test]
    async fn lists_datasets() {
        let fx = start().await;
        let mut stream = tokio::net::TcpStream::connect(fx.addr).await.unwrap();
        use tokio::io::{AsyncReadExt, AsyncWriteExt};
        stream
            .write_all(b"GET /api/datasets HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).await.unwrap();

        let body = response.split("\r\n\r\n").nth(1).unwrap();
        let listed: serde_json::Value = serde_json::from_str(body).unwrap();
        assert_eq!(listed, json!([{"id": "d1", "title": "Data", "rowCount": 3}]));

        fx.token.cancel();
    }
}
