// End-to-end tests for the live connection against a local axum WebSocket server.
//
// The server records every text frame it receives and pushes frames on
// command. `Kick` drops the socket without a close frame, which the client
// must treat as an abnormal close and reconnect from.

use axum::{
    extract::{
        ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
    routing::get,
    Router,
};
use railwatch::config::LiveConfig;
use railwatch::dashboard::StatsView;
use railwatch::live::{ConnectionManager, ConnectionState, ConnectionStatus, WsConnector};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::time::timeout;

#[derive(Clone, Debug)]
enum ServerPush {
    Text(String),
    Close(u16, &'static str),
    Kick,
}

#[derive(Clone)]
struct ServerState {
    inbound: mpsc::UnboundedSender<String>,
    push: broadcast::Sender<ServerPush>,
}

struct TestServer {
    addr: SocketAddr,
    inbound: mpsc::UnboundedReceiver<String>,
    push: broadcast::Sender<ServerPush>,
}

async fn start_server() -> TestServer {
    let (inbound_tx, inbound) = mpsc::unbounded_channel();
    let (push, _) = broadcast::channel(16);
    let state = ServerState {
        inbound: inbound_tx,
        push: push.clone(),
    };

    let app = Router::new()
        .route("/ws/dashboard", get(ws_handler))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, inbound, push }
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<ServerState>) -> Response {
    // Subscribe before the upgrade completes so no push is missed
    let push = state.push.subscribe();
    ws.on_upgrade(move |socket| serve_socket(socket, state, push))
}

async fn serve_socket(mut socket: WebSocket, state: ServerState, mut push: broadcast::Receiver<ServerPush>) {
    loop {
        tokio::select! {
            incoming = socket.recv() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    let _ = state.inbound.send(text);
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            cmd = push.recv() => match cmd {
                Ok(ServerPush::Text(text)) => {
                    if socket.send(Message::Text(text)).await.is_err() {
                        return;
                    }
                }
                Ok(ServerPush::Close(code, reason)) => {
                    let frame = CloseFrame { code, reason: reason.into() };
                    let _ = socket.send(Message::Close(Some(frame))).await;
                    return;
                }
                Ok(ServerPush::Kick) | Err(_) => return,
            },
        }
    }
}

fn live_config(addr: SocketAddr) -> LiveConfig {
    LiveConfig {
        origin: format!("http://{}", addr),
        base_delay_ms: 50,
        max_attempts: 3,
        ..LiveConfig::default()
    }
}

fn watch_status(manager: &ConnectionManager) -> mpsc::UnboundedReceiver<ConnectionStatus> {
    let (tx, rx) = mpsc::unbounded_channel();
    manager.handle().on_status_change(move |change| {
        let _ = tx.send(change.status.clone());
    });
    rx
}

async fn next_status(rx: &mut mpsc::UnboundedReceiver<ConnectionStatus>) -> ConnectionStatus {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for status change")
        .expect("status channel closed")
}

async fn next_inbound(server: &mut TestServer) -> Value {
    let text = timeout(Duration::from_secs(5), server.inbound.recv())
        .await
        .expect("timed out waiting for client frame")
        .expect("inbound channel closed");
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn test_connect_subscribe_receive_and_reconnect() {
    let mut server = start_server().await;
    let manager = ConnectionManager::new(live_config(server.addr), Arc::new(WsConnector::new()));
    let handle = manager.handle();
    let mut statuses = watch_status(&manager);
    let view = StatsView::attach(&handle);

    let task = tokio::spawn(manager.run());

    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);

    let mut subscribed = Vec::new();
    for _ in 0..4 {
        subscribed.push(next_inbound(&mut server).await["channel"].clone());
    }
    assert_eq!(subscribed, vec![json!("activity"), json!("stats"), json!("alerts"), json!("charts")]);

    server
        .push
        .send(ServerPush::Text(
            json!({"type": "stats", "data": {"totalRequests": 9, "errorCount": 2}}).to_string(),
        ))
        .unwrap();

    timeout(Duration::from_secs(5), async {
        while view.stats().is_none() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("stats never reached the view");
    assert_eq!(view.stats().unwrap().total_requests, 9);

    // Drop the socket without a close frame
    server.push.send(ServerPush::Kick).unwrap();
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);

    // The new connection subscribes again
    assert_eq!(next_inbound(&mut server).await["type"], json!("subscribe"));

    handle.shutdown();
    let final_state = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(final_state, ConnectionState::Idle);
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);
}

#[tokio::test]
async fn test_server_close_frame_is_terminal() {
    let server = start_server().await;
    let manager = ConnectionManager::new(live_config(server.addr), Arc::new(WsConnector::new()));
    let mut statuses = watch_status(&manager);

    let task = tokio::spawn(manager.run());
    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Connected);

    server.push.send(ServerPush::Close(1000, "maintenance")).unwrap();

    assert_eq!(next_status(&mut statuses).await, ConnectionStatus::Disconnected);
    match next_status(&mut statuses).await {
        ConnectionStatus::Failed(reason) => assert!(reason.contains("maintenance"), "reason: {}", reason),
        other => panic!("expected failure, got {:?}", other),
    }

    let final_state = timeout(Duration::from_secs(5), task).await.unwrap().unwrap();
    assert_eq!(final_state, ConnectionState::Failed);
}

#[tokio::test]
async fn test_unreachable_server_gives_up_after_max_attempts() {
    // Reserve a port, then close it so connects are refused
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = LiveConfig {
        base_delay_ms: 10,
        max_attempts: 2,
        ..live_config(addr)
    };
    let manager = ConnectionManager::new(config, Arc::new(WsConnector::new()));
    let mut statuses = watch_status(&manager);

    let final_state = timeout(Duration::from_secs(5), manager.run()).await.unwrap();
    assert_eq!(final_state, ConnectionState::Failed);

    let mut seen = Vec::new();
    while let Ok(status) = statuses.try_recv() {
        seen.push(status);
    }
    assert_eq!(
        seen,
        vec![
            ConnectionStatus::Disconnected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Failed("Max reconnection attempts reached".to_string()),
        ]
    );
}
