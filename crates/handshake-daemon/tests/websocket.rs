//! WebSocket endpoints against a served daemon

use futures_util::{SinkExt, StreamExt};
use handshake_daemon::api::rest::state::AppState;
use handshake_daemon::error::DaemonResult;
use handshake_daemon::wallet::LocalWallet;
use handshake_daemon::{DaemonConfig, Server};
use handshake_types::{ClaimSet, ErrorCode, GatewayMessage, SessionId};
use serde_json::json;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    state: AppState,
    shutdown: oneshot::Sender<()>,
    server: JoinHandle<DaemonResult<()>>,
}

async fn start() -> Running {
    let mut config = DaemonConfig::default();
    config.watcher.poll_interval_ms = 50;

    let server = Server::new(config).await.unwrap();
    let state = server.state();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (shutdown, signal) = oneshot::channel::<()>();
    let server = tokio::spawn(server.serve(listener, async move {
        let _ = signal.await;
    }));

    Running {
        addr,
        state,
        shutdown,
        server,
    }
}

async fn connect(addr: SocketAddr, path: &str) -> Socket {
    let (socket, _) = tokio_tungstenite::connect_async(format!("ws://{}{}", addr, path))
        .await
        .unwrap();
    socket
}

async fn next_message(socket: &mut Socket) -> GatewayMessage {
    let read = async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
                Some(Ok(Message::Ping(_) | Message::Pong(_))) => continue,
                other => panic!("expected a text frame, got {:?}", other),
            }
        }
    };
    tokio::time::timeout(WAIT, read).await.unwrap()
}

async fn expect_close(socket: &mut Socket) {
    let frame = tokio::time::timeout(WAIT, socket.next()).await.unwrap();
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None));
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn hanging_up_stops_watching() {
    let daemon = start().await;
    let mut socket = connect(daemon.addr, "/ws/sso-status?userId=xyz").await;

    let watcher = daemon.state.watcher.clone();
    eventually(|| watcher.watching() == 1).await;

    socket.close(None).await.unwrap();
    drop(socket);

    eventually(|| watcher.watching() == 0).await;
    assert!(daemon.state.gateway.registry().is_empty());

    daemon.shutdown.send(()).unwrap();
    daemon.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn handshake_socket_receives_code_then_result() {
    let daemon = start().await;
    let mut socket = connect(daemon.addr, "/ws/handshake?sessionId=abc123").await;

    let GatewayMessage::Pending {
        session_id, token, ..
    } = next_message(&mut socket).await
    else {
        panic!("expected pending message");
    };
    assert_eq!(session_id.as_str(), "abc123");

    let device = LocalWallet::new("development-seed", "did:local:handshake");
    let response = device
        .respond(&token, "did:x:1", ClaimSet::new().with("givenName", "Ann"))
        .unwrap();
    daemon
        .state
        .receiver
        .submit(&SessionId::new("abc123").unwrap(), &response)
        .await
        .unwrap();

    assert_eq!(
        next_message(&mut socket).await,
        GatewayMessage::Success {
            data: json!({"did": "did:x:1", "firstName": "Ann"})
        }
    );
    expect_close(&mut socket).await;

    let watcher = daemon.state.watcher.clone();
    eventually(|| watcher.watching() == 0).await;

    daemon.shutdown.send(()).unwrap();
    daemon.server.await.unwrap().unwrap();
}

#[tokio::test]
async fn shutdown_tells_waiting_socket_to_go_away() {
    let daemon = start().await;
    let mut socket = connect(daemon.addr, "/ws/sso-status?userId=xyz").await;

    let watcher = daemon.state.watcher.clone();
    eventually(|| watcher.watching() == 1).await;

    daemon.shutdown.send(()).unwrap();

    let message = next_message(&mut socket).await;
    assert!(matches!(
        message,
        GatewayMessage::Error {
            code: ErrorCode::Internal,
            ..
        }
    ));
    expect_close(&mut socket).await;

    tokio::time::timeout(WAIT, daemon.server)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
}
