//! End-to-end tests of the connection manager against an in-process relay server.
//!
//! Each server runs on its own tokio runtime in a dedicated thread, so
//! dropping it tears down every live socket like a crashed server would.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    thread::JoinHandle,
    time::Duration,
};

use futures_util::StreamExt;
use hiroba_client::{ClientConfig, ConnectionManager, ConnectionState, SessionEvent};
use hiroba_server::{Server, ServerConfig};
use serde_json::Value;
use tokio::{sync::oneshot, time::Instant};
use tokio_tungstenite::tungstenite::protocol::Message;

const WAIT_TIMEOUT: Duration = Duration::from_secs(5);

/// Helper struct to manage an in-process server lifecycle
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl TestServer {
    fn start(addr: &str) -> Self {
        let std_listener = std::net::TcpListener::bind(addr).unwrap();
        std_listener.set_nonblocking(true).unwrap();
        let addr = std_listener.local_addr().unwrap();
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        let thread = std::thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .unwrap();
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
                let server = Server::from_config(ServerConfig::default());
                tokio::select! {
                    result = server.serve(listener, std::future::pending()) => result.unwrap(),
                    _ = shutdown_rx => {}
                }
            });
            // dropping the runtime cancels every connection task
        });

        TestServer {
            addr,
            shutdown: Some(shutdown),
            thread: Some(thread),
        }
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    async fn connection_count(&self) -> u64 {
        let body: Value = reqwest::get(format!("http://{}/api/health", self.addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        body["connections"].as_u64().unwrap()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

fn config(url: String, nickname: &str) -> ClientConfig {
    ClientConfig {
        url,
        nickname: nickname.to_string(),
        reconnect_interval: Duration::from_millis(100),
        ..ClientConfig::default()
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not met in time");
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

fn texts(manager: &ConnectionManager) -> Vec<String> {
    manager.messages().into_iter().map(|e| e.text).collect()
}

#[tokio::test(flavor = "multi_thread")]
async fn test_message_reaches_every_client() {
    // テスト項目: alice の送信は bob のログにも alice 名義で追加される
    // given (前提条件):
    let server = TestServer::start("127.0.0.1:0");
    let alice = ConnectionManager::connect(config(server.ws_url(), "alice"));
    let bob = ConnectionManager::connect(config(server.ws_url(), "bob"));
    wait_until(|| alice.is_connected() && bob.is_connected()).await;
    // both connections must be registered before sending
    let mut registered = 0;
    let deadline = Instant::now() + WAIT_TIMEOUT;
    while registered < 2 && Instant::now() < deadline {
        registered = server.connection_count().await;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(registered, 2);

    // when (操作):
    alice.send_message("hi").unwrap();

    // then (期待する結果):
    wait_until(|| {
        bob.messages()
            .iter()
            .any(|e| e.text == "hi" && e.nickname == "alice")
    })
    .await;
    // optimistic entry plus the broadcast echo
    wait_until(|| alice.messages().iter().filter(|e| e.text == "hi").count() == 2).await;

    alice.dispose().await;
    bob.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_invalid_message_is_reported_in_log() {
    // テスト項目: サーバーに拒否されたメッセージは exception と送信失敗がログに残り、接続は維持される
    // given (前提条件):
    let server = TestServer::start("127.0.0.1:0");
    let manager = ConnectionManager::connect(config(server.ws_url(), ""));
    wait_until(|| manager.is_connected()).await;

    // when (操作):
    manager.send_message("hi").unwrap();

    // then (期待する結果):
    wait_until(|| manager.messages().len() == 4).await;
    assert_eq!(
        texts(&manager),
        vec![
            "Connected! How may I help you?",
            "hi",
            "nickname should not be empty",
            "Message failed to send: nickname should not be empty"
        ]
    );
    assert_eq!(manager.state(), ConnectionState::Connected);

    manager.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_reconnects_after_server_restart() {
    // テスト項目: サーバー再起動後に自動で再接続し、同じリスナーに通知が届き、ログが読みやすく残る
    // given (前提条件):
    let server = TestServer::start("127.0.0.1:0");
    let addr = server.addr;
    let mut manager = ConnectionManager::new(config(server.ws_url(), "alice"));
    let connected_events = Arc::new(AtomicUsize::new(0));
    let connected_events_clone = connected_events.clone();
    let _subscription = manager.subscribe(move |event| {
        if event == &SessionEvent::StateChanged(ConnectionState::Connected) {
            connected_events_clone.fetch_add(1, Ordering::SeqCst);
        }
    });
    manager.start();
    wait_until(|| manager.is_connected()).await;

    // when (操作):
    drop(server);
    wait_until(|| matches!(manager.state(), ConnectionState::Disconnected(_))).await;
    let _server = TestServer::start(&addr.to_string());
    wait_until(|| manager.is_connected()).await;

    // then (期待する結果):
    let texts = texts(&manager);
    assert_eq!(texts.len(), 3);
    assert_eq!(texts[0], "Connected! How may I help you?");
    assert!(texts[1].starts_with("Disconnected: "));
    assert!(texts[1].ends_with(". Reconnecting..."));
    assert_eq!(texts[2], "Connected! How may I help you?");
    assert_eq!(connected_events.load(Ordering::SeqCst), 2);

    manager.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unreachable_server_logs_every_failure() {
    // テスト項目: 接続できないサーバーへの再試行は Errored になり、失敗のたびにログが追加される
    // given (前提条件):
    let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}/ws", unused.local_addr().unwrap());
    drop(unused);

    // when (操作):
    let manager = ConnectionManager::connect(config(url, "alice"));
    wait_until(|| matches!(manager.state(), ConnectionState::Errored(_))).await;
    // let a few retries happen
    tokio::time::sleep(Duration::from_millis(400)).await;

    // then (期待する結果):
    let texts = texts(&manager);
    assert!(texts.len() >= 2);
    assert!(texts.iter().all(|text| text.starts_with("Connection failed: ")));
    assert!(manager.send_message("hello").is_err());

    manager.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_max_reconnect_attempts_stops_retrying() {
    // テスト項目: max_reconnect_attempts に達すると再接続をやめ、Errored のまま止まる
    // given (前提条件):
    let unused = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let url = format!("ws://{}/ws", unused.local_addr().unwrap());
    drop(unused);
    let attempts = Arc::new(AtomicUsize::new(0));
    let attempts_clone = attempts.clone();

    // when (操作):
    let mut manager = ConnectionManager::new(ClientConfig {
        max_reconnect_attempts: Some(2),
        reconnect_interval: Duration::from_millis(20),
        ..config(url, "alice")
    });
    let _subscription = manager.subscribe(move |event| {
        if event == &SessionEvent::StateChanged(ConnectionState::Connecting) {
            attempts_clone.fetch_add(1, Ordering::SeqCst);
        }
    });
    manager.start();
    tokio::time::sleep(Duration::from_millis(500)).await;

    // then (期待する結果):
    // the initial state is already Connecting, so only the retry is counted
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert!(matches!(manager.state(), ConnectionState::Errored(_)));
    assert_eq!(texts(&manager).len(), 2);

    manager.dispose().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_dispose_closes_connection_and_detaches_listeners() {
    // テスト項目: dispose するとリスナーへの通知が止まり、サーバー側の接続も解除される
    // given (前提条件):
    let server = TestServer::start("127.0.0.1:0");
    let manager = ConnectionManager::connect(config(server.ws_url(), "alice"));
    let events = Arc::new(AtomicUsize::new(0));
    let events_clone = events.clone();
    let _subscription = manager.subscribe(move |_| {
        events_clone.fetch_add(1, Ordering::SeqCst);
    });
    wait_until(|| manager.is_connected()).await;
    let seen_before_dispose = events.load(Ordering::SeqCst);

    // when (操作):
    manager.dispose().await;

    // then (期待する結果):
    let deadline = Instant::now() + WAIT_TIMEOUT;
    let mut connections = server.connection_count().await;
    while connections > 0 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
        connections = server.connection_count().await;
    }
    assert_eq!(connections, 0);
    assert_eq!(events.load(Ordering::SeqCst), seen_before_dispose);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_unacknowledged_message_fails_after_connection_drop() {
    // テスト項目: 送信直後に接続が切れて ack が届かなくても、ack_timeout 後に送信失敗がログに残る
    // given (前提条件):
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (received_tx, received_rx) = oneshot::channel::<String>();
    // accepts one connection, reads the chat frame and hangs up without an ack
    let silent_server = tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        while let Some(Ok(message)) = ws.next().await {
            if let Message::Text(text) = message {
                let _ = received_tx.send(text.to_string());
                break;
            }
        }
    });
    let manager = ConnectionManager::connect(ClientConfig {
        ack_timeout: Duration::from_millis(100),
        max_reconnect_attempts: Some(2),
        ..config(url, "alice")
    });
    wait_until(|| manager.is_connected()).await;

    // when (操作):
    manager.send_message("hello").unwrap();
    let received = received_rx.await.unwrap();
    silent_server.await.unwrap();

    // then (期待する結果):
    assert!(received.contains("hello"));
    wait_until(|| matches!(manager.state(), ConnectionState::Disconnected(_))).await;
    wait_until(|| {
        texts(&manager)
            .iter()
            .any(|text| text == "Message failed to send: acknowledgment timed out")
    })
    .await;

    manager.dispose().await;
}
