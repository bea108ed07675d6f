//! Integration tests for the relay protocol over a real WebSocket connection.
//!
//! Each test binds the server on an ephemeral port in-process and drives it
//! with tokio-tungstenite clients.

use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use hiroba_server::{DeliveryPolicy, Server, ServerConfig};
use hiroba_shared::protocol::{ACK_EVENT, CHAT_EVENT, EXCEPTION_EVENT, Frame};
use serde_json::json;
use tokio::{net::TcpStream, sync::oneshot};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::protocol::Message,
};

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE: Duration = Duration::from_millis(300);

/// Helper struct to manage the in-process server lifecycle
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl TestServer {
    async fn start(delivery_policy: DeliveryPolicy) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let config = ServerConfig {
            delivery_policy,
            ..ServerConfig::default()
        };
        let (shutdown, shutdown_rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            Server::from_config(config)
                .serve(listener, async {
                    let _ = shutdown_rx.await;
                })
                .await
                .unwrap();
        });

        TestServer {
            addr,
            shutdown: Some(shutdown),
        }
    }

    fn url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

/// Helper struct wrapping a raw WebSocket client
struct TestClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl TestClient {
    async fn connect(url: &str) -> Self {
        let (stream, _response) = connect_async(url).await.unwrap();
        TestClient { stream }
    }

    /// Connect and wait until the server has registered the connection
    async fn connect_registered(url: &str, nickname: &str) -> Self {
        let mut client = Self::connect(url).await;
        client.send_chat(nickname, "joined", None).await;
        let frame = client.recv_frame().await;
        assert!(frame.is(CHAT_EVENT));
        client
    }

    async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.to_string().into()))
            .await
            .unwrap();
    }

    async fn send_chat(&mut self, nickname: &str, message: &str, ack: Option<u64>) {
        let mut frame = json!({"event": "chat", "data": {"nickname": nickname, "message": message}});
        if let Some(ack) = ack {
            frame["ack"] = json!(ack);
        }
        self.send_text(&frame.to_string()).await;
    }

    async fn try_recv_frame(&mut self, wait: Duration) -> Option<Frame> {
        loop {
            let next = tokio::time::timeout(wait, self.stream.next()).await.ok()??;
            match next.unwrap() {
                Message::Text(text) => return Some(Frame::from_json(text.as_str()).unwrap()),
                Message::Close(_) => return None,
                _ => continue,
            }
        }
    }

    async fn recv_frame(&mut self) -> Frame {
        self.try_recv_frame(RECV_TIMEOUT)
            .await
            .expect("expected a frame from the server")
    }
}

#[tokio::test]
async fn test_chat_is_broadcast_to_every_connection_including_sender() {
    // テスト項目: alice の送信は alice 自身を含む全接続にサーバー時刻付きで届く
    // given (前提条件):
    let server = TestServer::start(DeliveryPolicy::Broadcast).await;
    let mut alice = TestClient::connect_registered(&server.url(), "alice").await;
    let mut bob = TestClient::connect_registered(&server.url(), "bob").await;
    // bob's join message also reached alice
    alice.recv_frame().await;

    // when (操作):
    alice.send_chat("alice", "hi", None).await;

    // then (期待する結果):
    for client in [&mut alice, &mut bob] {
        let frame = client.recv_frame().await;
        assert!(frame.is(CHAT_EVENT));
        assert_eq!(frame.data["nickname"], "alice");
        assert_eq!(frame.data["message"], "hi");
        assert!(frame.data["time"].as_i64().unwrap() > 0);
    }
}

#[tokio::test]
async fn test_invalid_chat_returns_exception_to_sender_only() {
    // テスト項目: nickname が空のメッセージは送信者にだけ exception が返り、chat は配信されない
    // given (前提条件):
    let server = TestServer::start(DeliveryPolicy::Broadcast).await;
    let mut alice = TestClient::connect_registered(&server.url(), "alice").await;
    let mut bob = TestClient::connect_registered(&server.url(), "bob").await;
    alice.recv_frame().await;

    // when (操作):
    alice.send_chat("", "hi", None).await;

    // then (期待する結果):
    let frame = alice.recv_frame().await;
    assert!(frame.is(EXCEPTION_EVENT));
    assert_eq!(
        frame.data,
        json!({"status": "error", "message": "nickname should not be empty"})
    );
    assert!(alice.try_recv_frame(SILENCE).await.is_none());
    assert!(bob.try_recv_frame(SILENCE).await.is_none());
}

#[tokio::test]
async fn test_connection_stays_open_after_malformed_frames() {
    // テスト項目: 不正なフレームを送っても接続は維持され、その後のメッセージは中継される
    // given (前提条件):
    let server = TestServer::start(DeliveryPolicy::Broadcast).await;
    let mut alice = TestClient::connect(&server.url()).await;

    // when (操作):
    alice.send_text("this is not json").await;
    alice.send_text(r#"{"event":"chat","data":"hi"}"#).await;
    alice.send_chat("alice", "still here", None).await;

    // then (期待する結果):
    assert!(alice.recv_frame().await.is(EXCEPTION_EVENT));
    assert!(alice.recv_frame().await.is(EXCEPTION_EVENT));
    let frame = alice.recv_frame().await;
    assert!(frame.is(CHAT_EVENT));
    assert_eq!(frame.data["message"], "still here");
}

#[tokio::test]
async fn test_ack_is_sent_for_valid_and_invalid_messages() {
    // テスト項目: ack を要求したメッセージには成功時 {}、失敗時 {error} の ack が返る
    // given (前提条件):
    let server = TestServer::start(DeliveryPolicy::Broadcast).await;
    let mut alice = TestClient::connect(&server.url()).await;

    // when (操作):
    alice.send_chat("alice", "hi", Some(1)).await;
    alice.send_chat("alice", "", Some(2)).await;

    // then (期待する結果):
    assert!(alice.recv_frame().await.is(CHAT_EVENT));
    let ok = alice.recv_frame().await;
    assert!(ok.is(ACK_EVENT));
    assert_eq!(ok.ack, Some(1));
    assert_eq!(ok.data, json!({}));

    assert!(alice.recv_frame().await.is(EXCEPTION_EVENT));
    let failed = alice.recv_frame().await;
    assert!(failed.is(ACK_EVENT));
    assert_eq!(failed.ack, Some(2));
    assert_eq!(failed.data, json!({"error": "message should not be empty"}));
}

#[tokio::test]
async fn test_broadcast_is_not_delivered_to_late_connection() {
    // テスト項目: 送信後に接続したクライアントにはそのメッセージは届かない
    // given (前提条件):
    let server = TestServer::start(DeliveryPolicy::Broadcast).await;
    let mut alice = TestClient::connect_registered(&server.url(), "alice").await;
    let mut bob = TestClient::connect_registered(&server.url(), "bob").await;
    alice.recv_frame().await;

    // when (操作):
    alice.send_chat("alice", "before charlie", None).await;
    assert_eq!(alice.recv_frame().await.data["message"], "before charlie");
    assert_eq!(bob.recv_frame().await.data["message"], "before charlie");
    let mut charlie = TestClient::connect(&server.url()).await;

    // then (期待する結果):
    assert!(charlie.try_recv_frame(SILENCE).await.is_none());
}

#[tokio::test]
async fn test_echo_policy_replies_to_sender_only() {
    // テスト項目: echo ポリシーでは送信者にだけメッセージが返る
    // given (前提条件):
    let server = TestServer::start(DeliveryPolicy::Echo).await;
    let mut alice = TestClient::connect_registered(&server.url(), "alice").await;
    let mut bob = TestClient::connect_registered(&server.url(), "bob").await;

    // when (操作):
    alice.send_chat("alice", "only me", None).await;

    // then (期待する結果):
    assert_eq!(alice.recv_frame().await.data["message"], "only me");
    assert!(bob.try_recv_frame(SILENCE).await.is_none());
}

#[tokio::test]
async fn test_others_policy_skips_sender() {
    // テスト項目: others ポリシーでは送信者以外にだけメッセージが届く
    // given (前提条件):
    let server = TestServer::start(DeliveryPolicy::Others).await;
    let mut alice = TestClient::connect(&server.url()).await;
    let mut bob = TestClient::connect(&server.url()).await;
    // make sure both connections are registered before sending
    tokio::time::sleep(Duration::from_millis(200)).await;

    // when (操作):
    alice.send_chat("alice", "to the others", None).await;

    // then (期待する結果):
    assert_eq!(bob.recv_frame().await.data["message"], "to the others");
    assert!(alice.try_recv_frame(SILENCE).await.is_none());
}
