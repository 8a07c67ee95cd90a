//! End-to-end tests: a real server on an ephemeral port, driven by WebSocket
//! and HTTP clients.

use std::{
    net::SocketAddr,
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::{net::TcpListener, sync::oneshot};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, Message, client::IntoClientRequest},
};

use hiroba_server::{
    domain::{RoomId, UserId},
    infrastructure::{
        auth::{Claims, JwtAuthVerifier, Subject},
        message_pusher::WebSocketMessagePusher,
        store::{InMemoryChatStore, LocalFileStore},
    },
    ui::{ConnectionSettings, Dependencies, Server, SessionGateway, SweepSettings},
    usecase::UploadLimits,
};
use hiroba_shared::time::SystemClock;

const SECRET: &str = "integration-test-secret";
const ALICE: i64 = 1;
const BOB: i64 = 2;
const CAROL: i64 = 3;

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Server running in the background for the duration of a test
struct TestServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    _upload_dir: tempfile::TempDir,
}

impl TestServer {
    async fn start() -> Self {
        let upload_dir = tempfile::tempdir().unwrap();
        let store = Arc::new(InMemoryChatStore::with_rooms([
            (RoomId::new(7), vec![UserId::new(ALICE), UserId::new(BOB)]),
            (RoomId::new(9), vec![UserId::new(CAROL)]),
        ]));
        let gateway = Arc::new(SessionGateway::assemble(
            Dependencies {
                auth_verifier: Arc::new(JwtAuthVerifier::new(SECRET)),
                membership_store: store.clone(),
                message_store: store,
                file_store: Arc::new(LocalFileStore::new(upload_dir.path())),
                message_pusher: Arc::new(WebSocketMessagePusher::new()),
                clock: Arc::new(SystemClock),
            },
            UploadLimits::default(),
            50,
        ));
        let server = Server::new(
            gateway,
            ConnectionSettings::default(),
            SweepSettings {
                interval: Duration::from_secs(60),
                idle_timeout: Duration::from_secs(600),
            },
            upload_dir.path(),
        );

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        tokio::spawn(server.serve(listener, async move {
            let _ = shutdown_rx.await;
        }));

        TestServer {
            addr,
            shutdown: Some(shutdown_tx),
            _upload_dir: upload_dir,
        }
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Connect with `Authorization: Bearer <token>`
    async fn connect(&self, user_id: i64) -> Client {
        let mut request = self.ws_url().into_client_request().unwrap();
        request.headers_mut().insert(
            "Authorization",
            format!("Bearer {}", token(user_id)).parse().unwrap(),
        );
        let (stream, _) = connect_async(request).await.unwrap();
        stream
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

fn token(user_id: i64) -> String {
    let exp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
        + 3600;
    encode(
        &Header::default(),
        &Claims {
            sub: Subject::Number(user_id),
            exp,
        },
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .unwrap()
}

/// Next JSON text frame, skipping control frames
async fn next_frame(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .unwrap();
        if let Message::Text(text) = msg {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(client: &mut Client, frame: Value) {
    client
        .send(Message::Text(frame.to_string().into()))
        .await
        .unwrap();
}

fn online_status(room_id: i64, users: &[i64]) -> Value {
    json!({
        "event": "online_status",
        "data": {"roomId": room_id, "onlineUsers": users, "onlineCount": users.len()}
    })
}

#[tokio::test]
async fn test_presence_and_messaging_scenario() {
    // テスト項目: 2 人の接続・メッセージ送信・切断で、オンライン状況とメッセージが正しく届く
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.connect(ALICE).await;
    assert_eq!(next_frame(&mut alice).await, online_status(7, &[ALICE]));

    // when (操作): bob が接続する
    let mut bob = server.connect(BOB).await;

    // then (期待する結果):
    assert_eq!(next_frame(&mut alice).await, online_status(7, &[ALICE, BOB]));
    assert_eq!(next_frame(&mut bob).await, online_status(7, &[ALICE, BOB]));

    // when (操作): alice がメッセージを送る
    send(
        &mut alice,
        json!({"event": "sendMessage", "requestId": "m1", "data": {"chatId": 7, "content": "hi"}}),
    )
    .await;

    // then (期待する結果): alice には ack、bob には newMessage
    let ack = next_frame(&mut alice).await;
    assert_eq!(ack["event"], "ack");
    assert_eq!(ack["data"]["requestId"], "m1");
    let message = next_frame(&mut bob).await;
    assert_eq!(message["event"], "newMessage");
    assert_eq!(message["data"]["content"], "hi");
    assert_eq!(message["data"]["senderId"], ALICE);
    assert_eq!(message["data"]["roomId"], 7);

    // when (操作): bob が切断する
    bob.close(None).await.unwrap();

    // then (期待する結果):
    assert_eq!(next_frame(&mut alice).await, online_status(7, &[ALICE]));
}

#[tokio::test]
async fn test_connection_without_token_is_rejected() {
    // テスト項目: トークンなし・不正なトークンの接続はアップグレード前に 401 で拒否される
    // given (前提条件):
    let server = TestServer::start().await;

    // when (操作):
    let missing = connect_async(server.ws_url()).await;
    let invalid = connect_async(format!("{}?token=not-a-jwt", server.ws_url())).await;

    // then (期待する結果):
    for result in [missing, invalid] {
        match result {
            Err(WsError::Http(response)) => assert_eq!(response.status().as_u16(), 401),
            other => panic!("expected 401, got {:?}", other.map(|_| ())),
        }
    }
}

#[tokio::test]
async fn test_query_token_and_forbidden_subscribe() {
    // テスト項目: クエリのトークンで接続でき、メンバーでないルームへの subscribe は FORBIDDEN
    // given (前提条件):
    let server = TestServer::start().await;
    let url = format!("{}?token={}", server.ws_url(), token(ALICE));
    let (mut alice, _) = connect_async(url).await.unwrap();
    next_frame(&mut alice).await;

    // when (操作):
    send(
        &mut alice,
        json!({"event": "subscribeToChat", "requestId": "s1", "data": {"roomId": 9}}),
    )
    .await;

    // then (期待する結果):
    let reply = next_frame(&mut alice).await;
    assert_eq!(reply["event"], "error");
    assert_eq!(reply["data"]["code"], "FORBIDDEN");
    assert_eq!(reply["data"]["requestId"], "s1");

    let presence: Value = reqwest::get(server.http_url("/api/rooms/9/presence"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(presence["onlineCount"], 0);
}

#[tokio::test]
async fn test_chunked_upload_is_served_after_merge() {
    // テスト項目: チャンクを順不同で送ってマージすると、ファイルが配信されダウンロードできる
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.connect(ALICE).await;
    next_frame(&mut alice).await;
    let mut bob = server.connect(BOB).await;
    next_frame(&mut alice).await;
    next_frame(&mut bob).await;

    // when (操作): "hello world" を 2 チャンクで逆順に送ってマージする
    for (index, bytes) in [(1, "IHdvcmxk"), (0, "aGVsbG8=")] {
        send(
            &mut alice,
            json!({"event": "uploadChunk", "data": {"sessionId": "up-1", "index": index, "totalChunks": 2, "bytes": bytes}}),
        )
        .await;
        assert_eq!(next_frame(&mut alice).await["event"], "ack");
    }
    send(
        &mut alice,
        json!({"event": "mergeChunks", "data": {"sessionId": "up-1", "filename": "hello.txt", "mimetype": "text/plain", "size": 11, "roomId": 7}}),
    )
    .await;

    // then (期待する結果):
    let merged = next_frame(&mut alice).await;
    assert_eq!(merged["event"], "ack");
    let path = merged["data"]["file"]["path"].as_str().unwrap().to_string();

    let message = next_frame(&mut bob).await;
    assert_eq!(message["event"], "newMessage");
    assert_eq!(message["data"]["type"], "file");
    assert_eq!(message["data"]["fileId"], merged["data"]["file"]["id"]);

    let body = reqwest::get(server.http_url(&path))
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    assert_eq!(body, "hello world");
}

#[tokio::test]
async fn test_health_reports_connections() {
    // テスト項目: ヘルスチェックが接続数を返す
    // given (前提条件):
    let server = TestServer::start().await;
    let mut alice = server.connect(ALICE).await;
    next_frame(&mut alice).await;

    // when (操作):
    let health: Value = reqwest::get(server.http_url("/api/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    // then (期待する結果):
    assert_eq!(health["status"], "ok");
    assert_eq!(health["connections"], 1);
    assert_eq!(health["uploadSessions"], 0);
}
