//! Drives the WebSocket fan-out hub over a real bound TCP port with
//! `tokio-tungstenite` as the client, since `axum::WebSocketUpgrade` cannot
//! be exercised through `tower::ServiceExt::oneshot`.

use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::{STANDARD, URL_SAFE};
use base64::Engine as _;
use futures_util::{SinkExt, StreamExt};
use relay_gateway::http::dto::EnvelopeWire;
use relay_gateway::{http, Authenticator, Hub, RelayController, RocksStore, Store};
use rsa::pkcs1::EncodeRsaPublicKey;
use rsa::pkcs1v15::Pkcs1v15Sign;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::{json, Value};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message as WsMessage;

struct TestServer {
    addr: std::net::SocketAddr,
    client: reqwest::Client,
}

impl TestServer {
    async fn spawn(dir: &tempfile::TempDir) -> Self {
        let store: Arc<dyn Store> = Arc::new(RocksStore::open(dir.path().to_str().unwrap()).unwrap());
        let authenticator = Arc::new(Authenticator::new(
            "challenge-secret",
            "bearer-secret",
            32,
            Duration::from_secs(300),
            Duration::from_secs(3600),
        ));
        let controller = RelayController::new(store);
        let hub = Hub::spawn();
        let state = http::AppState {
            controller,
            authenticator,
            hub,
        };
        let router = http::build_router(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.ok();
        });

        Self {
            addr,
            client: reqwest::Client::new(),
        }
    }

    fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    fn ws_url(&self, path: &str) -> String {
        format!("ws://{}{}", self.addr, path)
    }

    /// Registers a fresh RSA-keyed user and completes the nonce-challenge
    /// round trip, returning the bearer token and the signing key.
    async fn register_and_authenticate(&self, username: &str) -> (String, RsaPrivateKey) {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).unwrap();
        let public_key = RsaPublicKey::from(&private_key);
        let pem = public_key.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap();

        let resp = self
            .client
            .post(self.http_url("/api/v1/users"))
            .json(&json!({
                "name": username,
                "publicKey": STANDARD.encode(pem.as_bytes()),
            }))
            .send()
            .await
            .unwrap();
        assert!(resp.status().is_success());

        let challenge: Value = self
            .client
            .get(self.http_url(&format!("/api/v1/auth/{username}")))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        let nonce_bytes = URL_SAFE.decode(challenge["nonce"].as_str().unwrap()).unwrap();
        let signature = private_key.sign(Pkcs1v15Sign::new_unprefixed(), &nonce_bytes).unwrap();
        let signed_nonce = URL_SAFE.encode(signature);

        let bearer: Value = self
            .client
            .post(self.http_url(&format!("/api/v1/auth/{username}")))
            .json(&json!({
                "signedNonce": signed_nonce,
                "token": challenge["token"].as_str().unwrap(),
            }))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        (bearer["token"].as_str().unwrap().to_string(), private_key)
    }

    async fn connect_ws(
        &self,
        username: &str,
        bearer: &str,
    ) -> tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>> {
        let mut request = self.ws_url(&format!("/api/v1/ws/{username}")).into_client_request().unwrap();
        request.headers_mut().insert(
            axum::http::header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {bearer}")).unwrap(),
        );
        let (stream, _) = tokio_tungstenite::connect_async(request).await.unwrap();
        stream
    }
}

fn envelope_frame(sender: &str, recipient: &str) -> String {
    serde_json::to_string(&EnvelopeWire {
        sender: sender.into(),
        recipient: recipient.into(),
        cipher_sym_key: vec![1, 2, 3],
        ciphertext: vec![4, 5, 6, 7],
    })
    .unwrap()
}

#[tokio::test]
async fn websocket_fan_out_delivers_to_live_recipient_without_persisting() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::spawn(&dir).await;

    let (alice_token, _) = server.register_and_authenticate("alice").await;
    let (bob_token, _) = server.register_and_authenticate("bob").await;

    let mut alice_ws = server.connect_ws("alice", &alice_token).await;
    let mut bob_ws = server.connect_ws("bob", &bob_token).await;

    alice_ws
        .send(WsMessage::Text(envelope_frame("alice", "bob")))
        .await
        .unwrap();

    let received = tokio::time::timeout(Duration::from_secs(5), bob_ws.next())
        .await
        .expect("bob should receive the fanned-out envelope")
        .unwrap()
        .unwrap();
    let WsMessage::Text(text) = received else {
        panic!("expected a text frame, got {received:?}");
    };
    let wire: EnvelopeWire = serde_json::from_str(&text).unwrap();
    assert_eq!(wire.sender.as_str(), "alice");
    assert_eq!(wire.recipient.as_str(), "bob");
    assert_eq!(wire.ciphertext, vec![4, 5, 6, 7]);

    // Hub-routed delivery is not persisted: draining over HTTP afterward
    // stays empty.
    let drained: Value = server
        .client
        .get(server.http_url("/api/v1/messages/bob"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(drained, json!([]));
}

#[tokio::test]
async fn spoofed_sender_frame_is_dropped_silently() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::spawn(&dir).await;

    let (alice_token, _) = server.register_and_authenticate("alice").await;
    let (bob_token, _) = server.register_and_authenticate("bob").await;
    let (_carol_token, _) = server.register_and_authenticate("carol").await;

    let mut alice_ws = server.connect_ws("alice", &alice_token).await;
    let mut bob_ws = server.connect_ws("bob", &bob_token).await;

    // alice is bound to her own session but claims to be carol; the reader
    // must reject this rather than route it.
    alice_ws
        .send(WsMessage::Text(envelope_frame("carol", "bob")))
        .await
        .unwrap();

    let outcome = tokio::time::timeout(Duration::from_millis(500), bob_ws.next()).await;
    assert!(outcome.is_err(), "bob should not receive a frame with a spoofed sender");
}

#[tokio::test]
async fn http_deposit_to_offline_recipient_is_persisted_and_drained_once() {
    let dir = tempfile::tempdir().unwrap();
    let server = TestServer::spawn(&dir).await;

    let (alice_token, _) = server.register_and_authenticate("alice").await;
    let (bob_token, _) = server.register_and_authenticate("bob").await;

    let resp = server
        .client
        .post(server.http_url("/api/v1/messages/alice"))
        .bearer_auth(&alice_token)
        .json(&json!({
            "sender": "alice",
            "recipient": "bob",
            "cipherSymKey": STANDARD.encode([1, 2, 3]),
            "ciphertext": STANDARD.encode([4, 5, 6]),
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), reqwest::StatusCode::CREATED);

    let first_drain: Vec<EnvelopeWire> = server
        .client
        .get(server.http_url("/api/v1/messages/bob"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(first_drain.len(), 1);
    assert_eq!(first_drain[0].sender.as_str(), "alice");

    let second_drain: Vec<EnvelopeWire> = server
        .client
        .get(server.http_url("/api/v1/messages/bob"))
        .bearer_auth(&bob_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(second_drain.is_empty(), "a drained message must not be returned again");
}
