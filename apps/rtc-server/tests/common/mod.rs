#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::time;
use tokio_tungstenite::{tungstenite, MaybeTlsStream, WebSocketStream};

use rtc_server::config::Config;
use rtc_server::error::HandlerError;
use rtc_server::identity::Identity;
use rtc_server::rtc::hub::BroadcastHub;
use rtc_server::rtc::policies::{self, EveryonePolicy};
use rtc_server::rtc::{
    Action, BroadcastMessage, Payload, PolicyRef, Registry, StateGenerator, StateObject,
};
use rtc_server::AppState;

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Shared record of action lifecycle calls.
pub type Log = Arc<Mutex<Vec<String>>>;

pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
    pub log: Log,
}

/// Records every lifecycle call.
struct Ping {
    log: Log,
}

#[async_trait]
impl Action for Ping {
    async fn initialize(&mut self, identity: &Identity) -> Result<(), HandlerError> {
        self.log.lock().push(format!(
            "initialize({})",
            identity.user_id().unwrap_or("anonymous")
        ));
        Ok(())
    }

    async fn execute(&mut self, data: Payload) -> Result<(), HandlerError> {
        self.log
            .lock()
            .push(format!("execute({})", Value::Object(data)));
        Ok(())
    }

    async fn destroy(&mut self) -> Result<(), HandlerError> {
        self.log.lock().push("destroy".to_string());
        Ok(())
    }
}

/// Publishes `data.text` to every connection, signed with the sender's user.
struct Announce {
    hub: BroadcastHub,
    from: Option<String>,
}

#[async_trait]
impl Action for Announce {
    async fn initialize(&mut self, identity: &Identity) -> Result<(), HandlerError> {
        self.from = identity.user_id().map(str::to_string);
        Ok(())
    }

    async fn execute(&mut self, data: Payload) -> Result<(), HandlerError> {
        let mut out = Payload::new();
        out.insert("from".into(), self.from.clone().into());
        out.insert(
            "text".into(),
            data.get("text").cloned().unwrap_or(Value::Null),
        );
        self.hub.publish(BroadcastMessage::new(
            PolicyRef::new(policies::EVERYONE, EveryonePolicy),
            out,
        ));
        Ok(())
    }
}

/// Emits `data` as a single `Comment`.
#[derive(Default)]
struct NewComment;

#[async_trait]
impl StateGenerator for NewComment {
    async fn create(&self, data: Payload) -> Result<Vec<StateObject>, HandlerError> {
        Ok(vec![StateObject::new("Comment", data)])
    }
}

/// Start a real server on an ephemeral port. The server runs in the background.
pub async fn start_server(allow_anonymous: bool) -> TestServer {
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    let hub = BroadcastHub::new();

    let mut builder = Registry::builder();
    let ping_log = log.clone();
    let announce_hub = hub.clone();
    builder
        .with_builtin_policies()
        .unwrap()
        .register_action("Ping", move || Ping {
            log: ping_log.clone(),
        })
        .unwrap()
        .register_action("Announce", move || Announce {
            hub: announce_hub.clone(),
            from: None,
        })
        .unwrap()
        .register_state("NewComment", NewComment::default)
        .unwrap()
        .associate("Comment", policies::EVERYONE)
        .unwrap();

    let config = Config {
        allow_anonymous,
        ..Config::default()
    };
    let state = AppState::with_hub(config, builder.build(), hub);
    let app = rtc_server::routes::router(&state.config.rtc_path).with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state, log }
}

/// Connect and read the hello frame. Returns the socket and its resource id.
pub async fn connect(addr: SocketAddr, ticket: Option<&str>) -> (Ws, String) {
    let url = match ticket {
        Some(ticket) => format!("ws://{addr}/rtc?ticket={ticket}"),
        None => format!("ws://{addr}/rtc"),
    };
    let (mut ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");

    let hello = next_json(&mut ws).await;
    let resource = hello["resource"]
        .as_str()
        .expect("hello carries resource")
        .to_string();
    (ws, resource)
}

pub async fn send_json(ws: &mut Ws, value: Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

pub async fn send_text(ws: &mut Ws, text: &str) {
    ws.send(tungstenite::Message::Text(text.to_string().into()))
        .await
        .expect("send");
}

/// Next text frame as JSON, failing after 5s.
pub async fn next_json(ws: &mut Ws) -> Value {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for frame")
            .expect("stream ended")
            .expect("ws read error");

        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("parse frame");
        }
    }
}

/// Assert no text frame arrives within `window`.
pub async fn expect_silence(ws: &mut Ws, window: Duration) {
    if let Ok(Some(Ok(tungstenite::Message::Text(text)))) = time::timeout(window, ws.next()).await {
        panic!("unexpected frame: {text}");
    }
}

/// Poll `check` until it holds, failing after 5s.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = time::Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(time::Instant::now() < deadline, "condition not met in time");
        time::sleep(Duration::from_millis(10)).await;
    }
}

impl TestServer {
    pub fn log(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}
