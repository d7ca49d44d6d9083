//! In-process stand-in for a Volumio player, used by the tests

use std::sync::{Arc, Mutex};

use axum::{
    extract::State,
    http::{header, StatusCode, Uri},
    response::IntoResponse,
    routing::get,
    Router,
};
use tokio::{net::TcpListener, task::JoinHandle};

pub const PLAYING: &str = r#"{"status":"play","title":"Song","artist":"Artist","album":"Album","seek":1000,"duration":200,"volume":37,"repeat":false,"random":false,"consume":false,"volumio_version":"3.0","service":"mpd","trackType":"flac","samplerate":"44.1 kHz","bitdepth":"16 bit","channels":2,"updated":"","disableUiControls":false}"#;

/// Canned answers of a [`FakePlayer`]
#[derive(Clone, Debug)]
pub struct Responses {
    pub command_status: u16,
    pub state_status: u16,
    pub state_body: String,
}
impl Default for Responses {
    fn default() -> Self {
        Self {
            command_status: 200,
            state_status: 200,
            state_body: PLAYING.to_owned(),
        }
    }
}

#[derive(Clone)]
struct Shared {
    responses: Arc<Responses>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl Shared {
    fn record(&self, uri: &Uri) {
        self.requests.lock().unwrap().push(uri.to_string());
    }
}

/// Player API served by axum, recording the request targets it receives.
pub struct FakePlayer {
    pub port: u16,
    requests: Arc<Mutex<Vec<String>>>,
    server: JoinHandle<()>,
}

impl FakePlayer {
    pub async fn start(responses: Responses) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let app = Router::new()
            .route("/api/v1/getState", get(get_state))
            .route("/api/v1/commands/", get(command))
            .with_state(Shared {
                responses: Arc::new(responses),
                requests: Arc::clone(&requests),
            });

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            port,
            requests,
            server,
        }
    }

    pub fn address(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Request targets in arrival order, e.g. `/api/v1/getState`
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, prefix: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.starts_with(prefix))
            .count()
    }
}

impl Drop for FakePlayer {
    fn drop(&mut self) {
        self.server.abort();
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

async fn get_state(State(player): State<Shared>, uri: Uri) -> impl IntoResponse {
    player.record(&uri);
    (
        status(player.responses.state_status),
        [(header::CONTENT_TYPE, "application/json")],
        player.responses.state_body.clone(),
    )
}

async fn command(State(player): State<Shared>, uri: Uri) -> impl IntoResponse {
    player.record(&uri);
    let code = status(player.responses.command_status);
    let body = if code == StatusCode::NO_CONTENT {
        String::new()
    } else {
        r#"{"response":"ok"}"#.to_owned()
    };
    (code, [(header::CONTENT_TYPE, "application/json")], body)
}

/// A local port with nothing listening on it
pub async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
