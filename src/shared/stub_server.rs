//! Loopback HTTP server answering from a fixed routing function, for
//! exercising the HTTP clients against real sockets.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};

/// One request as the server saw it. `path` keeps its percent-encoding.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub query: String,
    pub authorization: Option<String>,
    pub body: String,
}

type Respond = fn(&RecordedRequest) -> HttpResponse;

struct StubState {
    respond: Respond,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

async fn answer(req: HttpRequest, body: web::Bytes, state: web::Data<StubState>) -> HttpResponse {
    let recorded = RecordedRequest {
        method: req.method().to_string(),
        path: req.uri().path().to_string(),
        query: req.query_string().to_string(),
        authorization: req
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: String::from_utf8_lossy(&body).into_owned(),
    };
    let response = (state.respond)(&recorded);
    if let Ok(mut log) = state.requests.lock() {
        log.push(recorded);
    }
    response
}

pub struct StubServer {
    pub base_url: String,
    handle: ServerHandle,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub fn start(respond: Respond) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let state = web::Data::new(StubState {
            respond,
            requests: requests.clone(),
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .default_service(web::to(answer))
        })
        .workers(1)
        .shutdown_timeout(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .expect("bind stub server");

        let port = server.addrs()[0].port();
        let server = server.run();
        let handle = server.handle();
        tokio::spawn(server);

        Self {
            base_url: format!("http://127.0.0.1:{}", port),
            handle,
            requests,
        }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().expect("request log").clone()
    }

    pub async fn stop(self) {
        if tokio::time::timeout(Duration::from_secs(2), self.handle.stop(true))
            .await
            .is_err()
        {
            self.handle.stop(false).await;
        }
    }
}
