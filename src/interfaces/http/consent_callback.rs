use std::sync::Mutex;
use std::time::Duration;

use actix_web::dev::ServerHandle;
use actix_web::{get, web, App, HttpResponse, HttpServer, Responder};
use serde::Deserialize;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::domain::error::{AppError, Result};

/// Query parameters Google appends to the loopback redirect.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ConsentCallback {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

struct CallbackState {
    sender: Mutex<Option<oneshot::Sender<ConsentCallback>>>,
}

#[get("/")]
async fn consent_redirect(
    data: web::Data<CallbackState>,
    query: web::Query<ConsentCallback>,
) -> impl Responder {
    let params = query.into_inner();
    let message = if params.error.is_some() {
        "Authorization was not granted. You may close this window."
    } else {
        "The authentication flow has completed. You may close this window."
    };

    let sender = data.sender.lock().ok().and_then(|mut guard| guard.take());
    match sender {
        Some(sender) => {
            let _ = sender.send(params);
        }
        None => warn!("Ignoring repeated consent redirect"),
    }

    HttpResponse::Ok()
        .content_type("text/plain; charset=utf-8")
        .body(message)
}

/// One-shot loopback listener that receives the consent redirect.
pub struct ConsentListener {
    port: u16,
    handle: ServerHandle,
    receiver: oneshot::Receiver<ConsentCallback>,
}

impl ConsentListener {
    /// Binds an ephemeral port on 127.0.0.1 and starts serving.
    pub fn start() -> Result<Self> {
        let (sender, receiver) = oneshot::channel();
        let state = web::Data::new(CallbackState {
            sender: Mutex::new(Some(sender)),
        });

        let server = HttpServer::new(move || {
            App::new()
                .app_data(state.clone())
                .service(consent_redirect)
        })
        .workers(1)
        .shutdown_timeout(1)
        .disable_signals()
        .bind(("127.0.0.1", 0))
        .map_err(|err| AppError::Internal(format!("Failed to bind consent listener: {}", err)))?;

        let port = server
            .addrs()
            .first()
            .map(|addr| addr.port())
            .ok_or_else(|| AppError::Internal("Consent listener has no address".to_string()))?;

        let server = server.run();
        let handle = server.handle();
        tokio::spawn(server);

        info!(port, "Waiting for consent redirect");
        Ok(Self {
            port,
            handle,
            receiver,
        })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/", self.port)
    }

    /// Waits for the redirect, then shuts the listener down.
    pub async fn wait(self, limit: Duration) -> Result<ConsentCallback> {
        let Self {
            handle, receiver, ..
        } = self;

        let outcome = timeout(limit, receiver).await;

        if timeout(Duration::from_secs(2), handle.stop(true)).await.is_err() {
            handle.stop(false).await;
        }

        match outcome {
            Ok(Ok(callback)) => Ok(callback),
            Ok(Err(_)) => Err(AppError::Internal(
                "Consent listener closed without a redirect".to_string(),
            )),
            Err(_) => Err(AppError::Timeout(format!(
                "no consent redirect within {}s",
                limit.as_secs()
            ))),
        }
    }
}
