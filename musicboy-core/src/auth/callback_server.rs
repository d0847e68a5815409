use std::{net::SocketAddr, sync::Arc};

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Html,
    routing::get,
};
use axum_server::Handle;
use serde::Deserialize;
use tokio::sync::oneshot;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use musicboy_common::traits::repository_traits::PendingAuthRepository;
use crate::auth::oauth::user_id_from_state;
use crate::Error;

/// Query string Spotify redirects back with: ?code=xxx&state=<uid>:<nonce>
#[derive(Debug, Deserialize)]
pub struct AuthQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

#[derive(Clone)]
pub struct CallbackServerState {
    pub pending_repo: Arc<dyn PendingAuthRepository>,
}

/// Start the OAuth redirect listener on localhost. Returns the shutdown
/// handle; dropping it does not stop the server, sending on it does.
pub async fn start_callback_server(
    port: u16,
    pending_repo: Arc<dyn PendingAuthRepository>,
) -> Result<oneshot::Sender<()>, Error> {
    let state = CallbackServerState { pending_repo };

    let app = Router::new()
        .route("/callback", get(handle_callback))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    let (shutdown_send, shutdown_recv) = oneshot::channel::<()>();
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    info!("OAuth callback server listening on http://{}", addr);

    let handle = Handle::new();
    let handle_clone = handle.clone();

    tokio::spawn(async move {
        let _ = shutdown_recv.await;
        handle_clone.graceful_shutdown(None);
    });

    let server = axum_server::bind(addr)
        .handle(handle)
        .serve(app.into_make_service());

    tokio::spawn(async move {
        if let Err(e) = server.await {
            error!("Callback server error: {}", e);
        }
        info!("Callback server shut down.");
    });

    Ok(shutdown_send)
}

async fn handle_callback(
    State(state): State<CallbackServerState>,
    Query(query): Query<AuthQuery>,
) -> (StatusCode, Html<String>) {
    if let Some(err) = query.error.as_ref() {
        let msg = format!("<h2>Spotify authorization failed</h2><p>{}</p>", err);
        return (StatusCode::OK, Html(msg));
    }

    let (Some(code), Some(oauth_state)) = (query.code.clone(), query.state.clone()) else {
        let msg = "<h2>Missing 'code' or 'state' query param</h2><p>Try again from Discord.</p>";
        return (StatusCode::BAD_REQUEST, Html(msg.to_string()));
    };

    let Some(user_id) = user_id_from_state(&oauth_state) else {
        warn!("Callback with unparseable state: {oauth_state}");
        let msg = "<h2>Bad 'state' parameter</h2><p>Request a fresh link from the bot.</p>";
        return (StatusCode::BAD_REQUEST, Html(msg.to_string()));
    };

    if let Err(e) = state.pending_repo.store_code(user_id, &code).await {
        error!("Failed to store pending auth code for user {user_id}: {e}");
        let msg = "<h2>Something went wrong</h2><p>Please try again.</p>";
        return (StatusCode::INTERNAL_SERVER_ERROR, Html(msg.to_string()));
    }

    info!("Stored pending auth code for user {user_id}");
    let success = r#"
<h2>Spotify connected</h2>
<p>You can close this window and head back to Discord.</p>
"#;
    (StatusCode::OK, Html(success.to_string()))
}

pub async fn test_port_available(port: u16) -> Result<(), Error> {
    use tokio::net::TcpListener;
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    match TcpListener::bind(addr).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) => Err(Error::Platform(format!("Port {} not available: {}", port, e))),
    }
}
