//! The HTTP façade: maps the wire protocol in `/api/v1` onto calls against
//! the [`RelayController`], [`Authenticator`], and [`HubHandle`].
//!
//! Every handler here assumes path-level authorization (bearer subject vs.
//! `{u}`) has already run where required — [`crate::middleware::auth`] does
//! that before the request reaches these functions. Handlers still perform
//! the one check the auth layer can't: envelope-body sender vs. path user.

pub mod dto;

use std::sync::Arc;

use axum::extract::{Path, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use relay_types::Username;

use crate::auth::Authenticator;
use crate::controller::RelayController;
use crate::domain::{RelayError, RelayResult};
use crate::hub::HubHandle;
use crate::middleware::{AuthenticatedUser, BearerAuthLayer};
use dto::{
    AuthChallengeResponse, AuthChallengeSignedRequest, BearerTokenResponse, EnvelopeWire, PublicUserResponse,
    RegisterUserRequest,
};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub controller: RelayController,
    pub authenticator: Arc<Authenticator>,
    pub hub: HubHandle,
}

/// Builds the full `/api/v1` router: public routes, then bearer-guarded
/// routes layered with [`BearerAuthLayer`].
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/messages/:u", post(deposit_message).get(drain_messages))
        .route("/ws/:u", get(upgrade_websocket))
        .layer(BearerAuthLayer::new(Arc::clone(&state.authenticator)));

    let public = Router::new()
        .route("/users", post(register_user))
        .route("/users/:u", get(get_user))
        .route("/auth/:u", get(issue_challenge).post(verify_challenge));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api/v1", public.merge(protected))
        .with_state(state)
}

async fn healthz() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok", "version": crate::VERSION }))
}

async fn register_user(
    State(state): State<AppState>,
    Json(body): Json<RegisterUserRequest>,
) -> RelayResult<impl IntoResponse> {
    let public_key_pem =
        String::from_utf8(body.public_key).map_err(|e| RelayError::BadRequest(format!("public key is not valid UTF-8 PEM: {e}")))?;

    let already_existed = state.controller.register_user(body.name, &public_key_pem).await?;
    let status = if already_existed {
        axum::http::StatusCode::OK
    } else {
        axum::http::StatusCode::CREATED
    };
    Ok(status)
}

async fn get_user(State(state): State<AppState>, Path(username): Path<String>) -> RelayResult<impl IntoResponse> {
    let user = state.controller.get_user(&Username::from(username)).await?;
    Ok(Json(PublicUserResponse::from(user)))
}

async fn issue_challenge(State(state): State<AppState>, Path(username): Path<String>) -> RelayResult<impl IntoResponse> {
    let username = Username::from(username);
    // GET /auth/{u} 404s on an unknown user even though generate_challenge
    // itself doesn't check existence (that's deferred to verify_challenge).
    state.controller.get_user(&username).await?;
    let challenge = state.authenticator.generate_challenge(&username)?;
    Ok(Json(AuthChallengeResponse {
        nonce: challenge.nonce,
        token: challenge.token,
    }))
}

async fn verify_challenge(
    State(state): State<AppState>,
    Path(_username): Path<String>,
    Json(body): Json<AuthChallengeSignedRequest>,
) -> RelayResult<impl IntoResponse> {
    let bearer = state
        .authenticator
        .verify_challenge(&body.token, &body.signed_nonce, state.controller.store())
        .await?;
    Ok(Json(BearerTokenResponse { token: bearer }))
}

async fn deposit_message(
    State(state): State<AppState>,
    Path(path_user): Path<String>,
    axum::Extension(subject): axum::Extension<AuthenticatedUser>,
    Json(body): Json<EnvelopeWire>,
) -> RelayResult<impl IntoResponse> {
    debug_assert_eq!(subject.as_str(), path_user);
    if body.sender.as_str() != path_user {
        return Err(RelayError::Forbidden("envelope sender does not match path user".into()));
    }
    state.controller.deposit_message(body.into_envelope()).await?;
    Ok(axum::http::StatusCode::CREATED)
}

async fn drain_messages(
    State(state): State<AppState>,
    axum::Extension(subject): axum::Extension<AuthenticatedUser>,
) -> RelayResult<impl IntoResponse> {
    let envelopes = state.controller.drain_messages(&subject).await?;
    let wire: Vec<EnvelopeWire> = envelopes.into_iter().map(EnvelopeWire::from).collect();
    Ok(Json(wire))
}

async fn upgrade_websocket(
    State(state): State<AppState>,
    axum::Extension(subject): axum::Extension<AuthenticatedUser>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| async move {
        crate::ws::run_session(socket, subject, hub).await;
    })
}
