use crate::{
    relay::{
        error::Error,
        handlers::{Message, RateLimit, enforce},
        rate_limit::Endpoint,
    },
    replicate::DirtyFlag,
    store::{Confirmation, CredentialStore},
};
use axum::{Json, extract::ConnectInfo, extract::Extension, http::HeaderMap};
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::{debug, instrument};
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AddKeyRequest {
    pub username: Option<String>,
    pub secret: Option<String>,
    pub public_key: Option<String>,
}

#[utoipa::path(
    post,
    path = "/addKey",
    request_body = AddKeyRequest,
    responses(
        (status = 200, description = "Public key registered", body = Message),
        (status = 400, description = "A required field is missing", body = String),
        (status = 403, description = "Secret does not match", body = String),
        (status = 429, description = "Rate limit exceeded", body = String),
    ),
    tag = "relay",
)]
/// Register a public key for `username` if the presented secret matches the
/// pending one. No partial mutation is visible on mismatch.
#[instrument(skip_all)]
pub async fn add_key(
    Extension(store): Extension<Arc<CredentialStore>>,
    Extension(dirty): Extension<DirtyFlag>,
    Extension(limit): Extension<RateLimit>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<AddKeyRequest>>,
) -> Result<Json<Message>, Error> {
    enforce(&limit, Endpoint::AddKey, &headers, peer.as_ref())?;

    let (username, secret, public_key) = payload
        .map(|Json(request)| request)
        .and_then(|request| {
            let username = request.username.filter(|field| !field.trim().is_empty())?;
            let secret = request.secret.filter(|field| !field.trim().is_empty())?;
            let public_key = request.public_key.filter(|field| !field.trim().is_empty())?;
            Some((username, secret, public_key))
        })
        .ok_or_else(|| {
            Error::Validation("username, secret, and public_key are required".to_string())
        })?;

    match store.confirm_key(&username, &secret, &public_key).await? {
        Confirmation::Confirmed => {}
        Confirmation::InvalidSecret => {
            debug!(username, "Secret mismatch on key registration");
            return Err(Error::InvalidSecret);
        }
    }

    dirty.mark();

    Ok(Json(Message {
        message: format!("RSA key for {username} added successfully"),
    }))
}
