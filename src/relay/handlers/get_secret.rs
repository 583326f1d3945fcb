use crate::{
    delivery::MessageDelivery,
    relay::{
        error::Error,
        handlers::{Message, RateLimit, enforce},
        rate_limit::Endpoint,
    },
    replicate::DirtyFlag,
    store::CredentialStore,
};
use axum::{Json, extract::ConnectInfo, extract::Extension, http::HeaderMap};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{net::SocketAddr, sync::Arc};
use tracing::{instrument, warn};
use utoipa::ToSchema;

/// 10 digits is enough entropy for a short-lived, rate-limited, single-use
/// code; cryptographic randomness is not required here.
const SECRET_LENGTH: usize = 10;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SecretRequest {
    pub username: Option<String>,
}

fn generate_secret(length: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect()
}

#[utoipa::path(
    post,
    path = "/getSecret",
    request_body = SecretRequest,
    responses(
        (status = 200, description = "Secret generated and delivery requested", body = Message),
        (status = 400, description = "Username is missing", body = String),
        (status = 429, description = "Rate limit exceeded", body = String),
    ),
    tag = "relay",
)]
/// Issue a one-time secret for `username` and request PM delivery.
///
/// Delivery is best effort: the secret is already persisted, so a failed send
/// is logged and the response still reports success.
#[instrument(skip_all)]
pub async fn get_secret(
    Extension(store): Extension<Arc<CredentialStore>>,
    Extension(delivery): Extension<Arc<dyn MessageDelivery>>,
    Extension(dirty): Extension<DirtyFlag>,
    Extension(limit): Extension<RateLimit>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    payload: Option<Json<SecretRequest>>,
) -> Result<Json<Message>, Error> {
    enforce(&limit, Endpoint::GetSecret, &headers, peer.as_ref())?;

    let username = payload
        .and_then(|Json(request)| request.username)
        .filter(|username| !username.trim().is_empty())
        .ok_or_else(|| Error::Validation("Username is required".to_string()))?;

    let secret = generate_secret(SECRET_LENGTH);

    store.upsert_pending_secret(&username, &secret).await?;
    dirty.mark();

    if let Err(err) = delivery
        .send_message(
            &username,
            "Verify your identity",
            &format!("Your verification code is {secret}."),
        )
        .await
    {
        warn!("Failed to send PM to {username}: {err}");
    }

    Ok(Json(Message {
        message: format!("Secret generated and PM sent for {username}"),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_is_fixed_length_numeric() {
        for _ in 0..100 {
            let secret = generate_secret(SECRET_LENGTH);
            assert_eq!(secret.len(), SECRET_LENGTH);
            assert!(secret.chars().all(|c| c.is_ascii_digit()));
        }
    }
}
