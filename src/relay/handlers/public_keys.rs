use crate::{
    relay::{
        error::Error,
        handlers::{RateLimit, enforce},
        rate_limit::Endpoint,
    },
    store::CredentialStore,
};
use axum::{Json, extract::ConnectInfo, extract::Extension, http::HeaderMap};
use std::{collections::BTreeMap, net::SocketAddr, sync::Arc};
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/getPublicKeys",
    responses(
        (status = 200, description = "Mapping of username to registered public key"),
        (status = 429, description = "Rate limit exceeded", body = String),
    ),
    tag = "relay",
)]
/// List every registered public key. The request body is ignored.
#[instrument(skip_all)]
pub async fn public_keys(
    Extension(store): Extension<Arc<CredentialStore>>,
    Extension(limit): Extension<RateLimit>,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
) -> Result<Json<BTreeMap<String, String>>, Error> {
    enforce(&limit, Endpoint::PublicKeys, &headers, peer.as_ref())?;

    Ok(Json(store.get_public_keys().await?))
}
