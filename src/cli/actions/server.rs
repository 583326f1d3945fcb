use crate::{
    delivery::{DiscourseMessenger, MessageDelivery},
    relay,
    replicate::{self, BlobStorage, HttpBlobStore},
    store::CredentialStore,
};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::{path::PathBuf, sync::Arc};
use tracing::info;
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub db_path: PathBuf,
    pub blob_endpoint: String,
    pub blob_remote_name: String,
    pub blob_token: Option<SecretString>,
    pub forum_url: String,
    pub forum_session_cookie: Option<SecretString>,
    pub forum_user_cookie: Option<SecretString>,
    pub bot_email: Option<String>,
    pub ip_header: String,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the store cannot be opened or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let blob_endpoint = Url::parse(&args.blob_endpoint).context("Invalid blob endpoint URL")?;
    let blob: Arc<dyn BlobStorage> = Arc::new(
        HttpBlobStore::new(
            &blob_endpoint,
            &args.blob_remote_name,
            args.blob_token.clone(),
        )
        .context("Failed to build blob store client")?,
    );

    replicate::restore_if_missing(&args.db_path, blob.as_ref()).await;

    let store = Arc::new(
        CredentialStore::open(&args.db_path)
            .await
            .context("Failed to open credential store")?,
    );

    let forum_url = Url::parse(&args.forum_url).context("Invalid forum URL")?;
    let delivery: Arc<dyn MessageDelivery> = Arc::new(
        DiscourseMessenger::new(
            forum_url,
            args.forum_session_cookie.clone(),
            args.forum_user_cookie.clone(),
            args.bot_email.clone(),
        )
        .context("Failed to build forum client")?,
    );

    relay::new(args.port, store, delivery, blob, args.ip_header).await
}

fn log_startup_args(args: &Args) {
    info!(
        port = args.port,
        db = %args.db_path.display(),
        blob_endpoint = %args.blob_endpoint,
        blob_remote_name = %args.blob_remote_name,
        blob_token_set = args.blob_token.is_some(),
        forum_url = %args.forum_url,
        forum_session_set = args.forum_session_cookie.is_some(),
        forum_user_cookie_set = args.forum_user_cookie.is_some(),
        ip_header = %args.ip_header,
        "Startup configuration"
    );
}
