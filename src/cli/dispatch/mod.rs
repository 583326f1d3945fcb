use crate::cli::actions::{Action, server::Args};
use anyhow::{Context, Result};
use secrecy::SecretString;
use std::path::PathBuf;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let db_path = matches
        .get_one::<String>("db")
        .map(PathBuf::from)
        .context("missing required argument: --db")?;

    let blob_endpoint = matches
        .get_one::<String>("blob-endpoint")
        .cloned()
        .context("missing required argument: --blob-endpoint")?;

    let blob_remote_name = matches
        .get_one::<String>("blob-remote-name")
        .cloned()
        .context("missing required argument: --blob-remote-name")?;

    let forum_url = matches
        .get_one::<String>("forum-url")
        .cloned()
        .context("missing required argument: --forum-url")?;

    let ip_header = matches
        .get_one::<String>("ip-header")
        .cloned()
        .context("missing required argument: --ip-header")?;

    Ok(Action::Server(Args {
        port,
        db_path,
        blob_endpoint,
        blob_remote_name,
        blob_token: matches
            .get_one::<String>("blob-token")
            .map(|token| SecretString::from(token.clone())),
        forum_url,
        forum_session_cookie: matches
            .get_one::<String>("forum-session-cookie")
            .map(|cookie| SecretString::from(cookie.clone())),
        forum_user_cookie: matches
            .get_one::<String>("forum-user-cookie")
            .map(|cookie| SecretString::from(cookie.clone())),
        bot_email: matches.get_one::<String>("bot-email").cloned(),
        ip_header,
    }))
}
