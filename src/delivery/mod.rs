//! Message delivery to forum users.
//!
//! The relay only needs "deliver a message to a user"; the Discourse
//! private-message implementation below is one pluggable transport behind
//! [`MessageDelivery`].

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, info, instrument};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("message request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("message endpoint returned {0}")]
    Status(StatusCode),
    #[error("CSRF token missing in forum response")]
    MissingCsrf,
}

#[async_trait]
pub trait MessageDelivery: Send + Sync {
    /// Deliver `body` to `recipient` under `title`. Best effort; callers in
    /// the issue path log and swallow failures.
    async fn send_message(
        &self,
        recipient: &str,
        title: &str,
        body: &str,
    ) -> Result<(), DeliveryError>;
}

/// Sends Discourse private messages with a bot account session.
///
/// Discourse requires a CSRF token fetched per request from
/// `/session/csrf.json`; the message itself is a form-POST to `/posts.json`
/// with `archetype=private_message`.
#[derive(Debug)]
pub struct DiscourseMessenger {
    client: Client,
    base_url: Url,
    session_cookie: Option<SecretString>,
    user_cookie: Option<SecretString>,
}

impl DiscourseMessenger {
    /// # Errors
    /// Returns an error if the HTTP client fails to build.
    pub fn new(
        base_url: Url,
        session_cookie: Option<SecretString>,
        user_cookie: Option<SecretString>,
        user_agent: Option<String>,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .user_agent(user_agent.unwrap_or_else(|| crate::APP_USER_AGENT.to_string()))
            .build()?;

        Ok(Self {
            client,
            base_url,
            session_cookie,
            user_cookie,
        })
    }

    fn endpoint(&self, path: &str) -> Url {
        let mut url = self.base_url.clone();
        url.set_path(path);
        url
    }

    fn cookie_header(&self) -> Option<String> {
        let mut cookies = Vec::new();
        if let Some(session) = &self.session_cookie {
            cookies.push(format!("_forum_session={}", session.expose_secret()));
        }
        if let Some(token) = &self.user_cookie {
            cookies.push(format!("_t={}", token.expose_secret()));
        }
        if cookies.is_empty() {
            None
        } else {
            Some(cookies.join("; "))
        }
    }

    async fn csrf(&self) -> Result<String, DeliveryError> {
        #[derive(Deserialize)]
        struct Csrf {
            csrf: Option<String>,
        }

        let mut request = self
            .client
            .get(self.endpoint("/session/csrf.json"))
            .header("X-Requested-With", "XMLHttpRequest");
        if let Some(cookie) = self.cookie_header() {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DeliveryError::Status(response.status()));
        }

        let payload: Csrf = response.json().await?;
        payload.csrf.ok_or(DeliveryError::MissingCsrf)
    }
}

#[async_trait]
impl MessageDelivery for DiscourseMessenger {
    #[instrument(skip(self, body))]
    async fn send_message(
        &self,
        recipient: &str,
        title: &str,
        body: &str,
    ) -> Result<(), DeliveryError> {
        let csrf = self.csrf().await?;

        let form = [
            ("title", title),
            ("raw", body),
            ("target_recipients", recipient),
            ("unlist_topic", "false"),
            ("archetype", "private_message"),
        ];

        let mut request = self
            .client
            .post(self.endpoint("/posts.json"))
            .header(header::ACCEPT, "application/json")
            .header("X-Requested-With", "XMLHttpRequest")
            .header("X-CSRF-Token", csrf)
            .header(header::REFERER, self.base_url.as_str())
            .form(&form);
        if let Some(cookie) = self.cookie_header() {
            request = request.header(header::COOKIE, cookie);
        }

        let response = request.send().await?;

        info!(status = %response.status(), "PM send status");
        debug!(recipient, title, "PM payload delivered");

        if response.status().is_success() {
            Ok(())
        } else {
            Err(DeliveryError::Status(response.status()))
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn messenger_for(server: &MockServer) -> DiscourseMessenger {
        DiscourseMessenger::new(
            Url::parse(&server.uri()).unwrap(),
            Some(SecretString::from("session-cookie".to_string())),
            Some(SecretString::from("user-token".to_string())),
            Some("bot@example.com".to_string()),
        )
        .unwrap()
    }

    async fn mount_csrf(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/session/csrf.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "csrf": "tok-123" })),
            )
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn sends_private_message_with_csrf_and_cookies() {
        let server = MockServer::start().await;
        mount_csrf(&server).await;

        Mock::given(method("POST"))
            .and(path("/posts.json"))
            .and(header("X-CSRF-Token", "tok-123"))
            .and(header(
                "cookie",
                "_forum_session=session-cookie; _t=user-token",
            ))
            .and(body_string_contains("archetype=private_message"))
            .and(body_string_contains("target_recipients=alice"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let messenger = messenger_for(&server);
        messenger
            .send_message("alice", "Verify your identity", "Your verification code is 42.")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn post_failure_maps_to_status_error() {
        let server = MockServer::start().await;
        mount_csrf(&server).await;

        Mock::given(method("POST"))
            .and(path("/posts.json"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let messenger = messenger_for(&server);
        let err = messenger
            .send_message("alice", "title", "body")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::Status(StatusCode::FORBIDDEN)));
    }

    #[tokio::test]
    async fn null_csrf_token_is_an_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/session/csrf.json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(serde_json::json!({ "csrf": null })),
            )
            .mount(&server)
            .await;

        let messenger = messenger_for(&server);
        let err = messenger
            .send_message("alice", "title", "body")
            .await
            .unwrap_err();
        assert!(matches!(err, DeliveryError::MissingCsrf));
    }
}
