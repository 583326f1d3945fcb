use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    #[error("blob request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("blob endpoint returned {0}")]
    Status(StatusCode),
    #[error("invalid blob endpoint: {0}")]
    Endpoint(String),
}

/// Remote mirror of the store file, keyed by one fixed logical name.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Upload a full snapshot, replacing the previous one.
    async fn upload(&self, bytes: &[u8]) -> Result<(), BlobError>;

    /// Fetch the last snapshot; `None` if no snapshot exists yet.
    async fn download(&self) -> Result<Option<Vec<u8>>, BlobError>;
}

/// Blob storage over plain HTTP object semantics: `PUT`/`GET`
/// `<endpoint>/<remote_name>` with an optional bearer token.
#[derive(Debug)]
pub struct HttpBlobStore {
    client: Client,
    url: Url,
    token: Option<SecretString>,
}

impl HttpBlobStore {
    /// # Errors
    /// Returns an error if the endpoint cannot carry a path segment or the
    /// HTTP client fails to build.
    pub fn new(
        endpoint: &Url,
        remote_name: &str,
        token: Option<SecretString>,
    ) -> Result<Self, BlobError> {
        let mut url = endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| BlobError::Endpoint(endpoint.to_string()))?
            .pop_if_empty()
            .push(remote_name);

        let client = Client::builder().user_agent(crate::APP_USER_AGENT).build()?;

        Ok(Self { client, url, token })
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

#[async_trait]
impl BlobStorage for HttpBlobStore {
    async fn upload(&self, bytes: &[u8]) -> Result<(), BlobError> {
        let response = self
            .authorized(self.client.put(self.url.clone()))
            .body(bytes.to_vec())
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(BlobError::Status(response.status()))
        }
    }

    async fn download(&self) -> Result<Option<Vec<u8>>, BlobError> {
        let response = self
            .authorized(self.client.get(self.url.clone()))
            .send()
            .await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => Ok(Some(response.bytes().await?.to_vec())),
            status => Err(BlobError::Status(status)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn store_for(server: &MockServer, token: Option<&str>) -> HttpBlobStore {
        let endpoint = Url::parse(&format!("{}/backups", server.uri())).unwrap();
        HttpBlobStore::new(
            &endpoint,
            "keyrelay.db",
            token.map(|token| SecretString::from(token.to_string())),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn upload_puts_bytes_under_the_remote_name() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/backups/keyrelay.db"))
            .and(header("authorization", "Bearer blob-token"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_for(&server, Some("blob-token"));
        store.upload(b"snapshot-bytes").await.unwrap();
    }

    #[tokio::test]
    async fn upload_surfaces_error_status() {
        let server = MockServer::start().await;

        Mock::given(method("PUT"))
            .and(path("/backups/keyrelay.db"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let err = store.upload(b"snapshot-bytes").await.unwrap_err();
        assert!(matches!(
            err,
            BlobError::Status(StatusCode::INTERNAL_SERVER_ERROR)
        ));
    }

    #[tokio::test]
    async fn download_returns_snapshot_bytes() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backups/keyrelay.db"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"snapshot-bytes".to_vec()))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        let bytes = store.download().await.unwrap();
        assert_eq!(bytes.as_deref(), Some(b"snapshot-bytes".as_slice()));
    }

    #[tokio::test]
    async fn download_maps_not_found_to_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backups/keyrelay.db"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = store_for(&server, None);
        assert_eq!(store.download().await.unwrap(), None);
    }
}
