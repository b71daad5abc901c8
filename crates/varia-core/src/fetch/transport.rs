use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;

use crate::USER_AGENT;
use crate::error::FetchError;

/// Downloads raw bytes. Retries, if any, belong to the implementation.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn download(&self, url: &str) -> Result<Bytes, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn download(&self, url: &str) -> Result<Bytes, FetchError> {
        tracing::debug!(%url, "downloading");
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    #[tokio::test]
    async fn download_sends_user_agent() {
        let mut server = Server::new_async().await;
        let mock = server
            .mock("GET", "/artifact.tar.gz")
            .match_header("user-agent", Matcher::Regex("^varia-core/".into()))
            .with_status(200)
            .with_body("payload")
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let bytes = transport
            .download(&format!("{}/artifact.tar.gz", server.url()))
            .await
            .unwrap();
        assert_eq!(&bytes[..], b"payload");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("GET", "/gone")
            .with_status(404)
            .create_async()
            .await;

        let transport = HttpTransport::new().unwrap();
        let err = transport
            .download(&format!("{}/gone", server.url()))
            .await
            .unwrap_err();
        assert!(matches!(err, FetchError::Transport(_)));
    }
}
