//! HTTP endpoints of the lobby server.
//!
//! Everything outside the game connection goes over plain `GET` requests:
//! waking the server, creating a lobby and checking a login before the game
//! connection is opened. Requires the `http-client` feature.

use std::time::Duration;

use tracing::{debug, info, warn};
use url::Url;

use crate::error::{ClientError, Result};
use crate::error_codes::LoginError;
use crate::protocol::LobbyCode;

/// Default timeout of one HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the lobby server's HTTP endpoints.
#[derive(Debug, Clone)]
pub struct LobbyApi {
    base: Url,
    client: reqwest::Client,
}

impl LobbyApi {
    /// Create a client for the server at `base`, e.g. `https://sh.example.com`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if `base` is not an `http` or `https` URL
    /// or the HTTP client cannot be built.
    pub fn new(base: &str) -> Result<Self> {
        Self::with_timeout(base, DEFAULT_REQUEST_TIMEOUT)
    }

    /// As [`new`](Self::new), with a custom per-request timeout.
    ///
    /// # Errors
    ///
    /// As for [`new`](Self::new).
    pub fn with_timeout(base: &str, timeout: Duration) -> Result<Self> {
        let mut base =
            Url::parse(base).map_err(|e| ClientError::Http(format!("invalid base url: {e}")))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(ClientError::Http(format!(
                "unsupported scheme {:?}",
                base.scheme()
            )));
        }
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        base.set_query(None);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Http(e.to_string()))?;
        Ok(Self { base, client })
    }

    /// Nudge a sleeping server awake. Failures are logged and ignored.
    pub async fn wake(&self) {
        let Ok(url) = self.endpoint("ping") else {
            return;
        };
        match self.client.get(url).send().await {
            Ok(response) => debug!(status = %response.status(), "server ping"),
            Err(e) => warn!("server ping failed: {e}"),
        }
    }

    /// Ask the server for a fresh lobby.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] on a transport failure or non-success
    /// status, and [`ClientError::InvalidLobbyCode`] if the server answers
    /// with something that is not a lobby code.
    pub async fn create_lobby(&self) -> Result<LobbyCode> {
        let response = self
            .client
            .get(self.endpoint("new-lobby")?)
            .send()
            .await
            .map_err(http_error)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Http(format!("lobby creation failed: {status}")));
        }
        let body = response.text().await.map_err(http_error)?;
        let lobby = LobbyCode::parse(&body)?;
        info!(%lobby, "lobby created");
        Ok(lobby)
    }

    /// Check that `name` may join `lobby`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Login`] with the server's reason when the login
    /// is refused, and [`ClientError::Http`] if the request itself fails.
    pub async fn check_login(&self, name: &str, lobby: &LobbyCode) -> Result<()> {
        let url = self.check_login_url(name, lobby)?;
        let response = self.client.get(url).send().await.map_err(http_error)?;
        match LoginError::from_status(response.status().as_u16()) {
            None => {
                debug!(name, %lobby, "login accepted");
                Ok(())
            }
            Some(reason) => {
                warn!(name, %lobby, status = reason.status(), "login refused: {reason}");
                Err(ClientError::Login(reason))
            }
        }
    }

    /// `check-login` URL with the name and lobby as query parameters.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::Http`] if the URL cannot be built.
    pub fn check_login_url(&self, name: &str, lobby: &LobbyCode) -> Result<Url> {
        let mut url = self.endpoint("check-login")?;
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("lobby", lobby.as_str());
        Ok(url)
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| ClientError::Http(format!("invalid endpoint {path:?}: {e}")))
    }
}

fn http_error(e: reqwest::Error) -> ClientError {
    if e.is_timeout() {
        ClientError::Timeout
    } else {
        ClientError::Http(e.to_string())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one HTTP request with a canned response and return the request line.
    async fn serve_once(status: &str, body: &str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let response = format!(
            "HTTP/1.1 {status}\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 4096];
            let n = stream.read(&mut buf).await.unwrap();
            stream.write_all(response.as_bytes()).await.unwrap();
            let request = String::from_utf8_lossy(&buf[..n]).to_string();
            request.lines().next().unwrap_or_default().to_string()
        });
        (format!("http://{addr}"), handle)
    }

    #[test]
    fn check_login_url_encodes_query() {
        let api = LobbyApi::new("https://sh.example.com/api").unwrap();
        let url = api
            .check_login_url("Ann Lee", &LobbyCode::parse("abcd").unwrap())
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://sh.example.com/api/check-login?name=Ann+Lee&lobby=ABCD"
        );
    }

    #[test]
    fn rejects_non_http_base() {
        assert!(matches!(
            LobbyApi::new("ws://sh.example.com"),
            Err(ClientError::Http(_))
        ));
    }

    #[tokio::test]
    async fn create_lobby_parses_plain_text_code() {
        let (base, server) = serve_once("200 OK", "wxyz").await;
        let api = LobbyApi::new(&base).unwrap();
        let lobby = api.create_lobby().await.unwrap();
        assert_eq!(lobby.as_str(), "WXYZ");
        assert!(server.await.unwrap().starts_with("GET /new-lobby"));
    }

    #[tokio::test]
    async fn refused_login_maps_status() {
        let (base, server) = serve_once("488 Game In Progress", "").await;
        let api = LobbyApi::new(&base).unwrap();
        let err = api
            .check_login("ann", &LobbyCode::parse("ABCD").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ClientError::Login(LoginError::GameInProgress)));
        assert!(server
            .await
            .unwrap()
            .starts_with("GET /check-login?name=ann&lobby=ABCD"));
    }

    #[tokio::test]
    async fn accepted_login_is_ok() {
        let (base, _server) = serve_once("200 OK", "").await;
        let api = LobbyApi::new(&base).unwrap();
        api.check_login("ann", &LobbyCode::parse("ABCD").unwrap())
            .await
            .unwrap();
    }
}
