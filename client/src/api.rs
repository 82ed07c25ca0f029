use reqwest::{header::AUTHORIZATION, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::errors::{FetchError, RequestError};

/// HTTP client for the Votecaster backend.
///
/// Every call goes through [`ApiClient::send`], which attaches the bearer token when
/// one is supplied and turns non-success responses into [`RequestError`]s. It never
/// touches session state; deciding what a failure means is up to the caller.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// Start a request to `path` on the backend.
    ///
    /// Add a body or headers to the builder as needed, then hand it to
    /// [`ApiClient::send`].
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Send a request built with [`ApiClient::request`], attaching the bearer token
    /// when one is supplied. Fails on any non-success status.
    pub async fn send(
        &self,
        request: RequestBuilder,
        bearer: Option<&str>,
    ) -> Result<Response, FetchError> {
        let response = self.dispatch(request, bearer).await?;
        ensure_success(response).await
    }

    /// Issue a GET, failing on any non-success status.
    pub async fn get(&self, path: &str, bearer: Option<&str>) -> Result<Response, FetchError> {
        self.send(self.request(Method::GET, path), bearer).await
    }

    /// Issue a GET and return the response whatever its status.
    ///
    /// Used where a non-success status is a meaningful outcome rather than an error.
    pub async fn get_raw(&self, path: &str, bearer: Option<&str>) -> Result<Response, FetchError> {
        Ok(self.dispatch(self.request(Method::GET, path), bearer).await?)
    }

    /// [`ApiClient::get`] followed by decoding the JSON body
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        bearer: Option<&str>,
    ) -> Result<T, FetchError> {
        let response = self.get(path, bearer).await?;
        let body = response.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }

    async fn dispatch(
        &self,
        mut request: RequestBuilder,
        bearer: Option<&str>,
    ) -> Result<Response, reqwest::Error> {
        if let Some(token) = bearer {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let request = request.build()?;
        debug!(
            method = %request.method(),
            url = %request.url(),
            authenticated = bearer.is_some(),
            "Backend request"
        );

        self.http.execute(request).await
    }
}

/// Pass successful responses through untouched; read the body of failed ones into
/// a [`RequestError`].
pub async fn ensure_success(response: Response) -> Result<Response, FetchError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(request_error(status, &body).into())
}

/// Build the error for a failed response: the body without newlines, or the
/// status reason phrase when that leaves nothing.
pub fn request_error(status: StatusCode, body: &str) -> RequestError {
    let sanitized = sanitize(body);
    let message = if sanitized.is_empty() {
        status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| status.as_u16().to_string())
    } else {
        sanitized
    };

    RequestError { status, message }
}

fn sanitize(body: &str) -> String {
    body.chars().filter(|c| *c != '\n' && *c != '\r').collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_error_strips_newlines() {
        let err = request_error(StatusCode::UNAUTHORIZED, "Invalid token\n");
        assert_eq!(err.message, "Invalid token");
        assert_eq!(err.to_string(), "Invalid token");
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);

        let err = request_error(StatusCode::BAD_REQUEST, "line one\r\nline two\n");
        assert_eq!(err.message, "line oneline two");
    }

    #[test]
    fn test_request_error_falls_back_to_status_phrase() {
        let err = request_error(StatusCode::NOT_FOUND, "");
        assert_eq!(err.message, "Not Found");

        let err = request_error(StatusCode::INTERNAL_SERVER_ERROR, "\n");
        assert_eq!(err.message, "Internal Server Error");
    }

    #[test]
    fn test_request_error_without_canonical_reason() {
        let status = StatusCode::from_u16(599).unwrap();
        let err = request_error(status, "");
        assert_eq!(err.message, "599");
    }

    #[test]
    fn test_url_joins_paths() {
        let client = ApiClient::new("http://localhost:8080/");
        assert_eq!(client.url("/auth/check"), "http://localhost:8080/auth/check");
        assert_eq!(client.url("profile"), "http://localhost:8080/profile");
    }

    #[test]
    fn test_request_targets_backend_path() {
        let client = ApiClient::new("http://localhost:8080");
        let request = client
            .request(Method::DELETE, "/profile/mutedUsers/bob")
            .build()
            .unwrap();

        assert_eq!(request.method(), &Method::DELETE);
        assert_eq!(
            request.url().as_str(),
            "http://localhost:8080/profile/mutedUsers/bob"
        );
        assert!(request.headers().get(AUTHORIZATION).is_none());
    }
}
