//! Request and response model shared by the resolver, the offline cache and
//! the prefetcher, plus the HTTP-backed [`Fetcher`].

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{ACCESS_CONTROL_ALLOW_ORIGIN, CONTENT_TYPE};
use reqwest::{Method, Url};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// What a request is for; drives the offline cache policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// HTML pages.
    Document,
    /// Flag images and icons.
    Image,
    /// JavaScript.
    Script,
    /// Stylesheets.
    Style,
    /// JSON and other data fetched programmatically.
    Data,
    /// Anything else.
    Other,
}

impl Destination {
    /// Guesses the destination from the extension of a URL path.
    #[must_use]
    pub fn from_path(path: &str) -> Self {
        let ext = path
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        match ext.as_str() {
            "svg" | "png" | "jpg" | "jpeg" | "gif" | "webp" | "ico" => Self::Image,
            "html" | "htm" => Self::Document,
            "js" | "mjs" => Self::Script,
            "css" => Self::Style,
            "json" | "webmanifest" => Self::Data,
            _ => Self::Other,
        }
    }
}

/// An outgoing resource request.
#[derive(Debug, Clone)]
pub struct Request {
    /// Absolute URL.
    pub url: Url,
    /// HTTP method.
    pub method: Method,
    /// What the response will be used for.
    pub destination: Destination,
}

impl Request {
    /// Creates a GET request, guessing the destination from the URL path.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn get(url: &str) -> Result<Self> {
        let url = parse_url(url)?;
        let destination = Destination::from_path(url.path());
        Ok(Self {
            url,
            method: Method::GET,
            destination,
        })
    }

    /// Creates a GET request for an image.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] if `url` is not an absolute URL.
    pub fn image(url: &str) -> Result<Self> {
        Ok(Self::get(url)?.with_destination(Destination::Image))
    }

    /// Overrides the destination.
    #[must_use]
    pub const fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Overrides the method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Returns true if this request targets the same origin as `origin`.
    #[must_use]
    pub fn is_same_origin(&self, origin: &Url) -> bool {
        self.url.origin() == origin.origin()
    }
}

/// Parses an absolute URL.
///
/// # Errors
///
/// Returns [`Error::InvalidUrl`] on parse failure.
pub fn parse_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::InvalidUrl {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

/// How much of a response the caller is allowed to inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    /// Same-origin response.
    Basic,
    /// Cross-origin response with permissive headers.
    Cors,
    /// Cross-origin response whose status cannot be inspected.
    Opaque,
}

/// A response to a [`Request`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Final URL.
    pub url: String,
    /// Visibility of the response.
    pub kind: ResponseKind,
    /// HTTP status; always `0` for opaque responses.
    pub status: u16,
    /// `Content-Type` header, if visible.
    pub content_type: Option<String>,
    /// Response body.
    pub body: Bytes,
}

impl Response {
    /// Creates an inspectable same-origin response.
    #[must_use]
    pub fn basic(url: impl Into<String>, status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            kind: ResponseKind::Basic,
            status,
            content_type: None,
            body: body.into(),
        }
    }

    /// Creates an opaque response: status hidden, body replayable.
    #[must_use]
    pub fn opaque(url: impl Into<String>, body: impl Into<Bytes>) -> Self {
        Self {
            url: url.into(),
            kind: ResponseKind::Opaque,
            status: 0,
            content_type: None,
            body: body.into(),
        }
    }

    /// Sets the content type.
    #[must_use]
    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    /// Sets the response kind; opaque responses lose their status.
    #[must_use]
    pub fn with_kind(mut self, kind: ResponseKind) -> Self {
        self.kind = kind;
        if kind == ResponseKind::Opaque {
            self.status = 0;
        }
        self
    }

    /// Returns true for an inspectable 2xx response.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.kind != ResponseKind::Opaque && (200..300).contains(&self.status)
    }

    /// Returns true if the status cannot be inspected.
    #[must_use]
    pub fn is_opaque(&self) -> bool {
        self.kind == ResponseKind::Opaque
    }

    /// Converts a non-2xx (or opaque) response into [`Error::Status`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::Status`] unless [`is_ok`](Self::is_ok).
    pub fn error_for_status(self) -> Result<Self> {
        if self.is_ok() {
            Ok(self)
        } else {
            Err(Error::Status {
                url: self.url,
                status: self.status,
            })
        }
    }
}

/// Something that can turn a [`Request`] into a [`Response`].
///
/// Implemented by the real HTTP client, by the offline cache (which wraps
/// another fetcher) and by test doubles.
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Performs the request.
    async fn fetch(&self, request: &Request) -> Result<Response>;
}

/// Builds a configured HTTP client for asset requests.
///
/// # Errors
///
/// Returns an error if the TLS backend cannot be initialised.
pub fn build_http_client() -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .pool_idle_timeout(Duration::from_secs(60))
        .pool_max_idle_per_host(8)
        .tcp_keepalive(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(15))
        .build()
}

/// [`Fetcher`] backed by `reqwest`.
///
/// With an origin set, cross-origin responses are reported as opaque unless
/// their `Access-Control-Allow-Origin` header is `*` or names that origin,
/// mirroring what a page on that origin would see. Without one, every
/// response is basic.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    origin: Option<Url>,
}

impl HttpFetcher {
    /// Creates a fetcher that sees every response in full.
    #[must_use]
    pub const fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            origin: None,
        }
    }

    /// Creates a fetcher that classifies responses relative to `origin`.
    #[must_use]
    pub const fn with_origin(client: reqwest::Client, origin: Url) -> Self {
        Self {
            client,
            origin: Some(origin),
        }
    }

    /// Returns true if an `Access-Control-Allow-Origin` value grants this
    /// fetcher's origin.
    fn cors_allows(&self, allow_origin: Option<&str>) -> bool {
        match (&self.origin, allow_origin.map(str::trim)) {
            (_, Some("*")) => true,
            (Some(origin), Some(value)) => value == origin.origin().ascii_serialization(),
            _ => false,
        }
    }

    fn classify(&self, request: &Request, cors_allowed: bool) -> ResponseKind {
        match &self.origin {
            None => ResponseKind::Basic,
            Some(origin) if request.is_same_origin(origin) => ResponseKind::Basic,
            Some(_) if cors_allowed => ResponseKind::Cors,
            Some(_) => ResponseKind::Opaque,
        }
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &Request) -> Result<Response> {
        log::debug!("{} {}", request.method, request.url);
        let response = self
            .client
            .request(request.method.clone(), request.url.clone())
            .send()
            .await?;

        let status = response.status().as_u16();
        let url = response.url().to_string();
        let headers = response.headers();
        let cors_allowed = self.cors_allows(
            headers
                .get(ACCESS_CONTROL_ALLOW_ORIGIN)
                .and_then(|v| v.to_str().ok()),
        );
        let content_type = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.bytes().await?;

        let kind = self.classify(request, cors_allowed);
        let response = Response {
            url,
            kind,
            status,
            content_type: if kind == ResponseKind::Opaque {
                None
            } else {
                content_type
            },
            body,
        }
        .with_kind(kind);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_from_path() {
        assert_eq!(Destination::from_path("/fr.svg"), Destination::Image);
        assert_eq!(Destination::from_path("/FR/flat/64.PNG"), Destination::Image);
        assert_eq!(Destination::from_path("/index.html"), Destination::Document);
        assert_eq!(Destination::from_path("/data/countries.json"), Destination::Data);
        assert_eq!(Destination::from_path("/v3.1/all"), Destination::Other);
        assert_eq!(Destination::from_path("/"), Destination::Other);
    }

    #[test]
    fn request_get_parses_and_classifies() {
        let request = Request::get("https://flagcdn.com/fr.svg").unwrap();
        assert_eq!(request.method, Method::GET);
        assert_eq!(request.destination, Destination::Image);
        assert!(matches!(
            Request::get("flags/fr.svg"),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn same_origin_compares_scheme_host_port() {
        let origin = Url::parse("http://localhost:8080/").unwrap();
        let local = Request::get("http://localhost:8080/flags/fr.svg").unwrap();
        let other_port = Request::get("http://localhost:9000/flags/fr.svg").unwrap();
        let remote = Request::get("https://flagcdn.com/fr.svg").unwrap();
        assert!(local.is_same_origin(&origin));
        assert!(!other_port.is_same_origin(&origin));
        assert!(!remote.is_same_origin(&origin));
    }

    #[test]
    fn opaque_responses_hide_status() {
        let response = Response::basic("https://flagcdn.com/fr.svg", 200, "svg")
            .with_kind(ResponseKind::Opaque);
        assert_eq!(response.status, 0);
        assert!(response.is_opaque());
        assert!(!response.is_ok());
        assert!(response.error_for_status().is_err());
    }

    #[test]
    fn error_for_status_passes_success() {
        let ok = Response::basic("http://localhost/a.json", 204, Bytes::new());
        assert!(ok.error_for_status().is_ok());
        let missing = Response::basic("http://localhost/a.json", 404, Bytes::new());
        assert!(matches!(
            missing.error_for_status(),
            Err(Error::Status { status: 404, .. })
        ));
    }

    #[test]
    fn http_fetcher_classification() {
        let client = reqwest::Client::new();
        let origin = Url::parse("http://localhost/").unwrap();
        let fetcher = HttpFetcher::with_origin(client.clone(), origin);
        let local = Request::get("http://localhost/flags/fr.svg").unwrap();
        let remote = Request::get("https://flagcdn.com/fr.svg").unwrap();

        assert_eq!(fetcher.classify(&local, false), ResponseKind::Basic);
        assert_eq!(fetcher.classify(&remote, true), ResponseKind::Cors);
        assert_eq!(fetcher.classify(&remote, false), ResponseKind::Opaque);

        let direct = HttpFetcher::new(client);
        assert_eq!(direct.classify(&remote, false), ResponseKind::Basic);
    }

    #[test]
    fn cors_header_must_name_the_origin() {
        let origin = Url::parse("http://localhost:8080/game/").unwrap();
        let fetcher = HttpFetcher::with_origin(reqwest::Client::new(), origin);

        assert!(fetcher.cors_allows(Some("*")));
        assert!(fetcher.cors_allows(Some("http://localhost:8080")));
        assert!(!fetcher.cors_allows(Some("http://localhost")));
        assert!(!fetcher.cors_allows(Some("https://evil.example")));
        assert!(!fetcher.cors_allows(Some("null")));
        assert!(!fetcher.cors_allows(Some("")));
        assert!(!fetcher.cors_allows(None));
    }
}
