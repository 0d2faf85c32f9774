//! Streaming relay for generated clips.
//!
//! The relay fetches a caller-supplied locator and streams it back in
//! bounded chunks. Only allowlisted hosts are fetched, and the server
//! credential is attached only when the host exactly matches a credential
//! host. Nothing here buffers a whole body.

use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::redirect;
use secrecy::{ExposeSecret, SecretString};
use url::Url;

use crate::config::PROVIDER_HOST;
use crate::error::ProxyError;
use crate::safety::{DomainAllowlist, DomainValidationResult, redact_url};

/// Content type declared for every relayed body.
pub const VIDEO_CONTENT_TYPE: &str = "video/mp4";

/// Query parameter the provider expects its API key in.
pub const CREDENTIAL_PARAM: &str = "key";

/// Default relay chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024;

/// Redirect hops followed before a relay request is abandoned.
pub const MAX_REDIRECTS: usize = 5;

pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, ProxyError>> + Send>>;

/// An upstream body ready to be relayed.
pub struct MediaStream {
    pub content_type: &'static str,
    pub content_length: Option<u64>,
    pub body: ByteStream,
}

fn has_param(url: &Url, name: &str) -> bool {
    url.query_pairs().any(|(k, _)| k == name)
}

/// Append `key=<secret>` to `url` when its host is a credential host and no
/// `key` parameter is present. Returns whether the credential was added.
pub fn attach_credential(url: &mut Url, hosts: &DomainAllowlist, secret: &SecretString) -> bool {
    if !hosts.is_url_allowed(url).is_allowed() || has_param(url, CREDENTIAL_PARAM) {
        return false;
    }
    url.query_pairs_mut()
        .append_pair(CREDENTIAL_PARAM, secret.expose_secret());
    true
}

/// Redirect policy that re-checks every hop against the relay allowlists.
///
/// A hop is followed only if its scheme is http(s) and its host is listed
/// in `fetch_hosts` or `redirect_hosts`. Raw IP hosts never pass.
pub fn redirect_policy(
    fetch_hosts: DomainAllowlist,
    redirect_hosts: DomainAllowlist,
) -> redirect::Policy {
    redirect::Policy::custom(move |attempt| {
        if attempt.previous().len() > MAX_REDIRECTS {
            return attempt.error(format!("more than {} redirects", MAX_REDIRECTS));
        }

        let target = attempt.url();
        if !matches!(target.scheme(), "http" | "https") {
            let reason = format!("redirect to unsupported scheme '{}'", target.scheme());
            return attempt.error(reason);
        }

        match fetch_hosts.is_url_allowed(target) {
            DomainValidationResult::Allowed => attempt.follow(),
            DomainValidationResult::Denied(_)
                if redirect_hosts.is_url_allowed(target).is_allowed() =>
            {
                attempt.follow()
            }
            DomainValidationResult::Denied(reason) => {
                attempt.error(format!("redirect refused: {}", reason))
            }
        }
    })
}

/// Re-slice a byte stream so no item exceeds `chunk_size`.
///
/// At most one upstream item is held at a time, and the upstream is only
/// pulled once the previous item has been fully handed out. The stream
/// ends after the first error.
pub fn rechunk<S, E>(inner: S, chunk_size: usize) -> impl Stream<Item = Result<Bytes, E>> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: Send + 'static,
{
    let chunk_size = chunk_size.max(1);
    let state = (Box::pin(inner), Bytes::new(), false);

    futures::stream::unfold(state, move |(mut inner, mut pending, failed)| async move {
        if failed {
            return None;
        }
        loop {
            if !pending.is_empty() {
                let take = pending.len().min(chunk_size);
                let chunk = pending.split_to(take);
                return Some((Ok(chunk), (inner, pending, false)));
            }
            match inner.next().await {
                Some(Ok(bytes)) => pending = bytes,
                Some(Err(e)) => return Some((Err(e), (inner, pending, true))),
                None => return None,
            }
        }
    })
}

/// Relays remote media to callers.
pub struct MediaProxy {
    client: reqwest::Client,
    fetch_hosts: DomainAllowlist,
    credential_hosts: DomainAllowlist,
    api_key: Option<SecretString>,
    chunk_size: usize,
}

impl MediaProxy {
    /// Create a relay that may fetch from `fetch_hosts`, attaching `api_key`
    /// for the provider host only.
    ///
    /// Redirects are followed only to `fetch_hosts` or `redirect_hosts`.
    pub fn new(
        fetch_hosts: DomainAllowlist,
        redirect_hosts: DomainAllowlist,
        api_key: Option<SecretString>,
    ) -> Result<Self, ProxyError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("wishing-machine/", env!("CARGO_PKG_VERSION")))
            .redirect(redirect_policy(fetch_hosts.clone(), redirect_hosts))
            .build()?;

        Ok(Self {
            client,
            fetch_hosts,
            credential_hosts: DomainAllowlist::new(&[PROVIDER_HOST]),
            api_key,
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_credential_hosts(mut self, hosts: DomainAllowlist) -> Self {
        self.credential_hosts = hosts;
        self
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Validate a locator and produce the URL that will actually be fetched.
    pub fn resolve(&self, locator: &str) -> Result<Url, ProxyError> {
        let mut url = Url::parse(locator.trim()).map_err(|e| ProxyError::InvalidLocator {
            reason: format!("'{}' is not a URL: {}", locator, e),
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ProxyError::InvalidLocator {
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        if let DomainValidationResult::Denied(reason) = self.fetch_hosts.is_url_allowed(&url) {
            return Err(ProxyError::HostNotAllowed { reason });
        }

        let needs_credential = self.credential_hosts.is_url_allowed(&url).is_allowed()
            && !has_param(&url, CREDENTIAL_PARAM);
        if needs_credential {
            match &self.api_key {
                Some(secret) => {
                    attach_credential(&mut url, &self.credential_hosts, secret);
                }
                None => {
                    return Err(ProxyError::MissingCredential {
                        host: url.host_str().unwrap_or_default().to_string(),
                    });
                }
            }
        }

        Ok(url)
    }

    /// Start relaying `locator`.
    ///
    /// Resolves once upstream headers arrive; the body is pulled lazily as
    /// the returned stream is polled.
    pub async fn open(&self, locator: &str) -> Result<MediaStream, ProxyError> {
        let url = self.resolve(locator)?;
        let redacted = redact_url(&url);
        tracing::info!(url = %redacted, "Relaying media");

        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_redirect() {
                let reason = std::error::Error::source(&e)
                    .map(|source| source.to_string())
                    .unwrap_or_else(|| "redirect refused".to_string());
                tracing::warn!(url = %redacted, reason = %reason, "Upstream redirect refused");
                ProxyError::RedirectRefused { reason }
            } else {
                ProxyError::Upstream(e.without_url())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %redacted, status = status.as_u16(), "Upstream refused media request");
            return Err(ProxyError::UpstreamStatus {
                status: status.as_u16(),
            });
        }

        let content_length = response.content_length();
        let upstream = response
            .bytes_stream()
            .map_err(|e| ProxyError::Upstream(e.without_url()));
        let body = rechunk(upstream, self.chunk_size).inspect_err(move |e| {
            tracing::warn!(url = %redacted, error = %e, "Media relay interrupted");
        });

        Ok(MediaStream {
            content_type: VIDEO_CONTENT_TYPE,
            content_length,
            body: Box::pin(body),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use axum::Router;
    use axum::extract::RawQuery;
    use axum::http::StatusCode;
    use axum::response::Redirect;
    use axum::routing::get;
    use pretty_assertions::assert_eq;

    use super::*;

    const PROVIDER_CLIP: &str =
        "https://generativelanguage.googleapis.com/v1beta/files/abc:download?alt=media";

    fn secret() -> SecretString {
        SecretString::from("s3cret")
    }

    fn key_count(url: &Url) -> usize {
        url.query_pairs().filter(|(k, _)| k == CREDENTIAL_PARAM).count()
    }

    fn provider_proxy(api_key: Option<SecretString>) -> MediaProxy {
        MediaProxy::new(
            DomainAllowlist::new(&[PROVIDER_HOST, "cdn.example.com"]),
            DomainAllowlist::empty(),
            api_key,
        )
        .unwrap()
    }

    fn local_proxy(api_key: Option<SecretString>) -> MediaProxy {
        MediaProxy::new(
            DomainAllowlist::new(&["localhost"]),
            DomainAllowlist::empty(),
            api_key,
        )
        .unwrap()
    }

    // --- credential attachment ---

    #[test]
    fn test_attach_credential_to_provider_host() {
        let hosts = DomainAllowlist::new(&[PROVIDER_HOST]);
        let mut url = Url::parse(PROVIDER_CLIP).unwrap();
        assert!(attach_credential(&mut url, &hosts, &secret()));
        assert_eq!(key_count(&url), 1);
        assert!(url.as_str().ends_with("alt=media&key=s3cret"));
    }

    #[test]
    fn test_existing_key_is_left_alone() {
        let hosts = DomainAllowlist::new(&[PROVIDER_HOST]);
        let mut url = Url::parse(&format!("{}&key=callers", PROVIDER_CLIP)).unwrap();
        assert!(!attach_credential(&mut url, &hosts, &secret()));
        assert_eq!(key_count(&url), 1);
        assert!(!url.as_str().contains("s3cret"));
    }

    #[test]
    fn test_other_hosts_never_get_credential() {
        let hosts = DomainAllowlist::new(&[PROVIDER_HOST]);
        for locator in [
            "https://cdn.example.com/clip.mp4",
            "https://evilgenerativelanguage.googleapis.com/clip.mp4",
            "https://generativelanguage.googleapis.com.attacker.net/clip.mp4",
            "https://generativelanguage.googleapis.com@attacker.net/clip.mp4",
        ] {
            let mut url = Url::parse(locator).unwrap();
            assert!(!attach_credential(&mut url, &hosts, &secret()), "{}", locator);
            assert_eq!(key_count(&url), 0);
        }
    }

    // --- locator resolution ---

    #[test]
    fn test_resolve_provider_locator_adds_key() {
        let url = provider_proxy(Some(secret())).resolve(PROVIDER_CLIP).unwrap();
        assert_eq!(key_count(&url), 1);
    }

    #[test]
    fn test_resolve_allowlisted_non_provider_host_without_key() {
        let url = provider_proxy(Some(secret()))
            .resolve("https://cdn.example.com/clip.mp4")
            .unwrap();
        assert_eq!(key_count(&url), 0);
    }

    #[test]
    fn test_resolve_rejects_unlisted_host() {
        let err = provider_proxy(Some(secret()))
            .resolve("https://attacker.net/steal")
            .unwrap_err();
        assert!(matches!(err, ProxyError::HostNotAllowed { .. }));
        assert!(err.is_validation());
    }

    #[test]
    fn test_resolve_rejects_bad_locators() {
        let proxy = provider_proxy(Some(secret()));
        assert!(matches!(
            proxy.resolve("not a url").unwrap_err(),
            ProxyError::InvalidLocator { .. }
        ));
        assert!(matches!(
            proxy.resolve("file:///etc/passwd").unwrap_err(),
            ProxyError::InvalidLocator { .. }
        ));
    }

    #[test]
    fn test_resolve_provider_without_api_key_is_refused() {
        let err = provider_proxy(None).resolve(PROVIDER_CLIP).unwrap_err();
        assert!(matches!(err, ProxyError::MissingCredential { .. }));
        assert!(!err.is_validation());
    }

    #[test]
    fn test_resolve_provider_with_callers_key_and_no_api_key() {
        let locator = format!("{}&key=callers", PROVIDER_CLIP);
        let url = provider_proxy(None).resolve(&locator).unwrap();
        assert_eq!(key_count(&url), 1);
    }

    // --- chunking ---

    #[tokio::test]
    async fn test_rechunk_bounds_chunk_size_and_preserves_bytes() {
        let payload: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        let pieces = vec![
            Ok::<_, std::io::Error>(Bytes::copy_from_slice(&payload[..17_000])),
            Ok(Bytes::copy_from_slice(&payload[17_000..17_010])),
            Ok(Bytes::new()),
            Ok(Bytes::copy_from_slice(&payload[17_010..])),
        ];

        let chunks: Vec<Bytes> = rechunk(futures::stream::iter(pieces), 8192)
            .try_collect()
            .await
            .unwrap();

        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| !c.is_empty() && c.len() <= 8192));
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(joined, payload);
    }

    #[tokio::test]
    async fn test_rechunk_pulls_upstream_lazily() {
        let pulled = Arc::new(AtomicUsize::new(0));
        let counter = pulled.clone();
        let source = futures::stream::iter(0..4)
            .map(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, std::io::Error>(Bytes::from(vec![7u8; 10_000]))
            });

        let mut relay = Box::pin(rechunk(source, 8192));
        let first = relay.next().await.unwrap().unwrap();
        assert_eq!(first.len(), 8192);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);

        let second = relay.next().await.unwrap().unwrap();
        assert_eq!(second.len(), 10_000 - 8192);
        assert_eq!(pulled.load(Ordering::SeqCst), 1);

        relay.next().await.unwrap().unwrap();
        assert_eq!(pulled.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_rechunk_stops_after_error() {
        let source = futures::stream::iter(vec![
            Ok(Bytes::from_static(b"abc")),
            Err("connection dropped"),
            Ok(Bytes::from_static(b"never")),
        ]);
        let items: Vec<Result<Bytes, &str>> = rechunk(source, 8192).collect().await;
        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert_eq!(items[1], Err("connection dropped"));
    }

    // --- relay against a local upstream ---

    async fn spawn_stub(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://localhost:{}", port)
    }

    #[tokio::test]
    async fn test_open_streams_upstream_bytes_with_credential() {
        let payload: Vec<u8> = (0..50_000u32).map(|i| (i % 256) as u8).collect();
        let served = payload.clone();
        let router = Router::new().route(
            "/files/clip.mp4",
            get(move |RawQuery(query): RawQuery| {
                let served = served.clone();
                async move {
                    let query = query.unwrap_or_default();
                    if query.matches("key=").count() != 1 || !query.contains("key=s3cret") {
                        return (StatusCode::FORBIDDEN, Vec::new());
                    }
                    (StatusCode::OK, served)
                }
            }),
        );
        let base = spawn_stub(router).await;

        let proxy = local_proxy(Some(secret()))
            .with_credential_hosts(DomainAllowlist::new(&["localhost"]))
            .with_chunk_size(4096);

        let media = proxy
            .open(&format!("{}/files/clip.mp4", base))
            .await
            .unwrap();
        assert_eq!(media.content_type, "video/mp4");

        let chunks: Vec<Bytes> = media.body.try_collect().await.unwrap();
        assert!(chunks.iter().all(|c| c.len() <= 4096));
        let joined: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        assert_eq!(joined, payload);
    }

    #[tokio::test]
    async fn test_open_maps_upstream_status() {
        let router = Router::new().route(
            "/files/missing.mp4",
            get(|| async { StatusCode::NOT_FOUND }),
        );
        let base = spawn_stub(router).await;
        let proxy = local_proxy(None);

        let err = proxy
            .open(&format!("{}/files/missing.mp4", base))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProxyError::UpstreamStatus { status: 404 }));
    }

    // --- redirects ---

    async fn spawn_redirector(target: String) -> String {
        let router = Router::new().route(
            "/files/clip.mp4",
            get(move || {
                let target = target.clone();
                async move { Redirect::temporary(&target) }
            }),
        );
        spawn_stub(router).await
    }

    #[tokio::test]
    async fn test_open_refuses_redirect_to_ip_literal() {
        let internal = Router::new().route("/secret", get(|| async { "internal-only" }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let internal_addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, internal).await.unwrap();
        });

        let base = spawn_redirector(format!("http://{}/secret", internal_addr)).await;
        let proxy = local_proxy(None);

        let err = proxy
            .open(&format!("{}/files/clip.mp4", base))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProxyError::RedirectRefused { .. }), "{:?}", err);
        assert!(!err.is_validation());
    }

    #[tokio::test]
    async fn test_open_refuses_redirect_to_unlisted_host() {
        let base = spawn_redirector("http://unlisted.invalid/clip.mp4".to_string()).await;
        let err = local_proxy(None)
            .open(&format!("{}/files/clip.mp4", base))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, ProxyError::RedirectRefused { .. }), "{:?}", err);
    }

    #[tokio::test]
    async fn test_open_follows_redirect_within_allowlist() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let target = format!("http://localhost:{}/files/moved.mp4", port);
        let router = Router::new()
            .route(
                "/files/clip.mp4",
                get(move || {
                    let target = target.clone();
                    async move { Redirect::temporary(&target) }
                }),
            )
            .route("/files/moved.mp4", get(|| async { "moved-clip" }));
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let media = local_proxy(None)
            .open(&format!("http://localhost:{}/files/clip.mp4", port))
            .await
            .unwrap();
        let chunks: Vec<Bytes> = media.body.try_collect().await.unwrap();
        assert_eq!(chunks.concat(), b"moved-clip".to_vec());
    }

    #[test]
    fn test_redirect_hosts_are_not_directly_fetchable() {
        let proxy = MediaProxy::new(
            DomainAllowlist::new(&[PROVIDER_HOST]),
            DomainAllowlist::new(&["*.googleusercontent.com"]),
            Some(secret()),
        )
        .unwrap();
        let err = proxy
            .resolve("https://video-downloads.googleusercontent.com/clip.mp4")
            .unwrap_err();
        assert!(matches!(err, ProxyError::HostNotAllowed { .. }));
    }
}
