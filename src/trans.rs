//! The single path all ACME traffic flows through: URL vetting, JWS signing
//! of POST bodies, nonce bookkeeping and error mapping.

use std::{
    collections::VecDeque,
    future::Future,
    sync::atomic::{AtomicBool, Ordering},
    time::{Duration, SystemTime},
};

use parking_lot::Mutex;
use reqwest::{
    header::{self, HeaderMap},
    Method,
};
use serde::{de::DeserializeOwned, Serialize};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    error::{Error, Result},
    jws,
    key::AccountKey,
};

const USER_AGENT: &str = concat!("acme-classic/", env!("CARGO_PKG_VERSION"));

/// How much of an `application/problem+json` body is kept on an error.
const MAX_PROBLEM_BODY: usize = 16 * 1024;

/// How many harvested nonces are kept around.
const MAX_POOLED_NONCES: usize = 10;

static TESTING_NO_TLS: AtomicBool = AtomicBool::new(false);

/// Test-mode override: when enabled, outgoing `https://` URLs are rewritten
/// to `http://`.
///
/// Intended exclusively for tests against an insecure local fake CA. All real
/// ACME traffic must use HTTPS.
pub fn set_testing_no_tls(enabled: bool) {
    TESTING_NO_TLS.store(enabled, Ordering::SeqCst);
}

fn testing_no_tls() -> bool {
    TESTING_NO_TLS.load(Ordering::SeqCst)
}

/// Returns true if `u` is (potentially) a valid ACME resource URL: absolute
/// HTTPS, or absolute HTTP in test mode.
pub(crate) fn valid_url(u: &str) -> bool {
    match url::Url::parse(u) {
        Ok(parsed) => parsed.scheme() == "https" || (testing_no_tls() && parsed.scheme() == "http"),
        Err(_) => false,
    }
}

/// Applies the test-mode rewrite, then the absolute-HTTPS check.
fn effective_url(u: &str) -> Result<String> {
    let u = match u.strip_prefix("https:") {
        Some(rest) if testing_no_tls() => format!("http:{rest}"),
        _ => u.to_owned(),
    };

    if !valid_url(&u) {
        return Err(Error::InvalidUrl(u));
    }

    Ok(u)
}

/// Races `fut` against the cancellation token, checking the token first so
/// an already-finished future cannot starve cancellation.
pub(crate) async fn with_cancel<T, F>(ctx: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = std::result::Result<T, reqwest::Error>>,
{
    if ctx.is_cancelled() {
        return Err(Error::Cancelled);
    }

    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Error::Cancelled),
        res = fut => Ok(res?),
    }
}

/// Shared pool of replay nonces harvested from server responses.
///
/// Replenishment issues a HEAD to the directory endpoint and happens outside
/// the pool lock.
#[derive(Debug, Default)]
pub(crate) struct NoncePool {
    replenish_url: String,
    pool: Mutex<VecDeque<String>>,
}

impl NoncePool {
    pub(crate) fn new(replenish_url: &str) -> Self {
        NoncePool {
            replenish_url: replenish_url.to_owned(),
            ..Default::default()
        }
    }

    /// Adds a nonce, silently dropping duplicates.
    pub(crate) fn add(&self, nonce: &str) {
        let mut pool = self.pool.lock();

        if pool.iter().any(|pooled| pooled == nonce) {
            return;
        }

        pool.push_back(nonce.to_owned());
        if pool.len() > MAX_POOLED_NONCES {
            pool.pop_front();
        }
    }

    /// Absorbs the `Replay-Nonce` header of any response.
    pub(crate) fn extract(&self, headers: &HeaderMap) {
        if let Some(nonce) = headers.get("Replay-Nonce").and_then(|v| v.to_str().ok()) {
            log::trace!("harvested replay nonce");
            self.add(nonce);
        }
    }

    /// Takes one nonce, replenishing over the network if the pool is empty.
    async fn get(&self, http: &reqwest::Client, ctx: &CancellationToken) -> Result<String> {
        {
            let mut pool = self.pool.lock();
            if let Some(nonce) = pool.pop_front() {
                log::trace!("using pooled nonce");
                return Ok(nonce);
            }
        }

        log::debug!("nonce pool empty; requesting a new nonce");
        let url = effective_url(&self.replenish_url)?;
        let req = http
            .head(url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json");
        let res = with_cancel(ctx, req.send()).await?;
        self.extract(res.headers());

        self.pool.lock().pop_front().ok_or(Error::NonceExhausted)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.pool.lock().len()
    }
}

/// Marshals, signs and dispatches ACME requests over a caller-supplied HTTP
/// client.
#[derive(Debug)]
pub(crate) struct Transactor {
    http: reqwest::Client,
    nonces: NoncePool,
}

impl Transactor {
    pub(crate) fn new(http: reqwest::Client, directory_url: &str) -> Self {
        Transactor {
            nonces: NoncePool::new(directory_url),
            http,
        }
    }

    pub(crate) async fn get(
        &self,
        url: &str,
        ctx: &CancellationToken,
    ) -> Result<reqwest::Response> {
        let url = effective_url(url)?;
        self.dispatch(Method::GET, url, None, ctx).await
    }

    /// Signs `body` with `key` and POSTs the JWS. Consumes exactly one nonce.
    pub(crate) async fn post<T>(
        &self,
        url: &str,
        body: &T,
        key: &AccountKey,
        ctx: &CancellationToken,
    ) -> Result<reqwest::Response>
    where
        T: Serialize + ?Sized,
    {
        // Vet the URL before a nonce is drawn or anything is signed.
        let dispatch_url = effective_url(url)?;

        let nonce = self.nonces.get(&self.http, ctx).await?;
        let jws = jws::sign(key, url, nonce, body)?;
        self.dispatch(Method::POST, dispatch_url, Some(jws), ctx).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: String,
        signed_body: Option<String>,
        ctx: &CancellationToken,
    ) -> Result<reqwest::Response> {
        log::debug!("request: {method} {url}");

        let mut req = self
            .http
            .request(method, url)
            .header(header::USER_AGENT, USER_AGENT)
            .header(header::ACCEPT, "application/json");
        if let Some(body) = signed_body {
            req = req
                .header(header::CONTENT_TYPE, "application/json")
                .body(body);
        }

        let res = with_cancel(ctx, req.send()).await?;

        // Regardless of the outcome there might be a nonce to harvest.
        self.nonces.extract(res.headers());

        let status = res.status();
        if (400..600).contains(&status.as_u16()) {
            let headers = res.headers().clone();
            let problem_body = if content_type(&headers) == Some("application/problem+json") {
                let bytes = with_cancel(ctx, res.bytes()).await?;
                let bytes = &bytes[..bytes.len().min(MAX_PROBLEM_BODY)];
                Some(String::from_utf8_lossy(bytes).into_owned())
            } else {
                None
            };

            return Err(Error::HttpStatus {
                status,
                headers: Box::new(headers),
                problem_body,
            });
        }

        Ok(res)
    }
}

/// The response media type, with any parameters stripped.
pub(crate) fn content_type(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::CONTENT_TYPE)?.to_str().ok()?;
    Some(value.split(';').next().unwrap_or(value).trim())
}

/// Requires `application/json` and decodes the body.
pub(crate) async fn read_json<T: DeserializeOwned>(
    res: reqwest::Response,
    ctx: &CancellationToken,
) -> Result<T> {
    match content_type(res.headers()) {
        Some("application/json") => {}
        ct => return Err(Error::UnexpectedContentType(ct.unwrap_or("").to_owned())),
    }

    let body = with_cancel(ctx, res.text()).await?;
    log::trace!("response body: {body}");

    serde_json::from_str(&body).map_err(|err| Error::Malformed(format!("invalid JSON: {err}")))
}

/// Reads the raw body.
pub(crate) async fn read_body(res: reqwest::Response, ctx: &CancellationToken) -> Result<Vec<u8>> {
    let bytes = with_cancel(ctx, res.bytes()).await?;
    Ok(bytes.to_vec())
}

/// Parses a `Retry-After` header into a wake-up instant: an integer seconds
/// count (31-bit) or an HTTP-date. Any other form is treated as absent.
fn parse_retry_after(headers: &HeaderMap) -> Option<Instant> {
    let value = headers.get(header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(secs) = value.parse::<u64>() {
        if secs >= 1 << 31 {
            return None;
        }
        return Some(Instant::now() + Duration::from_secs(secs));
    }

    let when = httpdate::parse_http_date(value).ok()?;
    let delay = when
        .duration_since(SystemTime::now())
        .unwrap_or(Duration::ZERO);
    Some(Instant::now() + delay)
}

/// The `Retry-After` instant, or now plus `default` when the header is
/// absent or unparseable.
pub(crate) fn retry_at_default(headers: &HeaderMap, default: Duration) -> Instant {
    parse_retry_after(headers).unwrap_or_else(|| Instant::now() + default)
}
