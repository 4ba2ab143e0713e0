//! The stateful protocol surface: registration, authorizations, challenges,
//! certificates and revocation.

use std::{collections::HashSet, time::Duration};

use parking_lot::Mutex;
use reqwest::{
    header::{self, HeaderMap},
    StatusCode,
};
use serde_json::value::RawValue;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{
    api,
    cert::Certificate,
    dir::{DirectoryCache, DirectoryUrl},
    error::{Error, Result},
    key::AccountKey,
    trans::{self, Transactor},
    util,
};

/// How long to wait between polls when the server sends no `Retry-After`
/// hint.
const DEFAULT_POLL_DELAY: Duration = Duration::from_secs(10);

/// Hard cap on the issuer chain walk, to defeat malicious or cyclic `up`
/// links.
const MAX_CHAIN_LENGTH: usize = 10;

/// Client for making ACME API calls.
///
/// Some methods correspond exactly to ACME calls, such as
/// [`new_authorization`], [`respond_to_challenge`], [`request_certificate`]
/// or [`revoke`]. Others, such as [`upsert_registration`],
/// [`load_certificate`] or [`wait_for_certificate`], automatically compose
/// requests to provide a simplified interface.
///
/// All methods take a [`CancellationToken`] so they can be cancelled or
/// given deadlines.
///
/// If you have a URI for an authorization, challenge or certificate, you can
/// load it by constructing the object with its `from_uri` constructor and
/// calling the appropriate load method.
///
/// The client is usable from any number of concurrent tasks; the nonce pool
/// and directory cache it owns are internally serialized.
///
/// [`new_authorization`]: Client::new_authorization
/// [`respond_to_challenge`]: Client::respond_to_challenge
/// [`request_certificate`]: Client::request_certificate
/// [`revoke`]: Client::revoke
/// [`upsert_registration`]: Client::upsert_registration
/// [`load_certificate`]: Client::load_certificate
/// [`wait_for_certificate`]: Client::wait_for_certificate
#[derive(Debug)]
pub struct Client {
    key: AccountKey,
    contact_uris: Vec<String>,
    agreement_uris: HashSet<String>,
    registration_uri: Mutex<Option<String>>,
    directory_url: String,
    trans: Transactor,
    dir: DirectoryCache,
}

impl Client {
    /// Client against the default (staging) directory.
    pub fn new(key: AccountKey) -> Client {
        Client::builder(key).build()
    }

    pub fn builder(key: AccountKey) -> ClientBuilder {
        ClientBuilder {
            key,
            directory_url: DirectoryUrl::default().to_url().to_owned(),
            contact_uris: Vec::new(),
            agreement_uris: HashSet::new(),
            registration_uri: None,
            http: None,
        }
    }

    /// The account key requests are signed with.
    pub fn account_key(&self) -> &AccountKey {
        &self.key
    }

    async fn directory(&self, ctx: &CancellationToken) -> Result<&api::Directory> {
        self.dir.get(&self.trans, &self.directory_url, ctx).await
    }

    /// Finds the registration URI, registering a new account if necessary.
    ///
    /// The server reports an already-registered key with 409; either way the
    /// `Location` header carries the registration URI, which is cached.
    pub async fn registration_uri(&self, ctx: &CancellationToken) -> Result<String> {
        if let Some(uri) = self.registration_uri.lock().clone() {
            return Ok(uri);
        }

        let new_reg_url = self.directory(ctx).await?.new_reg.clone();
        let req = api::Registration::new_reg(&self.contact_uris);

        let (status, headers) = match self.trans.post(&new_reg_url, &req, &self.key, ctx).await {
            Ok(res) => (res.status(), res.headers().clone()),
            Err(Error::HttpStatus {
                status, headers, ..
            }) if status == StatusCode::CONFLICT => (status, *headers),
            Err(err) => return Err(err),
        };

        if status != StatusCode::CREATED && status != StatusCode::CONFLICT {
            return Err(Error::UnexpectedStatus(status));
        }

        let uri = location(&headers)?;
        log::debug!("registration URI: {uri}");
        *self.registration_uri.lock() = Some(uri.clone());

        Ok(uri)
    }

    /// Registers a new account or updates an existing one.
    ///
    /// The configured contact URIs are set. If the server requires a new
    /// terms-of-service agreement and its URI is in the pre-accepted set, it
    /// is agreed to automatically; otherwise [`Error::Agreement`] is
    /// returned.
    pub async fn upsert_registration(&self, ctx: &CancellationToken) -> Result<()> {
        let reg_uri = self.registration_uri(ctx).await?;

        let mut req = api::Registration::reg(&self.contact_uris);
        let res = self.trans.post(&reg_uri, &req, &self.key, ctx).await?;
        let headers = res.headers().clone();
        let res_info: api::Registration = trans::read_json(res, ctx).await?;

        if let Some(tos_uri) = util::link_with_rel(&headers, "terms-of-service") {
            if res_info.agreement_uri.as_deref() != Some(tos_uri.as_str()) {
                if !self.agreement_uris.contains(&tos_uri) {
                    return Err(Error::Agreement { uri: tos_uri });
                }

                req.agreement_uri = Some(tos_uri);
                let res = self.trans.post(&reg_uri, &req, &self.key, ctx).await?;
                let _: api::Registration = trans::read_json(res, ctx).await?;
            }
        }

        Ok(())
    }

    /// Creates a new authorization for the given hostname.
    pub async fn new_authorization(
        &self,
        hostname: &str,
        ctx: &CancellationToken,
    ) -> Result<api::Authorization> {
        let new_authz_url = self.directory(ctx).await?.new_authz.clone();
        let req = api::NewAuthorization::dns(hostname);

        let res = self.trans.post(&new_authz_url, &req, &self.key, ctx).await?;
        if res.status() != StatusCode::CREATED {
            return Err(Error::UnexpectedStatus(res.status()));
        }

        let uri = location(res.headers())?;
        let mut az: api::Authorization = trans::read_json(res, ctx).await?;
        az.uri = uri;
        az.validate()?;

        Ok(az)
    }

    /// Loads or reloads the details of an authorization via its URI.
    ///
    /// The server's view replaces the local one wholesale, including any
    /// locally synthesized combinations.
    pub async fn load_authorization(
        &self,
        az: &mut api::Authorization,
        ctx: &CancellationToken,
    ) -> Result<()> {
        let res = self.trans.get(&az.uri, ctx).await?;
        let headers = res.headers().clone();

        let mut fresh: api::Authorization = trans::read_json(res, ctx).await?;
        fresh.uri = az.uri.clone();
        fresh.validate()?;
        fresh.retry_at = Some(trans::retry_at_default(&headers, DEFAULT_POLL_DELAY));

        *az = fresh;
        Ok(())
    }

    /// Like [`load_authorization`](Client::load_authorization), but first
    /// waits out the server's retry hint. To be used when polling.
    pub async fn wait_load_authorization(
        &self,
        az: &mut api::Authorization,
        ctx: &CancellationToken,
    ) -> Result<()> {
        wait_until(az.retry_at, ctx).await?;
        self.load_authorization(az, ctx).await
    }

    /// Loads or reloads the details of a challenge via its URI.
    pub async fn load_challenge(
        &self,
        ch: &mut api::Challenge,
        ctx: &CancellationToken,
    ) -> Result<()> {
        let res = self.trans.get(&ch.uri, ctx).await?;
        let headers = res.headers().clone();

        let mut fresh: api::Challenge = trans::read_json(res, ctx).await?;
        if fresh.uri.is_empty() {
            fresh.uri = ch.uri.clone();
        }
        fresh.retry_at = Some(trans::retry_at_default(&headers, DEFAULT_POLL_DELAY));

        *ch = fresh;
        Ok(())
    }

    /// Like [`load_challenge`](Client::load_challenge), but first waits out
    /// the server's retry hint. To be used when polling.
    pub async fn wait_load_challenge(
        &self,
        ch: &mut api::Challenge,
        ctx: &CancellationToken,
    ) -> Result<()> {
        wait_until(ch.retry_at, ctx).await?;
        self.load_challenge(ch, ctx).await
    }

    /// Submits a challenge response.
    ///
    /// The response body is produced by a responder and is opaque here. It is
    /// signed with `key`, or the account key when `key` is `None`.
    pub async fn respond_to_challenge(
        &self,
        ch: &api::Challenge,
        response: &RawValue,
        key: Option<&AccountKey>,
        ctx: &CancellationToken,
    ) -> Result<()> {
        let key = key.unwrap_or(&self.key);
        self.trans.post(&ch.uri, response, key, ctx).await?;
        Ok(())
    }

    /// Requests a certificate using a CSR in DER form.
    ///
    /// When the server answers with the certificate right away, the issuer
    /// chain is fetched as well; otherwise the leaf stays empty until a
    /// later load finds it issued.
    pub async fn request_certificate(
        &self,
        csr_der: &[u8],
        ctx: &CancellationToken,
    ) -> Result<Certificate> {
        let new_cert_url = self.directory(ctx).await?.new_cert.clone();
        let req = api::NewCertificate::new(csr_der);

        let res = self.trans.post(&new_cert_url, &req, &self.key, ctx).await?;
        if res.status() != StatusCode::CREATED {
            return Err(Error::UnexpectedStatus(res.status()));
        }

        let mut crt = Certificate {
            uri: location(res.headers())?,
            csr: csr_der.to_vec(),
            ..Default::default()
        };
        self.ingest_certificate(&mut crt, res, ctx).await?;

        Ok(crt)
    }

    /// Loads or reloads a certificate via its URI.
    ///
    /// Returns `Ok` with an empty leaf when the certificate is not yet
    /// issued.
    pub async fn load_certificate(
        &self,
        crt: &mut Certificate,
        ctx: &CancellationToken,
    ) -> Result<()> {
        let res = self.trans.get(&crt.uri, ctx).await?;
        self.ingest_certificate(crt, res, ctx).await
    }

    async fn ingest_certificate(
        &self,
        crt: &mut Certificate,
        res: reqwest::Response,
        ctx: &CancellationToken,
    ) -> Result<()> {
        let status = res.status();
        let headers = res.headers().clone();

        match trans::content_type(&headers) {
            Some("application/pkix-cert") => {
                crt.certificate = trans::read_body(res, ctx).await?;
                self.load_extra_certificates(crt, &headers, ctx).await?;
            }
            ct if status == StatusCode::OK => {
                return Err(Error::UnexpectedContentType(ct.unwrap_or("").to_owned()));
            }
            _ => {}
        }

        crt.retry_at = Some(trans::retry_at_default(&headers, DEFAULT_POLL_DELAY));
        Ok(())
    }

    /// Walks `rel="up"` links from the issuance response, collecting the
    /// issuer chain in walk order. Terminates on the first response without
    /// an `up` link.
    async fn load_extra_certificates(
        &self,
        crt: &mut Certificate,
        headers: &HeaderMap,
        ctx: &CancellationToken,
    ) -> Result<()> {
        crt.extra_certificates.clear();
        let mut headers = headers.clone();

        loop {
            let Some(up) = util::link_with_rel(&headers, "up") else {
                return Ok(());
            };

            if crt.extra_certificates.len() >= MAX_CHAIN_LENGTH {
                return Err(Error::Malformed("certificate chain too long".to_owned()));
            }

            // The link may be relative to the certificate URI.
            let base = url::Url::parse(&crt.uri)
                .map_err(|_| Error::InvalidUrl(crt.uri.clone()))?;
            let up_url = base.join(&up).map_err(|_| Error::InvalidUrl(up.clone()))?;

            let res = self.trans.get(up_url.as_str(), ctx).await?;
            headers = res.headers().clone();

            match trans::content_type(&headers) {
                Some("application/pkix-cert") => {}
                ct => return Err(Error::UnexpectedContentType(ct.unwrap_or("").to_owned())),
            }

            let der = trans::read_body(res, ctx).await?;
            crt.extra_certificates.push(der);
        }
    }

    /// Like [`load_certificate`](Client::load_certificate), but first waits
    /// out the server's retry hint.
    ///
    /// You will almost certainly want
    /// [`wait_for_certificate`](Client::wait_for_certificate) instead.
    pub async fn wait_load_certificate(
        &self,
        crt: &mut Certificate,
        ctx: &CancellationToken,
    ) -> Result<()> {
        wait_until(crt.retry_at, ctx).await?;
        self.load_certificate(crt, ctx).await
    }

    /// Waits for a pending certificate to be issued. If the certificate has
    /// already been issued, this is a no-op.
    pub async fn wait_for_certificate(
        &self,
        crt: &mut Certificate,
        ctx: &CancellationToken,
    ) -> Result<()> {
        while !crt.is_issued() {
            self.wait_load_certificate(crt, ctx).await?;
        }
        Ok(())
    }

    /// Revokes the given certificate.
    ///
    /// `key` may be the key corresponding to the certificate. When `None`,
    /// the account key is used; in that case the account must be authorized
    /// for all identifiers in the certificate.
    pub async fn revoke(
        &self,
        certificate_der: &[u8],
        key: Option<&AccountKey>,
        ctx: &CancellationToken,
    ) -> Result<()> {
        let revoke_url = self.directory(ctx).await?.revoke_cert.clone();
        let req = api::Revocation::new(certificate_der);
        let key = key.unwrap_or(&self.key);

        self.trans.post(&revoke_url, &req, key, ctx).await?;
        Ok(())
    }
}

/// Builder for [`Client`].
#[derive(Debug)]
pub struct ClientBuilder {
    key: AccountKey,
    directory_url: String,
    contact_uris: Vec<String>,
    agreement_uris: HashSet<String>,
    registration_uri: Option<String>,
    http: Option<reqwest::Client>,
}

impl ClientBuilder {
    /// The directory endpoint to talk to. Defaults to the Let's Encrypt
    /// staging directory.
    pub fn directory_url(mut self, url: DirectoryUrl<'_>) -> Self {
        self.directory_url = url.to_url().to_owned();
        self
    }

    /// Adds a contact URI used when registering or updating a registration.
    pub fn contact_uri(mut self, uri: &str) -> Self {
        self.contact_uris.push(uri.to_owned());
        self
    }

    /// Adds a terms-of-service URI to agree to automatically.
    pub fn agreement_uri(mut self, uri: &str) -> Self {
        self.agreement_uris.insert(uri.to_owned());
        self
    }

    /// Seeds the registration URI when already known, saving a discovery
    /// round trip.
    pub fn registration_uri(mut self, uri: &str) -> Self {
        self.registration_uri = Some(uri.to_owned());
        self
    }

    /// HTTP client to dispatch requests through.
    pub fn http_client(mut self, http: reqwest::Client) -> Self {
        self.http = Some(http);
        self
    }

    pub fn build(self) -> Client {
        let http = self.http.unwrap_or_default();

        Client {
            trans: Transactor::new(http, &self.directory_url),
            key: self.key,
            contact_uris: self.contact_uris,
            agreement_uris: self.agreement_uris,
            registration_uri: Mutex::new(self.registration_uri),
            directory_url: self.directory_url,
            dir: DirectoryCache::default(),
        }
    }
}

fn location(headers: &HeaderMap) -> Result<String> {
    let uri = headers
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    if !trans::valid_url(uri) {
        return Err(Error::InvalidUrl(uri.to_owned()));
    }

    Ok(uri.to_owned())
}

/// Waits until `at` or cancellation, whichever comes first. The token is
/// checked up front so that a zero-duration wait cannot starve cancellation.
async fn wait_until(at: Option<Instant>, ctx: &CancellationToken) -> Result<()> {
    if ctx.is_cancelled() {
        return Err(Error::Cancelled);
    }

    let Some(at) = at else { return Ok(()) };

    tokio::select! {
        biased;
        _ = ctx.cancelled() => Err(Error::Cancelled),
        _ = tokio::time::sleep_until(at) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::with_directory_server;

    fn test_client(dir_url: &str) -> Client {
        Client::builder(AccountKey::generate_p256())
            .directory_url(DirectoryUrl::Other(dir_url))
            .contact_uri("mailto:foo@bar.example")
            .build()
    }

    #[tokio::test]
    async fn test_upsert_registration_new_account() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        client.upsert_registration(&ctx).await.unwrap();

        let uri = client.registration_uri(&ctx).await.unwrap();
        assert_eq!(uri, format!("{}/acme/reg/1", server.base_url));
    }

    #[tokio::test]
    async fn test_registration_uri_found_via_conflict() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&format!("{}/directory-conflict", server.base_url));

        let uri = client.registration_uri(&ctx).await.unwrap();
        assert_eq!(uri, format!("{}/acme/reg/1", server.base_url));
    }

    #[tokio::test]
    async fn test_registration_tos_not_accepted() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&format!("{}/directory-tos", server.base_url));

        let err = client.upsert_registration(&ctx).await.unwrap_err();
        match err {
            Error::Agreement { uri } => {
                assert_eq!(uri, format!("{}/tos/v2", server.base_url));
            }
            err => panic!("expected agreement error, got {err}"),
        }
    }

    #[tokio::test]
    async fn test_registration_tos_pre_accepted() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();

        let client = Client::builder(AccountKey::generate_p256())
            .directory_url(DirectoryUrl::Other(&format!(
                "{}/directory-tos",
                server.base_url
            )))
            .agreement_uri(&format!("{}/tos/v2", server.base_url))
            .build();

        client.upsert_registration(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_registration_tos_already_agreed() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&format!("{}/directory-agreed", server.base_url));

        // The response's agreement matches the link, so no further POST and
        // no agreement error.
        client.upsert_registration(&ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_new_authorization_synthesizes_combinations() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let az = client
            .new_authorization("publicdomain.example", &ctx)
            .await
            .unwrap();

        assert_eq!(az.uri, format!("{}/acme/authz/1", server.base_url));
        assert_eq!(az.identifier, api::Identifier::dns("publicdomain.example"));
        assert_eq!(az.challenges.len(), 3);
        assert_eq!(az.combinations, Some(vec![vec![0, 1, 2]]));
    }

    #[tokio::test]
    async fn test_load_authorization_from_uri() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let mut az =
            api::Authorization::from_uri(&format!("{}/acme/authz/1", server.base_url));
        client.load_authorization(&mut az, &ctx).await.unwrap();

        assert_eq!(az.uri, format!("{}/acme/authz/1", server.base_url));
        assert_eq!(az.status, api::Status::Pending);
        assert_eq!(az.challenges.len(), 3);
        assert!(az.retry_at.is_some());
    }

    #[tokio::test]
    async fn test_wait_load_authorization_immediate_when_unpolled() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let mut az =
            api::Authorization::from_uri(&format!("{}/acme/authz/1", server.base_url));

        // No recorded poll instant: the call happens immediately.
        client.wait_load_authorization(&mut az, &ctx).await.unwrap();
        assert_eq!(az.status, api::Status::Pending);
    }

    #[tokio::test]
    async fn test_wait_load_cancelled_without_network_call() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let mut az = api::Authorization::from_uri("https://unreachable.example/authz/1");
        az.retry_at = Some(Instant::now() + Duration::from_secs(3600));

        ctx.cancel();
        let err = client
            .wait_load_authorization(&mut az, &ctx)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }

    #[tokio::test]
    async fn test_load_challenge() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let mut ch =
            api::Challenge::from_uri(&format!("{}/acme/challenge/http0", server.base_url));
        client.load_challenge(&mut ch, &ctx).await.unwrap();

        assert_eq!(ch._type, "http-01");
        assert_eq!(ch.status, api::Status::Pending);
        assert!(!ch.token.is_empty());
        assert!(ch.retry_at.is_some());
    }

    #[tokio::test]
    async fn test_respond_to_challenge() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let ch =
            api::Challenge::from_uri(&format!("{}/acme/challenge/http0", server.base_url));
        let response = serde_json::value::RawValue::from_string(
            r#"{"resource":"challenge","type":"http-01","keyAuthorization":"t.d"}"#.to_owned(),
        )
        .unwrap();

        client
            .respond_to_challenge(&ch, &response, None, &ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_certificate_issued_with_chain() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let csr = [0x30, 0x0a, 0x01];
        let crt = client.request_certificate(&csr, &ctx).await.unwrap();

        assert_eq!(crt.uri, format!("{}/acme/cert/5", server.base_url));
        assert_eq!(crt.csr, csr);
        assert_eq!(crt.certificate, b"LEAF CERT DER");
        assert_eq!(crt.extra_certificates, vec![b"INTERMEDIATE DER".to_vec()]);
    }

    #[tokio::test]
    async fn test_certificate_pending_then_issued() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&format!("{}/directory-pending", server.base_url));

        let mut crt = client.request_certificate(&[0x30], &ctx).await.unwrap();
        assert!(!crt.is_issued());
        assert!(crt.retry_at.is_some());

        client.wait_for_certificate(&mut crt, &ctx).await.unwrap();
        assert_eq!(crt.certificate, b"PENDING LEAF DER");
    }

    #[tokio::test]
    async fn test_reload_clears_and_rewalks_chain() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let mut crt =
            Certificate::from_uri(&format!("{}/acme/cert/5", server.base_url));
        client.load_certificate(&mut crt, &ctx).await.unwrap();
        client.load_certificate(&mut crt, &ctx).await.unwrap();

        assert_eq!(crt.extra_certificates.len(), 1);
    }

    #[tokio::test]
    async fn test_revoke_with_account_key() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        client.revoke(&[0x30, 0x82], None, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_revoke_with_certificate_key() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        let cert_key = AccountKey::generate_p256();
        client
            .revoke(&[0x30, 0x82], Some(&cert_key), &ctx)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_directory_fetched_once() {
        let server = with_directory_server();
        let ctx = CancellationToken::new();
        let client = test_client(&server.dir_url);

        client.registration_uri(&ctx).await.unwrap();
        client.new_authorization("a.example", &ctx).await.unwrap();
        client.revoke(&[0x30], None, &ctx).await.unwrap();

        assert_eq!(server.directory_hits(), 1);
    }
}
