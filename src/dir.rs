use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use crate::{
    api,
    error::{Error, Result},
    trans::{self, Transactor},
};

const LETSENCRYPT_URL: &str = "https://acme-v01.api.letsencrypt.org/directory";
const LETSENCRYPT_STAGING_URL: &str = "https://acme-staging.api.letsencrypt.org/directory";

/// Enumeration of known ACME API directories.
#[derive(Debug, Clone)]
pub enum DirectoryUrl<'a> {
    /// The main Let's Encrypt directory.
    ///
    /// Not appropriate for testing / development.
    LetsEncrypt,

    /// The staging Let's Encrypt directory.
    ///
    /// Use for testing and development. Doesn't issue "valid" certificates.
    LetsEncryptStaging,

    /// Provide an arbitrary directory URL to connect to.
    Other(&'a str),
}

impl DirectoryUrl<'_> {
    pub(crate) fn to_url(&self) -> &str {
        match self {
            DirectoryUrl::LetsEncrypt => LETSENCRYPT_URL,
            DirectoryUrl::LetsEncryptStaging => LETSENCRYPT_STAGING_URL,
            DirectoryUrl::Other(url) => url,
        }
    }
}

impl Default for DirectoryUrl<'_> {
    fn default() -> Self {
        DirectoryUrl::LetsEncryptStaging
    }
}

/// Once-per-client cache of the directory document.
///
/// The first call fetches and validates the document; a failed fetch or
/// validation leaves the cache unset so a later call retries.
#[derive(Debug, Default)]
pub(crate) struct DirectoryCache {
    cell: OnceCell<api::Directory>,
}

impl DirectoryCache {
    pub(crate) async fn get(
        &self,
        trans: &Transactor,
        url: &str,
        ctx: &CancellationToken,
    ) -> Result<&api::Directory> {
        self.cell
            .get_or_try_init(|| async {
                log::debug!("fetching directory: {url}");
                let res = trans.get(url, ctx).await?;
                let dir: api::Directory = trans::read_json(res, ctx).await?;

                if !trans::valid_url(&dir.new_reg)
                    || !trans::valid_url(&dir.new_authz)
                    || !trans::valid_url(&dir.new_cert)
                {
                    return Err(Error::Malformed(
                        "directory does not provide required endpoints".to_owned(),
                    ));
                }

                Ok(dir)
            })
            .await
    }
}
