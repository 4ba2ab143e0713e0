use tokio::time::Instant;

/// A certificate which has been, or is about to be, issued.
///
/// A certificate can also be constructed from a known URI alone and filled in
/// with [`Client::load_certificate`](crate::Client::load_certificate).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Certificate {
    /// URI of the certificate resource.
    pub uri: String,

    /// The leaf certificate, DER. Empty until issuance completes.
    pub certificate: Vec<u8>,

    /// Required extra certificates, DER, in chain-walk order.
    pub extra_certificates: Vec<Vec<u8>>,

    /// The certificate signing request submitted for issuance, DER.
    pub csr: Vec<u8>,

    /// Instant before which the server asked us not to poll again.
    pub(crate) retry_at: Option<Instant>,
}

impl Certificate {
    /// Certificate handle with only the URI set; the remaining fields are
    /// populated by `load_certificate`.
    pub fn from_uri(uri: &str) -> Self {
        Self {
            uri: uri.to_owned(),
            ..Default::default()
        }
    }

    /// Returns true once the leaf certificate has been downloaded.
    pub fn is_issued(&self) -> bool {
        !self.certificate.is_empty()
    }
}
