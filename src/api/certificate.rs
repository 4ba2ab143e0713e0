use serde::{Deserialize, Serialize};

use crate::util;

/// Certificate issuance request ("new-cert").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCertificate {
    pub resource: String,

    /// Certificate signing request, base64url DER on the wire.
    #[serde(with = "util::b64der")]
    pub csr: Vec<u8>,
}

impl NewCertificate {
    pub(crate) fn new(csr_der: &[u8]) -> Self {
        Self {
            resource: "new-cert".to_owned(),
            csr: csr_der.to_vec(),
        }
    }
}
