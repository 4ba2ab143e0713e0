use serde::{Deserialize, Serialize};

use crate::util;

/// Certificate revocation request ("revoke-cert").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revocation {
    pub resource: String,

    /// The certificate being revoked, base64url DER on the wire.
    #[serde(with = "util::b64der")]
    pub certificate: Vec<u8>,
}

impl Revocation {
    pub(crate) fn new(certificate_der: &[u8]) -> Self {
        Self {
            resource: "revoke-cert".to_owned(),
            certificate: certificate_der.to_vec(),
        }
    }
}
