use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{api::Status, util};

/// A challenge belonging to an [`Authorization`](crate::api::Authorization).
///
/// A challenge can also be constructed from a known URI alone and filled in
/// with [`Client::load_challenge`](crate::Client::load_challenge).
///
/// # Example JSON
///
/// ```json
/// {
///   "type": "http-01",
///   "status": "pending",
///   "uri": "https://ca.example/acme/challenge/publicdomain.example/17",
///   "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Challenge {
    /// URI of the challenge resource.
    #[serde(default)]
    pub uri: String,

    #[serde(rename = "type", default)]
    pub _type: String,

    #[serde(default)]
    pub status: Status,

    /// RFC 3339 instant at which the challenge was validated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validated: Option<String>,

    /// Server-provided token the proof artifact is derived from.
    #[serde(default)]
    pub token: String,

    /// tls-sni-01 iteration count.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<u32>,

    /// proofOfPossession candidate certificates, DER.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "util::b64der_list"
    )]
    pub certs: Option<Vec<Vec<u8>>>,

    /// Instant before which the server asked us not to poll again.
    #[serde(skip)]
    pub(crate) retry_at: Option<Instant>,
}

impl Challenge {
    /// Challenge handle with only the URI set; the remaining fields are
    /// populated by `load_challenge`.
    pub fn from_uri(uri: &str) -> Self {
        Self {
            uri: uri.to_owned(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_challenge() {
        let ch: Challenge = serde_json::from_str(
            r#"{
                "type": "tls-sni-01",
                "status": "pending",
                "uri": "https://ca.example/acme/challenge/17",
                "token": "WCdRWkCy4THTD_j5IH4ISAzr59lFIg5wzYmKxuOJ1lU",
                "n": 2
            }"#,
        )
        .unwrap();

        assert_eq!(ch._type, "tls-sni-01");
        assert_eq!(ch.status, Status::Pending);
        assert_eq!(ch.n, Some(2));
        assert!(ch.certs.is_none());
        assert!(ch.validated.is_none());
    }

    #[test]
    fn test_decode_rejects_bad_status() {
        let res = serde_json::from_str::<Challenge>(
            r#"{ "type": "http-01", "status": "sideways", "uri": "x", "token": "t" }"#,
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_decode_certs_base64url() {
        let ch: Challenge = serde_json::from_str(
            r#"{ "type": "proofOfPossession", "uri": "x", "token": "t", "certs": ["MIL_"] }"#,
        )
        .unwrap();
        assert_eq!(ch.certs, Some(vec![vec![0x30, 0x82, 0xff]]));
    }
}
