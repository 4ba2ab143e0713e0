//! Flattened JSON JWS envelopes as required for mutating ACME requests
//! ([RFC 7515 §7.2.2]).
//!
//! Every signed request embeds the account public key as a JWK together with
//! a fresh replay nonce and the target URL in the protected header.
//!
//! [RFC 7515 §7.2.2]: https://datatracker.ietf.org/doc/html/rfc7515#section-7.2.2

use base64::prelude::*;
use rsa::traits::PublicKeyParts as _;
use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    key::AccountKey,
    util,
};

/// JWS protected header.
///
/// The `alg` value is derived from the signing key and MUST NOT be "none" or
/// a MAC algorithm. The `nonce` binds the signature to a single request.
#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct JwsProtectedHeader {
    alg: String,
    nonce: String,
    url: String,
    jwk: Jwk,
}

impl JwsProtectedHeader {
    pub(crate) fn new(key: &AccountKey, url: &str, nonce: String) -> Self {
        JwsProtectedHeader {
            alg: key.algorithm().to_owned(),
            nonce,
            url: url.to_owned(),
            jwk: Jwk::from_key(key),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub(crate) enum Jwk {
    Ec {
        kty: String,
        crv: String,
        x: String,
        y: String,
    },
    Rsa {
        kty: String,
        n: String,
        e: String,
    },
}

impl Jwk {
    pub(crate) fn from_key(key: &AccountKey) -> Jwk {
        match key {
            AccountKey::Rsa(key) => Jwk::Rsa {
                kty: "RSA".to_owned(),
                n: util::base64url(&key.n().to_bytes_be()),
                e: util::base64url(&key.e().to_bytes_be()),
            },
            AccountKey::P256(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                Jwk::Ec {
                    kty: "EC".to_owned(),
                    crv: "P-256".to_owned(),
                    x: util::base64url(point.x().unwrap()),
                    y: util::base64url(point.y().unwrap()),
                }
            }
            AccountKey::P384(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                Jwk::Ec {
                    kty: "EC".to_owned(),
                    crv: "P-384".to_owned(),
                    x: util::base64url(point.x().unwrap()),
                    y: util::base64url(point.y().unwrap()),
                }
            }
            AccountKey::P521(key) => {
                let point = p521::ecdsa::VerifyingKey::from(key).to_encoded_point(false);
                Jwk::Ec {
                    kty: "EC".to_owned(),
                    crv: "P-521".to_owned(),
                    x: util::base64url(point.x().unwrap()),
                    y: util::base64url(point.y().unwrap()),
                }
            }
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
// LEXICAL ORDER OF FIELDS MATTER!
pub(crate) enum JwkThumb<'a> {
    Ec {
        crv: &'a str,
        kty: &'a str,
        x: &'a str,
        y: &'a str,
    },
    Rsa {
        e: &'a str,
        kty: &'a str,
        n: &'a str,
    },
}

impl<'a> From<&'a Jwk> for JwkThumb<'a> {
    fn from(jwk: &'a Jwk) -> Self {
        match jwk {
            Jwk::Ec { kty, crv, x, y } => JwkThumb::Ec { crv, kty, x, y },
            Jwk::Rsa { kty, n, e } => JwkThumb::Rsa { e, kty, n },
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct FlattenedJsonJws {
    protected: String,
    payload: String,
    signature: String,
}

/// Signs `payload` into a flattened JSON JWS directed at `url`.
pub(crate) fn sign<T>(key: &AccountKey, url: &str, nonce: String, payload: &T) -> Result<String>
where
    T: Serialize + ?Sized,
{
    let protected = {
        let header = JwsProtectedHeader::new(key, url, nonce);
        let header_json = serde_json::to_string(&header)
            .map_err(|err| Error::Signing(err.to_string()))?;
        BASE64_URL_SAFE_NO_PAD.encode(header_json)
    };

    let payload = {
        let payload_json = serde_json::to_string(payload)
            .map_err(|err| Error::Signing(err.to_string()))?;
        BASE64_URL_SAFE_NO_PAD.encode(payload_json)
    };

    let to_sign = format!("{protected}.{payload}");
    let signature = BASE64_URL_SAFE_NO_PAD.encode(key.sign(to_sign.as_bytes())?);

    let jws = FlattenedJsonJws {
        protected,
        payload,
        signature,
    };

    serde_json::to_string(&jws).map_err(|err| Error::Signing(err.to_string()))
}
