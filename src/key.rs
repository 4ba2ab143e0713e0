use ecdsa::signature::Signer as _;
use pkcs8::{DecodePrivateKey as _, EncodePrivateKey as _};
use rsa::signature::SignatureEncoding as _;
use zeroize::Zeroizing;

use crate::error::{Error, Result};

/// Account private key used to sign requests to the ACME API.
///
/// The JWS algorithm is derived from the key material: RSA keys sign with
/// RS256, elliptic curve keys with the ES variant matching their curve.
#[derive(Clone)]
pub enum AccountKey {
    Rsa(rsa::RsaPrivateKey),
    P256(p256::ecdsa::SigningKey),
    P384(p384::ecdsa::SigningKey),
    P521(p521::ecdsa::SigningKey),
}

impl std::fmt::Debug for AccountKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = match self {
            AccountKey::Rsa(_) => "Rsa",
            AccountKey::P256(_) => "P256",
            AccountKey::P384(_) => "P384",
            AccountKey::P521(_) => "P521",
        };
        f.debug_tuple(variant).finish_non_exhaustive()
    }
}

impl AccountKey {
    /// Generates a fresh P-256 account key.
    pub fn generate_p256() -> AccountKey {
        let csprng = &mut rand::thread_rng();
        AccountKey::P256(ecdsa::SigningKey::from(p256::SecretKey::random(csprng)))
    }

    /// Reads a key from PKCS#8 PEM, recognizing RSA and the NIST curves
    /// P-256, P-384 and P-521.
    pub fn from_pkcs8_pem(pem: &str) -> Result<AccountKey> {
        if let Ok(key) = ecdsa::SigningKey::<p256::NistP256>::from_pkcs8_pem(pem) {
            return Ok(AccountKey::P256(key));
        }
        if let Ok(key) = ecdsa::SigningKey::<p384::NistP384>::from_pkcs8_pem(pem) {
            return Ok(AccountKey::P384(key));
        }
        if let Ok(key) = ecdsa::SigningKey::<p521::NistP521>::from_pkcs8_pem(pem) {
            return Ok(AccountKey::P521(key.into()));
        }
        if let Ok(key) = rsa::RsaPrivateKey::from_pkcs8_pem(pem) {
            return Ok(AccountKey::Rsa(key));
        }

        Err(Error::UnsupportedKey(
            "not a PKCS#8 RSA, P-256, P-384 or P-521 private key".to_owned(),
        ))
    }

    /// The key in PKCS#8 PEM format.
    pub fn to_pkcs8_pem(&self) -> Result<Zeroizing<String>> {
        let pem = match self {
            AccountKey::Rsa(key) => key.to_pkcs8_pem(pkcs8::LineEnding::LF),
            AccountKey::P256(key) => key.to_pkcs8_pem(pkcs8::LineEnding::LF),
            AccountKey::P384(key) => key.to_pkcs8_pem(pkcs8::LineEnding::LF),
            AccountKey::P521(key) => ecdsa::SigningKey::<p521::NistP521>::from_bytes(&key.to_bytes())
                .expect("round-trippable scalar")
                .to_pkcs8_pem(pkcs8::LineEnding::LF),
        };

        pem.map_err(|err| Error::Signing(format!("private key to PEM: {err}")))
    }

    /// The JWS algorithm name for this key.
    pub fn algorithm(&self) -> &'static str {
        match self {
            AccountKey::Rsa(_) => "RS256",
            AccountKey::P256(_) => "ES256",
            AccountKey::P384(_) => "ES384",
            AccountKey::P521(_) => "ES512",
        }
    }

    /// Signs `message`, returning the raw signature bytes in the form JWS
    /// expects (PKCS#1 v1.5 for RSA, fixed-width `r || s` for ECDSA).
    pub(crate) fn sign(&self, message: &[u8]) -> Result<Vec<u8>> {
        let signature = match self {
            AccountKey::Rsa(key) => {
                let signer = rsa::pkcs1v15::SigningKey::<sha2::Sha256>::new(key.clone());
                signer
                    .try_sign(message)
                    .map_err(|err| Error::Signing(err.to_string()))?
                    .to_vec()
            }
            AccountKey::P256(key) => {
                let signature: ecdsa::Signature<p256::NistP256> = key
                    .try_sign(message)
                    .map_err(|err| Error::Signing(err.to_string()))?;
                signature.to_bytes().to_vec()
            }
            AccountKey::P384(key) => {
                let signature: ecdsa::Signature<p384::NistP384> = key
                    .try_sign(message)
                    .map_err(|err| Error::Signing(err.to_string()))?;
                signature.to_bytes().to_vec()
            }
            AccountKey::P521(key) => {
                let signature: ecdsa::Signature<p521::NistP521> = key
                    .try_sign(message)
                    .map_err(|err| Error::Signing(err.to_string()))?;
                signature.to_bytes().to_vec()
            }
        };

        Ok(signature)
    }
}
