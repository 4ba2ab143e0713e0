//! Challenge responders: the components that publish the proof artifact a
//! challenge demands.
//!
//! Responders are looked up by challenge type string in a process-wide
//! registry. The `dns-01` responder ships with the crate; backends that need
//! sockets or filesystem access (HTTP webroots, TLS listeners, DNS record
//! publishers) live outside and register themselves during startup with
//! [`register_responder`].

use std::{collections::HashMap, sync::OnceLock};

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::value::RawValue;
use sha2::{Digest as _, Sha256};
use tokio::sync::watch;

use crate::{
    error::{Error, Result},
    jws::{Jwk, JwkThumb},
    key::AccountKey,
    util,
};

/// A prompt for the operator when a responder requires manual action.
#[derive(Debug, Clone)]
pub struct Interaction {
    pub title: String,
    pub prompt: String,
}

/// Callback through which responders ask the operator to act.
pub type InteractionFn = dyn Fn(&Interaction) -> Result<()> + Send + Sync;

/// A responder publishes the proof artifact for one challenge and produces
/// the JSON body submitted with
/// [`Client::respond_to_challenge`](crate::Client::respond_to_challenge).
pub trait Responder: Send {
    /// Begins publishing the proof artifact.
    fn start(&mut self, interaction: Option<&InteractionFn>) -> Result<()>;

    /// Withdraws the proof artifact.
    fn stop(&mut self) -> Result<()>;

    /// Optional stream of pokes signalling that the server probed the
    /// artifact, letting a caller cut polling short. `None` when the
    /// responder cannot detect probes.
    fn request_detected(&self) -> Option<watch::Receiver<()>> {
        None
    }

    /// The raw JSON to submit as the challenge response.
    fn validation(&self) -> &RawValue;
}

/// Everything a responder factory needs for one challenge.
pub struct ResponderConfig<'a> {
    pub challenge_type: &'a str,
    pub token: &'a str,
    pub account_key: &'a AccountKey,
}

impl ResponderConfig<'_> {
    /// The `token.thumbprint` key authorization string for this challenge.
    ///
    /// The thumbprint is the SHA-256 of the account key's JWK in thumbprint
    /// form ([RFC 7638]).
    ///
    /// [RFC 7638]: https://datatracker.ietf.org/doc/html/rfc7638
    pub fn key_authorization(&self) -> Result<String> {
        let jwk = Jwk::from_key(self.account_key);
        let thumb_json = serde_json::to_string(&JwkThumb::from(&jwk))
            .map_err(|err| Error::Signing(err.to_string()))?;

        let digest = util::base64url(&Sha256::digest(thumb_json));
        Ok(format!("{}.{digest}", self.token))
    }

    /// The challenge response body submitted to the server.
    pub fn response_json(&self) -> Result<Box<RawValue>> {
        #[derive(Serialize)]
        struct ChallengeResponse<'a> {
            resource: &'a str,
            #[serde(rename = "type")]
            _type: &'a str,
            #[serde(rename = "keyAuthorization")]
            key_authorization: &'a str,
        }

        let key_authorization = self.key_authorization()?;
        let body = serde_json::to_string(&ChallengeResponse {
            resource: "challenge",
            _type: self.challenge_type,
            key_authorization: &key_authorization,
        })
        .map_err(|err| Error::Responder(err.to_string()))?;

        RawValue::from_string(body).map_err(|err| Error::Responder(err.to_string()))
    }
}

/// Factory producing a responder for one challenge.
pub type ResponderFactory = fn(&ResponderConfig<'_>) -> Result<Box<dyn Responder>>;

fn registry() -> &'static RwLock<HashMap<String, ResponderFactory>> {
    static REGISTRY: OnceLock<RwLock<HashMap<String, ResponderFactory>>> = OnceLock::new();

    REGISTRY.get_or_init(|| {
        let mut factories: HashMap<String, ResponderFactory> = HashMap::new();
        factories.insert("dns-01".to_owned(), new_dns_responder);
        RwLock::new(factories)
    })
}

/// Registers a responder factory for a challenge type.
///
/// Registration happens at startup; later registrations for the same type
/// replace the earlier factory.
pub fn register_responder(challenge_type: &str, factory: ResponderFactory) {
    registry()
        .write()
        .insert(challenge_type.to_owned(), factory);
}

/// Creates a responder for the challenge type named in `config`.
pub fn new_responder(config: &ResponderConfig<'_>) -> Result<Box<dyn Responder>> {
    let factory = registry()
        .read()
        .get(config.challenge_type)
        .copied()
        .ok_or_else(|| {
            Error::Responder(format!(
                "no responder registered for challenge type {:?}",
                config.challenge_type
            ))
        })?;

    factory(config)
}

/// `dns-01` responder.
///
/// Publishing the TXT record is the operator's job, requested through the
/// interaction function; this responder only derives the record value and
/// the validation body.
struct DnsResponder {
    validation: Box<RawValue>,
    dns_string: String,
}

fn new_dns_responder(config: &ResponderConfig<'_>) -> Result<Box<dyn Responder>> {
    let validation = config.response_json()?;
    let key_authorization = config.key_authorization()?;
    let dns_string = util::base64url(&Sha256::digest(key_authorization));

    Ok(Box::new(DnsResponder {
        validation,
        dns_string,
    }))
}

impl Responder for DnsResponder {
    fn start(&mut self, interaction: Option<&InteractionFn>) -> Result<()> {
        let interaction = interaction.ok_or_else(|| {
            Error::Responder("interaction function not provided but required".to_owned())
        })?;

        interaction(&Interaction {
            title: "Verification DNS Record".to_owned(),
            prompt: format!(
                "You must place the verification DNS record at\n\n  \
                 _acme-challenge IN TXT {:?}\n\nunder the name to be verified.",
                self.dns_string
            ),
        })
    }

    fn stop(&mut self) -> Result<()> {
        Ok(())
    }

    fn validation(&self) -> &RawValue {
        &self.validation
    }
}
