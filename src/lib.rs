//! Client library for ACME (Automatic Certificate Management Environment)
//! certificate authorities speaking the draft (v1) protocol, as deployed by
//! the original [Let's Encrypt](https://letsencrypt.org/) endpoints.
//!
//! Some [`Client`] methods correspond exactly to ACME calls, such as
//! [`new_authorization`], [`respond_to_challenge`], [`request_certificate`]
//! or [`revoke`]. Others, such as [`upsert_registration`] or
//! [`wait_for_certificate`], automatically compose requests to provide a
//! simplified interface: `upsert_registration` determines automatically
//! whether the account key is already registered, `wait_for_certificate`
//! polls until the certificate is available and fetches the issuing chain.
//!
//! All methods take a cancellation token so they can be cancelled or given
//! deadlines.
//!
//! # Proving Domain Ownership
//!
//! Before issuing a certificate, the CA hands out per-identifier challenges
//! that must be answered with a proof artifact: a well-known HTTP resource,
//! a DNS `TXT` record or a special TLS certificate. Publishing the artifact
//! is the job of a [`responder`]; this crate ships the pure `dns-01`
//! responder and an interface for registering the rest.
//!
//! # Rate Limits
//!
//! Public ACME providers enforce rate limits. Polling intervals follow the
//! server's `Retry-After` hints; resist the temptation to poll faster.
//!
//! ## Use Staging For Development!
//!
//! The default directory is the Let's Encrypt staging environment, where
//! rate limits are relaxed and issued certificates chain to an untrusted
//! root. Point at [`DirectoryUrl::LetsEncrypt`] only once things work.
//!
//! [`new_authorization`]: Client::new_authorization
//! [`respond_to_challenge`]: Client::respond_to_challenge
//! [`request_certificate`]: Client::request_certificate
//! [`revoke`]: Client::revoke
//! [`upsert_registration`]: Client::upsert_registration
//! [`wait_for_certificate`]: Client::wait_for_certificate

#![deny(rust_2018_idioms, nonstandard_style, future_incompatible)]

mod cert;
mod client;
mod dir;
mod error;
mod jws;
mod key;
mod trans;
mod util;

pub mod api;
pub mod responder;


pub use crate::{
    cert::Certificate,
    client::{Client, ClientBuilder},
    dir::DirectoryUrl,
    error::{Error, Result},
    key::AccountKey,
    trans::set_testing_no_tls,
};
