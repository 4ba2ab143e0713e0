use serde::{Deserialize, Serialize};

/// Directory document for client self-configuration.
///
/// Missing entries decode as empty strings and are caught by URL validation
/// when (or if) the endpoint is used.
///
/// # Example JSON
///
/// ```json
/// {
///   "new-reg": "https://ca.example/acme/new-reg",
///   "new-authz": "https://ca.example/acme/new-authz",
///   "new-cert": "https://ca.example/acme/new-cert",
///   "revoke-cert": "https://ca.example/acme/revoke-cert"
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directory {
    /// URL for account registration.
    #[serde(rename = "new-reg", default)]
    pub new_reg: String,

    /// URL for account recovery, where the server offers it.
    #[serde(rename = "recover-reg", default, skip_serializing_if = "String::is_empty")]
    pub recover_reg: String,

    /// URL for creating authorizations.
    #[serde(rename = "new-authz", default)]
    pub new_authz: String,

    /// URL for requesting certificates.
    #[serde(rename = "new-cert", default)]
    pub new_cert: String,

    /// URL for certificate revocation.
    #[serde(rename = "revoke-cert", default)]
    pub revoke_cert: String,
}
