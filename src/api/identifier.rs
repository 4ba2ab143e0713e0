use serde::{Deserialize, Serialize};

/// An identifier for which an authorization is desired.
///
/// Only the "dns" type is recognized; the value is a hostname.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identifier {
    #[serde(rename = "type")]
    pub _type: String,
    pub value: String,
}

impl Identifier {
    pub fn dns(hostname: &str) -> Self {
        Self {
            _type: "dns".to_owned(),
            value: hostname.to_owned(),
        }
    }

    pub fn is_type_dns(&self) -> bool {
        self._type == "dns"
    }
}
