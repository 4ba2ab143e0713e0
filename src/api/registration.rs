use serde::{Deserialize, Serialize};

/// Registration request and response body ("new-reg" / "reg").
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Registration {
    /// "new-reg" on creation, "reg" on update.
    #[serde(default)]
    pub resource: String,

    /// Contact URIs, e.g. `mailto:` addresses.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contact: Vec<String>,

    /// Terms-of-service URI the account has agreed to.
    #[serde(
        rename = "agreement",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub agreement_uri: Option<String>,

    #[serde(
        rename = "authorizations",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub authorizations_uri: Option<String>,

    #[serde(
        rename = "certificates",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub certificates_uri: Option<String>,
}

impl Registration {
    pub(crate) fn new_reg(contact: &[String]) -> Self {
        Self {
            resource: "new-reg".to_owned(),
            contact: contact.to_vec(),
            ..Default::default()
        }
    }

    pub(crate) fn reg(contact: &[String]) -> Self {
        Self {
            resource: "reg".to_owned(),
            contact: contact.to_vec(),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_reg_serialization() {
        let reg = Registration::new_reg(&["mailto:a@b".to_owned()]);
        let json = serde_json::to_string(&reg).unwrap();
        assert_eq!(json, r#"{"resource":"new-reg","contact":["mailto:a@b"]}"#);
    }

    #[test]
    fn test_reg_with_agreement() {
        let mut reg = Registration::reg(&[]);
        reg.agreement_uri = Some("https://ca.example/tos/v2".to_owned());
        let json = serde_json::to_string(&reg).unwrap();
        assert_eq!(
            json,
            r#"{"resource":"reg","agreement":"https://ca.example/tos/v2"}"#
        );
    }
}
