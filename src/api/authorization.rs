use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::{
    api::{Challenge, Identifier, Status},
    error::{Error, Result},
};

/// An authorization: the server's record of an account proving (or trying to
/// prove) control over an identifier.
///
/// An authorization can be constructed from a known URI alone and filled in
/// with [`Client::load_authorization`](crate::Client::load_authorization).
///
/// # Example JSON
///
/// ```json
/// {
///   "identifier": {
///     "type": "dns",
///     "value": "publicdomain.example"
///   },
///   "status": "pending",
///   "expires": "2016-01-09T08:26:43Z",
///   "challenges": [
///     {
///       "type": "http-01",
///       "status": "pending",
///       "uri": "https://ca.example/acme/challenge/publicdomain.example/17",
///       "token": "MUi-gqeOJdRkSb_YR2eaMxQBqf6al8dgt_dOttSWb0w"
///     }
///   ],
///   "combinations": [[0]]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Authorization {
    /// URI of the authorization resource. Carried in the `Location` header,
    /// not the body.
    #[serde(skip)]
    pub uri: String,

    #[serde(default)]
    pub identifier: Identifier,

    #[serde(default)]
    pub status: Status,

    /// RFC 3339 instant after which the server considers the authorization
    /// invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires: Option<String>,

    #[serde(default)]
    pub challenges: Vec<Challenge>,

    /// Sets of challenge indices the server accepts as sufficient. When the
    /// server omits the field, validation synthesizes a single combination
    /// listing every challenge.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub combinations: Option<Vec<Vec<usize>>>,

    /// Instant before which the server asked us not to poll again.
    #[serde(skip)]
    pub(crate) retry_at: Option<Instant>,
}

impl Authorization {
    /// Authorization handle with only the URI set; the remaining fields are
    /// populated by `load_authorization`.
    pub fn from_uri(uri: &str) -> Self {
        Self {
            uri: uri.to_owned(),
            ..Default::default()
        }
    }

    /// Checks structural invariants and synthesizes the combinations list
    /// when the server omitted it.
    pub(crate) fn validate(&mut self) -> Result<()> {
        if self.challenges.is_empty() {
            return Err(Error::Malformed("no challenges offered".to_owned()));
        }

        if self.combinations.is_none() {
            self.combinations = Some(vec![(0..self.challenges.len()).collect()]);
        }

        for combination in self.combinations.as_deref().unwrap_or_default() {
            if combination.iter().any(|&i| i >= self.challenges.len()) {
                return Err(Error::Malformed(
                    "one or more combinations are malformed".to_owned(),
                ));
            }
        }

        Ok(())
    }
}

/// Authorization creation request ("new-authz").
#[derive(Debug, Clone, Serialize)]
pub struct NewAuthorization {
    pub resource: String,
    pub identifier: Identifier,
}

impl NewAuthorization {
    pub(crate) fn dns(hostname: &str) -> Self {
        Self {
            resource: "new-authz".to_owned(),
            identifier: Identifier::dns(hostname),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn authz_with_challenges(n: usize, combinations: Option<Vec<Vec<usize>>>) -> Authorization {
        Authorization {
            identifier: Identifier::dns("publicdomain.example"),
            status: Status::Pending,
            challenges: (0..n)
                .map(|i| Challenge {
                    uri: format!("https://ca.example/acme/challenge/{i}"),
                    _type: "http-01".to_owned(),
                    token: format!("token-{i}"),
                    ..Default::default()
                })
                .collect(),
            combinations,
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_synthesizes_combinations() {
        let mut az = authz_with_challenges(3, None);
        az.validate().unwrap();
        assert_eq!(az.combinations, Some(vec![vec![0, 1, 2]]));
    }

    #[test]
    fn test_validate_keeps_server_combinations() {
        let mut az = authz_with_challenges(3, Some(vec![vec![0], vec![1, 2]]));
        az.validate().unwrap();
        assert_eq!(az.combinations, Some(vec![vec![0], vec![1, 2]]));
    }

    #[test]
    fn test_validate_rejects_empty_challenges() {
        let mut az = authz_with_challenges(0, None);
        assert!(matches!(az.validate(), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_combination() {
        let mut az = authz_with_challenges(2, Some(vec![vec![0, 2]]));
        assert!(matches!(az.validate(), Err(Error::Malformed(_))));
    }

    #[test]
    fn test_decode_ignores_resource_field() {
        let az: Authorization = serde_json::from_str(
            r#"{
                "resource": "authz",
                "identifier": { "type": "dns", "value": "publicdomain.example" },
                "status": "valid",
                "challenges": [
                    { "type": "dns-01", "uri": "https://ca.example/c/1", "token": "t" }
                ]
            }"#,
        )
        .unwrap();

        assert_eq!(az.status, Status::Valid);
        assert_eq!(az.identifier.value, "publicdomain.example");
    }
}
