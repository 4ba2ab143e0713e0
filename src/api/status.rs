use serde::{Deserialize, Serialize};

/// Status of an authorization or challenge.
///
/// Any wire value outside this set fails deserialization.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    #[default]
    Unknown,
    Pending,
    Processing,
    Valid,
    Invalid,
    Revoked,
}

impl Status {
    /// Returns true iff the status is terminal.
    pub fn is_final(self) -> bool {
        matches!(self, Status::Valid | Status::Invalid | Status::Revoked)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_known_statuses() {
        for (text, status) in [
            ("\"unknown\"", Status::Unknown),
            ("\"pending\"", Status::Pending),
            ("\"processing\"", Status::Processing),
            ("\"valid\"", Status::Valid),
            ("\"invalid\"", Status::Invalid),
            ("\"revoked\"", Status::Revoked),
        ] {
            assert_eq!(serde_json::from_str::<Status>(text).unwrap(), status);
        }
    }

    #[test]
    fn test_parse_rejects_unknown_strings() {
        assert!(serde_json::from_str::<Status>("\"ready\"").is_err());
        assert!(serde_json::from_str::<Status>("\"\"").is_err());
    }

    #[test]
    fn test_final_statuses() {
        let finals = [Status::Valid, Status::Invalid, Status::Revoked];
        for status in [
            Status::Unknown,
            Status::Pending,
            Status::Processing,
            Status::Valid,
            Status::Invalid,
            Status::Revoked,
        ] {
            assert_eq!(status.is_final(), finals.contains(&status));
        }
    }
}
