use base64::prelude::*;
use reqwest::header::HeaderMap;

pub(crate) fn base64url<T: ?Sized + AsRef<[u8]>>(input: &T) -> String {
    BASE64_URL_SAFE_NO_PAD.encode(input)
}

/// Serde codec for DER byte fields carried on the wire as unpadded base64url
/// text.
pub(crate) mod b64der {
    use base64::prelude::*;
    use serde::{de, Deserialize as _, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&BASE64_URL_SAFE_NO_PAD.encode(bytes))
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        BASE64_URL_SAFE_NO_PAD
            .decode(text.trim_end_matches('='))
            .map_err(de::Error::custom)
    }
}

/// Like [`b64der`], for an optional list of DER blobs.
pub(crate) mod b64der_list {
    use base64::prelude::*;
    use serde::{de, Deserialize as _, Deserializer, Serializer};

    pub(crate) fn serialize<S: Serializer>(
        list: &Option<Vec<Vec<u8>>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let encoded = list
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|der| BASE64_URL_SAFE_NO_PAD.encode(der))
            .collect::<Vec<_>>();
        serializer.collect_seq(encoded)
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Vec<Vec<u8>>>, D::Error> {
        let Some(list) = Option::<Vec<String>>::deserialize(deserializer)? else {
            return Ok(None);
        };

        list.iter()
            .map(|text| {
                BASE64_URL_SAFE_NO_PAD
                    .decode(text.trim_end_matches('='))
                    .map_err(de::Error::custom)
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }
}

/// Returns the target of the first `Link` header entry carrying the relation
/// type `rel` ([RFC 5988]).
///
/// The scan is deliberately small: bracketed targets, `;`-separated
/// parameters, and space-separated relation lists, which covers the `up` and
/// `terms-of-service` relations ACME servers emit.
///
/// [RFC 5988]: https://datatracker.ietf.org/doc/html/rfc5988
pub(crate) fn link_with_rel(headers: &HeaderMap, rel: &str) -> Option<String> {
    for value in headers.get_all(reqwest::header::LINK) {
        let Ok(value) = value.to_str() else { continue };

        for entry in split_link_entries(value) {
            let entry = entry.trim();
            let Some(rest) = entry.strip_prefix('<') else { continue };
            let Some((target, params)) = rest.split_once('>') else { continue };

            for param in params.split(';').skip(1) {
                let Some((name, param_value)) = param.split_once('=') else {
                    continue;
                };
                if name.trim() != "rel" {
                    continue;
                }

                let param_value = param_value.trim().trim_matches('"');
                if param_value.split_ascii_whitespace().any(|r| r == rel) {
                    return Some(target.to_owned());
                }
            }
        }
    }

    None
}

/// Splits a `Link` header value on commas, keeping commas inside `<...>`
/// targets intact.
fn split_link_entries(value: &str) -> Vec<&str> {
    let mut entries = Vec::new();
    let mut in_target = false;
    let mut start = 0;

    for (i, c) in value.char_indices() {
        match c {
            '<' => in_target = true,
            '>' => in_target = false,
            ',' if !in_target => {
                entries.push(&value[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    entries.push(&value[start..]);

    entries
}
