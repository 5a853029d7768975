//! Location snapshots.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::OnceLock;

use serde::Serialize;
use url::{form_urlencoded, Url};

use crate::location::LocationError;

const BASE: &str = "memory://local/";

fn base_url() -> &'static Url {
    static BASE_URL: OnceLock<Url> = OnceLock::new();
    BASE_URL.get_or_init(|| Url::parse(BASE).expect("static base url is valid"))
}

/// A single navigation target: path, raw query and fragment.
///
/// Paths keep their percent-encoded form; the query is decoded on demand.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Location {
    path: String,
    query: String,
    fragment: String,
}

impl Location {
    /// Parse a reference such as `/account/42?tab=info#top`.
    ///
    /// Only absolute paths are accepted; schemes, hosts and network-path
    /// references (`//host/...`) are rejected.
    pub fn parse(reference: &str) -> Result<Self, LocationError> {
        if !reference.starts_with('/') || reference.starts_with("//") {
            return Err(LocationError::Invalid {
                reference: reference.to_string(),
                reason: "expected an absolute path".to_string(),
            });
        }

        let url = base_url()
            .join(reference)
            .map_err(|e| LocationError::Invalid {
                reference: reference.to_string(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            path: url.path().to_string(),
            query: url.query().unwrap_or_default().to_string(),
            fragment: url.fragment().unwrap_or_default().to_string(),
        })
    }

    /// Percent-encoded path, always starting with `/`.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Raw query string without the leading `?`.
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn fragment(&self) -> &str {
        &self.fragment
    }

    /// Decoded query dictionary. Later duplicates win.
    pub fn query_pairs(&self) -> BTreeMap<String, String> {
        form_urlencoded::parse(self.query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Location equality used to skip no-op transitions: same path and same
    /// decoded query dictionary. Fragments are ignored.
    pub fn same_as(&self, other: &Location) -> bool {
        self.path == other.path && self.query_pairs() == other.query_pairs()
    }

    /// Render back into a reference string.
    pub fn to_ref(&self) -> String {
        let mut out = self.path.clone();
        if !self.query.is_empty() {
            out.push('?');
            out.push_str(&self.query);
        }
        if !self.fragment.is_empty() {
            out.push('#');
            out.push_str(&self.fragment);
        }
        out
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_parts() {
        let location = Location::parse("/account/42?tab=info&_side=%2Fpanel#top").unwrap();
        assert_eq!(location.path(), "/account/42");
        assert_eq!(location.query(), "tab=info&_side=%2Fpanel");
        assert_eq!(location.fragment(), "top");

        let pairs = location.query_pairs();
        assert_eq!(pairs["tab"], "info");
        assert_eq!(pairs["_side"], "/panel");
    }

    #[test]
    fn test_rejects_non_paths() {
        assert!(Location::parse("account").is_err());
        assert!(Location::parse("//evil.example/x").is_err());
        assert!(Location::parse("https://example.com/").is_err());
    }

    #[test]
    fn test_normalizes_dot_segments_and_spaces() {
        let location = Location::parse("/a/./b/../c d").unwrap();
        assert_eq!(location.path(), "/a/c%20d");
    }

    #[test]
    fn test_same_as_ignores_fragment_and_order() {
        let a = Location::parse("/x?a=1&b=2#one").unwrap();
        let b = Location::parse("/x?b=2&a=1#two").unwrap();
        assert!(a.same_as(&b));
        assert_ne!(a, b);
        assert!(!a.same_as(&Location::parse("/x?a=1").unwrap()));
    }

    #[test]
    fn test_round_trip_ref() {
        let raw = "/x/y?a=1#frag";
        assert_eq!(Location::parse(raw).unwrap().to_ref(), raw);
    }
}
