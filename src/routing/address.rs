//! Location decoding and ref encoding.
//!
//! A location carries one path per group: the primary group's path is the
//! location path (minus the router prefix), every other group travels in the
//! query as `_<group>=<path>`.
//!
//! ```text
//! /app/inbox/7?filter=unread&_side=%2Fpanel%2Fcontacts
//!  └┬┘└───┬──┘ └─────┬─────┘ └──────────┬───────────┘
//! prefix  main   passthrough       side = /panel/contacts
//! ```

use std::collections::BTreeMap;
use std::sync::OnceLock;

use percent_encoding::percent_decode_str;
use url::{form_urlencoded, Url};

use crate::location::Location;

/// Per-group paths and the passthrough query of one location.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteRequest {
    pub paths: BTreeMap<String, String>,
    pub query: BTreeMap<String, String>,
}

/// Split a location into group paths and passthrough query keys.
///
/// A location outside `prefix` yields an empty primary path, which matches
/// nothing.
pub fn decode_location(location: &Location, prefix: &str, primary_group: &str) -> RouteRequest {
    let mut request = RouteRequest::default();

    let primary = match location.path().strip_prefix(prefix) {
        Some("") => "/".to_string(),
        Some(rest) if rest.starts_with('/') => rest.to_string(),
        _ => String::new(),
    };
    request.paths.insert(primary_group.to_string(), primary);

    for (key, value) in location.query_pairs() {
        match key.strip_prefix('_') {
            Some(group) if !group.is_empty() && group != primary_group => {
                let path = if value.starts_with('/') {
                    value
                } else {
                    format!("/{value}")
                };
                request.paths.insert(group.to_string(), path);
            }
            Some(_) => {
                tracing::debug!(key = %key, "Ignoring malformed group key");
            }
            None => {
                request.query.insert(key, value);
            }
        }
    }

    request
}

/// Build `<prefix><primary-path>[?<query>]`.
///
/// Passthrough keys come first, then one `_<group>=<path>` entry per group
/// path, both in key order.
pub fn encode_ref(
    prefix: &str,
    primary_path: &str,
    query: &BTreeMap<String, String>,
    group_paths: &BTreeMap<String, String>,
) -> String {
    let mut out = format!("{prefix}{primary_path}");

    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in query {
        serializer.append_pair(key, value);
    }
    for (group, path) in group_paths {
        serializer.append_pair(&format!("_{group}"), path);
    }
    let encoded = serializer.finish();

    if !encoded.is_empty() {
        out.push('?');
        out.push_str(&encoded);
    }
    out
}

fn segment_base() -> &'static Url {
    static BASE: OnceLock<Url> = OnceLock::new();
    BASE.get_or_init(|| Url::parse("memory://local/").expect("static base url is valid"))
}

/// Percent-encode a value so it fits into a single path segment.
pub fn encode_segment(value: &str) -> String {
    let mut url = segment_base().clone();
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.clear().push(value);
    }
    url.path()[1..].to_string()
}

/// Decode a percent-encoded path component. `+` is kept literally.
pub fn decode_component(raw: &str) -> String {
    percent_decode_str(raw).decode_utf8_lossy().into_owned()
}
