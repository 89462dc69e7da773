//! Canonical query-string encoding for data endpoints.
//!
//! Parameters are prefixed with `$` and JSON-encoded so the server can tell
//! the number `1` from the string `"1"`. Options ride along as plain
//! `key=value` pairs. The request tag, when present, always comes first so
//! server-side logs group by it.

use std::collections::BTreeMap;

use serde_json::Value;
use url::form_urlencoded::Serializer;

/// Option keys the server defaults to `true`; an explicit `false` override
/// has to be sent for these, while every other falsy option is omitted.
const SERVER_DEFAULT_TRUE: [&str; 2] = ["includeResult", "includeMutations"];

pub(crate) fn encode_query_string(
    query: &str,
    params: &BTreeMap<String, Value>,
    tag: Option<&str>,
    options: &[(&'static str, Value)],
) -> String {
    let mut serializer = Serializer::new(String::new());
    if let Some(tag) = tag {
        serializer.append_pair("tag", tag);
    }
    serializer.append_pair("query", query);
    for (name, value) in params {
        // Value's Display is its JSON serialization.
        serializer.append_pair(&format!("${name}"), &value.to_string());
    }
    for (key, value) in options {
        if let Some(encoded) = encode_option(key, value) {
            serializer.append_pair(key, &encoded);
        }
    }
    format!("?{}", serializer.finish())
}

fn encode_option(key: &str, value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::Bool(false) => SERVER_DEFAULT_TRUE
            .contains(&key)
            .then(|| "false".to_owned()),
        Value::Bool(true) => Some("true".to_owned()),
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(entries: &[(&str, Value)]) -> BTreeMap<String, Value> {
        entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.clone()))
            .collect()
    }

    fn decode(encoded: &str) -> Vec<(String, String)> {
        url::form_urlencoded::parse(encoded.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect()
    }

    #[test]
    fn tag_is_always_the_first_pair() {
        let encoded = encode_query_string(
            "*[_type == $type]",
            &params(&[("type", json!("post"))]),
            Some("website.listen"),
            &[("visibility", json!("query"))],
        );
        let pairs = decode(&encoded);
        assert_eq!(pairs[0], ("tag".to_owned(), "website.listen".to_owned()));
        assert_eq!(pairs[1].0, "query");
    }

    #[test]
    fn params_are_json_encoded_with_dollar_prefix() {
        let encoded = encode_query_string(
            "*[_id == $id && rev == $rev]",
            &params(&[("id", json!("abc")), ("rev", json!(7))]),
            None,
            &[],
        );
        let pairs = decode(&encoded);
        assert!(pairs.contains(&("$id".to_owned(), "\"abc\"".to_owned())));
        assert!(pairs.contains(&("$rev".to_owned(), "7".to_owned())));
    }

    #[test]
    fn server_default_true_options_are_sent_when_false() {
        let encoded = encode_query_string(
            "*",
            &BTreeMap::new(),
            None,
            &[
                ("includeResult", json!(false)),
                ("includePreviousRevision", json!(false)),
                ("includeMutations", json!(false)),
            ],
        );
        let pairs = decode(&encoded);
        assert!(pairs.contains(&("includeResult".to_owned(), "false".to_owned())));
        assert!(pairs.contains(&("includeMutations".to_owned(), "false".to_owned())));
        // Server default is already false, so the override is dropped.
        assert!(!pairs.iter().any(|(k, _)| k == "includePreviousRevision"));
    }

    #[test]
    fn falsy_and_unset_options_are_omitted() {
        let encoded = encode_query_string(
            "*",
            &BTreeMap::new(),
            None,
            &[
                ("effectFormat", Value::Null),
                ("visibility", json!("")),
                ("includeAllVersions", json!(true)),
            ],
        );
        let pairs = decode(&encoded);
        assert_eq!(pairs.len(), 2);
        assert!(pairs.contains(&("includeAllVersions".to_owned(), "true".to_owned())));
    }
}
