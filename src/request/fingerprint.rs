use std::fmt;

use serde_json::Value;
use url::Url;

/// Identity of a request: `md5(method ‖ canonicalized_url ‖ str(data) ‖ str(json))`.
///
/// Two requests with the same fingerprint are considered the same unit of work by
/// the dedup filter and the scheduler queue's pending/failure maps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    pub fn compute(method: &str, url: &Url, data: Option<&Value>, json: Option<&Value>) -> Self {
        let mut input = String::with_capacity(128);
        input.push_str(&method.to_uppercase());
        input.push_str(canonicalize(url).as_str());
        input.push_str(&stringify(data));
        input.push_str(&stringify(json));
        Fingerprint(md5::compute(input.as_bytes()).0)
    }

    pub fn as_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_hex())
    }
}

/// Sorts query parameters so that equivalent URLs with differently-ordered
/// query strings collapse to the same fingerprint, then drops the fragment.
fn canonicalize(url: &Url) -> String {
    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    pairs.sort();

    let mut out = url.clone();
    out.set_fragment(None);
    if pairs.is_empty() {
        out.set_query(None);
    } else {
        let query = pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join("&");
        out.set_query(Some(&query));
    }
    out.to_string()
}

fn stringify(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(v) => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn same_url_same_fingerprint() {
        let a = Fingerprint::compute("get", &url("https://example.com/a?x=1&y=2"), None, None);
        let b = Fingerprint::compute("GET", &url("https://example.com/a?y=2&x=1"), None, None);
        assert_eq!(a, b, "method case and query order must not affect identity");
    }

    #[test]
    fn different_body_different_fingerprint() {
        let u = url("https://example.com/a");
        let a = Fingerprint::compute("post", &u, Some(&serde_json::json!({"a":1})), None);
        let b = Fingerprint::compute("post", &u, Some(&serde_json::json!({"a":2})), None);
        assert_ne!(a, b);
    }

    #[test]
    fn fragment_is_ignored() {
        let a = Fingerprint::compute("get", &url("https://example.com/a#frag1"), None, None);
        let b = Fingerprint::compute("get", &url("https://example.com/a#frag2"), None, None);
        assert_eq!(a, b);
    }
}
