//! Stable request fingerprinting
//!
//! A fingerprint is a pure function of a request's deterministic fields.
//! Fields that vary between two runs of the same logical call (timestamps,
//! correlation ids, trace propagation headers) are excluded before keying,
//! and order-dependent parts (query string, header list) are normalized, so
//! that a replayed request keys to the interaction captured for it.

use crate::types::{Fingerprint, RequestRecord};
use blake3::Hasher as Blake3Hasher;

/// Domain tag mixed into every fingerprint, versioned with the encoding
const FINGERPRINT_DOMAIN: &[u8] = b"retrace.fingerprint.v1";

/// Header names excluded from fingerprinting by default
///
/// All entries are lowercase; comparison is case-insensitive.
const DEFAULT_VOLATILE_HEADERS: &[&str] = &[
    "date",
    "x-request-id",
    "x-correlation-id",
    "x-demo-correlation-id",
    "x-trace-id",
    "x-amzn-trace-id",
    "traceparent",
    "tracestate",
    "idempotency-key",
];

/// Derives stable matching keys from requests
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    volatile_headers: Vec<String>,
}

impl Fingerprinter {
    /// Create a fingerprinter with the default volatile-header list
    pub fn new() -> Self {
        Self {
            volatile_headers: DEFAULT_VOLATILE_HEADERS
                .iter()
                .map(|h| h.to_string())
                .collect(),
        }
    }

    /// Exclude an additional header from fingerprinting
    pub fn with_volatile_header(mut self, name: impl Into<String>) -> Self {
        self.volatile_headers.push(name.into().to_ascii_lowercase());
        self
    }

    /// Compute the stable key for a request
    ///
    /// The encoding is structural and length-prefixed: equal fingerprints
    /// require equal method, target, normalized headers, and normalized body.
    /// No process-local state is involved, so the key is identical across
    /// restarts and machines.
    pub fn fingerprint(&self, request: &RequestRecord) -> Fingerprint {
        let mut hasher = Blake3Hasher::new();
        hasher.update(FINGERPRINT_DOMAIN);

        update_field(&mut hasher, request.method.to_ascii_uppercase().as_bytes());
        update_field(&mut hasher, normalize_url(&request.url).as_bytes());

        let headers = self.normalized_headers(request);
        update_field(&mut hasher, &(headers.len() as u64).to_le_bytes());
        for (name, value) in &headers {
            update_field(&mut hasher, name.as_bytes());
            update_field(&mut hasher, value.as_bytes());
        }

        update_field(&mut hasher, &canonical_body(&request.body));

        Fingerprint(*hasher.finalize().as_bytes())
    }

    /// Whether a header is excluded from fingerprinting
    pub fn is_volatile(&self, name: &str) -> bool {
        let name = name.to_ascii_lowercase();
        self.volatile_headers.iter().any(|h| *h == name)
    }

    fn normalized_headers(&self, request: &RequestRecord) -> Vec<(String, String)> {
        let mut headers: Vec<(String, String)> = request
            .headers
            .iter()
            .filter(|(name, _)| !self.is_volatile(name))
            .map(|(name, value)| (name.to_ascii_lowercase(), value.clone()))
            .collect();
        headers.sort();
        headers
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new()
    }
}

/// Write one field as a length-prefixed byte run
fn update_field(hasher: &mut Blake3Hasher, bytes: &[u8]) {
    hasher.update(&(bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

/// Sort the query portion of a URL so parameter order does not affect the key
fn normalize_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, query)) => {
            let mut params: Vec<&str> = query.split('&').filter(|p| !p.is_empty()).collect();
            params.sort_unstable();
            if params.is_empty() {
                base.to_string()
            } else {
                format!("{}?{}", base, params.join("&"))
            }
        }
        None => url.to_string(),
    }
}

/// Canonicalize a JSON body so key order does not affect the key
///
/// Non-JSON bodies are keyed on their raw bytes.
fn canonical_body(body: &[u8]) -> Vec<u8> {
    if body.is_empty() {
        return Vec::new();
    }
    match serde_json::from_slice::<serde_json::Value>(body) {
        // serde_json maps are ordered by key, so re-serializing sorts objects
        Ok(value) => serde_json::to_vec(&value).unwrap_or_else(|_| body.to_vec()),
        Err(_) => body.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> RequestRecord {
        RequestRecord::new("GET", "https://api.example.com/todos/1")
            .with_header("Accept", "application/json")
    }

    #[test]
    fn test_identical_requests_share_a_fingerprint() {
        let fingerprinter = Fingerprinter::new();
        assert_eq!(
            fingerprinter.fingerprint(&request()),
            fingerprinter.fingerprint(&request())
        );
    }

    #[test]
    fn test_volatile_headers_do_not_affect_the_key() {
        let fingerprinter = Fingerprinter::new();
        let bare = request();
        let stamped = request()
            .with_header("Date", "Tue, 04 Aug 2026 10:00:00 GMT")
            .with_header("X-Request-Id", "9f41c2d7")
            .with_header("Traceparent", "00-abc-def-01");

        assert_eq!(
            fingerprinter.fingerprint(&bare),
            fingerprinter.fingerprint(&stamped)
        );
    }

    #[test]
    fn test_custom_volatile_header() {
        let fingerprinter = Fingerprinter::new().with_volatile_header("X-App-Nonce");
        let bare = request();
        let nonced = request().with_header("x-app-nonce", "71ab2c");

        assert_eq!(
            fingerprinter.fingerprint(&bare),
            fingerprinter.fingerprint(&nonced)
        );
    }

    #[test]
    fn test_method_and_target_are_significant() {
        let fingerprinter = Fingerprinter::new();
        let get = RequestRecord::new("GET", "https://api.example.com/todos/1");
        let post = RequestRecord::new("POST", "https://api.example.com/todos/1");
        let other = RequestRecord::new("GET", "https://api.example.com/todos/2");

        assert_ne!(
            fingerprinter.fingerprint(&get),
            fingerprinter.fingerprint(&post)
        );
        assert_ne!(
            fingerprinter.fingerprint(&get),
            fingerprinter.fingerprint(&other)
        );
    }

    #[test]
    fn test_header_order_and_case_are_insignificant() {
        let fingerprinter = Fingerprinter::new();
        let a = RequestRecord::new("GET", "https://api.example.com/users/1")
            .with_header("Accept", "application/json")
            .with_header("X-Api-Key", "k1");
        let b = RequestRecord::new("GET", "https://api.example.com/users/1")
            .with_header("x-api-key", "k1")
            .with_header("accept", "application/json");

        assert_eq!(fingerprinter.fingerprint(&a), fingerprinter.fingerprint(&b));
    }

    #[test]
    fn test_query_parameter_order_is_insignificant() {
        let fingerprinter = Fingerprinter::new();
        let a = RequestRecord::new("GET", "https://api.example.com/search?a=1&b=2");
        let b = RequestRecord::new("GET", "https://api.example.com/search?b=2&a=1");
        let c = RequestRecord::new("GET", "https://api.example.com/search?a=1&b=3");

        assert_eq!(fingerprinter.fingerprint(&a), fingerprinter.fingerprint(&b));
        assert_ne!(fingerprinter.fingerprint(&a), fingerprinter.fingerprint(&c));
    }

    #[test]
    fn test_json_body_key_order_is_insignificant() {
        let fingerprinter = Fingerprinter::new();
        let a = RequestRecord::new("POST", "https://api.example.com/posts")
            .with_body(br#"{"title":"x","userId":1}"#.to_vec());
        let b = RequestRecord::new("POST", "https://api.example.com/posts")
            .with_body(br#"{"userId":1,"title":"x"}"#.to_vec());

        assert_eq!(fingerprinter.fingerprint(&a), fingerprinter.fingerprint(&b));
    }

    #[test]
    fn test_non_json_bodies_are_keyed_verbatim() {
        let fingerprinter = Fingerprinter::new();
        let a = RequestRecord::new("POST", "https://api.example.com/upload")
            .with_body(vec![0x00, 0x01, 0x02]);
        let b = RequestRecord::new("POST", "https://api.example.com/upload")
            .with_body(vec![0x00, 0x01, 0x03]);

        assert_ne!(fingerprinter.fingerprint(&a), fingerprinter.fingerprint(&b));
    }

    #[test]
    fn test_normalize_url_handles_empty_query() {
        assert_eq!(
            normalize_url("https://api.example.com/a?"),
            "https://api.example.com/a"
        );
        assert_eq!(
            normalize_url("https://api.example.com/a"),
            "https://api.example.com/a"
        );
    }
}
