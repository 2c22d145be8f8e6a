use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use crate::error::ValidationError;

/// The kind whose key is used verbatim in a single-kind canonical key.
pub const DEFAULT_KIND: &str = "user";

/// One named partition of a context's identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextKind {
    pub kind: String,
    pub raw_key: String,
}

impl ContextKind {
    pub fn new(kind: impl Into<String>, raw_key: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            raw_key: raw_key.into(),
        }
    }

    pub fn user(raw_key: impl Into<String>) -> Self {
        Self::new(DEFAULT_KIND, raw_key)
    }
}

/// Stable string identity of a context. Only produced by
/// [`derive_canonical_key`], so a canonical key is never encoded twice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CanonicalKey(String);

impl CanonicalKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A validated context together with its canonical key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Context {
    kinds: Vec<ContextKind>,
    canonical_key: CanonicalKey,
}

impl Context {
    pub fn new(kinds: Vec<ContextKind>) -> Result<Self, ValidationError> {
        let canonical_key = derive_canonical_key(&kinds)?;
        Ok(Self {
            kinds,
            canonical_key,
        })
    }

    pub fn single(kind: impl Into<String>, raw_key: impl Into<String>) -> Result<Self, ValidationError> {
        Self::new(vec![ContextKind::new(kind, raw_key)])
    }

    pub fn kinds(&self) -> &[ContextKind] {
        &self.kinds
    }

    pub fn is_multiple(&self) -> bool {
        self.kinds.len() > 1
    }

    pub fn canonical_key(&self) -> &CanonicalKey {
        &self.canonical_key
    }

    /// Raw key of the given kind, if present.
    pub fn key_for(&self, kind: &str) -> Option<&str> {
        self.kinds
            .iter()
            .find(|k| k.kind == kind)
            .map(|k| k.raw_key.as_str())
    }

    /// Raw key of the first kind as it was supplied.
    pub fn first_key(&self) -> &str {
        // non-empty, checked in derive_canonical_key
        &self.kinds[0].raw_key
    }

    /// Kind names sorted ascending.
    pub fn sorted_kind_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.kinds.iter().map(|k| k.kind.clone()).collect();
        names.sort();
        names
    }
}

/// Escape the delimiter characters of a raw key. `%` must go first, otherwise
/// the `%` introduced by the colon escape would itself be escaped.
pub fn encode_key(raw_key: &str) -> String {
    raw_key.replace('%', "%25").replace(':', "%3A")
}

/// Derive the canonical key for a context description.
///
/// A lone `user` kind yields its encoded key with no prefix, any other lone
/// kind yields `kind:key`, and multi-kind contexts join `kind:key` segments
/// sorted by kind name.
pub fn derive_canonical_key(kinds: &[ContextKind]) -> Result<CanonicalKey, ValidationError> {
    validate_kinds(kinds)?;

    if let [single] = kinds {
        let encoded = encode_key(&single.raw_key);
        if single.kind == DEFAULT_KIND {
            return Ok(CanonicalKey(encoded));
        }
        return Ok(CanonicalKey(format!("{}:{}", single.kind, encoded)));
    }

    let mut sorted: Vec<&ContextKind> = kinds.iter().collect();
    sorted.sort_by(|a, b| a.kind.cmp(&b.kind));

    let segments: Vec<String> = sorted
        .iter()
        .map(|k| format!("{}:{}", k.kind, encode_key(&k.raw_key)))
        .collect();

    Ok(CanonicalKey(segments.join(":")))
}

fn validate_kinds(kinds: &[ContextKind]) -> Result<(), ValidationError> {
    if kinds.is_empty() {
        return Err(ValidationError::EmptyContext);
    }

    let mut seen = HashSet::new();
    for k in kinds {
        validate_kind_name(&k.kind)?;
        if k.raw_key.is_empty() {
            return Err(ValidationError::EmptyContextKey {
                kind: k.kind.clone(),
            });
        }
        if !seen.insert(k.kind.as_str()) {
            return Err(ValidationError::DuplicateKind(k.kind.clone()));
        }
    }

    Ok(())
}

// "kind" and "multi" are reserved by the context wire format
fn validate_kind_name(kind: &str) -> Result<(), ValidationError> {
    if kind.is_empty() || kind == "kind" || kind == "multi" {
        return Err(ValidationError::InvalidKind(kind.to_string()));
    }

    if !kind
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
    {
        return Err(ValidationError::InvalidKind(kind.to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn derive(kinds: &[ContextKind]) -> String {
        derive_canonical_key(kinds).unwrap().as_str().to_string()
    }

    #[test]
    fn test_user_kind_key_is_verbatim() {
        assert_eq!(derive(&[ContextKind::user("demo-user-1")]), "demo-user-1");
        assert_eq!(derive(&[ContextKind::user("abc_123.x")]), "abc_123.x");
    }

    #[test]
    fn test_percent_encoded_before_colon() {
        assert_eq!(
            derive(&[ContextKind::user("user:123%test")]),
            "user%3A123%25test"
        );
        // a literal "%3A" must survive as an escaped percent, not a colon
        assert_eq!(derive(&[ContextKind::user("a%3Ab")]), "a%253Ab");
    }

    #[test]
    fn test_non_user_single_kind_is_prefixed() {
        assert_eq!(
            derive(&[ContextKind::new("organization", "org-123")]),
            "organization:org-123"
        );
        assert_eq!(
            derive(&[ContextKind::new("device", "mac:00:11")]),
            "device:mac%3A00%3A11"
        );
    }

    #[test]
    fn test_multi_kind_sorted_regardless_of_input_order() {
        let forward = [
            ContextKind::user("user-456"),
            ContextKind::new("organization", "org-123"),
        ];
        let reverse = [
            ContextKind::new("organization", "org-123"),
            ContextKind::user("user-456"),
        ];

        assert_eq!(derive(&forward), "organization:org-123:user:user-456");
        assert_eq!(derive(&reverse), "organization:org-123:user:user-456");
    }

    #[test]
    fn test_multi_kind_encodes_each_segment() {
        let kinds = [
            ContextKind::new("org", "a:b"),
            ContextKind::user("100%"),
            ContextKind::new("device", "d1"),
        ];
        assert_eq!(derive(&kinds), "device:d1:org:a%3Ab:user:100%25");
    }

    #[test]
    fn test_derivation_is_deterministic() {
        let kinds = [ContextKind::user("x"), ContextKind::new("team", "t")];
        assert_eq!(
            derive_canonical_key(&kinds).unwrap(),
            derive_canonical_key(&kinds).unwrap()
        );
    }

    #[test]
    fn test_rederiving_output_would_double_encode() {
        // the pipeline must only ever derive from raw keys
        let once = derive(&[ContextKind::user("a:b")]);
        let twice = derive(&[ContextKind::user(once.clone())]);
        assert_eq!(once, "a%3Ab");
        assert_eq!(twice, "a%253Ab");

        let ctx = Context::new(vec![ContextKind::user("a:b")]).unwrap();
        assert_eq!(ctx.canonical_key().as_str(), once);
    }

    #[test]
    fn test_validation_policy() {
        assert_eq!(
            derive_canonical_key(&[]),
            Err(ValidationError::EmptyContext)
        );
        assert_eq!(
            derive_canonical_key(&[ContextKind::user("")]),
            Err(ValidationError::EmptyContextKey {
                kind: "user".to_string()
            })
        );
        assert_eq!(
            derive_canonical_key(&[ContextKind::user("a"), ContextKind::user("b")]),
            Err(ValidationError::DuplicateKind("user".to_string()))
        );
        assert!(derive_canonical_key(&[ContextKind::new("kind", "a")]).is_err());
        assert!(derive_canonical_key(&[ContextKind::new("multi", "a")]).is_err());
        assert!(derive_canonical_key(&[ContextKind::new("", "a")]).is_err());
        assert!(derive_canonical_key(&[ContextKind::new("org:x", "a")]).is_err());
    }

    #[test]
    fn test_context_accessors() {
        let ctx = Context::new(vec![
            ContextKind::user("u1"),
            ContextKind::new("organization", "o1"),
        ])
        .unwrap();

        assert!(ctx.is_multiple());
        assert_eq!(ctx.first_key(), "u1");
        assert_eq!(ctx.key_for("organization"), Some("o1"));
        assert_eq!(ctx.key_for("device"), None);
        assert_eq!(ctx.sorted_kind_names(), vec!["organization", "user"]);
    }
}
