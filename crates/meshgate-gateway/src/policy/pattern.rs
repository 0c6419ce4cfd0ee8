//! Dotted wildcard patterns for capabilities and realm keys.
//!
//! `*` matches any run of characters (including further dots); every other
//! character is literal. Patterns compile to anchored regular expressions:
//! `test.*` matches `test.ping-pong` and `test.anything.nested` but not
//! `other.thing`.

use std::sync::OnceLock;

use dashmap::DashMap;
use regex::Regex;

use meshgate_core::error::{MeshError, Result};

/// Cached compilations beyond this are dropped wholesale.
const CACHE_LIMIT: usize = 4096;

fn cache() -> &'static DashMap<String, Regex> {
    static CACHE: OnceLock<DashMap<String, Regex>> = OnceLock::new();
    CACHE.get_or_init(DashMap::new)
}

/// Compile a wildcard pattern into an anchored regex.
pub fn compile(pattern: &str) -> Result<Regex> {
    let body = regex::escape(pattern).replace(r"\*", ".*");
    Regex::new(&format!("^{body}$"))
        .map_err(|e| MeshError::BadRequest(format!("invalid pattern {pattern:?}: {e}")))
}

/// Whether `value` is fully covered by `pattern`.
pub fn matches(pattern: &str, value: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == value;
    }

    if let Some(re) = cache().get(pattern) {
        return re.is_match(value);
    }

    let Ok(re) = compile(pattern) else {
        tracing::warn!(%pattern, "uncompilable wildcard pattern treated as no-match");
        return false;
    };
    let hit = re.is_match(value);

    let c = cache();
    if c.len() >= CACHE_LIMIT {
        c.clear();
    }
    c.insert(pattern.to_string(), re);
    hit
}

#[cfg(test)]
mod tests {
    use super::matches;

    #[test]
    fn suffix_wildcard_covers_nested_segments() {
        assert!(matches("test.*", "test.ping-pong"));
        assert!(matches("test.*", "test.anything.nested"));
        assert!(!matches("test.*", "other.thing"));
        assert!(!matches("test.*", "test"));
    }

    #[test]
    fn dot_is_literal() {
        assert!(!matches("test.ping", "testxping"));
        assert!(!matches("a.*", "abc"));
    }

    #[test]
    fn star_matches_everything() {
        assert!(matches("*", ""));
        assert!(matches("*", "any.thing"));
    }

    #[test]
    fn inner_wildcard_and_regex_metachars() {
        assert!(matches("realm.*.ops", "realm.eu.west.ops"));
        assert!(!matches("realm.*.ops", "realm.ops"));
        assert!(matches("svc+(v1).*", "svc+(v1).call"));
        assert!(!matches("svc+(v1).*", "svcc(v1).call"));
    }

    #[test]
    fn exact_pattern_is_equality() {
        assert!(matches("test.ping-pong", "test.ping-pong"));
        assert!(!matches("test.ping-pong", "test.ping-pong.extra"));
    }
}
