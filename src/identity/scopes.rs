// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Provider session scopes.
//!
//! A scope is `provider:<segment>[:<segment>...]` where each segment is
//! lowercase ASCII alphanumerics, `_`, `-` or `.`. `provider:*` grants every
//! provider scope.

pub const WILDCARD_SCOPE: &str = "provider:*";
pub const DEFAULT_SCOPE: &str = "provider:session";

const SCOPE_PREFIX: &str = "provider:";
const MAX_SCOPES: usize = 32;
const MAX_SCOPE_LEN: usize = 128;

pub fn is_valid_scope(scope: &str) -> bool {
    if scope == WILDCARD_SCOPE {
        return true;
    }
    if scope.len() > MAX_SCOPE_LEN {
        return false;
    }
    let Some(rest) = scope.strip_prefix(SCOPE_PREFIX) else {
        return false;
    };
    rest.split(':').all(|segment| {
        !segment.is_empty()
            && segment.bytes().all(|b| {
                b.is_ascii_lowercase() || b.is_ascii_digit() || matches!(b, b'_' | b'-' | b'.')
            })
    })
}

/// Keep the well-formed requested scopes, in order, without duplicates.
/// Falls back to [`DEFAULT_SCOPE`] when nothing survives.
pub fn filter_scopes(requested: &[String]) -> Vec<String> {
    let mut granted: Vec<String> = Vec::new();
    for scope in requested.iter().map(|s| s.trim()) {
        if granted.len() == MAX_SCOPES {
            break;
        }
        if is_valid_scope(scope) && !granted.iter().any(|g| g == scope) {
            granted.push(scope.to_string());
        }
    }
    if granted.is_empty() {
        granted.push(DEFAULT_SCOPE.to_string());
    }
    granted
}

/// Whether `granted` covers `required`.
pub fn grants(granted: &[String], required: &str) -> bool {
    granted
        .iter()
        .any(|scope| scope == WILDCARD_SCOPE || scope == required)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(scopes: &[&str]) -> Vec<String> {
        scopes.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn filters_malformed_scopes() {
        let filtered = filter_scopes(&owned(&[
            "provider:posts:read",
            "",
            "  ",
            "admin",
            "provider:",
            "provider:Posts",
            "provider:a::b",
            "provider:posts:read",
            " provider:feed.v2 ",
        ]));
        assert_eq!(filtered, owned(&["provider:posts:read", "provider:feed.v2"]));
    }

    #[test]
    fn empty_request_gets_default_scope() {
        assert_eq!(filter_scopes(&[]), owned(&[DEFAULT_SCOPE]));
        assert_eq!(filter_scopes(&owned(&["nope"])), owned(&[DEFAULT_SCOPE]));
    }

    #[test]
    fn wildcard_grants_everything() {
        let granted = filter_scopes(&owned(&["provider:*"]));
        assert!(grants(&granted, "provider:posts:write"));

        let narrow = owned(&["provider:posts:read"]);
        assert!(grants(&narrow, "provider:posts:read"));
        assert!(!grants(&narrow, "provider:posts:write"));
    }
}
