//! Access control for intercepted calls.
//!
//! A policy maps each consumer to an ordered list of operation patterns:
//!
//! - `/*` permits every operation;
//! - `<service>/*` permits operations whose name starts with `<service>/`;
//! - anything else must equal the operation name.
//!
//! Patterns are evaluated in order and the first match allows. Unknown
//! consumers are denied. The policy is immutable once loaded, so evaluation
//! takes no locks.

use serde::Deserialize;
use std::collections::HashMap;
use std::fmt;
use thiserror::Error;

/// Errors from loading an access policy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The blob is not a JSON object of string arrays
    #[error("invalid policy JSON: {0}")]
    Parse(String),

    #[error("empty pattern at position {index} for consumer '{consumer}'")]
    EmptyPattern { consumer: String, index: usize },
}

/// One entry of a consumer's allow list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodPattern {
    /// `/*`
    Any,
    /// `<service>/*`, stored as `<service>/`
    Prefix(String),
    /// A full operation name
    Exact(String),
}

impl MethodPattern {
    /// Parse a pattern string.
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }

        let pattern = if raw == "/*" {
            MethodPattern::Any
        } else if let Some(service) = raw.strip_suffix('*').filter(|s| s.ends_with('/')) {
            MethodPattern::Prefix(service.to_string())
        } else {
            MethodPattern::Exact(raw.to_string())
        };
        Some(pattern)
    }

    pub fn matches(&self, operation: &str) -> bool {
        match self {
            MethodPattern::Any => true,
            MethodPattern::Prefix(prefix) => operation.starts_with(prefix.as_str()),
            MethodPattern::Exact(name) => operation == name,
        }
    }
}

impl fmt::Display for MethodPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodPattern::Any => f.write_str("/*"),
            MethodPattern::Prefix(prefix) => write!(f, "{prefix}*"),
            MethodPattern::Exact(name) => f.write_str(name),
        }
    }
}

/// Consumer to allow-list mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AccessPolicy {
    rules: HashMap<String, Vec<MethodPattern>>,
}

impl AccessPolicy {
    /// Parse a policy from a JSON object of consumer to pattern arrays, e.g.
    /// `{"biz_admin": ["/callguard.Biz/*"]}`.
    pub fn from_json(blob: &str) -> Result<Self, PolicyError> {
        #[derive(Deserialize)]
        #[serde(transparent)]
        struct RawPolicy(HashMap<String, Vec<String>>);

        let raw: RawPolicy =
            serde_json::from_str(blob).map_err(|e| PolicyError::Parse(e.to_string()))?;

        let mut rules = HashMap::with_capacity(raw.0.len());
        for (consumer, patterns) in raw.0 {
            let mut parsed = Vec::with_capacity(patterns.len());
            for (index, pattern) in patterns.iter().enumerate() {
                match MethodPattern::parse(pattern) {
                    Some(p) => parsed.push(p),
                    None => return Err(PolicyError::EmptyPattern { consumer, index }),
                }
            }
            rules.insert(consumer, parsed);
        }

        Ok(Self { rules })
    }

    /// Build a policy from already parsed rules.
    pub fn from_rules<I, S>(rules: I) -> Self
    where
        I: IntoIterator<Item = (S, Vec<MethodPattern>)>,
        S: Into<String>,
    {
        Self {
            rules: rules.into_iter().map(|(c, p)| (c.into(), p)).collect(),
        }
    }

    pub fn patterns_for(&self, consumer: &str) -> Option<&[MethodPattern]> {
        self.rules.get(consumer).map(Vec::as_slice)
    }

    pub fn consumer_count(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Why a call was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    UnknownConsumer,
    NotPermitted,
}

impl Denial {
    pub fn message(self) -> &'static str {
        match self {
            Denial::UnknownConsumer => "consumer not in acl",
            Denial::NotPermitted => "consumer has no access to method",
        }
    }
}

/// Evaluates calls against an immutable [`AccessPolicy`].
#[derive(Debug, Clone, Default)]
pub struct AccessControl {
    policy: AccessPolicy,
}

impl AccessControl {
    pub fn new(policy: AccessPolicy) -> Self {
        Self { policy }
    }

    /// Whether `identity` may call `operation`.
    pub fn authorize(&self, identity: &str, operation: &str) -> bool {
        self.check(identity, operation).is_ok()
    }

    /// Like [`authorize`](Self::authorize), but says why a call was refused.
    pub fn check(&self, identity: &str, operation: &str) -> Result<(), Denial> {
        let patterns = self
            .policy
            .patterns_for(identity)
            .ok_or(Denial::UnknownConsumer)?;

        if patterns.iter().any(|p| p.matches(operation)) {
            Ok(())
        } else {
            Err(Denial::NotPermitted)
        }
    }

    /// Whether the policy has an entry for `identity`.
    pub fn is_known(&self, identity: &str) -> bool {
        self.policy.patterns_for(identity).is_some()
    }

    pub fn policy(&self) -> &AccessPolicy {
        &self.policy
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const EXAMPLE_POLICY: &str = r#"{
        "logger1":          ["/callguard.Admin/StreamEvents"],
        "stat1":            ["/callguard.Admin/StreamStats"],
        "biz_user":         ["/callguard.Biz/Check", "/callguard.Biz/Add"],
        "biz_admin":        ["/callguard.Biz/*"],
        "after_disconnect": ["/callguard.Biz/Add"]
    }"#;

    fn acl(blob: &str) -> AccessControl {
        AccessControl::new(AccessPolicy::from_json(blob).unwrap())
    }

    #[test]
    fn test_service_wildcard() {
        let acl = acl(r#"{"alice": ["/Biz/*"]}"#);

        assert!(acl.authorize("alice", "/Biz/Add"));
        assert!(!acl.authorize("alice", "/Admin/Stats"));
        assert!(!acl.authorize("bob", "/Biz/Add"));
    }

    #[test]
    fn test_global_wildcard() {
        let acl = acl(r#"{"carol": ["/*"]}"#);

        assert!(acl.authorize("carol", "/Biz/Add"));
        assert!(acl.authorize("carol", "/callguard.Admin/StreamStats"));
        assert!(acl.authorize("carol", ""));
    }

    #[test]
    fn test_wildcard_respects_service_boundary() {
        let acl = acl(r#"{"alice": ["/Biz/*"]}"#);
        assert!(!acl.authorize("alice", "/BizExtra/Add"));
    }

    #[test]
    fn test_example_policy() {
        let acl = acl(EXAMPLE_POLICY);

        assert!(acl.authorize("biz_user", "/callguard.Biz/Check"));
        assert!(!acl.authorize("biz_user", "/callguard.Biz/Test"));
        assert!(acl.authorize("biz_admin", "/callguard.Biz/Test"));
        assert!(!acl.authorize("biz_admin", "/callguard.Admin/StreamEvents"));
        assert!(acl.authorize("logger1", "/callguard.Admin/StreamEvents"));
        assert!(!acl.authorize("logger1", "/callguard.Admin/StreamStats"));
        assert_eq!(acl.policy().consumer_count(), 5);
    }

    #[test]
    fn test_denial_reasons() {
        let acl = acl(EXAMPLE_POLICY);

        assert_eq!(
            acl.check("nobody", "/callguard.Biz/Add"),
            Err(Denial::UnknownConsumer)
        );
        assert_eq!(
            acl.check("stat1", "/callguard.Biz/Add"),
            Err(Denial::NotPermitted)
        );
        assert!(acl.is_known("stat1"));
        assert!(!acl.is_known("nobody"));
    }

    #[test]
    fn test_empty_allow_list_denies() {
        let acl = acl(r#"{"mute": []}"#);
        assert!(acl.is_known("mute"));
        assert!(!acl.authorize("mute", "/callguard.Biz/Add"));
    }

    #[test]
    fn test_pattern_parsing() {
        assert_eq!(MethodPattern::parse("/*"), Some(MethodPattern::Any));
        assert_eq!(
            MethodPattern::parse("/callguard.Biz/*"),
            Some(MethodPattern::Prefix("/callguard.Biz/".into()))
        );
        assert_eq!(
            MethodPattern::parse("/callguard.Biz/Add"),
            Some(MethodPattern::Exact("/callguard.Biz/Add".into()))
        );
        assert_eq!(MethodPattern::parse(""), None);
        assert_eq!(MethodPattern::parse("/callguard.Biz/*").unwrap().to_string(), "/callguard.Biz/*");
    }

    #[test]
    fn test_rejects_malformed_json() {
        assert!(matches!(
            AccessPolicy::from_json(r#"["/*"]"#),
            Err(PolicyError::Parse(_))
        ));
        assert!(matches!(
            AccessPolicy::from_json(r#"{"alice": "/*"}"#),
            Err(PolicyError::Parse(_))
        ));
    }

    #[test]
    fn test_rejects_empty_pattern() {
        let err = AccessPolicy::from_json(r#"{"alice": ["/Biz/Add", ""]}"#).unwrap_err();
        assert_eq!(
            err,
            PolicyError::EmptyPattern {
                consumer: "alice".into(),
                index: 1
            }
        );
    }

    #[test]
    fn test_default_policy_denies_everyone() {
        let acl = AccessControl::default();
        assert!(!acl.authorize("alice", "/Biz/Add"));
        assert!(acl.policy().is_empty());
    }

    fn operation() -> impl Strategy<Value = String> {
        ("[A-Za-z]{1,8}", "[A-Za-z]{1,8}").prop_map(|(svc, m)| format!("/{svc}/{m}"))
    }

    proptest! {
        #[test]
        fn prop_global_wildcard_allows_everything(op in operation()) {
            let acl = AccessControl::new(AccessPolicy::from_rules([("carol", vec![MethodPattern::Any])]));
            prop_assert!(acl.authorize("carol", &op));
        }

        #[test]
        fn prop_unknown_consumer_always_denied(op in operation(), who in "[a-z]{1,12}") {
            let acl = AccessControl::new(AccessPolicy::from_rules([("root", vec![MethodPattern::Any])]));
            prop_assume!(who != "root");
            prop_assert!(!acl.authorize(&who, &op));
        }

        #[test]
        fn prop_exact_pattern_matches_only_itself(a in operation(), b in operation()) {
            let acl = AccessControl::new(AccessPolicy::from_rules([("alice", vec![MethodPattern::Exact(a.clone())])]));
            prop_assert!(acl.authorize("alice", &a));
            prop_assert_eq!(acl.authorize("alice", &b), a == b);
        }

        #[test]
        fn prop_match_anywhere_in_list_allows(op in operation(), other in operation()) {
            let forward = AccessPolicy::from_rules([(
                "alice",
                vec![MethodPattern::Exact(other.clone()), MethodPattern::Exact(op.clone())],
            )]);
            let reverse = AccessPolicy::from_rules([(
                "alice",
                vec![MethodPattern::Exact(op.clone()), MethodPattern::Exact(other)],
            )]);
            prop_assert!(AccessControl::new(forward).authorize("alice", &op));
            prop_assert!(AccessControl::new(reverse).authorize("alice", &op));
        }
    }
}
