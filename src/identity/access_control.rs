//! Role-based access rules keyed by request path.
//!
//! Rules are evaluated in declaration order; the first rule whose `path`
//! glob matches decides. A matched rule allows the request when the identity
//! holds any listed role, where `"*"` stands for any authenticated identity.
//! No matching rule → [`AccessDecision::Deny`] (fail-closed).
//!
//! | Pattern | Semantics |
//! |---------|-----------|
//! | `"*"` | matches everything |
//! | `"/api/*"` | prefix match |
//! | `"*/admin"` | suffix match |
//! | `"*identity*"` | contains match |
//! | `"/health"` | exact match |

use tracing::debug;

use super::SecurityIdentity;
use crate::config::{AccessConfig, AccessRuleConfig};

const ANY_AUTHENTICATED: &str = "*";

/// Outcome of evaluating an identity against a [`RolePolicy`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    /// The request may proceed.
    Allow,
    /// The request is forbidden.
    Deny,
}

/// Compiled path → roles policy.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    rules: Vec<CompiledRule>,
}

impl RolePolicy {
    /// Compile the configured rules.
    #[must_use]
    pub fn from_config(config: &AccessConfig) -> Self {
        Self {
            rules: config.rules.iter().map(CompiledRule::from_config).collect(),
        }
    }

    /// Decide whether `identity` may access `path`.
    #[must_use]
    pub fn evaluate(&self, identity: &SecurityIdentity, path: &str) -> AccessDecision {
        let Some(rule) = self.rules.iter().find(|rule| rule.path.matches(path)) else {
            debug!(path = %path, "No access rule matched");
            return AccessDecision::Deny;
        };
        if rule.grants(identity) {
            AccessDecision::Allow
        } else {
            debug!(
                path = %path,
                principal = identity.principal().unwrap_or("<anonymous>"),
                "Identity lacks the roles required for path"
            );
            AccessDecision::Deny
        }
    }

    /// `true` when no rules are configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[derive(Debug, Clone)]
struct CompiledRule {
    path: GlobPattern,
    roles: Vec<String>,
}

impl CompiledRule {
    fn from_config(rule: &AccessRuleConfig) -> Self {
        Self {
            path: GlobPattern::new(&rule.path),
            roles: rule.roles.clone(),
        }
    }

    fn grants(&self, identity: &SecurityIdentity) -> bool {
        self.roles.iter().any(|role| {
            if role == ANY_AUTHENTICATED {
                !identity.is_anonymous()
            } else {
                identity.has_role(role)
            }
        })
    }
}

#[derive(Debug, Clone)]
enum GlobPattern {
    Wildcard,
    Exact(String),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl GlobPattern {
    fn new(pattern: &str) -> Self {
        if pattern == "*" {
            return Self::Wildcard;
        }
        match (pattern.strip_prefix('*'), pattern.strip_suffix('*')) {
            (Some(rest), Some(_)) => match rest.strip_suffix('*') {
                Some("") | None => Self::Wildcard,
                Some(inner) => Self::Contains(inner.to_string()),
            },
            (Some(suffix), None) => Self::Suffix(suffix.to_string()),
            (None, Some(prefix)) => Self::Prefix(prefix.to_string()),
            (None, None) => Self::Exact(pattern.to_string()),
        }
    }

    fn matches(&self, path: &str) -> bool {
        match self {
            Self::Wildcard => true,
            Self::Exact(e) => path == e,
            Self::Prefix(p) => path.starts_with(p.as_str()),
            Self::Suffix(s) => path.ends_with(s.as_str()),
            Self::Contains(c) => path.contains(c.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::certificate::testing::MockCertificate;

    fn rule(path: &str, roles: &[&str]) -> AccessRuleConfig {
        AccessRuleConfig {
            path: path.to_string(),
            roles: roles.iter().map(|r| (*r).to_string()).collect(),
        }
    }

    fn policy(rules: Vec<AccessRuleConfig>) -> RolePolicy {
        RolePolicy::from_config(&AccessConfig { rules })
    }

    fn authenticated(roles: &[&str]) -> SecurityIdentity {
        let cert = MockCertificate {
            subject: Some("CN=device-1, O=Example".to_string()),
            ..MockCertificate::default()
        };
        SecurityIdentity::from_certificate(Arc::new(cert)).with_roles(roles.iter().copied())
    }

    #[test]
    fn empty_policy_denies() {
        let policy = RolePolicy::default();
        assert!(policy.is_empty());
        assert_eq!(
            policy.evaluate(&authenticated(&["Admin"]), "/api"),
            AccessDecision::Deny
        );
    }

    #[test]
    fn holder_of_listed_role_is_allowed() {
        // GIVEN: admin-only prefix rule
        let policy = policy(vec![rule("/api/v1/admin*", &["Administrator"])]);
        // THEN: admins pass, users do not
        assert_eq!(
            policy.evaluate(&authenticated(&["Administrator"]), "/api/v1/admin/users"),
            AccessDecision::Allow
        );
        assert_eq!(
            policy.evaluate(&authenticated(&["User"]), "/api/v1/admin/users"),
            AccessDecision::Deny
        );
    }

    #[test]
    fn first_matching_rule_wins() {
        let policy = policy(vec![
            rule("/api/v1/public", &["*"]),
            rule("/api/*", &["Administrator"]),
        ]);
        assert_eq!(
            policy.evaluate(&authenticated(&[]), "/api/v1/public"),
            AccessDecision::Allow
        );
        assert_eq!(
            policy.evaluate(&authenticated(&[]), "/api/v1/private"),
            AccessDecision::Deny
        );
    }

    #[test]
    fn wildcard_role_requires_authentication() {
        let policy = policy(vec![rule("*", &["*"])]);
        assert_eq!(
            policy.evaluate(&authenticated(&[]), "/anything"),
            AccessDecision::Allow
        );
        assert_eq!(
            policy.evaluate(&SecurityIdentity::anonymous(), "/anything"),
            AccessDecision::Deny
        );
    }

    #[test]
    fn unmatched_path_is_denied() {
        let policy = policy(vec![rule("/health", &["*"])]);
        assert_eq!(
            policy.evaluate(&authenticated(&["User"]), "/api"),
            AccessDecision::Deny
        );
    }

    #[test]
    fn glob_patterns() {
        assert!(GlobPattern::new("*").matches("/x"));
        assert!(GlobPattern::new("**").matches("/x"));
        assert!(GlobPattern::new("/api/*").matches("/api/v1"));
        assert!(!GlobPattern::new("/api/*").matches("/health"));
        assert!(GlobPattern::new("*/admin").matches("/api/admin"));
        assert!(GlobPattern::new("*identity*").matches("/api/user-identity/me"));
        assert!(GlobPattern::new("/health").matches("/health"));
        assert!(!GlobPattern::new("/health").matches("/healthz"));
    }
}
