//! Topic routing
//!
//! Maps the edge controller a release runs on to the broker topic its
//! snapshots are published to. The mapping is an ordered rule table taken
//! from configuration; the first matching rule wins and anything unmatched,
//! including releases installed without an explicit host, falls back to the
//! default topic.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Routing table configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// Topic used when no host is given or no rule matches
    #[serde(default = "default_topic")]
    pub default_topic: String,
    /// Ordered routing rules
    #[serde(default = "default_routes")]
    pub routes: Vec<RouteRule>,
}

/// A single routing rule
///
/// `exact` takes precedence over `contains`; a rule with neither matches
/// every controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteRule {
    /// Controller identity must equal this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exact: Option<String>,
    /// Controller identity must contain this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contains: Option<String>,
    /// Destination topic
    pub topic: String,
}

/// Controller identity matcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostMatcher {
    /// Identity equals the value
    Exact(String),
    /// Identity contains the value
    Contains(String),
    /// Matches every controller
    Any,
}

fn default_topic() -> String {
    "Domain1.NetworkServiceIP".to_string()
}

fn default_routes() -> Vec<RouteRule> {
    vec![
        RouteRule::contains("70", "EC1.NetworkServiceIP"),
        RouteRule::any("EC2.NetworkServiceIP"),
    ]
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            default_topic: default_topic(),
            routes: default_routes(),
        }
    }
}

impl RouteRule {
    /// Rule matching one controller identity
    pub fn exact(identity: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            exact: Some(identity.into()),
            contains: None,
            topic: topic.into(),
        }
    }

    /// Rule matching identities containing a substring
    pub fn contains(fragment: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            exact: None,
            contains: Some(fragment.into()),
            topic: topic.into(),
        }
    }

    /// Catch-all rule
    pub fn any(topic: impl Into<String>) -> Self {
        Self {
            exact: None,
            contains: None,
            topic: topic.into(),
        }
    }

    /// Matcher described by this rule
    pub fn matcher(&self) -> HostMatcher {
        match (&self.exact, &self.contains) {
            (Some(value), _) => HostMatcher::Exact(value.to_ascii_lowercase()),
            (None, Some(value)) => HostMatcher::Contains(value.to_ascii_lowercase()),
            (None, None) => HostMatcher::Any,
        }
    }
}

impl HostMatcher {
    fn matches(&self, identity: &str) -> bool {
        match self {
            HostMatcher::Exact(value) => identity == value,
            HostMatcher::Contains(value) => identity.contains(value.as_str()),
            HostMatcher::Any => true,
        }
    }
}

/// Deterministic controller-to-topic router
#[derive(Debug, Clone)]
pub struct TopicRouter {
    default_topic: String,
    routes: Vec<(HostMatcher, String)>,
}

impl Default for TopicRouter {
    fn default() -> Self {
        Self::new(RoutingConfig::default())
    }
}

impl TopicRouter {
    /// Create a router from a routing table
    pub fn new(config: RoutingConfig) -> Self {
        let routes = config
            .routes
            .iter()
            .map(|rule| (rule.matcher(), rule.topic.clone()))
            .collect();
        Self {
            default_topic: config.default_topic,
            routes,
        }
    }

    /// Topic used when nothing else applies
    pub fn default_topic(&self) -> &str {
        &self.default_topic
    }

    /// Resolve the topic for a release
    ///
    /// Total and pure: the same inputs always give the same topic.
    pub fn resolve(&self, controller_host: Option<&str>, release: &str) -> String {
        let Some(identity) = controller_host.map(controller_identity).filter(|id| !id.is_empty())
        else {
            debug!("No controller host for {}, using default topic", release);
            return self.default_topic.clone();
        };

        let topic = self
            .routes
            .iter()
            .find(|(matcher, _)| matcher.matches(&identity))
            .map(|(_, topic)| topic.clone())
            .unwrap_or_else(|| self.default_topic.clone());

        debug!("Routed {} on controller {} to {}", release, identity, topic);
        topic
    }
}

/// Canonical identity of a controller host
///
/// Strips the scheme, any path and trailing slashes, and lower-cases the
/// rest, so different spellings of one controller compare equal.
pub fn controller_identity(host: &str) -> String {
    let host = host.trim();
    let without_scheme = host.split_once("://").map_or(host, |(_, rest)| rest);
    let authority = without_scheme.split('/').next().unwrap_or_default();
    authority.to_ascii_lowercase()
}
