//! Discovery queries and fuzzy matching.
//!
//! [`DiscoveryQuery`] filters agents, [`CapabilityQuery`] filters individual
//! capabilities across agents. Both are built from HTTP query parameters by
//! the registry and applied against in-memory snapshots.

use crate::registration::{AgentRegistration, AgentStatus, Capability, Stability};
use crate::version::VersionConstraint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Agent discovery filter, all fields conjunctive.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AgentStatus>,
    /// Label selectors; every entry must match exactly.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    /// Capability names; an agent matches when it provides any of them.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capability_stability: Option<Stability>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub capability_tags: Vec<String>,
    #[serde(default)]
    pub fuzzy_match: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
}

impl DiscoveryQuery {
    pub fn is_empty(&self) -> bool {
        *self == DiscoveryQuery::default()
    }

    /// Whether the agent passes every filter in this query.
    pub fn matches(&self, agent: &AgentRegistration) -> bool {
        if let Some(ns) = &self.namespace {
            if &agent.namespace != ns {
                return false;
            }
        }
        if let Some(status) = self.status {
            if agent.status != status {
                return false;
            }
        }
        if !self.labels.is_empty()
            && !self
                .labels
                .iter()
                .all(|(k, v)| agent.labels.get(k) == Some(v))
        {
            return false;
        }
        if !self.capabilities.is_empty() {
            let hit = self.capabilities.iter().any(|wanted| {
                agent.capabilities.iter().any(|cap| {
                    if self.fuzzy_match {
                        fuzzy_match(wanted, &cap.name)
                    } else {
                        cap.name == *wanted
                    }
                })
            });
            if !hit {
                return false;
            }
        }
        if self.capability_category.is_some()
            || self.capability_stability.is_some()
            || !self.capability_tags.is_empty()
        {
            let hit = agent.capabilities.iter().any(|cap| {
                if let Some(category) = &self.capability_category {
                    if &cap.category != category {
                        return false;
                    }
                }
                if let Some(stability) = self.capability_stability {
                    if cap.stability != stability {
                        return false;
                    }
                }
                if !self.capability_tags.is_empty()
                    && !self.capability_tags.iter().any(|t| cap.tags.contains(t))
                {
                    return false;
                }
                true
            });
            if !hit {
                return false;
            }
        }
        if let Some(constraint) = &self.version_constraint {
            let constraint = VersionConstraint::parse(constraint);
            if !agent
                .capabilities
                .iter()
                .any(|cap| constraint.matches(&cap.version))
            {
                return false;
            }
        }
        true
    }
}

fn default_agent_status() -> Option<AgentStatus> {
    Some(AgentStatus::Healthy)
}

/// Capability search filter across the whole registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_contains: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stability: Option<Stability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_constraint: Option<String>,
    #[serde(default)]
    pub fuzzy_match: bool,
    #[serde(default)]
    pub include_deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_namespace: Option<String>,
    /// Defaults to `healthy`: discovery should not hand out dead endpoints.
    #[serde(default = "default_agent_status")]
    pub agent_status: Option<AgentStatus>,
}

impl Default for CapabilityQuery {
    fn default() -> Self {
        Self {
            agent_id: None,
            name: None,
            description_contains: None,
            category: None,
            tags: Vec::new(),
            stability: None,
            version_constraint: None,
            fuzzy_match: false,
            include_deprecated: false,
            agent_namespace: None,
            agent_status: default_agent_status(),
        }
    }
}

impl CapabilityQuery {
    /// Whether the owning agent passes the agent-level filters.
    pub fn matches_agent(&self, agent: &AgentRegistration) -> bool {
        if let Some(ns) = &self.agent_namespace {
            if &agent.namespace != ns {
                return false;
            }
        }
        if let Some(status) = self.agent_status {
            if agent.status != status {
                return false;
            }
        }
        true
    }

    /// Whether a single capability passes the capability-level filters.
    pub fn matches_capability(&self, cap: &Capability) -> bool {
        if cap.stability == Stability::Deprecated && !self.include_deprecated {
            return false;
        }
        if let Some(name) = &self.name {
            let hit = if self.fuzzy_match {
                fuzzy_match(name, &cap.name)
            } else {
                cap.name.to_lowercase().contains(&name.to_lowercase())
            };
            if !hit {
                return false;
            }
        }
        if let Some(needle) = &self.description_contains {
            if !cap
                .description
                .to_lowercase()
                .contains(&needle.to_lowercase())
            {
                return false;
            }
        }
        if let Some(category) = &self.category {
            if &cap.category != category {
                return false;
            }
        }
        if let Some(stability) = self.stability {
            if cap.stability != stability {
                return false;
            }
        }
        if !self.tags.is_empty() && !self.tags.iter().any(|t| cap.tags.contains(t)) {
            return false;
        }
        if let Some(constraint) = &self.version_constraint {
            if !VersionConstraint::parse(constraint).matches(&cap.version) {
                return false;
            }
        }
        true
    }
}

/// Case-insensitive fuzzy match: exact, then substring, then Levenshtein
/// distance ratio `1 - d / max(len)` against a 0.7 threshold. Empty operands
/// never match.
pub fn fuzzy_match(query: &str, candidate: &str) -> bool {
    const THRESHOLD: f64 = 0.7;

    if query.is_empty() || candidate.is_empty() {
        return false;
    }
    let query = query.to_lowercase();
    let candidate = candidate.to_lowercase();
    if query == candidate || candidate.contains(&query) {
        return true;
    }
    levenshtein_ratio(&query, &candidate) >= THRESHOLD
}

/// Similarity ratio derived from Levenshtein edit distance.
fn levenshtein_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    let max_len = a.len().max(b.len());

    // Single-row DP over the edit distance matrix.
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }

    1.0 - prev[b.len()] as f64 / max_len as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registration::AgentRegistration;

    fn agent_with_caps(id: &str, caps: &[&str]) -> AgentRegistration {
        let mut agent = AgentRegistration::new(id, id, format!("http://localhost:0/{id}"));
        agent.capabilities = caps.iter().map(|c| Capability::new(*c)).collect();
        agent
    }

    #[test]
    fn substring_is_a_fuzzy_hit() {
        assert!(fuzzy_match("file", "read_file"));
    }

    #[test]
    fn distant_strings_miss_threshold() {
        assert!(!fuzzy_match("authn", "authentication"));
    }

    #[test]
    fn near_identical_strings_pass_threshold() {
        assert!(fuzzy_match("greetings", "greeting"));
    }

    #[test]
    fn empty_operands_never_match() {
        assert!(!fuzzy_match("", "anything"));
        assert!(!fuzzy_match("anything", ""));
    }

    #[test]
    fn discovery_filters_by_capability_exact() {
        let agent = agent_with_caps("a1", &["greeting"]);
        let query = DiscoveryQuery {
            capabilities: vec!["greeting".into()],
            ..Default::default()
        };
        assert!(query.matches(&agent));

        let miss = DiscoveryQuery {
            capabilities: vec!["farewell".into()],
            ..Default::default()
        };
        assert!(!miss.matches(&agent));
    }

    #[test]
    fn discovery_fuzzy_finds_file_capabilities() {
        let reader = agent_with_caps("reader", &["read_file"]);
        let writer = agent_with_caps("writer", &["write_file"]);
        let exec = agent_with_caps("exec", &["execute_command"]);

        let query = DiscoveryQuery {
            capabilities: vec!["file".into()],
            fuzzy_match: true,
            ..Default::default()
        };
        assert!(query.matches(&reader));
        assert!(query.matches(&writer));
        assert!(!query.matches(&exec));
    }

    #[test]
    fn discovery_filters_by_labels() {
        let mut agent = agent_with_caps("a1", &["greeting"]);
        agent.labels.insert("env".into(), "prod".into());

        let mut query = DiscoveryQuery::default();
        query.labels.insert("env".into(), "prod".into());
        assert!(query.matches(&agent));

        query.labels.insert("tier".into(), "gold".into());
        assert!(!query.matches(&agent));
    }

    #[test]
    fn capability_query_skips_deprecated_by_default() {
        let mut cap = Capability::new("old_api");
        cap.stability = Stability::Deprecated;

        let query = CapabilityQuery::default();
        assert!(!query.matches_capability(&cap));

        let include = CapabilityQuery {
            include_deprecated: true,
            ..Default::default()
        };
        assert!(include.matches_capability(&cap));
    }

    #[test]
    fn capability_query_version_constraint() {
        let versions = ["1.0.0", "1.5.2", "2.1.0"];
        let query = CapabilityQuery {
            version_constraint: Some(">=2.0.0".into()),
            ..Default::default()
        };
        let matched: Vec<&str> = versions
            .iter()
            .filter(|v| {
                let mut cap = Capability::new("x");
                cap.version = v.to_string();
                query.matches_capability(&cap)
            })
            .copied()
            .collect();
        assert_eq!(matched, vec!["2.1.0"]);
    }
}
