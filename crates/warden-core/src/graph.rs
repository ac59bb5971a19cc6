use std::collections::{BTreeMap, BTreeSet, VecDeque};

use crate::validation::ValidationError;

/// Role membership as an adjacency map from a recipient to the roles granted
/// to it. Kept acyclic: `grant_role` refuses any edge that would close a loop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleGraph {
    edges: BTreeMap<String, BTreeSet<String>>,
}

impl RoleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `recipient` inherit from `granted`. Returns `false` when the edge
    /// already existed.
    pub fn grant_role(&mut self, granted: &str, recipient: &str) -> Result<bool, ValidationError> {
        if granted == recipient || self.is_reachable(granted, recipient) {
            return Err(ValidationError::CyclicMembership {
                granted: granted.to_string(),
                recipient: recipient.to_string(),
            });
        }

        Ok(self
            .edges
            .entry(recipient.to_string())
            .or_default()
            .insert(granted.to_string()))
    }

    pub fn revoke_role(&mut self, granted: &str, recipient: &str) -> bool {
        let Some(granted_set) = self.edges.get_mut(recipient) else {
            return false;
        };
        let removed = granted_set.remove(granted);
        if granted_set.is_empty() {
            self.edges.remove(recipient);
        }
        removed
    }

    /// True when `to` is among the roles `from` inherits, directly or not.
    pub fn is_reachable(&self, from: &str, to: &str) -> bool {
        self.walk(from).any(|role| role == to)
    }

    /// `role` followed by every role it inherits, breadth first.
    pub fn effective_roles(&self, role: &str) -> Vec<String> {
        let mut roles = vec![role.to_string()];
        roles.extend(self.walk(role).map(str::to_string));
        roles
    }

    pub fn roles_granted_to(&self, role: &str) -> impl Iterator<Item = &str> {
        self.edges
            .get(role)
            .into_iter()
            .flat_map(|set| set.iter().map(String::as_str))
    }

    /// Drops every edge touching `role`, in either direction.
    pub fn remove_role(&mut self, role: &str) -> usize {
        let mut removed = self.edges.remove(role).map_or(0, |set| set.len());
        self.edges.retain(|_, granted| {
            if granted.remove(role) {
                removed += 1;
            }
            !granted.is_empty()
        });
        removed
    }

    /// `(granted, recipient)` pairs in a stable order.
    pub fn edges(&self) -> impl Iterator<Item = (&str, &str)> {
        self.edges.iter().flat_map(|(recipient, granted)| {
            granted
                .iter()
                .map(move |g| (g.as_str(), recipient.as_str()))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Builds a graph from stored `(granted, recipient)` pairs. The first pair
    /// that would close a loop is reported instead of being dropped.
    pub fn from_edges<S: AsRef<str>>(
        edges: impl IntoIterator<Item = (S, S)>,
    ) -> Result<Self, ValidationError> {
        let mut graph = RoleGraph::new();
        for (granted, recipient) in edges {
            graph.grant_role(granted.as_ref(), recipient.as_ref())?;
        }
        Ok(graph)
    }

    fn walk<'a>(&'a self, start: &'a str) -> Walk<'a> {
        let mut queue = VecDeque::new();
        queue.extend(self.roles_granted_to(start));
        Walk {
            graph: self,
            queue,
            visited: BTreeSet::from([start]),
        }
    }
}

struct Walk<'a> {
    graph: &'a RoleGraph,
    queue: VecDeque<&'a str>,
    visited: BTreeSet<&'a str>,
}

impl<'a> Iterator for Walk<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        while let Some(role) = self.queue.pop_front() {
            if !self.visited.insert(role) {
                continue;
            }
            self.queue.extend(self.graph.roles_granted_to(role));
            return Some(role);
        }
        None
    }
}
