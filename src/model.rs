//! Identities shared by the push and fuzzy-watch paths.

use std::fmt;

/// Namespace-qualified service identity; the debounce key of service pushes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub namespace: String,
    pub group: String,
    pub name: String,
}

impl ServiceKey {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(f, "{}>>{}@@{}", self.namespace, self.group, self.name)
    }
}

/// A client's registration on one service. Owned by the subscriber index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriber {
    pub client_id: String,
    /// Comma separated cluster filter; empty means every cluster
    pub clusters: String,
}

impl Subscriber {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            clusters: String::new(),
        }
    }
}

/// Kind of change reported for a service matched by a wildcard watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChangeType {
    Add,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Add => "ADD_SERVICE",
            ChangeType::Delete => "DELETE_SERVICE",
        }
    }
}
