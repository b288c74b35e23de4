use std::fmt;
use std::str::FromStr;

use crate::FuzzyWatchError;
use crate::ServiceKey;

pub const NAMESPACE_SEPARATOR: &str = ">>";
pub const GROUP_SEPARATOR: &str = "@@";
pub const ANY: char = '*';

/// Wildcard over service keys: `namespace>>group@@service`, where the
/// group and service parts may contain `*`. The namespace matches exactly.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FuzzyGroupKeyPattern {
    namespace: String,
    group: String,
    service: String,
}

impl FuzzyGroupKeyPattern {
    pub fn generate(
        namespace: impl Into<String>,
        group: impl Into<String>,
        service: impl Into<String>,
    ) -> Result<Self, FuzzyWatchError> {
        let pattern = Self {
            namespace: namespace.into(),
            group: group.into(),
            service: service.into(),
        };
        pattern.check()?;
        Ok(pattern)
    }

    pub fn parse(pattern: &str) -> Result<Self, FuzzyWatchError> {
        let invalid = || FuzzyWatchError::InvalidPattern(pattern.to_string());
        let (namespace, rest) = pattern.split_once(NAMESPACE_SEPARATOR).ok_or_else(invalid)?;
        let (group, service) = rest.split_once(GROUP_SEPARATOR).ok_or_else(invalid)?;
        Self::generate(namespace, group, service).map_err(|_| invalid())
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn matches(
        &self,
        service: &ServiceKey,
    ) -> bool {
        self.namespace == service.namespace
            && glob_match(&self.group, &service.group)
            && glob_match(&self.service, &service.name)
    }

    fn check(&self) -> Result<(), FuzzyWatchError> {
        let parts = [&self.namespace, &self.group, &self.service];
        if self.group.is_empty()
            || self.service.is_empty()
            || parts
                .iter()
                .any(|p| p.contains(NAMESPACE_SEPARATOR) || p.contains(GROUP_SEPARATOR))
        {
            return Err(FuzzyWatchError::InvalidPattern(self.to_string()));
        }
        Ok(())
    }
}

impl FromStr for FuzzyGroupKeyPattern {
    type Err = FuzzyWatchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FuzzyGroupKeyPattern {
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result {
        write!(
            f,
            "{}{}{}{}{}",
            self.namespace, NAMESPACE_SEPARATOR, self.group, GROUP_SEPARATOR, self.service
        )
    }
}

/// `*` matches any run of characters, everything else matches literally.
fn glob_match(
    pattern: &str,
    text: &str,
) -> bool {
    let mut parts = pattern.split(ANY);
    let Some(first) = parts.next() else {
        return text.is_empty();
    };
    let Some(mut rest) = text.strip_prefix(first) else {
        return false;
    };

    let tail: Vec<&str> = parts.collect();
    let Some((last, middle)) = tail.split_last() else {
        // no wildcard at all
        return rest.is_empty();
    };
    for part in middle {
        match rest.find(part) {
            Some(at) => rest = &rest[at + part.len()..],
            None => return false,
        }
    }
    rest.ends_with(last)
}
