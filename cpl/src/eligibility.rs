use std::collections::BTreeSet;

use cpl_config::shared::IndexConfig;

use crate::types::Namespace;

/// Decides whether a page belongs in the index.
///
/// A page is eligible when it lives in one of the configured content namespaces and is not a
/// redirect. The filter holds no state besides the namespace set and never touches storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EligibilityFilter {
    content_namespaces: BTreeSet<Namespace>,
}

impl EligibilityFilter {
    pub fn new<I>(content_namespaces: I) -> Self
    where
        I: IntoIterator<Item = Namespace>,
    {
        Self {
            content_namespaces: content_namespaces.into_iter().collect(),
        }
    }

    pub fn is_eligible(&self, namespace: Namespace, is_redirect: bool) -> bool {
        !is_redirect && self.content_namespaces.contains(&namespace)
    }

    pub fn is_content_namespace(&self, namespace: Namespace) -> bool {
        self.content_namespaces.contains(&namespace)
    }

    /// Content namespaces in ascending order.
    pub fn content_namespaces(&self) -> Vec<Namespace> {
        self.content_namespaces.iter().copied().collect()
    }
}

impl Default for EligibilityFilter {
    fn default() -> Self {
        Self::new([Namespace::MAIN])
    }
}

impl From<&IndexConfig> for EligibilityFilter {
    fn from(config: &IndexConfig) -> Self {
        Self::new(config.content_namespaces.iter().copied().map(Namespace::new))
    }
}
