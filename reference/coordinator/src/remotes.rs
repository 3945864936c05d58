//! Remote domain allow-list.

use std::collections::BTreeMap;

use dashmap::DashMap;
use tracing::info;

use omnisweep_common::{Address, DomainId};

/// Remote domain -> authorized worker address.
#[derive(Default)]
pub struct RemoteRegistry {
    remotes: DashMap<DomainId, Address>,
}

impl RemoteRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(remotes: &BTreeMap<DomainId, Address>) -> Self {
        let registry = Self::new();
        for (domain, worker) in remotes {
            registry.remotes.insert(*domain, *worker);
        }
        registry
    }

    /// Register or replace the worker for `domain`.
    pub fn set(&self, domain: DomainId, worker: Address) -> Option<Address> {
        let previous = self.remotes.insert(domain, worker);
        info!(domain = %domain, worker = %worker, "Remote registered");
        previous
    }

    pub fn remove(&self, domain: &DomainId) -> Option<Address> {
        let removed = self.remotes.remove(domain).map(|(_, worker)| worker);
        if removed.is_some() {
            info!(domain = %domain, "Remote removed");
        }
        removed
    }

    pub fn get(&self, domain: &DomainId) -> Option<Address> {
        self.remotes.get(domain).map(|w| *w)
    }

    pub fn contains(&self, domain: &DomainId) -> bool {
        self.remotes.contains_key(domain)
    }

    /// Whether `sender` is the allow-listed worker for `domain`.
    pub fn is_authorized(&self, domain: &DomainId, sender: &Address) -> bool {
        self.get(domain).map(|w| w == *sender).unwrap_or(false)
    }

    pub fn snapshot(&self) -> BTreeMap<DomainId, Address> {
        self.remotes.iter().map(|e| (*e.key(), *e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.remotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.remotes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authorization_requires_matching_address() {
        let registry = RemoteRegistry::new();
        let domain = DomainId::new(2);
        let worker = Address::from_label("worker");
        registry.set(domain, worker);

        assert!(registry.is_authorized(&domain, &worker));
        assert!(!registry.is_authorized(&domain, &Address::from_label("mallory")));
        assert!(!registry.is_authorized(&DomainId::new(3), &worker));
    }

    #[test]
    fn test_remove() {
        let registry = RemoteRegistry::from_map(&BTreeMap::from([(
            DomainId::new(2),
            Address::from_label("worker"),
        )]));
        assert_eq!(registry.len(), 1);
        assert!(registry.remove(&DomainId::new(2)).is_some());
        assert!(registry.is_empty());
        assert!(registry.remove(&DomainId::new(2)).is_none());
    }
}
