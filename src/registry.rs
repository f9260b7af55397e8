//! Name -> address registry populated during a deployment run

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::types::Address;
use indexmap::IndexMap;
use tracing::debug;

/// Write-once mapping from component name to deployed address.
///
/// Entries keep deployment order. The registry is mutated only by the
/// deployer and read by later phases, all on one flow, so it carries no lock.
#[derive(Debug, Clone, Default)]
pub struct AddressRegistry {
    entries: IndexMap<String, Address>,
}

impl AddressRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a registry from a persisted address map
    pub fn from_entries<I>(entries: I) -> OrchestratorResult<Self>
    where
        I: IntoIterator<Item = (String, Address)>,
    {
        let mut registry = Self::new();
        for (name, address) in entries {
            registry.set(&name, address)?;
        }
        Ok(registry)
    }

    /// Record a deployed address. A name can be written exactly once.
    pub fn set(&mut self, name: &str, address: Address) -> OrchestratorResult<()> {
        if self.entries.contains_key(name) {
            return Err(OrchestratorError::DuplicateRegistration(name.to_string()));
        }
        debug!(name, %address, "registered address");
        self.entries.insert(name.to_string(), address);
        Ok(())
    }

    pub fn get(&self, name: &str) -> OrchestratorResult<Address> {
        self.entries
            .get(name)
            .copied()
            .ok_or_else(|| OrchestratorError::UnresolvedReference(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Address)> {
        self.entries.iter().map(|(name, addr)| (name.as_str(), *addr))
    }

    /// Snapshot in deployment order, for the address artifact
    pub fn to_map(&self) -> IndexMap<String, Address> {
        self.entries.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    #[test]
    fn test_set_and_get() {
        let mut registry = AddressRegistry::new();
        registry.set("MockToken", addr(1)).unwrap();
        assert_eq!(registry.get("MockToken").unwrap(), addr(1));
        assert!(registry.contains("MockToken"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = AddressRegistry::new();
        registry.set("MockToken", addr(1)).unwrap();
        let err = registry.set("MockToken", addr(2)).unwrap_err();
        assert!(matches!(err, OrchestratorError::DuplicateRegistration(ref n) if n == "MockToken"));
        // first write wins
        assert_eq!(registry.get("MockToken").unwrap(), addr(1));
    }

    #[test]
    fn test_missing_name_is_unresolved() {
        let registry = AddressRegistry::new();
        let err = registry.get("PaymentHandler").unwrap_err();
        assert_eq!(err.kind(), "UnresolvedReferenceError");
        assert_eq!(err.subject(), Some("PaymentHandler"));
    }

    #[test]
    fn test_iteration_keeps_insertion_order() {
        let mut registry = AddressRegistry::new();
        for (i, name) in ["QualityControl", "MockToken", "PaymentHandler"].iter().enumerate() {
            registry.set(name, addr(i as u8)).unwrap();
        }
        let names: Vec<&str> = registry.iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["QualityControl", "MockToken", "PaymentHandler"]);
    }

    #[test]
    fn test_from_entries_rejects_duplicates() {
        let err = AddressRegistry::from_entries(vec![
            ("A".to_string(), addr(1)),
            ("A".to_string(), addr(2)),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), "DuplicateRegistrationError");
    }
}
