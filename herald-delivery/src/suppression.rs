//! Recipient suppression.
//!
//! A suppressed recipient short-circuits the send with a terminal,
//! non-retryable failure and zero network IO. Maintaining the list (hard
//! bounces, unsubscribes, complaints) is the caller's policy, driven by the
//! `DeliveryResult`s this engine hands back.

use std::collections::HashSet;

use parking_lot::RwLock;

use herald_common::Address;

/// Predicate consulted before any delivery work happens.
pub trait SuppressionList: Send + Sync {
    fn is_suppressed(&self, address: &Address) -> bool;
}

/// In-memory suppression list. Addresses compare case-insensitively on
/// their envelope form.
#[derive(Debug, Default)]
pub struct MemorySuppressionList {
    addresses: RwLock<HashSet<String>>,
}

impl MemorySuppressionList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, address: &Address) {
        self.addresses
            .write()
            .insert(address.envelope().to_ascii_lowercase());
    }
}

impl SuppressionList for MemorySuppressionList {
    fn is_suppressed(&self, address: &Address) -> bool {
        self.addresses
            .read()
            .contains(&address.envelope().to_ascii_lowercase())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_list_suppresses_nothing() {
        let list = MemorySuppressionList::new();
        assert!(!list.is_suppressed(&Address::parse("a@b.com").unwrap()));
    }

    #[test]
    fn test_inserted_address_suppressed() {
        let list = MemorySuppressionList::new();
        list.insert(&Address::parse("blocked@x.com").unwrap());

        assert!(list.is_suppressed(&Address::parse("blocked@x.com").unwrap()));
        assert!(!list.is_suppressed(&Address::parse("fine@x.com").unwrap()));
    }

    #[test]
    fn test_case_insensitive() {
        let list = MemorySuppressionList::new();
        list.insert(&Address::parse("Blocked@X.com").unwrap());
        assert!(list.is_suppressed(&Address::parse("blocked@x.com").unwrap()));
    }

    #[test]
    fn test_display_name_irrelevant() {
        let list = MemorySuppressionList::new();
        list.insert(&Address::parse("blocked@x.com").unwrap());
        assert!(list.is_suppressed(&Address::parse("Some One <blocked@x.com>").unwrap()));
    }
}
