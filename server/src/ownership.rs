//! Ownership table: which participant holds authority over which identity

use shared::{NetworkId, ParticipantId};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct OwnershipTable {
    owners: HashMap<NetworkId, ParticipantId>,
}

impl OwnershipTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gives `identity` to `participant`, returning the previous owner
    pub fn transfer(
        &mut self,
        identity: NetworkId,
        participant: ParticipantId,
    ) -> Option<ParticipantId> {
        self.owners.insert(identity, participant)
    }

    /// Returns `identity` to the authority, returning the previous owner
    pub fn clear(&mut self, identity: NetworkId) -> Option<ParticipantId> {
        self.owners.remove(&identity)
    }

    pub fn owner_of(&self, identity: NetworkId) -> Option<ParticipantId> {
        self.owners.get(&identity).copied()
    }

    pub fn owns_something(&self, participant: ParticipantId) -> bool {
        self.owners.values().any(|owner| *owner == participant)
    }

    /// Identities owned by `participant`, in id order
    pub fn owned_by(&self, participant: ParticipantId) -> Vec<NetworkId> {
        let mut owned: Vec<NetworkId> = self
            .owners
            .iter()
            .filter(|(_, owner)| **owner == participant)
            .map(|(identity, _)| *identity)
            .collect();
        owned.sort();
        owned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_and_query() {
        let mut table = OwnershipTable::new();

        assert_eq!(table.transfer(NetworkId(1), ParticipantId(1)), None);
        assert_eq!(table.owner_of(NetworkId(1)), Some(ParticipantId(1)));
        assert!(table.owns_something(ParticipantId(1)));
        assert!(!table.owns_something(ParticipantId(2)));
    }

    #[test]
    fn test_transfer_replaces_owner() {
        let mut table = OwnershipTable::new();

        table.transfer(NetworkId(1), ParticipantId(1));
        let previous = table.transfer(NetworkId(1), ParticipantId(2));

        assert_eq!(previous, Some(ParticipantId(1)));
        assert!(!table.owns_something(ParticipantId(1)));
    }

    #[test]
    fn test_clear() {
        let mut table = OwnershipTable::new();

        table.transfer(NetworkId(5), ParticipantId(3));
        assert_eq!(table.clear(NetworkId(5)), Some(ParticipantId(3)));
        assert_eq!(table.clear(NetworkId(5)), None);
        assert_eq!(table.owner_of(NetworkId(5)), None);
    }

    #[test]
    fn test_owned_by_is_sorted() {
        let mut table = OwnershipTable::new();

        table.transfer(NetworkId(9), ParticipantId(1));
        table.transfer(NetworkId(2), ParticipantId(1));
        table.transfer(NetworkId(4), ParticipantId(2));

        assert_eq!(
            table.owned_by(ParticipantId(1)),
            vec![NetworkId(2), NetworkId(9)]
        );
    }
}
