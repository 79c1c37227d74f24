//! Object cache fed by transaction effects.
//!
//! Executors submit transactions back to back without waiting for the ledger's
//! indexes to catch up, so the versions of the objects they touch are taken
//! from the effects of the previous transaction instead of a fresh lookup.
//!
//! # Example
//!
//! ```ignore
//! let cache = ObjectCache::new();
//! cache.apply_effects(&executed.effects);
//! // Inputs referencing objects touched above now resolve without a lookup.
//! cache.resolve_inputs(&mut tx)?;
//! ```

use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use sui_ptb_builder::{BuildError, TransactionDataBuilder};
use sui_ptb_types::{
    CallArg, ObjectArg, ObjectId, ObjectRef, Owner, SequenceNumber, TransactionEffects,
};
use tracing::{debug, warn};

/// A cached object: its latest known reference and owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedObject {
    pub object_ref: ObjectRef,
    pub owner: Owner,
}

impl CachedObject {
    fn is_owned(&self) -> bool {
        matches!(self.owner, Owner::AddressOwner(_) | Owner::ObjectOwner(_))
    }
}

/// In-memory cache of object references, shared-object versions, and custom entries.
///
/// Thread-safe via internal RwLocks.
#[derive(Debug, Default)]
pub struct ObjectCache {
    /// Owned and immutable objects: id -> latest reference.
    objects: RwLock<HashMap<ObjectId, CachedObject>>,
    /// Shared objects: id -> initial shared version.
    shared: RwLock<HashMap<ObjectId, SequenceNumber>>,
    /// Executor-defined entries, stored as JSON.
    custom: RwLock<HashMap<String, serde_json::Value>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    // ==================== Object Operations ====================

    pub fn get_object(&self, id: &ObjectId) -> Option<CachedObject> {
        self.objects.read().get(id).cloned()
    }

    pub fn add_object(&self, object_ref: ObjectRef, owner: Owner) {
        if let Owner::Shared {
            initial_shared_version,
        } = owner
        {
            self.objects.write().remove(&object_ref.object_id);
            self.shared
                .write()
                .insert(object_ref.object_id, initial_shared_version);
            return;
        }
        self.objects
            .write()
            .insert(object_ref.object_id, CachedObject { object_ref, owner });
    }

    pub fn initial_shared_version(&self, id: &ObjectId) -> Option<SequenceNumber> {
        self.shared.read().get(id).copied()
    }

    /// Forget the given objects, owned or shared.
    pub fn delete_objects(&self, ids: &[ObjectId]) {
        let mut objects = self.objects.write();
        let mut shared = self.shared.write();
        for id in ids {
            objects.remove(id);
            shared.remove(id);
        }
    }

    /// Drop address- and object-owned entries. Immutable and shared entries stay.
    pub fn clear_owned_objects(&self) {
        self.objects.write().retain(|_, obj| !obj.is_owned());
    }

    pub fn object_count(&self) -> usize {
        self.objects.read().len() + self.shared.read().len()
    }

    // ==================== Custom Entries ====================

    pub fn get_custom<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.custom.read().get(key).cloned()?;
        match serde_json::from_value(value) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(key, error = %e, "discarding undecodable cache entry");
                None
            }
        }
    }

    pub fn set_custom<T: Serialize>(&self, key: &str, value: &T) -> serde_json::Result<()> {
        let value = serde_json::to_value(value)?;
        self.custom.write().insert(key.to_string(), value);
        Ok(())
    }

    pub fn delete_custom(&self, key: &str) {
        self.custom.write().remove(key);
    }

    pub fn clear_custom(&self) {
        self.custom.write().clear();
    }

    // ==================== Effects ====================

    /// Record the outcome of a transaction: written objects are updated, deleted
    /// ones forgotten.
    pub fn apply_effects(&self, effects: &TransactionEffects) {
        let mut written = 0usize;
        let mut deleted = Vec::new();
        for change in &effects.changed_objects {
            match change.written() {
                Some((object_ref, owner)) => {
                    self.add_object(object_ref, owner);
                    written += 1;
                }
                None => deleted.push(change.object_id),
            }
        }
        self.delete_objects(&deleted);
        debug!(
            digest = %effects.transaction_digest,
            written,
            deleted = deleted.len(),
            "applied effects to object cache"
        );
    }

    /// Fill inputs from the cache: id-only objects become concrete arguments and
    /// owned references are moved to their latest cached version.
    pub fn resolve_inputs(&self, tx: &mut TransactionDataBuilder) -> Result<usize, BuildError> {
        let mut updates = Vec::new();
        {
            let objects = self.objects.read();
            let shared = self.shared.read();
            for (index, input) in tx.inputs().iter().enumerate() {
                let update = match input {
                    CallArg::UnresolvedObject(unresolved) => {
                        let id = unresolved.object_id;
                        if let Some(&initial_shared_version) = shared.get(&id) {
                            Some(ObjectArg::SharedObject {
                                object_id: id,
                                initial_shared_version,
                                mutable: unresolved.mutable.unwrap_or(true),
                            })
                        } else if unresolved.initial_shared_version.is_none() {
                            objects
                                .get(&id)
                                .map(|cached| ObjectArg::ImmOrOwnedObject(cached.object_ref.clone()))
                        } else {
                            None
                        }
                    }
                    CallArg::Object(ObjectArg::ImmOrOwnedObject(current)) => objects
                        .get(&current.object_id)
                        .filter(|cached| cached.object_ref.version > current.version)
                        .map(|cached| ObjectArg::ImmOrOwnedObject(cached.object_ref.clone())),
                    _ => None,
                };
                if let Some(arg) = update {
                    updates.push((index, arg));
                }
            }
        }

        let count = updates.len();
        for (index, arg) in updates {
            tx.replace_input(index, CallArg::Object(arg))?;
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::account_address::AccountAddress;
    use sui_ptb_types::{
        ChangedObject, ExecutionStatus, GasCostSummary, IdOperation, ObjectOutput,
        UnresolvedObject,
    };

    fn id(s: &str) -> ObjectId {
        AccountAddress::from_hex_literal(s).unwrap()
    }

    fn written(object_id: ObjectId, version: u64, owner: Owner) -> ChangedObject {
        ChangedObject {
            object_id,
            id_operation: IdOperation::None,
            output: ObjectOutput::Written {
                version,
                digest: format!("d{}", version),
                owner,
            },
        }
    }

    fn effects(changed_objects: Vec<ChangedObject>) -> TransactionEffects {
        TransactionEffects {
            transaction_digest: "tx".to_string(),
            status: ExecutionStatus::Success,
            gas_used: GasCostSummary::default(),
            gas_object_index: None,
            changed_objects,
            lamport_version: 9,
        }
    }

    #[test]
    fn test_apply_effects_and_clear_owned() {
        let owner = id("0xa");
        let cache = ObjectCache::new();
        cache.apply_effects(&effects(vec![
            written(id("0x1"), 9, Owner::AddressOwner(owner)),
            written(id("0x2"), 9, Owner::Immutable),
            written(
                id("0x3"),
                9,
                Owner::Shared {
                    initial_shared_version: 4,
                },
            ),
        ]));
        assert_eq!(cache.get_object(&id("0x1")).unwrap().object_ref.version, 9);
        assert_eq!(cache.initial_shared_version(&id("0x3")), Some(4));

        cache.clear_owned_objects();
        assert!(cache.get_object(&id("0x1")).is_none());
        assert!(cache.get_object(&id("0x2")).is_some());
        assert_eq!(cache.object_count(), 2);

        cache.apply_effects(&effects(vec![ChangedObject {
            object_id: id("0x2"),
            id_operation: IdOperation::Deleted,
            output: ObjectOutput::Deleted,
        }]));
        assert!(cache.get_object(&id("0x2")).is_none());
    }

    #[test]
    fn test_custom_entries() {
        let cache = ObjectCache::new();
        let gas = ObjectRef::new(id("0x5"), 3, "d");
        cache.set_custom("gasCoin", &gas).unwrap();
        assert_eq!(cache.get_custom::<ObjectRef>("gasCoin"), Some(gas));
        assert_eq!(cache.get_custom::<u64>("gasCoin"), None);
        cache.clear_custom();
        assert_eq!(cache.get_custom::<ObjectRef>("gasCoin"), None);
    }

    #[test]
    fn test_resolve_inputs_from_cache() {
        let owner = id("0xa");
        let cache = ObjectCache::new();
        cache.add_object(ObjectRef::new(id("0x1"), 7, "new"), Owner::AddressOwner(owner));
        cache.add_object(
            ObjectRef::new(id("0x2"), 7, "s"),
            Owner::Shared {
                initial_shared_version: 2,
            },
        );

        let mut tx = TransactionDataBuilder::new();
        tx.object_ref(ObjectRef::new(id("0x1"), 5, "old")).unwrap();
        tx.add_input(CallArg::UnresolvedObject(UnresolvedObject {
            mutable: Some(false),
            ..UnresolvedObject::new(id("0x2"))
        }))
        .unwrap();
        tx.object(id("0x3")).unwrap();

        assert_eq!(cache.resolve_inputs(&mut tx).unwrap(), 2);
        assert_eq!(
            tx.inputs()[0],
            CallArg::Object(ObjectArg::ImmOrOwnedObject(ObjectRef::new(id("0x1"), 7, "new")))
        );
        assert_eq!(
            tx.inputs()[1],
            CallArg::Object(ObjectArg::SharedObject {
                object_id: id("0x2"),
                initial_shared_version: 2,
                mutable: false,
            })
        );
        assert!(tx.inputs()[2].is_unresolved());
    }
}
