//! Transaction effects as reported by the ledger after execution.

use crate::base::{ObjectId, ObjectRef, SequenceNumber, SuiAddress};
use serde::{Deserialize, Serialize};

/// Who owns an object after a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Owner {
    AddressOwner(SuiAddress),
    ObjectOwner(ObjectId),
    Shared {
        initial_shared_version: SequenceNumber,
    },
    Immutable,
}

impl Owner {
    pub fn address(&self) -> Option<SuiAddress> {
        match self {
            Owner::AddressOwner(addr) => Some(*addr),
            _ => None,
        }
    }
}

/// Gas charged for a transaction, in MIST.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasCostSummary {
    pub computation_cost: u64,
    pub storage_cost: u64,
    pub storage_rebate: u64,
    pub non_refundable_storage_fee: u64,
}

impl GasCostSummary {
    /// Net amount deducted from the gas coin (negative when the rebate dominates).
    pub fn net_gas_usage(&self) -> i128 {
        self.computation_cost as i128 + self.storage_cost as i128 - self.storage_rebate as i128
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionStatus {
    Success,
    Failure { error: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdOperation {
    None,
    Created,
    Deleted,
}

/// State of an object after the transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectOutput {
    Written {
        version: SequenceNumber,
        digest: String,
        owner: Owner,
    },
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedObject {
    pub object_id: ObjectId,
    pub id_operation: IdOperation,
    pub output: ObjectOutput,
}

impl ChangedObject {
    /// New reference and owner of a written object; `None` if it was deleted.
    pub fn written(&self) -> Option<(ObjectRef, Owner)> {
        match &self.output {
            ObjectOutput::Written {
                version,
                digest,
                owner,
            } => Some((
                ObjectRef::new(self.object_id, *version, digest.clone()),
                *owner,
            )),
            ObjectOutput::Deleted => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionEffects {
    pub transaction_digest: String,
    pub status: ExecutionStatus,
    pub gas_used: GasCostSummary,
    /// Position of the gas coin in `changed_objects`, if a gas coin was used.
    pub gas_object_index: Option<usize>,
    pub changed_objects: Vec<ChangedObject>,
    pub lamport_version: SequenceNumber,
}

impl TransactionEffects {
    pub fn is_success(&self) -> bool {
        matches!(self.status, ExecutionStatus::Success)
    }

    pub fn failure_reason(&self) -> Option<&str> {
        match &self.status {
            ExecutionStatus::Failure { error } => Some(error),
            ExecutionStatus::Success => None,
        }
    }

    pub fn gas_object(&self) -> Option<&ChangedObject> {
        self.gas_object_index
            .and_then(|idx| self.changed_objects.get(idx))
    }

    /// Objects created by this transaction.
    pub fn created(&self) -> impl Iterator<Item = &ChangedObject> {
        self.changed_objects
            .iter()
            .filter(|c| c.id_operation == IdOperation::Created)
    }
}

/// A transaction accepted by the ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutedTransaction {
    pub digest: String,
    pub effects: TransactionEffects,
}
