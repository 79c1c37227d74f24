//! Conversion of finalized transactions to bytes.

use anyhow::{bail, Context, Result};
use sui_ptb_types::{CallArg, TransactionData};

/// Converts a finalized transaction into the bytes accepted by
/// [`LedgerClient::execute_transaction`](crate::LedgerClient::execute_transaction).
pub trait TransactionSerializer: Send + Sync {
    fn serialize(&self, data: &TransactionData) -> Result<Vec<u8>>;
}

/// Encodes [`TransactionData`] as BCS.
///
/// The layout is this workspace's own model, not the Sui wire format; it is
/// what the in-memory ledger decodes. Graphs that still contain intents or
/// unresolved objects, or that lack a sender or gas data, are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct BcsTransactionSerializer;

impl BcsTransactionSerializer {
    pub fn deserialize(bytes: &[u8]) -> Result<TransactionData> {
        bcs::from_bytes(bytes).context("Failed to decode transaction bytes")
    }
}

impl TransactionSerializer for BcsTransactionSerializer {
    fn serialize(&self, data: &TransactionData) -> Result<Vec<u8>> {
        if data.sender.is_none() {
            bail!("Transaction has no sender");
        }
        if let Some(idx) = data.commands.iter().position(|c| c.as_intent().is_some()) {
            bail!("Command {} is an unresolved intent", idx);
        }
        if let Some(idx) = data.inputs.iter().position(CallArg::is_unresolved) {
            bail!("Input {} is an unresolved object", idx);
        }
        let gas = &data.gas_data;
        if gas.budget.is_none() || gas.price.is_none() || gas.payment.is_none() {
            bail!("Gas budget, price and payment must be set before serialization");
        }
        bcs::to_bytes(data).context("Failed to encode transaction")
    }
}
