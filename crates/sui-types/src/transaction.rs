//! Transaction envelope: sender, gas data, expiration, inputs and commands.

use crate::base::{ObjectRef, SuiAddress};
use crate::ptb::{CallArg, Command};
use serde::{Deserialize, Serialize};

/// Gas configuration of a transaction. Unset fields are filled in at build time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasData {
    pub budget: Option<u64>,
    pub price: Option<u64>,
    pub owner: Option<SuiAddress>,
    /// Gas coins. `Some(vec![])` pays from the address balance.
    pub payment: Option<Vec<ObjectRef>>,
}

/// When a transaction stops being valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionExpiration {
    #[default]
    None,
    Epoch(u64),
    /// Replay-protected validity window, required for transactions without gas coins.
    ValidDuring {
        min_epoch: Option<u64>,
        max_epoch: Option<u64>,
        min_timestamp: Option<u64>,
        max_timestamp: Option<u64>,
        chain: String,
        nonce: u32,
    },
}

/// A programmable transaction and everything needed to serialize it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionData {
    pub version: u8,
    pub sender: Option<SuiAddress>,
    pub expiration: TransactionExpiration,
    pub gas_data: GasData,
    pub inputs: Vec<CallArg>,
    pub commands: Vec<Command>,
}

impl Default for TransactionData {
    fn default() -> Self {
        Self {
            version: 2,
            sender: None,
            expiration: TransactionExpiration::None,
            gas_data: GasData::default(),
            inputs: Vec::new(),
            commands: Vec::new(),
        }
    }
}

impl TransactionData {
    /// Gas coins that will be consumed, if any have been chosen.
    pub fn gas_payment(&self) -> &[ObjectRef] {
        self.gas_data.payment.as_deref().unwrap_or(&[])
    }

    /// Whether the gas is paid from the address balance rather than coins.
    pub fn pays_from_address_balance(&self) -> bool {
        matches!(&self.gas_data.payment, Some(p) if p.is_empty())
    }
}
