//! Ledger client interface.
//!
//! Everything the builder and executors need from a full node: object reads,
//! balance and coin queries, epoch info, and submission of signed transactions.
//! Implementations own their transport (gRPC, JSON-RPC, in-memory).

use anyhow::Result;
use move_core_types::language_storage::TypeTag;
use serde::{Deserialize, Serialize};
use sui_ptb_types::{ExecutedTransaction, ObjectId, ObjectRef, Owner, SuiAddress};

/// Current reference and ownership of an object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub object_ref: ObjectRef,
    pub owner: Owner,
    pub object_type: Option<TypeTag>,
}

/// Balance of one coin type held by an address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub coin_type: TypeTag,
    /// `coin_balance + address_balance`
    pub total_balance: u64,
    /// Sum of all `Coin<T>` objects owned by the address.
    pub coin_balance: u64,
    /// Funds held directly by the address, outside of coin objects.
    pub address_balance: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coin {
    pub object_ref: ObjectRef,
    pub coin_type: TypeTag,
    pub balance: u64,
}

/// One page of a coin listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinPage {
    pub coins: Vec<Coin>,
    pub next_cursor: Option<String>,
    pub has_next_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochInfo {
    pub epoch: u64,
    pub reference_gas_price: u64,
    pub epoch_start_timestamp_ms: u64,
    pub epoch_duration_ms: u64,
    /// Chain identifier, embedded in `ValidDuring` expirations.
    pub chain_identifier: String,
}

impl EpochInfo {
    pub fn epoch_end_timestamp_ms(&self) -> u64 {
        self.epoch_start_timestamp_ms
            .saturating_add(self.epoch_duration_ms)
    }
}

/// Async access to a Sui full node.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
    /// Fetch current object state. The result is aligned with `ids`; missing objects are `None`.
    async fn get_objects(&self, ids: &[ObjectId]) -> Result<Vec<Option<ObjectInfo>>>;

    /// Balance of `coin_type` held by `owner`, split into coin and address balances.
    async fn get_balance(&self, owner: SuiAddress, coin_type: &TypeTag) -> Result<Balance>;

    /// One page of `Coin<coin_type>` objects owned by `owner`.
    async fn list_coins(
        &self,
        owner: SuiAddress,
        coin_type: &TypeTag,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<CoinPage>;

    /// Submit signed transaction bytes and return the digest and effects.
    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[String],
    ) -> Result<ExecutedTransaction>;

    /// Resolve once the transaction is indexed and its outputs are readable.
    async fn wait_for_transaction(&self, digest: &str) -> Result<()>;

    async fn get_epoch_info(&self) -> Result<EpochInfo>;
}
