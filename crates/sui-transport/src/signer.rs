//! Transaction signing interface.

use anyhow::Result;
use sui_ptb_types::SuiAddress;

/// Signs finalized transaction bytes on behalf of one address.
#[async_trait::async_trait]
pub trait Signer: Send + Sync {
    /// Address the signatures are valid for. Used as the transaction sender.
    fn address(&self) -> SuiAddress;

    /// Sign serialized transaction bytes, returning an encoded signature.
    async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<String>;
}
