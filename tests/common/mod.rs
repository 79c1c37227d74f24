#![allow(dead_code)]
//! Shared setup for workspace integration tests.
//!
//! Every test runs against an in-memory [`MockLedger`]; `RUST_LOG=debug` shows
//! the executors' pool and cache events.

use move_core_types::account_address::AccountAddress;
use std::sync::Arc;
use std::time::Duration;
use sui_ptb::types::{sui_type, SuiAddress, SUI_FRAMEWORK_ADDRESS};
use sui_ptb::Transaction;
use sui_transport::{MockLedger, MockSigner};

pub const SENDER: &str = "0xa11ce";
pub const RECIPIENT: &str = "0xb0b";

/// Install a test subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn addr(s: &str) -> SuiAddress {
    AccountAddress::from_hex_literal(s).unwrap()
}

/// A ledger where [`SENDER`] owns one coin of `balance` MIST.
pub fn funded_ledger(balance: u64, latency: Duration) -> Arc<MockLedger> {
    init_tracing();
    let ledger = Arc::new(MockLedger::new().with_latency(latency));
    ledger.mint_sui(addr(SENDER), balance);
    ledger
}

pub fn signer() -> Arc<MockSigner> {
    Arc::new(MockSigner::new(addr(SENDER)))
}

/// Mint a zero-balance coin for `recipient`. Consumes no owned inputs.
pub fn mint_zero(recipient: SuiAddress) -> Transaction {
    let mut tx = Transaction::new();
    let coin = tx
        .move_call(SUI_FRAMEWORK_ADDRESS, "coin", "zero", vec![sui_type()], vec![])
        .unwrap();
    let to = tx.pure_address(recipient).unwrap();
    tx.transfer_objects(vec![coin.arg()], to).unwrap();
    tx
}
