//! A transaction under construction, plus the resolvers needed to finish it.

use crate::builder::TransactionDataBuilder;
use crate::error::BuildError;
use crate::intents::coin_with_balance::no_inputs;
use crate::intents::{
    CoinWithBalance, CoinWithBalanceResolver, IntentPipeline, IntentResolver, ResolveContext,
    COIN_WITH_BALANCE,
};
use crate::resolve::resolve_objects;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use sui_ptb_types::{sui_type, Argument, ObjectRef};
use sui_transport::TransactionSerializer;
use tracing::debug;

const GAS_COIN_PAGE_SIZE: usize = 50;
/// Most coins a gas payment may name.
pub const MAX_GAS_OBJECTS: usize = 256;

/// A [`TransactionDataBuilder`] with an intent pipeline attached.
///
/// Derefs to the builder, so every graph operation is available directly.
#[derive(Debug, Clone, Default)]
pub struct Transaction {
    builder: TransactionDataBuilder,
    pipeline: IntentPipeline,
}

impl Deref for Transaction {
    type Target = TransactionDataBuilder;

    fn deref(&self) -> &Self::Target {
        &self.builder
    }
}

impl DerefMut for Transaction {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.builder
    }
}

impl From<TransactionDataBuilder> for Transaction {
    fn from(builder: TransactionDataBuilder) -> Self {
        Self {
            builder,
            pipeline: IntentPipeline::new(),
        }
    }
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder(&self) -> &TransactionDataBuilder {
        &self.builder
    }

    pub fn into_builder(self) -> TransactionDataBuilder {
        self.builder
    }

    pub fn pipeline(&self) -> &IntentPipeline {
        &self.pipeline
    }

    pub fn add_intent_resolver(&mut self, name: impl Into<String>, resolver: Arc<dyn IntentResolver>) {
        self.pipeline.register(name, resolver);
    }

    /// Request a coin holding exactly `request.balance`, funded at build time.
    pub fn coin_with_balance(&mut self, request: CoinWithBalance) -> Result<Argument, BuildError> {
        if !self.pipeline.contains(COIN_WITH_BALANCE) {
            self.pipeline
                .register(COIN_WITH_BALANCE, Arc::new(CoinWithBalanceResolver));
        }
        let result = self
            .builder
            .intent(COIN_WITH_BALANCE, no_inputs(), request.into_intent_data())?;
        Ok(result.arg())
    }

    /// Resolve intents, then object inputs.
    ///
    /// Runs on a copy of the graph: on error the transaction is unchanged.
    pub async fn prepare_for_serialization(
        &mut self,
        ctx: &ResolveContext<'_>,
    ) -> Result<(), BuildError> {
        let mut working = self.builder.clone();
        self.pipeline.resolve(&mut working, ctx).await?;
        resolve_objects(&mut working, ctx).await?;
        self.builder = working;
        Ok(())
    }

    /// Prepare, fill in the gas price and payment if unset, and serialize.
    pub async fn build(
        &mut self,
        ctx: &ResolveContext<'_>,
        serializer: &dyn TransactionSerializer,
    ) -> Result<Vec<u8>, BuildError> {
        self.prepare_for_serialization(ctx).await?;

        if self.builder.data().gas_data.price.is_none() {
            let client = ctx.client("gas price")?;
            let epoch = client.get_epoch_info().await.map_err(BuildError::Client)?;
            self.builder.set_gas_price(epoch.reference_gas_price);
        }
        let budget = self
            .builder
            .data()
            .gas_data
            .budget
            .ok_or(BuildError::MissingField("gas budget"))?;
        if self.builder.data().gas_data.payment.is_none() {
            let payment = self.select_gas_payment(ctx, budget).await?;
            self.builder.set_gas_payment(payment);
        }

        self.builder.validate_for_build()?;
        serializer
            .serialize(self.builder.data())
            .map_err(BuildError::Serialization)
    }

    /// Pick SUI coins of the gas owner covering `budget`, skipping transaction inputs.
    async fn select_gas_payment(
        &self,
        ctx: &ResolveContext<'_>,
        budget: u64,
    ) -> Result<Vec<ObjectRef>, BuildError> {
        let data = self.builder.data();
        let owner = data
            .gas_data
            .owner
            .or(data.sender)
            .ok_or(BuildError::MissingField("sender"))?;
        let client = ctx.client("gas payment")?;
        let used = self.builder.object_ids();
        let sui = sui_type();

        let mut selected = Vec::new();
        let mut total = 0u128;
        let mut cursor = None;
        loop {
            let page = client
                .list_coins(owner, &sui, cursor.take(), GAS_COIN_PAGE_SIZE)
                .await
                .map_err(BuildError::Client)?;
            for coin in page.coins {
                if used.contains(&coin.object_ref.object_id) || selected.len() >= MAX_GAS_OBJECTS {
                    continue;
                }
                total += coin.balance as u128;
                selected.push(coin.object_ref);
                if total >= budget as u128 {
                    debug!(coins = selected.len(), total, "selected gas payment");
                    return Ok(selected);
                }
            }
            if !page.has_next_page || selected.len() >= MAX_GAS_OBJECTS {
                break;
            }
            cursor = page.next_cursor;
        }
        Err(BuildError::InsufficientBalance {
            coin_type: sui.to_string(),
            owner: owner.to_hex_literal(),
            required: budget as u128,
            available: total,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intents::Next;
    use move_core_types::account_address::AccountAddress;
    use sui_ptb_types::{CallArg, Command, IntentData, ObjectArg, SuiAddress};
    use sui_transport::{BcsTransactionSerializer, LedgerClient, MockLedger, MockSigner, Signer};

    fn addr(s: &str) -> SuiAddress {
        AccountAddress::from_hex_literal(s).unwrap()
    }

    #[tokio::test]
    async fn test_build_and_execute_coin_with_balance() {
        let ledger = MockLedger::new();
        let sender = addr("0xa11ce");
        let recipient = addr("0xb0b");
        ledger.mint_sui(sender, 1_000_000_000);

        let mut tx = Transaction::new();
        tx.set_sender(sender);
        tx.set_gas_budget(10_000_000);
        let coin = tx.coin_with_balance(CoinWithBalance::sui(1_234)).unwrap();
        let to = tx.pure_address(recipient).unwrap();
        tx.transfer_objects(vec![coin], to).unwrap();

        let bytes = tx
            .build(&ResolveContext::new(&ledger), &BcsTransactionSerializer)
            .await
            .unwrap();
        assert_eq!(tx.data().gas_data.price, Some(1_000));
        assert_eq!(tx.data().gas_payment().len(), 1);

        let signature = MockSigner::new(sender).sign_transaction(&bytes).await.unwrap();
        let executed = ledger
            .execute_transaction(&bytes, &[signature])
            .await
            .unwrap();
        assert!(executed.effects.is_success());
        let received: u64 = ledger
            .coins_owned_by(recipient, &sui_type())
            .iter()
            .map(|c| c.balance)
            .sum();
        assert_eq!(received, 1_234);
    }

    #[tokio::test]
    async fn test_build_requires_budget() {
        let ledger = MockLedger::new();
        let mut tx = Transaction::new();
        tx.set_sender(addr("0x1"));
        let err = tx
            .build(&ResolveContext::new(&ledger), &BcsTransactionSerializer)
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingField("gas budget")));
    }

    #[tokio::test]
    async fn test_gas_selection_skips_inputs() {
        let ledger = MockLedger::new();
        let sender = addr("0xa11ce");
        let input_coin = ledger.mint_sui(sender, 500);
        let gas_coin = ledger.mint_sui(sender, 500);
        let mut tx = Transaction::new();
        tx.set_sender(sender);
        tx.set_gas_budget(400);
        tx.set_gas_price(1);
        let coin = tx.object(input_coin.object_id).unwrap();
        tx.merge_coins(Argument::GasCoin, vec![coin]).unwrap();

        tx.build(&ResolveContext::new(&ledger), &BcsTransactionSerializer)
            .await
            .unwrap();
        assert_eq!(tx.data().gas_payment(), &[gas_coin]);
        assert_eq!(
            tx.inputs()[0],
            CallArg::Object(ObjectArg::ImmOrOwnedObject(input_coin))
        );
    }

    struct Failing;

    #[async_trait::async_trait]
    impl IntentResolver for Failing {
        async fn resolve(
            &self,
            tx: &mut TransactionDataBuilder,
            _ctx: &ResolveContext<'_>,
            _next: Next<'_>,
        ) -> Result<(), BuildError> {
            tx.replace_command(0, vec![], Default::default())?;
            Err(BuildError::Resolver {
                name: "Failing".to_string(),
                message: "out of luck".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn test_failed_prepare_leaves_transaction_unchanged() {
        let mut tx = Transaction::new();
        tx.add_intent_resolver("Failing", Arc::new(Failing));
        tx.intent(
            "Failing",
            no_inputs(),
            IntentData::Custom(serde_json::json!({"n": 1})),
        )
        .unwrap();
        let before = tx.builder().clone();

        let err = tx
            .prepare_for_serialization(&ResolveContext::offline())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::Resolver { .. }));
        assert_eq!(tx.builder(), &before);
        assert!(matches!(tx.commands()[0], Command::Intent(_)));
    }
}
