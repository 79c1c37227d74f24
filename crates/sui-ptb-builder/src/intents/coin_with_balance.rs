//! `CoinWithBalance`: "give me a coin of type T holding exactly N".
//!
//! The resolver picks funding for every requested coin type, preferring the
//! sender's address balance, then owned coin objects (or the gas coin for SUI),
//! and rewrites each intent into framework calls and `SplitCoins`. Everything
//! that referenced an intent ends up pointing at the split-off coin.

use super::{IntentResolver, Next, ResolveContext};
use crate::builder::{to_u16, TransactionDataBuilder};
use crate::error::BuildError;
use crate::surgery::ResultMapping;
use move_core_types::identifier::IdentStr;
use move_core_types::ident_str;
use move_core_types::language_storage::TypeTag;
use std::collections::{BTreeMap, HashMap, HashSet};
use sui_ptb_types::{
    balance_type, sui_type, Argument, CallArg, CoinKind, CoinWithBalanceData, Command,
    FundsWithdrawal, IntentData, ObjectId, SuiAddress, WithdrawFrom, SUI_FRAMEWORK_ADDRESS,
};
use sui_transport::{Coin, LedgerClient};
use tracing::{debug, info};

/// Intent name the resolver is registered under.
pub const COIN_WITH_BALANCE: &str = "CoinWithBalance";

const COIN_PAGE_SIZE: usize = 50;

/// A coin request, turned into an intent by
/// [`Transaction::coin_with_balance`](crate::Transaction::coin_with_balance).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoinWithBalance {
    /// Inner coin type `T`; SUI when `None`.
    pub coin_type: Option<TypeTag>,
    pub balance: u64,
    /// Split SUI requests off the gas coin instead of owned SUI coins.
    pub use_gas_coin: bool,
}

impl CoinWithBalance {
    /// A SUI coin, drawn from the gas coin.
    pub fn sui(balance: u64) -> Self {
        Self {
            coin_type: None,
            balance,
            use_gas_coin: true,
        }
    }

    pub fn new(coin_type: TypeTag, balance: u64) -> Self {
        Self {
            coin_type: Some(coin_type),
            balance,
            use_gas_coin: true,
        }
    }

    /// Fund SUI requests from owned SUI coins rather than the gas coin.
    pub fn without_gas_coin(mut self) -> Self {
        self.use_gas_coin = false;
        self
    }

    pub fn kind(&self) -> CoinKind {
        let coin_type = self.coin_type.clone().unwrap_or_else(sui_type);
        if self.use_gas_coin && coin_type == sui_type() {
            CoinKind::Gas
        } else {
            CoinKind::Coin(coin_type)
        }
    }

    pub fn into_intent_data(self) -> IntentData {
        IntentData::CoinWithBalance(CoinWithBalanceData {
            coin: self.kind(),
            balance: self.balance,
        })
    }
}

fn inner_type(kind: &CoinKind) -> TypeTag {
    match kind {
        CoinKind::Gas => sui_type(),
        CoinKind::Coin(t) => t.clone(),
    }
}

fn coin_call(function: &IdentStr, coin_type: TypeTag, arguments: Vec<Argument>) -> Command {
    Command::MoveCall {
        package: SUI_FRAMEWORK_ADDRESS,
        module: ident_str!("coin").to_owned(),
        function: function.to_owned(),
        type_arguments: vec![coin_type],
        arguments,
    }
}

/// Where the coins of one kind come from.
#[derive(Debug, Default)]
struct Funding {
    address_balance: u64,
    coins: Vec<Coin>,
}

/// Resolves [`COIN_WITH_BALANCE`] intents against the sender's holdings.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoinWithBalanceResolver;

impl CoinWithBalanceResolver {
    fn request_at(
        tx: &TransactionDataBuilder,
        index: usize,
    ) -> Result<Option<CoinWithBalanceData>, BuildError> {
        let Some(intent) = tx.commands().get(index).and_then(Command::as_intent) else {
            return Ok(None);
        };
        if intent.name != COIN_WITH_BALANCE {
            return Ok(None);
        }
        match &intent.data {
            IntentData::CoinWithBalance(data) => Ok(Some(data.clone())),
            IntentData::Custom(_) => Err(BuildError::Resolver {
                name: COIN_WITH_BALANCE.to_string(),
                message: format!("intent at command {} carries a custom payload", index),
            }),
        }
    }

    /// Per-kind totals, in order of first appearance.
    fn totals(tx: &TransactionDataBuilder) -> Result<Vec<(CoinKind, u128)>, BuildError> {
        let mut totals: Vec<(CoinKind, u128)> = Vec::new();
        for index in 0..tx.commands().len() {
            let Some(request) = Self::request_at(tx, index)? else {
                continue;
            };
            match totals.iter_mut().find(|(kind, _)| *kind == request.coin) {
                Some((_, total)) => *total += request.balance as u128,
                None => totals.push((request.coin, request.balance as u128)),
            }
        }
        Ok(totals)
    }

    async fn load_funding(
        client: &dyn LedgerClient,
        owner: SuiAddress,
        kind: &CoinKind,
        required: u128,
        used: &HashSet<ObjectId>,
    ) -> Result<Funding, BuildError> {
        let coin_type = inner_type(kind);
        let balance = client
            .get_balance(owner, &coin_type)
            .await
            .map_err(BuildError::Client)?;

        if *kind == CoinKind::Gas {
            return Ok(Funding {
                address_balance: balance.address_balance,
                coins: Vec::new(),
            });
        }

        if (balance.total_balance as u128) < required {
            return Err(BuildError::InsufficientBalance {
                coin_type: coin_type.to_string(),
                owner: owner.to_hex_literal(),
                required,
                available: balance.total_balance as u128,
            });
        }

        let mut remaining = required as i128 - balance.address_balance as i128;
        let mut coins = Vec::new();
        let mut cursor = None;
        while remaining > 0 {
            let page = client
                .list_coins(owner, &coin_type, cursor.take(), COIN_PAGE_SIZE)
                .await
                .map_err(BuildError::Client)?;
            for coin in page.coins {
                if used.contains(&coin.object_ref.object_id) {
                    continue;
                }
                remaining -= coin.balance as i128;
                coins.push(coin);
                if remaining <= 0 {
                    break;
                }
            }
            if remaining <= 0 || !page.has_next_page {
                break;
            }
            cursor = page.next_cursor;
        }

        if remaining > 0 {
            return Err(BuildError::InsufficientBalance {
                coin_type: coin_type.to_string(),
                owner: owner.to_hex_literal(),
                required,
                available: (required as i128 - remaining).max(0) as u128,
            });
        }
        debug!(
            coin_type = %coin_type,
            coins = coins.len(),
            address_balance = balance.address_balance,
            "selected coins"
        );
        Ok(Funding {
            address_balance: balance.address_balance,
            coins,
        })
    }

    fn withdrawal(
        tx: &mut TransactionDataBuilder,
        coin_type: &TypeTag,
        amount: u64,
    ) -> Result<Command, BuildError> {
        let withdrawal = tx.add_input(CallArg::FundsWithdrawal(FundsWithdrawal {
            max_amount: amount,
            balance_type: balance_type(coin_type.clone()),
            withdraw_from: WithdrawFrom::Sender,
        }))?;
        Ok(coin_call(
            ident_str!("redeem_funds"),
            coin_type.clone(),
            vec![withdrawal],
        ))
    }
}

#[async_trait::async_trait]
impl IntentResolver for CoinWithBalanceResolver {
    async fn resolve(
        &self,
        tx: &mut TransactionDataBuilder,
        ctx: &ResolveContext<'_>,
        next: Next<'_>,
    ) -> Result<(), BuildError> {
        let totals = Self::totals(tx)?;
        if totals.is_empty() {
            return next.run(tx, ctx).await;
        }
        let sender = tx.data().sender.ok_or(BuildError::MissingField("sender"))?;
        let client = ctx.client(COIN_WITH_BALANCE)?;

        let used = tx
            .inputs()
            .iter()
            .filter(|input| input.is_owned_object() || input.is_unresolved())
            .filter_map(CallArg::object_id)
            .collect::<HashSet<_>>();

        let mut funding: HashMap<CoinKind, (u128, Funding)> = HashMap::new();
        for (kind, total) in &totals {
            if *total == 0 {
                continue;
            }
            let loaded = Self::load_funding(client, sender, kind, *total, &used).await?;
            funding.insert(kind.clone(), (*total, loaded));
        }

        let mut base_coins: HashMap<CoinKind, Argument> = HashMap::new();
        let mut index = 0;
        while index < tx.commands().len() {
            let Some(request) = Self::request_at(tx, index)? else {
                index += 1;
                continue;
            };
            let coin_type = inner_type(&request.coin);

            if request.balance == 0 {
                tx.replace_command(
                    index,
                    vec![coin_call(ident_str!("zero"), coin_type, vec![])],
                    ResultMapping::Command(0),
                )?;
                index += 1;
                continue;
            }

            let (total, source) = funding.get(&request.coin).ok_or_else(|| BuildError::Resolver {
                name: COIN_WITH_BALANCE.to_string(),
                message: format!("no funding loaded for {}", coin_type),
            })?;

            let mut commands = Vec::new();
            if source.address_balance as u128 >= *total {
                commands.push(Self::withdrawal(tx, &coin_type, request.balance)?);
            } else {
                if !base_coins.contains_key(&request.coin) {
                    let (base, rest) = match &request.coin {
                        CoinKind::Gas => (Argument::GasCoin, Vec::new()),
                        CoinKind::Coin(_) => {
                            let mut args = Vec::with_capacity(source.coins.len());
                            for coin in &source.coins {
                                args.push(tx.object_ref(coin.object_ref.clone())?);
                            }
                            let mut args = args.into_iter();
                            let base = args.next().ok_or_else(|| BuildError::InsufficientBalance {
                                coin_type: coin_type.to_string(),
                                owner: sender.to_hex_literal(),
                                required: *total,
                                available: source.address_balance as u128,
                            })?;
                            (base, args.collect::<Vec<_>>())
                        }
                    };

                    if source.address_balance > 0 {
                        commands.push(Self::withdrawal(tx, &coin_type, source.address_balance)?);
                        let redeemed = Argument::Result(to_u16(index, "commands")?);
                        let mut sources = vec![redeemed];
                        sources.extend(rest);
                        commands.push(Command::MergeCoins {
                            destination: base,
                            sources,
                        });
                    } else if !rest.is_empty() {
                        commands.push(Command::MergeCoins {
                            destination: base,
                            sources: rest,
                        });
                    }
                    base_coins.insert(request.coin.clone(), base);
                }

                let base = base_coins[&request.coin];
                let amount = tx.pure_u64(request.balance)?;
                commands.push(Command::SplitCoins {
                    coin: base,
                    amounts: vec![amount],
                });
            }

            let produced = commands.len();
            let last = to_u16(produced - 1, "commands")?;
            tx.replace_command(index, commands, ResultMapping::NestedResult(last, 0))?;
            index += produced;
        }

        info!(kinds = totals.len(), "resolved coin requests");
        next.run(tx, ctx).await
    }
}

/// Inputs map used by the `CoinWithBalance` intent; it takes no arguments.
pub(crate) fn no_inputs() -> BTreeMap<String, Vec<Argument>> {
    BTreeMap::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intents::IntentPipeline;
    use move_core_types::account_address::AccountAddress;
    use std::sync::Arc;
    use sui_ptb_types::ObjectArg;
    use sui_transport::MockLedger;

    fn sender() -> SuiAddress {
        AccountAddress::from_hex_literal("0xa11ce").unwrap()
    }

    fn usdc() -> TypeTag {
        sui_ptb_types::parse_type_tag("0xdba3::usdc::USDC").unwrap()
    }

    fn pipeline() -> IntentPipeline {
        let mut pipeline = IntentPipeline::new();
        pipeline.register(COIN_WITH_BALANCE, Arc::new(CoinWithBalanceResolver));
        pipeline
    }

    fn request(tx: &mut TransactionDataBuilder, coin: CoinWithBalance) -> Argument {
        tx.intent(COIN_WITH_BALANCE, no_inputs(), coin.into_intent_data())
            .unwrap()
            .arg()
    }

    fn function_name(command: &Command) -> Option<String> {
        match command {
            Command::MoveCall { function, .. } => Some(function.to_string()),
            _ => None,
        }
    }

    #[test]
    fn test_kind_selection() {
        assert_eq!(CoinWithBalance::sui(1).kind(), CoinKind::Gas);
        assert_eq!(
            CoinWithBalance::sui(1).without_gas_coin().kind(),
            CoinKind::Coin(sui_type())
        );
        assert_eq!(CoinWithBalance::new(usdc(), 1).kind(), CoinKind::Coin(usdc()));
        assert_eq!(CoinWithBalance::new(sui_type(), 1).kind(), CoinKind::Gas);
    }

    #[tokio::test]
    async fn test_gas_request_splits_gas_coin_and_remaps_users() {
        let ledger = MockLedger::new();
        let mut tx = TransactionDataBuilder::new();
        tx.set_sender(sender());
        let coin = request(&mut tx, CoinWithBalance::sui(1_000));
        let recipient = tx.pure_address(sender()).unwrap();
        tx.transfer_objects(vec![coin], recipient).unwrap();

        pipeline()
            .resolve(&mut tx, &ResolveContext::new(&ledger))
            .await
            .unwrap();

        let commands = tx.commands();
        assert_eq!(commands.len(), 2);
        match &commands[0] {
            Command::SplitCoins { coin, amounts } => {
                assert_eq!(*coin, Argument::GasCoin);
                assert_eq!(amounts.len(), 1);
            }
            other => panic!("expected SplitCoins, got {:?}", other),
        }
        match &commands[1] {
            Command::TransferObjects { objects, .. } => {
                assert_eq!(objects, &vec![Argument::NestedResult(0, 0)]);
            }
            other => panic!("expected TransferObjects, got {:?}", other),
        }
        tx.validate_for_build().unwrap();
    }

    #[tokio::test]
    async fn test_address_balance_covers_requests() {
        let ledger = MockLedger::new();
        ledger.set_address_balance(sender(), usdc(), 500);
        let mut tx = TransactionDataBuilder::new();
        tx.set_sender(sender());
        let a = request(&mut tx, CoinWithBalance::new(usdc(), 200));
        let b = request(&mut tx, CoinWithBalance::new(usdc(), 300));
        tx.merge_coins(a, vec![b]).unwrap();

        pipeline()
            .resolve(&mut tx, &ResolveContext::new(&ledger))
            .await
            .unwrap();

        let commands = tx.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(function_name(&commands[0]).as_deref(), Some("redeem_funds"));
        assert_eq!(function_name(&commands[1]).as_deref(), Some("redeem_funds"));
        assert_eq!(
            commands[2],
            Command::MergeCoins {
                destination: Argument::NestedResult(0, 0),
                sources: vec![Argument::NestedResult(1, 0)],
            }
        );
        let withdrawals: Vec<u64> = tx
            .inputs()
            .iter()
            .filter_map(|i| match i {
                CallArg::FundsWithdrawal(w) => Some(w.max_amount),
                _ => None,
            })
            .collect();
        assert_eq!(withdrawals, vec![200, 300]);
    }

    #[tokio::test]
    async fn test_coins_are_merged_once_and_split_per_request() {
        let ledger = MockLedger::new();
        ledger.mint_coin(sender(), usdc(), 40);
        ledger.mint_coin(sender(), usdc(), 40);
        ledger.mint_coin(sender(), usdc(), 40);
        let mut tx = TransactionDataBuilder::new();
        tx.set_sender(sender());
        let a = request(&mut tx, CoinWithBalance::new(usdc(), 50));
        let b = request(&mut tx, CoinWithBalance::new(usdc(), 10));
        let recipient = tx.pure_address(sender()).unwrap();
        tx.transfer_objects(vec![a, b], recipient).unwrap();

        pipeline()
            .resolve(&mut tx, &ResolveContext::new(&ledger))
            .await
            .unwrap();

        let commands = tx.commands();
        // merge, split(50), split(10), transfer
        assert_eq!(commands.len(), 4);
        let (base, sources) = match &commands[0] {
            Command::MergeCoins {
                destination,
                sources,
            } => (*destination, sources.clone()),
            other => panic!("expected MergeCoins, got {:?}", other),
        };
        assert_eq!(sources.len(), 1);
        assert!(matches!(commands[1], Command::SplitCoins { coin, .. } if coin == base));
        assert!(matches!(commands[2], Command::SplitCoins { coin, .. } if coin == base));
        match &commands[3] {
            Command::TransferObjects { objects, .. } => assert_eq!(
                objects,
                &vec![Argument::NestedResult(1, 0), Argument::NestedResult(2, 0)]
            ),
            other => panic!("expected TransferObjects, got {:?}", other),
        }
        let owned = tx.owned_object_ids();
        assert_eq!(owned.len(), 2);
    }

    #[tokio::test]
    async fn test_gas_request_merges_partial_address_balance() {
        let ledger = MockLedger::new();
        ledger.set_address_balance(sender(), sui_type(), 100);
        let mut tx = TransactionDataBuilder::new();
        tx.set_sender(sender());
        request(&mut tx, CoinWithBalance::sui(250));

        pipeline()
            .resolve(&mut tx, &ResolveContext::new(&ledger))
            .await
            .unwrap();

        let commands = tx.commands();
        assert_eq!(commands.len(), 3);
        assert_eq!(function_name(&commands[0]).as_deref(), Some("redeem_funds"));
        assert_eq!(
            commands[1],
            Command::MergeCoins {
                destination: Argument::GasCoin,
                sources: vec![Argument::Result(0)],
            }
        );
        assert!(matches!(
            commands[2],
            Command::SplitCoins {
                coin: Argument::GasCoin,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_coins_already_used_as_inputs_are_skipped() {
        let ledger = MockLedger::new();
        let taken = ledger.mint_coin(sender(), usdc(), 100);
        let free = ledger.mint_coin(sender(), usdc(), 100);
        let mut tx = TransactionDataBuilder::new();
        tx.set_sender(sender());
        tx.object_ref(taken.clone()).unwrap();
        request(&mut tx, CoinWithBalance::new(usdc(), 60));

        pipeline()
            .resolve(&mut tx, &ResolveContext::new(&ledger))
            .await
            .unwrap();

        let coin_inputs: Vec<ObjectId> = tx
            .inputs()
            .iter()
            .filter_map(|i| match i {
                CallArg::Object(ObjectArg::ImmOrOwnedObject(r)) => Some(r.object_id),
                _ => None,
            })
            .collect();
        assert_eq!(coin_inputs, vec![taken.object_id, free.object_id]);
        assert!(matches!(
            tx.commands()[0],
            Command::SplitCoins {
                coin: Argument::Input(1),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_insufficient_balance() {
        let ledger = MockLedger::new();
        ledger.mint_coin(sender(), usdc(), 10);
        let mut tx = TransactionDataBuilder::new();
        tx.set_sender(sender());
        request(&mut tx, CoinWithBalance::new(usdc(), 11));

        let err = pipeline()
            .resolve(&mut tx, &ResolveContext::new(&ledger))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            BuildError::InsufficientBalance {
                required: 11,
                available: 10,
                ..
            }
        ));
        assert_eq!(err.stage(), crate::error::ErrorStage::Resolution);
    }

    #[tokio::test]
    async fn test_zero_balance_becomes_coin_zero() {
        let ledger = MockLedger::new();
        let mut tx = TransactionDataBuilder::new();
        tx.set_sender(sender());
        let coin = request(&mut tx, CoinWithBalance::new(usdc(), 0));
        tx.merge_coins(Argument::GasCoin, vec![coin]).unwrap();

        pipeline()
            .resolve(&mut tx, &ResolveContext::new(&ledger))
            .await
            .unwrap();

        assert_eq!(function_name(&tx.commands()[0]).as_deref(), Some("zero"));
        assert_eq!(
            tx.commands()[1],
            Command::MergeCoins {
                destination: Argument::GasCoin,
                sources: vec![Argument::Result(0)],
            }
        );
        assert!(tx.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_requires_sender_and_client() {
        let mut tx = TransactionDataBuilder::new();
        request(&mut tx, CoinWithBalance::sui(1));
        let err = pipeline()
            .resolve(&mut tx.clone(), &ResolveContext::offline())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingField("sender")));

        tx.set_sender(sender());
        let err = pipeline()
            .resolve(&mut tx, &ResolveContext::offline())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingClient(COIN_WITH_BALANCE)));
    }
}
