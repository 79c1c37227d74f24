//! In-memory ledger for tests.
//!
//! [`MockLedger`] decodes [`BcsTransactionSerializer`] output and executes the
//! coin-level subset of commands (`SplitCoins`, `MergeCoins`, `TransferObjects`,
//! `0x2::coin::zero`, `0x2::coin::redeem_funds`). Other Move calls succeed
//! without side effects beyond bumping the versions of owned inputs.
//!
//! Owned inputs and gas coins are locked for the duration of a submission, so a
//! second transaction touching the same object while the first is in flight is
//! rejected and counted in [`MockLedgerStats::lock_conflicts`].

use crate::client::{Balance, Coin, CoinPage, EpochInfo, LedgerClient, ObjectInfo};
use crate::serializer::BcsTransactionSerializer;
use crate::signer::Signer;
use anyhow::{anyhow, bail, Result};
use move_core_types::account_address::AccountAddress;
use move_core_types::language_storage::TypeTag;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use sui_ptb_types::encoding::{base64_decode, base64_encode};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::Duration;
use sui_ptb_types::{
    sui_type, Argument, CallArg, ChangedObject, Command, ExecutedTransaction, ExecutionStatus,
    GasCostSummary, IdOperation, ObjectArg, ObjectId, ObjectOutput, ObjectRef, Owner,
    SuiAddress, TransactionData, TransactionEffects, TransactionExpiration,
    SUI_FRAMEWORK_ADDRESS,
};
use tracing::debug;

#[derive(Debug, Clone)]
enum ObjectKind {
    Coin { coin_type: TypeTag, balance: u64 },
    Other { object_type: Option<TypeTag> },
}

#[derive(Debug, Clone)]
struct StoredObject {
    version: u64,
    digest: String,
    owner: Owner,
    kind: ObjectKind,
}

/// Counters describing what the ledger has seen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockLedgerStats {
    /// Calls to `execute_transaction`.
    pub submitted: usize,
    /// Transactions executed with a success status.
    pub executed: usize,
    /// Transactions executed with a failure status (gas still charged).
    pub failed: usize,
    /// Submissions rejected before execution.
    pub rejected: usize,
    /// Submissions that touched an object locked by another in-flight submission.
    pub lock_conflicts: usize,
    /// Highest number of simultaneously in-flight submissions.
    pub max_in_flight: usize,
}

#[derive(Debug, Default)]
struct LedgerState {
    objects: HashMap<ObjectId, StoredObject>,
    address_balances: HashMap<(SuiAddress, TypeTag), u64>,
    transactions: HashMap<String, ExecutedTransaction>,
    lamport: u64,
    id_counter: u64,
    locked: HashSet<ObjectId>,
    in_flight: usize,
    pending_transport_failures: usize,
    pending_execution_failures: usize,
    pending_read_failures: usize,
    stats: MockLedgerStats,
}

/// An in-memory ledger implementing [`LedgerClient`].
pub struct MockLedger {
    state: Mutex<LedgerState>,
    epoch: Mutex<EpochInfo>,
    latency: Duration,
    gas_cost: GasCostSummary,
}

impl Default for MockLedger {
    fn default() -> Self {
        Self::new()
    }
}

impl MockLedger {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            epoch: Mutex::new(EpochInfo {
                epoch: 1,
                reference_gas_price: 1_000,
                epoch_start_timestamp_ms: 0,
                epoch_duration_ms: u64::MAX / 2,
                chain_identifier: "4c78adac".to_string(),
            }),
            latency: Duration::ZERO,
            gas_cost: GasCostSummary {
                computation_cost: 1_000_000,
                storage_cost: 2_000_000,
                storage_rebate: 1_000_000,
                non_refundable_storage_fee: 0,
            },
        }
    }

    /// Delay every submission, so concurrent submissions overlap.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Gas charged for every executed transaction.
    pub fn with_gas_cost(mut self, gas_cost: GasCostSummary) -> Self {
        self.gas_cost = gas_cost;
        self
    }

    pub fn set_epoch(&self, info: EpochInfo) {
        *self.epoch.lock() = info;
    }

    pub fn mint_coin(&self, owner: SuiAddress, coin_type: TypeTag, balance: u64) -> ObjectRef {
        self.insert_object(
            Owner::AddressOwner(owner),
            ObjectKind::Coin { coin_type, balance },
        )
    }

    pub fn mint_sui(&self, owner: SuiAddress, balance: u64) -> ObjectRef {
        self.mint_coin(owner, sui_type(), balance)
    }

    /// Create a non-coin object.
    pub fn create_object(&self, owner: Owner, object_type: Option<TypeTag>) -> ObjectRef {
        self.insert_object(owner, ObjectKind::Other { object_type })
    }

    fn insert_object(&self, owner: Owner, kind: ObjectKind) -> ObjectRef {
        let mut state = self.state.lock();
        let id = state.fresh_id();
        let version = state.lamport.max(1);
        let digest = object_digest(&id, version);
        state.objects.insert(
            id,
            StoredObject {
                version,
                digest: digest.clone(),
                owner,
                kind,
            },
        );
        ObjectRef::new(id, version, digest)
    }

    pub fn set_address_balance(&self, owner: SuiAddress, coin_type: TypeTag, amount: u64) {
        self.state
            .lock()
            .address_balances
            .insert((owner, coin_type), amount);
    }

    pub fn address_balance(&self, owner: SuiAddress, coin_type: &TypeTag) -> u64 {
        self.state
            .lock()
            .address_balances
            .get(&(owner, coin_type.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Balance of a coin object, `None` if it does not exist or is not a coin.
    pub fn coin_balance(&self, id: &ObjectId) -> Option<u64> {
        match self.state.lock().objects.get(id).map(|o| &o.kind) {
            Some(ObjectKind::Coin { balance, .. }) => Some(*balance),
            _ => None,
        }
    }

    pub fn object_ref(&self, id: &ObjectId) -> Option<ObjectRef> {
        self.state
            .lock()
            .objects
            .get(id)
            .map(|o| ObjectRef::new(*id, o.version, o.digest.clone()))
    }

    pub fn owner_of(&self, id: &ObjectId) -> Option<Owner> {
        self.state.lock().objects.get(id).map(|o| o.owner)
    }

    pub fn coins_owned_by(&self, owner: SuiAddress, coin_type: &TypeTag) -> Vec<Coin> {
        self.state.lock().coins_owned_by(owner, coin_type)
    }

    /// Reject the next `n` submissions before execution, as a transport error.
    pub fn fail_next_submissions(&self, n: usize) {
        self.state.lock().pending_transport_failures = n;
    }

    /// Execute the next `n` transactions with a failure status.
    pub fn fail_next_executions(&self, n: usize) {
        self.state.lock().pending_execution_failures = n;
    }

    /// Fail the next `n` object or coin lookups (`get_objects`, `list_coins`).
    pub fn fail_next_reads(&self, n: usize) {
        self.state.lock().pending_read_failures = n;
    }

    pub fn stats(&self) -> MockLedgerStats {
        self.state.lock().stats.clone()
    }
}

fn object_digest(id: &ObjectId, version: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.as_ref());
    hasher.update(version.to_le_bytes());
    hex::encode(&hasher.finalize()[..16])
}

fn mock_object_id(counter: u64) -> ObjectId {
    let mut hasher = Sha256::new();
    hasher.update(b"mock-object");
    hasher.update(counter.to_le_bytes());
    let hash = hasher.finalize();
    let mut bytes = [0u8; AccountAddress::LENGTH];
    bytes.copy_from_slice(&hash[..AccountAddress::LENGTH]);
    AccountAddress::new(bytes)
}

/// Ids a submission locks while it is in flight: gas coins and owned inputs.
fn locked_ids(data: &TransactionData) -> Vec<ObjectId> {
    let mut ids: Vec<ObjectId> = data.gas_payment().iter().map(|r| r.object_id).collect();
    for input in &data.inputs {
        match input {
            CallArg::Object(ObjectArg::ImmOrOwnedObject(r))
            | CallArg::Object(ObjectArg::Receiving(r)) => ids.push(r.object_id),
            _ => {}
        }
    }
    ids.sort();
    ids.dedup();
    ids
}

impl LedgerState {
    fn fresh_id(&mut self) -> ObjectId {
        self.id_counter += 1;
        mock_object_id(self.id_counter)
    }

    fn coins_owned_by(&self, owner: SuiAddress, coin_type: &TypeTag) -> Vec<Coin> {
        let mut coins: Vec<Coin> = self
            .objects
            .iter()
            .filter_map(|(id, obj)| match (&obj.kind, obj.owner) {
                (ObjectKind::Coin { coin_type: t, balance }, Owner::AddressOwner(o))
                    if o == owner && t == coin_type =>
                {
                    Some(Coin {
                        object_ref: ObjectRef::new(*id, obj.version, obj.digest.clone()),
                        coin_type: t.clone(),
                        balance: *balance,
                    })
                }
                _ => None,
            })
            .collect();
        coins.sort_by_key(|c| c.object_ref.object_id);
        coins
    }

    fn check_ref(&self, r: &ObjectRef) -> Result<&StoredObject> {
        let obj = self
            .objects
            .get(&r.object_id)
            .ok_or_else(|| anyhow!("Object {} does not exist", r.object_id.to_hex_literal()))?;
        if obj.version != r.version || obj.digest != r.digest {
            bail!(
                "Object {} is at version {}, transaction uses version {}",
                r.object_id.to_hex_literal(),
                obj.version,
                r.version
            );
        }
        Ok(obj)
    }

    fn check_transaction(&self, data: &TransactionData, sender: SuiAddress) -> Result<()> {
        let budget = data.gas_data.budget.unwrap_or(0);
        let gas_owner = data.gas_data.owner.unwrap_or(sender);
        let payment = data
            .gas_data
            .payment
            .as_ref()
            .ok_or_else(|| anyhow!("Missing gas payment"))?;

        if payment.is_empty() {
            if !matches!(data.expiration, TransactionExpiration::ValidDuring { .. }) {
                bail!("Address balance gas payment requires a ValidDuring expiration");
            }
            let available = self
                .address_balances
                .get(&(gas_owner, sui_type()))
                .copied()
                .unwrap_or(0);
            if available < budget {
                bail!(
                    "Insufficient address balance for gas: {} < {}",
                    available,
                    budget
                );
            }
        } else {
            let mut total = 0u64;
            for coin in payment {
                let obj = self.check_ref(coin)?;
                if obj.owner != Owner::AddressOwner(gas_owner) {
                    bail!(
                        "Gas coin {} is not owned by the gas owner",
                        coin.object_id.to_hex_literal()
                    );
                }
                match &obj.kind {
                    ObjectKind::Coin { coin_type, balance } if *coin_type == sui_type() => {
                        total = total.saturating_add(*balance)
                    }
                    _ => bail!("Gas object {} is not a SUI coin", coin.object_id.to_hex_literal()),
                }
            }
            if total < budget {
                bail!("Insufficient gas: coins hold {} but budget is {}", total, budget);
            }
        }

        for (idx, input) in data.inputs.iter().enumerate() {
            match input {
                CallArg::Object(ObjectArg::ImmOrOwnedObject(r)) => {
                    let obj = self.check_ref(r)?;
                    if !matches!(obj.owner, Owner::Immutable)
                        && obj.owner != Owner::AddressOwner(sender)
                    {
                        bail!("Input {} is not owned by the sender", idx);
                    }
                }
                CallArg::Object(ObjectArg::Receiving(r)) => {
                    self.check_ref(r)?;
                }
                CallArg::Object(ObjectArg::SharedObject { object_id, .. }) => {
                    let obj = self
                        .objects
                        .get(object_id)
                        .ok_or_else(|| anyhow!("Shared object {} does not exist", object_id))?;
                    if !matches!(obj.owner, Owner::Shared { .. }) {
                        bail!("Input {} is not a shared object", idx);
                    }
                }
                CallArg::UnresolvedObject(_) => bail!("Input {} is unresolved", idx),
                CallArg::Pure(_) | CallArg::FundsWithdrawal(_) => {}
            }
        }
        Ok(())
    }

    fn take_read_failure(&mut self) -> Result<()> {
        if self.pending_read_failures > 0 {
            self.pending_read_failures -= 1;
            bail!("injected read failure");
        }
        Ok(())
    }

    fn release(&mut self, ids: &[ObjectId]) {
        for id in ids {
            self.locked.remove(id);
        }
        self.in_flight = self.in_flight.saturating_sub(1);
    }

    fn apply(
        &mut self,
        data: &TransactionData,
        sender: SuiAddress,
        tx_bytes: &[u8],
        gas_cost: &GasCostSummary,
    ) -> ExecutedTransaction {
        let payment = data.gas_payment().to_vec();
        let gas_coin = payment.first().map(|r| r.object_id);

        let max_input_version = payment
            .iter()
            .map(|r| r.version)
            .chain(data.inputs.iter().filter_map(|i| match i {
                CallArg::Object(ObjectArg::ImmOrOwnedObject(r))
                | CallArg::Object(ObjectArg::Receiving(r)) => Some(r.version),
                _ => None,
            }))
            .max()
            .unwrap_or(0);
        self.lamport = self.lamport.max(max_input_version) + 1;
        let lamport = self.lamport;

        // Smash extra payment coins into the first one before execution.
        let mut smashed = BTreeSet::new();
        if let Some(gas_id) = gas_coin {
            let mut extra = 0u64;
            for r in payment.iter().skip(1) {
                if let Some(StoredObject {
                    kind: ObjectKind::Coin { balance, .. },
                    ..
                }) = self.objects.remove(&r.object_id)
                {
                    extra = extra.saturating_add(balance);
                    smashed.insert(r.object_id);
                }
            }
            if let Some(StoredObject {
                kind: ObjectKind::Coin { balance, .. },
                ..
            }) = self.objects.get_mut(&gas_id)
            {
                *balance = balance.saturating_add(extra);
            }
        }

        let outcome = if self.pending_execution_failures > 0 {
            self.pending_execution_failures -= 1;
            Err(anyhow!("injected execution failure"))
        } else {
            let mut exec = Execution {
                objects: self.objects.clone(),
                address_balances: self.address_balances.clone(),
                data,
                sender,
                gas_coin,
                results: Vec::with_capacity(data.commands.len()),
                created: BTreeSet::new(),
                deleted: BTreeSet::new(),
                touched: BTreeSet::new(),
                id_counter: self.id_counter,
            };
            exec.run().map(|()| exec)
        };

        let mut created = BTreeSet::new();
        let mut deleted = BTreeSet::new();
        let mut touched: BTreeSet<ObjectId> = data
            .inputs
            .iter()
            .filter_map(|i| match i {
                CallArg::Object(ObjectArg::ImmOrOwnedObject(r))
                | CallArg::Object(ObjectArg::Receiving(r)) => Some(r.object_id),
                _ => None,
            })
            .filter(|id| {
                self.objects
                    .get(id)
                    .is_some_and(|o| !matches!(o.owner, Owner::Immutable))
            })
            .collect();

        let status = match outcome {
            Ok(exec) => {
                self.objects = exec.objects;
                self.address_balances = exec.address_balances;
                self.id_counter = exec.id_counter;
                created = exec.created;
                deleted = exec.deleted;
                touched.extend(exec.touched);
                ExecutionStatus::Success
            }
            Err(e) => ExecutionStatus::Failure {
                error: e.to_string(),
            },
        };

        // Charge gas.
        deleted.extend(smashed);
        let net = gas_cost.net_gas_usage();
        if let Some(gas_id) = gas_coin {
            if let Some(StoredObject {
                kind: ObjectKind::Coin { balance, .. },
                ..
            }) = self.objects.get_mut(&gas_id)
            {
                *balance = apply_net(*balance, net);
            }
            touched.insert(gas_id);
        } else {
            let gas_owner = data.gas_data.owner.unwrap_or(sender);
            let entry = self
                .address_balances
                .entry((gas_owner, sui_type()))
                .or_insert(0);
            *entry = apply_net(*entry, net);
        }

        let mut changed_objects = Vec::new();
        let mut gas_object_index = None;
        let ordered = gas_coin
            .into_iter()
            .chain(touched.iter().copied().filter(|id| Some(*id) != gas_coin))
            .chain(created.iter().copied())
            .collect::<Vec<_>>();
        let mut seen = HashSet::new();
        for id in ordered {
            if deleted.contains(&id) || !seen.insert(id) {
                continue;
            }
            let Some(obj) = self.objects.get_mut(&id) else {
                continue;
            };
            obj.version = lamport;
            obj.digest = object_digest(&id, lamport);
            if Some(id) == gas_coin {
                gas_object_index = Some(changed_objects.len());
            }
            changed_objects.push(ChangedObject {
                object_id: id,
                id_operation: if created.contains(&id) {
                    IdOperation::Created
                } else {
                    IdOperation::None
                },
                output: ObjectOutput::Written {
                    version: lamport,
                    digest: obj.digest.clone(),
                    owner: obj.owner,
                },
            });
        }
        for id in deleted {
            changed_objects.push(ChangedObject {
                object_id: id,
                id_operation: IdOperation::Deleted,
                output: ObjectOutput::Deleted,
            });
        }

        let mut hasher = Sha256::new();
        hasher.update(tx_bytes);
        hasher.update(lamport.to_le_bytes());
        let digest = hex::encode(hasher.finalize());

        match &status {
            ExecutionStatus::Success => self.stats.executed += 1,
            ExecutionStatus::Failure { .. } => self.stats.failed += 1,
        }

        let executed = ExecutedTransaction {
            digest: digest.clone(),
            effects: TransactionEffects {
                transaction_digest: digest.clone(),
                status,
                gas_used: gas_cost.clone(),
                gas_object_index,
                changed_objects,
                lamport_version: lamport,
            },
        };
        self.transactions.insert(digest, executed.clone());
        executed
    }
}

fn apply_net(balance: u64, net: i128) -> u64 {
    let next = balance as i128 - net;
    next.clamp(0, u64::MAX as i128) as u64
}

#[derive(Debug, Clone)]
enum Value {
    Object(ObjectId),
    Pure(Vec<u8>),
    Withdrawal { max_amount: u64, coin_type: TypeTag },
    Unit,
}

/// Command interpreter over a scratch copy of the ledger state.
struct Execution<'a> {
    objects: HashMap<ObjectId, StoredObject>,
    address_balances: HashMap<(SuiAddress, TypeTag), u64>,
    data: &'a TransactionData,
    sender: SuiAddress,
    gas_coin: Option<ObjectId>,
    results: Vec<Vec<Value>>,
    created: BTreeSet<ObjectId>,
    deleted: BTreeSet<ObjectId>,
    touched: BTreeSet<ObjectId>,
    id_counter: u64,
}

impl Execution<'_> {
    fn run(&mut self) -> Result<()> {
        let data = self.data;
        for (idx, command) in data.commands.iter().enumerate() {
            let values = self
                .execute(command)
                .map_err(|e| anyhow!("Command {} ({}) failed: {}", idx, command.kind_name(), e))?;
            self.results.push(values);
        }
        Ok(())
    }

    fn resolve(&self, arg: &Argument) -> Result<Value> {
        match arg {
            Argument::GasCoin => self
                .gas_coin
                .map(Value::Object)
                .ok_or_else(|| anyhow!("GasCoin used without a gas coin")),
            Argument::Input(i) => match self.data.inputs.get(*i as usize) {
                Some(CallArg::Pure(bytes)) => Ok(Value::Pure(bytes.clone())),
                Some(CallArg::Object(obj)) => Ok(Value::Object(obj.object_id())),
                Some(CallArg::FundsWithdrawal(w)) => {
                    let coin_type = match &w.balance_type {
                        TypeTag::Struct(s) => s.type_params.first().cloned(),
                        _ => None,
                    }
                    .ok_or_else(|| anyhow!("Withdrawal type is not a Balance<T>"))?;
                    Ok(Value::Withdrawal {
                        max_amount: w.max_amount,
                        coin_type,
                    })
                }
                Some(CallArg::UnresolvedObject(_)) => bail!("Input {} is unresolved", i),
                None => bail!("Input {} out of bounds", i),
            },
            Argument::Result(c) => match self.results.get(*c as usize).map(Vec::as_slice) {
                Some([single]) => Ok(single.clone()),
                Some(values) => bail!("Result({}) has {} values", c, values.len()),
                None => bail!("Result({}) is not available", c),
            },
            Argument::NestedResult(c, k) => self
                .results
                .get(*c as usize)
                .and_then(|values| values.get(*k as usize))
                .cloned()
                .ok_or_else(|| anyhow!("NestedResult({}, {}) is not available", c, k)),
        }
    }

    fn coin(&self, arg: &Argument) -> Result<(ObjectId, TypeTag, u64)> {
        let Value::Object(id) = self.resolve(arg)? else {
            bail!("Argument {:?} is not an object", arg);
        };
        match self.objects.get(&id).map(|o| &o.kind) {
            Some(ObjectKind::Coin { coin_type, balance }) => Ok((id, coin_type.clone(), *balance)),
            Some(_) => bail!("Object {} is not a coin", id.to_hex_literal()),
            None => bail!("Object {} does not exist", id.to_hex_literal()),
        }
    }

    fn set_coin_balance(&mut self, id: &ObjectId, value: u64) {
        if let Some(StoredObject {
            kind: ObjectKind::Coin { balance, .. },
            ..
        }) = self.objects.get_mut(id)
        {
            *balance = value;
        }
        self.touched.insert(*id);
    }

    fn new_coin(&mut self, coin_type: TypeTag, balance: u64) -> ObjectId {
        self.id_counter += 1;
        let id = mock_object_id(self.id_counter);
        self.objects.insert(
            id,
            StoredObject {
                version: 0,
                digest: String::new(),
                owner: Owner::AddressOwner(self.sender),
                kind: ObjectKind::Coin { coin_type, balance },
            },
        );
        self.created.insert(id);
        id
    }

    fn pure<T: serde::de::DeserializeOwned>(&self, arg: &Argument) -> Result<T> {
        match self.resolve(arg)? {
            Value::Pure(bytes) => Ok(bcs::from_bytes(&bytes)?),
            other => bail!("Expected a pure argument, got {:?}", other),
        }
    }

    fn execute(&mut self, command: &Command) -> Result<Vec<Value>> {
        match command {
            Command::SplitCoins { coin, amounts } => {
                let (id, coin_type, mut balance) = self.coin(coin)?;
                let mut out = Vec::with_capacity(amounts.len());
                for amount in amounts {
                    let amount: u64 = self.pure(amount)?;
                    balance = balance
                        .checked_sub(amount)
                        .ok_or_else(|| anyhow!("Insufficient coin balance to split {}", amount))?;
                    out.push(Value::Object(self.new_coin(coin_type.clone(), amount)));
                }
                self.set_coin_balance(&id, balance);
                Ok(out)
            }
            Command::MergeCoins {
                destination,
                sources,
            } => {
                let (dest, dest_type, mut total) = self.coin(destination)?;
                for source in sources {
                    let (id, coin_type, balance) = self.coin(source)?;
                    if coin_type != dest_type || id == dest {
                        bail!("Cannot merge {} into {}", id.to_hex_literal(), dest.to_hex_literal());
                    }
                    total = total.saturating_add(balance);
                    self.objects.remove(&id);
                    if !self.created.remove(&id) {
                        self.deleted.insert(id);
                    }
                }
                self.set_coin_balance(&dest, total);
                Ok(vec![])
            }
            Command::TransferObjects { objects, address } => {
                let recipient: AccountAddress = self.pure(address)?;
                for object in objects {
                    let Value::Object(id) = self.resolve(object)? else {
                        bail!("Cannot transfer a non-object value");
                    };
                    let obj = self
                        .objects
                        .get_mut(&id)
                        .ok_or_else(|| anyhow!("Object {} does not exist", id.to_hex_literal()))?;
                    obj.owner = Owner::AddressOwner(recipient);
                    self.touched.insert(id);
                }
                Ok(vec![])
            }
            Command::MoveCall {
                package,
                module,
                function,
                type_arguments,
                arguments,
            } if *package == SUI_FRAMEWORK_ADDRESS && module.as_str() == "coin" => {
                match function.as_str() {
                    "zero" => {
                        let coin_type = type_arguments
                            .first()
                            .cloned()
                            .ok_or_else(|| anyhow!("coin::zero needs a type argument"))?;
                        Ok(vec![Value::Object(self.new_coin(coin_type, 0))])
                    }
                    "redeem_funds" => {
                        let arg = arguments
                            .first()
                            .ok_or_else(|| anyhow!("coin::redeem_funds needs a withdrawal"))?;
                        let Value::Withdrawal {
                            max_amount,
                            coin_type,
                        } = self.resolve(arg)?
                        else {
                            bail!("coin::redeem_funds argument is not a withdrawal");
                        };
                        let key = (self.sender, coin_type.clone());
                        let available = self.address_balances.get(&key).copied().unwrap_or(0);
                        if available < max_amount {
                            bail!(
                                "Insufficient address balance: {} < {}",
                                available,
                                max_amount
                            );
                        }
                        self.address_balances.insert(key, available - max_amount);
                        Ok(vec![Value::Object(self.new_coin(coin_type, max_amount))])
                    }
                    _ => Ok(vec![Value::Unit]),
                }
            }
            Command::MoveCall { arguments, .. } => {
                for arg in arguments {
                    self.resolve(arg)?;
                }
                Ok(vec![Value::Unit])
            }
            Command::MakeMoveVec { elements, .. } => {
                for arg in elements {
                    self.resolve(arg)?;
                }
                Ok(vec![Value::Unit])
            }
            Command::Publish { .. } | Command::Upgrade { .. } => Ok(vec![Value::Unit]),
            Command::Intent(intent) => bail!("Unresolved intent {}", intent.name),
        }
    }
}

/// Releases the objects a submission locked if the submission is dropped early.
struct LockGuard<'a> {
    state: &'a Mutex<LedgerState>,
    ids: Option<Vec<ObjectId>>,
}

impl LockGuard<'_> {
    fn finish(mut self, state: &mut LedgerState) {
        if let Some(ids) = self.ids.take() {
            state.release(&ids);
        }
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        if let Some(ids) = self.ids.take() {
            self.state.lock().release(&ids);
        }
    }
}

#[async_trait::async_trait]
impl LedgerClient for MockLedger {
    async fn get_objects(&self, ids: &[ObjectId]) -> Result<Vec<Option<ObjectInfo>>> {
        let mut state = self.state.lock();
        state.take_read_failure()?;
        Ok(ids
            .iter()
            .map(|id| {
                state.objects.get(id).map(|obj| ObjectInfo {
                    object_ref: ObjectRef::new(*id, obj.version, obj.digest.clone()),
                    owner: obj.owner,
                    object_type: match &obj.kind {
                        ObjectKind::Coin { coin_type, .. } => {
                            Some(sui_ptb_types::coin_type(coin_type.clone()))
                        }
                        ObjectKind::Other { object_type } => object_type.clone(),
                    },
                })
            })
            .collect())
    }

    async fn get_balance(&self, owner: SuiAddress, coin_type: &TypeTag) -> Result<Balance> {
        let state = self.state.lock();
        let coin_balance = state
            .coins_owned_by(owner, coin_type)
            .iter()
            .map(|c| c.balance)
            .fold(0u64, u64::saturating_add);
        let address_balance = state
            .address_balances
            .get(&(owner, coin_type.clone()))
            .copied()
            .unwrap_or(0);
        Ok(Balance {
            coin_type: coin_type.clone(),
            total_balance: coin_balance.saturating_add(address_balance),
            coin_balance,
            address_balance,
        })
    }

    async fn list_coins(
        &self,
        owner: SuiAddress,
        coin_type: &TypeTag,
        cursor: Option<String>,
        limit: usize,
    ) -> Result<CoinPage> {
        let start = match cursor {
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| anyhow!("Invalid coin cursor '{}'", c))?,
            None => 0,
        };
        let coins = {
            let mut state = self.state.lock();
            state.take_read_failure()?;
            state.coins_owned_by(owner, coin_type)
        };
        let end = start.saturating_add(limit.max(1)).min(coins.len());
        let page = coins.get(start..end).map(<[Coin]>::to_vec).unwrap_or_default();
        let has_next_page = end < coins.len();
        Ok(CoinPage {
            coins: page,
            next_cursor: has_next_page.then(|| end.to_string()),
            has_next_page,
        })
    }

    async fn execute_transaction(
        &self,
        tx_bytes: &[u8],
        signatures: &[String],
    ) -> Result<ExecutedTransaction> {
        let data = BcsTransactionSerializer::deserialize(tx_bytes)?;
        let sender = data
            .sender
            .ok_or_else(|| anyhow!("Transaction has no sender"))?;
        if signatures.is_empty() {
            bail!("Transaction is not signed");
        }
        for signature in signatures {
            base64_decode(signature, "signature")?;
        }

        let guard = {
            let mut state = self.state.lock();
            state.stats.submitted += 1;
            if state.pending_transport_failures > 0 {
                state.pending_transport_failures -= 1;
                state.stats.rejected += 1;
                bail!("injected transport failure");
            }
            let ids = locked_ids(&data);
            if ids.iter().any(|id| state.locked.contains(id)) {
                state.stats.lock_conflicts += 1;
                state.stats.rejected += 1;
                bail!("Object is locked by another in-flight transaction");
            }
            if let Err(e) = state.check_transaction(&data, sender) {
                state.stats.rejected += 1;
                return Err(e);
            }
            state.locked.extend(ids.iter().copied());
            state.in_flight += 1;
            state.stats.max_in_flight = state.stats.max_in_flight.max(state.in_flight);
            LockGuard {
                state: &self.state,
                ids: Some(ids),
            }
        };

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }

        let mut state = self.state.lock();
        let executed = state.apply(&data, sender, tx_bytes, &self.gas_cost);
        guard.finish(&mut state);
        debug!(
            digest = %executed.digest,
            success = executed.effects.is_success(),
            "mock ledger executed transaction"
        );
        Ok(executed)
    }

    async fn wait_for_transaction(&self, digest: &str) -> Result<()> {
        if self.state.lock().transactions.contains_key(digest) {
            Ok(())
        } else {
            bail!("Unknown transaction {}", digest)
        }
    }

    async fn get_epoch_info(&self) -> Result<EpochInfo> {
        Ok(self.epoch.lock().clone())
    }
}

/// Signer that "signs" by hashing the bytes (base64, like Sui signatures). Accepted by [`MockLedger`].
#[derive(Debug, Clone, Copy)]
pub struct MockSigner {
    address: SuiAddress,
}

impl MockSigner {
    pub fn new(address: SuiAddress) -> Self {
        Self { address }
    }
}

#[async_trait::async_trait]
impl Signer for MockSigner {
    fn address(&self) -> SuiAddress {
        self.address
    }

    async fn sign_transaction(&self, tx_bytes: &[u8]) -> Result<String> {
        Ok(base64_encode(&Sha256::digest(tx_bytes)))
    }
}
