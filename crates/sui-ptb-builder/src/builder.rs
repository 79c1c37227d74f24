//! The transaction graph: a deduplicated input table plus an ordered command list.
//!
//! Inputs are deduplicated on insertion. Pure values are keyed by their bytes and
//! object inputs by object id; funds withdrawals are never merged since every
//! withdrawal is its own reservation. When an object is added twice the entries
//! are merged and only ever upgrade: an unresolved reference becomes resolved, and
//! shared access becomes mutable if either side asked for it.

use crate::error::BuildError;
use crate::validation::check_references;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::TypeTag;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use sui_ptb_types::{
    Argument, CallArg, Command, IntentCommand, IntentData, ObjectArg, ObjectId, ObjectRef,
    SequenceNumber, SuiAddress, TransactionData, TransactionExpiration, UnresolvedObject,
};
use tracing::{debug, warn};

/// Largest number of inputs or commands a transaction can hold (arguments are `u16`).
pub const MAX_ENTRIES: usize = u16::MAX as usize + 1;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKey {
    Pure(Vec<u8>),
    Object(ObjectId),
}

fn input_key(arg: &CallArg) -> Option<InputKey> {
    match arg {
        CallArg::Pure(bytes) => Some(InputKey::Pure(bytes.clone())),
        CallArg::Object(_) | CallArg::UnresolvedObject(_) => arg.object_id().map(InputKey::Object),
        CallArg::FundsWithdrawal(_) => None,
    }
}

/// Merge two inputs sharing a dedup key. Never downgrades the existing entry.
pub(crate) fn merge_inputs(existing: &CallArg, incoming: CallArg) -> CallArg {
    match (existing, incoming) {
        (
            CallArg::Object(ObjectArg::SharedObject {
                object_id,
                initial_shared_version,
                mutable,
            }),
            CallArg::Object(ObjectArg::SharedObject {
                mutable: other_mutable,
                ..
            }),
        ) => CallArg::Object(ObjectArg::SharedObject {
            object_id: *object_id,
            initial_shared_version: *initial_shared_version,
            mutable: *mutable || other_mutable,
        }),
        (
            CallArg::Object(ObjectArg::SharedObject {
                object_id,
                initial_shared_version,
                mutable,
            }),
            CallArg::UnresolvedObject(u),
        ) => CallArg::Object(ObjectArg::SharedObject {
            object_id: *object_id,
            initial_shared_version: *initial_shared_version,
            mutable: *mutable || u.mutable == Some(true),
        }),
        (CallArg::UnresolvedObject(u), CallArg::Object(obj)) => match obj {
            ObjectArg::SharedObject {
                object_id,
                initial_shared_version,
                mutable,
            } => CallArg::Object(ObjectArg::SharedObject {
                object_id,
                initial_shared_version,
                mutable: mutable || u.mutable == Some(true),
            }),
            resolved => CallArg::Object(resolved),
        },
        (CallArg::UnresolvedObject(a), CallArg::UnresolvedObject(b)) => {
            CallArg::UnresolvedObject(UnresolvedObject {
                object_id: a.object_id,
                version: a.version.or(b.version),
                digest: a.digest.clone().or(b.digest),
                initial_shared_version: a.initial_shared_version.or(b.initial_shared_version),
                mutable: match (a.mutable, b.mutable) {
                    (Some(true), _) | (_, Some(true)) => Some(true),
                    (x, y) => x.or(y),
                },
            })
        }
        (existing, incoming) => {
            if *existing != incoming {
                warn!(
                    existing = ?existing,
                    incoming = ?incoming,
                    "conflicting inputs for the same key, keeping the existing one"
                );
            }
            existing.clone()
        }
    }
}

/// Handle to the result(s) of a command added to a builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionResult {
    pub index: u16,
}

impl TransactionResult {
    /// `Result(index)`: the single return value.
    pub fn arg(&self) -> Argument {
        Argument::Result(self.index)
    }

    /// `NestedResult(index, k)`: the k-th return value.
    pub fn nested(&self, k: u16) -> Argument {
        Argument::NestedResult(self.index, k)
    }
}

impl From<TransactionResult> for Argument {
    fn from(result: TransactionResult) -> Self {
        result.arg()
    }
}

/// Mutable transaction graph.
#[derive(Debug, Clone, Default)]
pub struct TransactionDataBuilder {
    pub(crate) data: TransactionData,
    index: HashMap<InputKey, u16>,
}

impl PartialEq for TransactionDataBuilder {
    fn eq(&self, other: &Self) -> bool {
        self.data == other.data
    }
}

pub(crate) fn to_u16(value: usize, what: &'static str) -> Result<u16, BuildError> {
    u16::try_from(value).map_err(|_| BuildError::CapacityExceeded {
        what,
        len: value.saturating_add(1),
    })
}

impl TransactionDataBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap existing transaction data, indexing its inputs for deduplication.
    pub fn from_data(data: TransactionData) -> Result<Self, BuildError> {
        if data.inputs.len() > MAX_ENTRIES {
            return Err(BuildError::CapacityExceeded {
                what: "inputs",
                len: data.inputs.len(),
            });
        }
        if data.commands.len() > MAX_ENTRIES {
            return Err(BuildError::CapacityExceeded {
                what: "commands",
                len: data.commands.len(),
            });
        }
        let mut index = HashMap::new();
        for (i, input) in data.inputs.iter().enumerate() {
            if let Some(key) = input_key(input) {
                index.entry(key).or_insert(to_u16(i, "inputs")?);
            }
        }
        Ok(Self { data, index })
    }

    pub fn data(&self) -> &TransactionData {
        &self.data
    }

    pub fn into_data(self) -> TransactionData {
        self.data
    }

    pub fn inputs(&self) -> &[CallArg] {
        &self.data.inputs
    }

    pub fn commands(&self) -> &[Command] {
        &self.data.commands
    }

    /// Add an input, merging it into an existing entry with the same key.
    pub fn add_input(&mut self, arg: CallArg) -> Result<Argument, BuildError> {
        let key = input_key(&arg);
        if let Some(&existing) = key.as_ref().and_then(|k| self.index.get(k)) {
            let slot = &mut self.data.inputs[existing as usize];
            let merged = merge_inputs(slot, arg);
            if *slot != merged {
                debug!(input = existing, "upgraded deduplicated input");
                *slot = merged;
            }
            return Ok(Argument::Input(existing));
        }

        let idx = to_u16(self.data.inputs.len(), "inputs")?;
        self.data.inputs.push(arg);
        if let Some(key) = key {
            self.index.insert(key, idx);
        }
        Ok(Argument::Input(idx))
    }

    /// Replace an input in place. The replacement must refer to the same object.
    pub fn replace_input(&mut self, index: usize, arg: CallArg) -> Result<(), BuildError> {
        let len = self.data.inputs.len();
        let current = self
            .data
            .inputs
            .get(index)
            .ok_or(BuildError::InputIndexOutOfRange { index, len })?;
        if input_key(current) != input_key(&arg) {
            return Err(BuildError::InputKeyMismatch {
                index,
                expected: current
                    .object_id()
                    .map(|id| id.to_hex_literal())
                    .unwrap_or_else(|| "the same value".to_string()),
            });
        }
        self.data.inputs[index] = arg;
        Ok(())
    }

    /// Append a command and return a handle to its result.
    pub fn add_command(&mut self, command: Command) -> Result<TransactionResult, BuildError> {
        let index = to_u16(self.data.commands.len(), "commands")?;
        self.data.commands.push(command);
        Ok(TransactionResult { index })
    }

    // ---- input constructors ----

    /// BCS-encode a value as a pure input.
    pub fn pure<T: Serialize>(&mut self, value: &T) -> Result<Argument, BuildError> {
        let bytes = bcs::to_bytes(value)?;
        self.add_input(CallArg::Pure(bytes))
    }

    pub fn pure_u64(&mut self, value: u64) -> Result<Argument, BuildError> {
        self.pure(&value)
    }

    pub fn pure_address(&mut self, address: SuiAddress) -> Result<Argument, BuildError> {
        self.pure(&address)
    }

    /// An object referenced by id only, resolved at build time.
    pub fn object(&mut self, object_id: ObjectId) -> Result<Argument, BuildError> {
        self.add_input(CallArg::UnresolvedObject(UnresolvedObject::new(object_id)))
    }

    pub fn object_ref(&mut self, object_ref: ObjectRef) -> Result<Argument, BuildError> {
        self.add_input(CallArg::Object(ObjectArg::ImmOrOwnedObject(object_ref)))
    }

    pub fn shared_object_ref(
        &mut self,
        object_id: ObjectId,
        initial_shared_version: SequenceNumber,
        mutable: bool,
    ) -> Result<Argument, BuildError> {
        self.add_input(CallArg::Object(ObjectArg::SharedObject {
            object_id,
            initial_shared_version,
            mutable,
        }))
    }

    pub fn receiving_ref(&mut self, object_ref: ObjectRef) -> Result<Argument, BuildError> {
        self.add_input(CallArg::Object(ObjectArg::Receiving(object_ref)))
    }

    pub fn gas(&self) -> Argument {
        Argument::GasCoin
    }

    // ---- command constructors ----

    pub fn move_call(
        &mut self,
        package: ObjectId,
        module: &str,
        function: &str,
        type_arguments: Vec<TypeTag>,
        arguments: Vec<Argument>,
    ) -> Result<TransactionResult, BuildError> {
        let module =
            Identifier::new(module).map_err(|_| BuildError::InvalidIdentifier(module.to_string()))?;
        let function = Identifier::new(function)
            .map_err(|_| BuildError::InvalidIdentifier(function.to_string()))?;
        self.add_command(Command::MoveCall {
            package,
            module,
            function,
            type_arguments,
            arguments,
        })
    }

    pub fn split_coins(
        &mut self,
        coin: Argument,
        amounts: Vec<Argument>,
    ) -> Result<TransactionResult, BuildError> {
        self.add_command(Command::SplitCoins { coin, amounts })
    }

    pub fn merge_coins(
        &mut self,
        destination: Argument,
        sources: Vec<Argument>,
    ) -> Result<TransactionResult, BuildError> {
        self.add_command(Command::MergeCoins {
            destination,
            sources,
        })
    }

    pub fn transfer_objects(
        &mut self,
        objects: Vec<Argument>,
        address: Argument,
    ) -> Result<TransactionResult, BuildError> {
        self.add_command(Command::TransferObjects { objects, address })
    }

    pub fn make_move_vec(
        &mut self,
        type_tag: Option<TypeTag>,
        elements: Vec<Argument>,
    ) -> Result<TransactionResult, BuildError> {
        self.add_command(Command::MakeMoveVec { type_tag, elements })
    }

    pub fn publish(
        &mut self,
        modules: Vec<Vec<u8>>,
        dependencies: Vec<ObjectId>,
    ) -> Result<TransactionResult, BuildError> {
        self.add_command(Command::Publish {
            modules,
            dependencies,
        })
    }

    pub fn upgrade(
        &mut self,
        modules: Vec<Vec<u8>>,
        dependencies: Vec<ObjectId>,
        package: ObjectId,
        ticket: Argument,
    ) -> Result<TransactionResult, BuildError> {
        self.add_command(Command::Upgrade {
            modules,
            dependencies,
            package,
            ticket,
        })
    }

    /// Add a placeholder command for the intent pipeline.
    pub fn intent(
        &mut self,
        name: impl Into<String>,
        inputs: BTreeMap<String, Vec<Argument>>,
        data: IntentData,
    ) -> Result<TransactionResult, BuildError> {
        self.add_command(Command::Intent(IntentCommand {
            name: name.into(),
            inputs,
            data,
        }))
    }

    // ---- queries ----

    /// Ids of inputs a submission consumes exclusively.
    pub fn owned_object_ids(&self) -> Vec<ObjectId> {
        self.data
            .inputs
            .iter()
            .filter(|input| input.is_owned_object())
            .filter_map(CallArg::object_id)
            .collect()
    }

    /// Ids of every object input, owned or shared.
    pub fn object_ids(&self) -> HashSet<ObjectId> {
        self.data.inputs.iter().filter_map(CallArg::object_id).collect()
    }

    pub fn uses_gas_coin(&self) -> bool {
        self.data
            .commands
            .iter()
            .any(|cmd| cmd.arguments().into_iter().any(|a| *a == Argument::GasCoin))
    }

    pub fn has_intents(&self) -> bool {
        self.data.commands.iter().any(|c| c.as_intent().is_some())
    }

    /// Every `Input`/`Result` reference is in range and points backwards.
    pub fn validate(&self) -> Result<(), BuildError> {
        check_references(&self.data.commands, self.data.inputs.len())?;
        Ok(())
    }

    /// [`validate`](Self::validate), plus no intents or unresolved objects remain.
    pub fn validate_for_build(&self) -> Result<(), BuildError> {
        self.validate()?;
        if let Some((index, intent)) = self
            .data
            .commands
            .iter()
            .enumerate()
            .find_map(|(i, c)| c.as_intent().map(|intent| (i, intent)))
        {
            return Err(BuildError::UnresolvedIntent {
                index,
                name: intent.name.clone(),
            });
        }
        if let Some(index) = self.data.inputs.iter().position(CallArg::is_unresolved) {
            return Err(BuildError::UnresolvedObject { index });
        }
        Ok(())
    }

    // ---- envelope ----

    pub fn set_sender(&mut self, sender: SuiAddress) {
        self.data.sender = Some(sender);
    }

    pub fn set_sender_if_not_set(&mut self, sender: SuiAddress) {
        self.data.sender.get_or_insert(sender);
    }

    pub fn set_gas_budget(&mut self, budget: u64) {
        self.data.gas_data.budget = Some(budget);
    }

    pub fn set_gas_budget_if_not_set(&mut self, budget: u64) {
        self.data.gas_data.budget.get_or_insert(budget);
    }

    pub fn set_gas_price(&mut self, price: u64) {
        self.data.gas_data.price = Some(price);
    }

    pub fn set_gas_payment(&mut self, payment: Vec<ObjectRef>) {
        self.data.gas_data.payment = Some(payment);
    }

    pub fn set_gas_owner(&mut self, owner: SuiAddress) {
        self.data.gas_data.owner = Some(owner);
    }

    pub fn set_expiration(&mut self, expiration: TransactionExpiration) {
        self.data.expiration = expiration;
    }
}
