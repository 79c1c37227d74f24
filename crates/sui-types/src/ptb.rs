//! Programmable transaction reference model.
//!
//! A transaction is an ordered list of [`Command`]s over a deduplicated table of
//! inputs ([`CallArg`]). Commands refer to inputs and to each other's results
//! through [`Argument`], which is always a plain index. A command may only
//! reference results of commands that precede it.

use crate::base::{ObjectId, ObjectRef, SequenceNumber};
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::TypeTag;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A reference to a value available to a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Argument {
    /// The gas coin, injected at submission time.
    GasCoin,
    /// The i-th entry of the input table.
    Input(u16),
    /// The (only) result of command c.
    Result(u16),
    /// The k-th result of command c.
    NestedResult(u16, u16),
}

impl Argument {
    /// Index of the command this argument reads from, if it is a result reference.
    pub fn command_index(&self) -> Option<u16> {
        match self {
            Argument::Result(c) | Argument::NestedResult(c, _) => Some(*c),
            Argument::GasCoin | Argument::Input(_) => None,
        }
    }

    pub fn input_index(&self) -> Option<u16> {
        match self {
            Argument::Input(i) => Some(*i),
            _ => None,
        }
    }
}

/// A resolved object input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ObjectArg {
    /// An immutable or address-owned object at a fixed version.
    ImmOrOwnedObject(ObjectRef),
    /// A shared object; the ledger sequences access to it.
    SharedObject {
        object_id: ObjectId,
        initial_shared_version: SequenceNumber,
        mutable: bool,
    },
    /// An object previously sent to the sender, to be received by this transaction.
    Receiving(ObjectRef),
}

impl ObjectArg {
    pub fn object_id(&self) -> ObjectId {
        match self {
            ObjectArg::ImmOrOwnedObject(r) | ObjectArg::Receiving(r) => r.object_id,
            ObjectArg::SharedObject { object_id, .. } => *object_id,
        }
    }
}

/// An object referenced by id, with whatever is already known about it.
///
/// Resolved into an [`ObjectArg`] before the transaction is serialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedObject {
    pub object_id: ObjectId,
    pub version: Option<SequenceNumber>,
    pub digest: Option<String>,
    pub initial_shared_version: Option<SequenceNumber>,
    pub mutable: Option<bool>,
}

impl UnresolvedObject {
    pub fn new(object_id: ObjectId) -> Self {
        Self {
            object_id,
            version: None,
            digest: None,
            initial_shared_version: None,
            mutable: None,
        }
    }

    /// Whether this object is known to be shared.
    pub fn is_shared(&self) -> bool {
        self.initial_shared_version.is_some()
    }
}

/// Whose address balance a withdrawal is charged against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WithdrawFrom {
    Sender,
    Sponsor,
}

/// A reservation against an address-level balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsWithdrawal {
    /// Upper bound of the amount that may be withdrawn.
    pub max_amount: u64,
    /// `0x2::balance::Balance<T>` of the withdrawn coin type.
    pub balance_type: TypeTag,
    pub withdraw_from: WithdrawFrom,
}

/// One slot of the input table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallArg {
    /// BCS-encoded scalar or vector data.
    Pure(Vec<u8>),
    Object(ObjectArg),
    UnresolvedObject(UnresolvedObject),
    FundsWithdrawal(FundsWithdrawal),
}

impl CallArg {
    /// Id of the object this input refers to, if any.
    pub fn object_id(&self) -> Option<ObjectId> {
        match self {
            CallArg::Object(obj) => Some(obj.object_id()),
            CallArg::UnresolvedObject(u) => Some(u.object_id),
            CallArg::Pure(_) | CallArg::FundsWithdrawal(_) => None,
        }
    }

    /// Whether the input still needs a ledger lookup before serialization.
    pub fn is_unresolved(&self) -> bool {
        matches!(self, CallArg::UnresolvedObject(_))
    }

    /// Whether this input is consumed exclusively by the transaction that uses it.
    pub fn is_owned_object(&self) -> bool {
        match self {
            CallArg::Object(ObjectArg::ImmOrOwnedObject(_)) => true,
            CallArg::Object(ObjectArg::Receiving(_)) => true,
            CallArg::UnresolvedObject(u) => !u.is_shared(),
            _ => false,
        }
    }
}

/// The coin a `CoinWithBalance` intent draws from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoinKind {
    /// SUI, split off the gas coin.
    Gas,
    /// Any coin type `T` (the inner type of `Coin<T>`).
    Coin(TypeTag),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinWithBalanceData {
    pub coin: CoinKind,
    pub balance: u64,
}

/// Payload carried by an intent placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum IntentData {
    CoinWithBalance(CoinWithBalanceData),
    /// Payload of a resolver registered by the caller.
    Custom(serde_json::Value),
}

/// A placeholder command, rewritten into real commands before submission.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentCommand {
    pub name: String,
    pub inputs: BTreeMap<String, Vec<Argument>>,
    pub data: IntentData,
}

/// A command in a programmable transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    /// Call a Move function
    MoveCall {
        package: ObjectId,
        module: Identifier,
        function: Identifier,
        type_arguments: Vec<TypeTag>,
        arguments: Vec<Argument>,
    },

    /// Transfer objects to an address.
    TransferObjects {
        objects: Vec<Argument>,
        address: Argument,
    },

    /// Split a coin into multiple coins with specified amounts.
    /// Returns one coin per amount.
    SplitCoins {
        coin: Argument,
        amounts: Vec<Argument>,
    },

    /// Merge source coins into the destination coin.
    MergeCoins {
        destination: Argument,
        sources: Vec<Argument>,
    },

    /// Publish new modules.
    Publish {
        modules: Vec<Vec<u8>>,
        dependencies: Vec<ObjectId>,
    },

    /// Create a vector from elements.
    /// If type_tag is None, it's inferred from elements.
    MakeMoveVec {
        type_tag: Option<TypeTag>,
        elements: Vec<Argument>,
    },

    /// Upgrade an existing package with an upgrade ticket.
    Upgrade {
        modules: Vec<Vec<u8>>,
        dependencies: Vec<ObjectId>,
        package: ObjectId,
        ticket: Argument,
    },

    /// Placeholder resolved by the intent pipeline; never sent to the network.
    Intent(IntentCommand),
}

impl Command {
    /// Short name of the command kind, for logs and errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Command::MoveCall { .. } => "MoveCall",
            Command::TransferObjects { .. } => "TransferObjects",
            Command::SplitCoins { .. } => "SplitCoins",
            Command::MergeCoins { .. } => "MergeCoins",
            Command::Publish { .. } => "Publish",
            Command::MakeMoveVec { .. } => "MakeMoveVec",
            Command::Upgrade { .. } => "Upgrade",
            Command::Intent(_) => "Intent",
        }
    }

    pub fn as_intent(&self) -> Option<&IntentCommand> {
        match self {
            Command::Intent(intent) => Some(intent),
            _ => None,
        }
    }

    /// Every argument of the command, in a stable order.
    ///
    /// The order matches [`Command::arguments_mut`].
    pub fn arguments(&self) -> Vec<&Argument> {
        match self {
            Command::MoveCall { arguments, .. } => arguments.iter().collect(),
            Command::TransferObjects { objects, address } => {
                objects.iter().chain(std::iter::once(address)).collect()
            }
            Command::SplitCoins { coin, amounts } => {
                std::iter::once(coin).chain(amounts.iter()).collect()
            }
            Command::MergeCoins {
                destination,
                sources,
            } => std::iter::once(destination).chain(sources.iter()).collect(),
            Command::Publish { .. } => Vec::new(),
            Command::MakeMoveVec { elements, .. } => elements.iter().collect(),
            Command::Upgrade { ticket, .. } => vec![ticket],
            Command::Intent(intent) => intent.inputs.values().flatten().collect(),
        }
    }

    pub fn arguments_mut(&mut self) -> Vec<&mut Argument> {
        match self {
            Command::MoveCall { arguments, .. } => arguments.iter_mut().collect(),
            Command::TransferObjects { objects, address } => {
                objects.iter_mut().chain(std::iter::once(address)).collect()
            }
            Command::SplitCoins { coin, amounts } => {
                std::iter::once(coin).chain(amounts.iter_mut()).collect()
            }
            Command::MergeCoins {
                destination,
                sources,
            } => std::iter::once(destination)
                .chain(sources.iter_mut())
                .collect(),
            Command::Publish { .. } => Vec::new(),
            Command::MakeMoveVec { elements, .. } => elements.iter_mut().collect(),
            Command::Upgrade { ticket, .. } => vec![ticket],
            Command::Intent(intent) => intent.inputs.values_mut().flatten().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use move_core_types::account_address::AccountAddress;

    #[test]
    fn test_argument_order_is_stable() {
        let mut cmd = Command::TransferObjects {
            objects: vec![Argument::Result(0), Argument::NestedResult(1, 2)],
            address: Argument::Input(3),
        };
        let read: Vec<Argument> = cmd.arguments().into_iter().copied().collect();
        let written: Vec<Argument> = cmd.arguments_mut().into_iter().map(|a| *a).collect();
        assert_eq!(read, written);
        assert_eq!(read.last(), Some(&Argument::Input(3)));
    }

    #[test]
    fn test_intent_arguments_are_visited() {
        let mut inputs = BTreeMap::new();
        inputs.insert("coin".to_string(), vec![Argument::Result(4)]);
        let mut cmd = Command::Intent(IntentCommand {
            name: "Custom".into(),
            inputs,
            data: IntentData::Custom(serde_json::json!({"k": 1})),
        });
        for arg in cmd.arguments_mut() {
            *arg = Argument::Result(5);
        }
        assert_eq!(cmd.arguments(), vec![&Argument::Result(5)]);
    }

    #[test]
    fn test_owned_object_classification() {
        let id = AccountAddress::from_hex_literal("0x42").unwrap();
        let owned = CallArg::Object(ObjectArg::ImmOrOwnedObject(ObjectRef::new(id, 1, "d")));
        let shared = CallArg::Object(ObjectArg::SharedObject {
            object_id: id,
            initial_shared_version: 1,
            mutable: true,
        });
        let mut unresolved = UnresolvedObject::new(id);
        assert!(owned.is_owned_object());
        assert!(!shared.is_owned_object());
        assert!(CallArg::UnresolvedObject(unresolved.clone()).is_owned_object());
        unresolved.initial_shared_version = Some(3);
        assert!(!CallArg::UnresolvedObject(unresolved).is_owned_object());
        assert!(!CallArg::Pure(vec![1]).is_owned_object());
    }

    #[test]
    fn test_command_bcs_roundtrip() {
        let cmd = Command::SplitCoins {
            coin: Argument::GasCoin,
            amounts: vec![Argument::Input(0), Argument::Input(1)],
        };
        let bytes = bcs::to_bytes(&cmd).unwrap();
        let decoded: Command = bcs::from_bytes(&bytes).unwrap();
        assert_eq!(decoded, cmd);
    }
}
