//! Identifiers, object references, and Move type helpers.

use anyhow::{anyhow, bail, Result};
use move_core_types::account_address::AccountAddress;
use move_core_types::ident_str;
use move_core_types::identifier::Identifier;
use move_core_types::language_storage::{StructTag, TypeTag};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for ledger objects.
pub type ObjectId = AccountAddress;

/// Account address of a transaction sender or object owner.
pub type SuiAddress = AccountAddress;

/// Object version as assigned by the ledger.
pub type SequenceNumber = u64;

/// Address of the Sui framework package (`0x2`).
pub const SUI_FRAMEWORK_ADDRESS: AccountAddress = {
    let mut bytes = [0u8; AccountAddress::LENGTH];
    bytes[AccountAddress::LENGTH - 1] = 2;
    AccountAddress::new(bytes)
};

/// A concrete, versioned reference to an object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ObjectRef {
    pub object_id: ObjectId,
    pub version: SequenceNumber,
    pub digest: String,
}

impl ObjectRef {
    pub fn new(object_id: ObjectId, version: SequenceNumber, digest: impl Into<String>) -> Self {
        Self {
            object_id,
            version,
            digest: digest.into(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}#{}",
            self.object_id.to_hex_literal(),
            self.version,
            self.digest
        )
    }
}

fn framework_struct(module: Identifier, name: Identifier, type_params: Vec<TypeTag>) -> TypeTag {
    TypeTag::Struct(Box::new(StructTag {
        address: SUI_FRAMEWORK_ADDRESS,
        module,
        name,
        type_params,
    }))
}

/// `0x2::sui::SUI`
pub fn sui_type() -> TypeTag {
    framework_struct(
        ident_str!("sui").to_owned(),
        ident_str!("SUI").to_owned(),
        vec![],
    )
}

/// `0x2::coin::Coin<T>`
pub fn coin_type(inner: TypeTag) -> TypeTag {
    framework_struct(
        ident_str!("coin").to_owned(),
        ident_str!("Coin").to_owned(),
        vec![inner],
    )
}

/// `0x2::balance::Balance<T>`
pub fn balance_type(inner: TypeTag) -> TypeTag {
    framework_struct(
        ident_str!("balance").to_owned(),
        ident_str!("Balance").to_owned(),
        vec![inner],
    )
}

/// Parse a Move type string into a [`TypeTag`].
///
/// Accepts primitives, `vector<T>`, and struct types with short or long
/// addresses (`0x2::coin::Coin<0x2::sui::SUI>`).
pub fn parse_type_tag(type_str: &str) -> Result<TypeTag> {
    let type_str = type_str.trim();

    match type_str {
        "bool" => return Ok(TypeTag::Bool),
        "u8" => return Ok(TypeTag::U8),
        "u16" => return Ok(TypeTag::U16),
        "u32" => return Ok(TypeTag::U32),
        "u64" => return Ok(TypeTag::U64),
        "u128" => return Ok(TypeTag::U128),
        "u256" => return Ok(TypeTag::U256),
        "address" => return Ok(TypeTag::Address),
        "signer" => return Ok(TypeTag::Signer),
        _ => {}
    }

    if let Some(inner) = type_str
        .strip_prefix("vector<")
        .and_then(|s| s.strip_suffix('>'))
    {
        return Ok(TypeTag::Vector(Box::new(parse_type_tag(inner)?)));
    }

    let (base, params) = match type_str.find('<') {
        Some(pos) => {
            let args = type_str[pos..]
                .strip_prefix('<')
                .and_then(|s| s.strip_suffix('>'))
                .ok_or_else(|| anyhow!("Unbalanced type arguments in '{}'", type_str))?;
            (&type_str[..pos], split_type_params(args))
        }
        None => (type_str, Vec::new()),
    };

    let parts: Vec<&str> = base.split("::").collect();
    if parts.len() != 3 {
        bail!("Invalid struct type '{}': expected address::module::name", type_str);
    }

    let address = AccountAddress::from_hex_literal(parts[0])
        .map_err(|e| anyhow!("Invalid address in type '{}': {}", type_str, e))?;
    let module = Identifier::new(parts[1])?;
    let name = Identifier::new(parts[2])?;
    let type_params = params
        .into_iter()
        .map(parse_type_tag)
        .collect::<Result<Vec<_>>>()?;

    Ok(TypeTag::Struct(Box::new(StructTag {
        address,
        module,
        name,
        type_params,
    })))
}

/// Split `A, B<C, D>, E` into its top-level parameters.
fn split_type_params(s: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (i, c) in s.char_indices() {
        match c {
            '<' => depth += 1,
            '>' => depth -= 1,
            ',' if depth == 0 => {
                result.push(s[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }

    let last = s[start..].trim();
    if !last.is_empty() {
        result.push(last);
    }
    result
}
