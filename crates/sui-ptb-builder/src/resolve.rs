//! Turning id-only object inputs into concrete object arguments.

use crate::builder::TransactionDataBuilder;
use crate::error::BuildError;
use crate::intents::ResolveContext;
use sui_ptb_types::{CallArg, ObjectArg, ObjectId, ObjectRef, Owner, UnresolvedObject};
use tracing::debug;

/// What the hints of an unresolved object already pin down, if enough.
fn from_hints(object: &UnresolvedObject) -> Option<ObjectArg> {
    if let Some(initial_shared_version) = object.initial_shared_version {
        return Some(ObjectArg::SharedObject {
            object_id: object.object_id,
            initial_shared_version,
            mutable: object.mutable.unwrap_or(true),
        });
    }
    match (object.version, &object.digest) {
        (Some(version), Some(digest)) => Some(ObjectArg::ImmOrOwnedObject(ObjectRef::new(
            object.object_id,
            version,
            digest.clone(),
        ))),
        _ => None,
    }
}

/// Resolve every [`CallArg::UnresolvedObject`] input in place.
///
/// Hint-complete inputs are resolved without a ledger round trip; the rest are
/// fetched with a single batched lookup. Nothing is written back unless every
/// input resolves.
pub async fn resolve_objects(
    tx: &mut TransactionDataBuilder,
    ctx: &ResolveContext<'_>,
) -> Result<(), BuildError> {
    let mut resolved: Vec<(usize, ObjectArg)> = Vec::new();
    let mut pending: Vec<(usize, UnresolvedObject)> = Vec::new();
    for (index, input) in tx.inputs().iter().enumerate() {
        let CallArg::UnresolvedObject(object) = input else {
            continue;
        };
        match from_hints(object) {
            Some(arg) => resolved.push((index, arg)),
            None => pending.push((index, object.clone())),
        }
    }

    if !pending.is_empty() {
        let client = ctx.client("object inputs")?;
        let ids: Vec<ObjectId> = pending.iter().map(|(_, o)| o.object_id).collect();
        let infos = client.get_objects(&ids).await.map_err(BuildError::Client)?;
        for ((index, object), info) in pending.into_iter().zip(infos) {
            let info = info.ok_or(BuildError::ObjectNotFound(object.object_id))?;
            let arg = match info.owner {
                Owner::Shared {
                    initial_shared_version,
                } => ObjectArg::SharedObject {
                    object_id: object.object_id,
                    initial_shared_version,
                    mutable: object.mutable.unwrap_or(true),
                },
                Owner::AddressOwner(_) | Owner::ObjectOwner(_) | Owner::Immutable => {
                    ObjectArg::ImmOrOwnedObject(info.object_ref)
                }
            };
            resolved.push((index, arg));
        }
    }

    if resolved.is_empty() {
        return Ok(());
    }
    debug!(count = resolved.len(), "resolved object inputs");
    for (index, arg) in resolved {
        tx.replace_input(index, CallArg::Object(arg))?;
    }
    Ok(())
}
