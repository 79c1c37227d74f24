//! Intent resolution pipeline.
//!
//! An intent is a placeholder [`Command::Intent`](sui_ptb_types::Command::Intent)
//! that a registered [`IntentResolver`] rewrites into real commands right before
//! the transaction is finalized. Resolvers form a middleware chain: each one gets
//! the graph and a [`Next`] continuation, may do work before and after calling
//! it, and must have removed every intent carrying its name by the time it returns.

pub mod coin_with_balance;

use crate::builder::TransactionDataBuilder;
use crate::error::BuildError;
use std::collections::HashMap;
use std::sync::Arc;
use sui_transport::LedgerClient;
use tracing::debug;

pub use coin_with_balance::{CoinWithBalance, CoinWithBalanceResolver, COIN_WITH_BALANCE};

/// What resolvers may use while rewriting a graph.
#[derive(Clone, Copy, Default)]
pub struct ResolveContext<'a> {
    pub client: Option<&'a dyn LedgerClient>,
}

impl<'a> ResolveContext<'a> {
    pub fn new(client: &'a dyn LedgerClient) -> Self {
        Self {
            client: Some(client),
        }
    }

    /// A context without ledger access; only hint-complete graphs can be built.
    pub fn offline() -> Self {
        Self { client: None }
    }

    /// The ledger client, or an error naming what needed it.
    pub fn client(&self, purpose: &'static str) -> Result<&'a dyn LedgerClient, BuildError> {
        self.client.ok_or(BuildError::MissingClient(purpose))
    }
}

/// Rewrites intents with a given name into concrete commands.
#[async_trait::async_trait]
pub trait IntentResolver: Send + Sync {
    async fn resolve(
        &self,
        tx: &mut TransactionDataBuilder,
        ctx: &ResolveContext<'_>,
        next: Next<'_>,
    ) -> Result<(), BuildError>;
}

/// The rest of the resolver chain.
pub struct Next<'a> {
    chain: &'a [(String, Arc<dyn IntentResolver>)],
}

impl Next<'_> {
    /// Run the remaining resolvers in order.
    pub async fn run(
        self,
        tx: &mut TransactionDataBuilder,
        ctx: &ResolveContext<'_>,
    ) -> Result<(), BuildError> {
        let Some(((name, resolver), rest)) = self.chain.split_first() else {
            return Ok(());
        };
        debug!(intent = %name, "resolving intents");
        resolver.resolve(tx, ctx, Next { chain: rest }).await?;
        if let Some(index) = first_intent(tx, Some(name.as_str())) {
            return Err(BuildError::UnresolvedIntent {
                index,
                name: name.clone(),
            });
        }
        Ok(())
    }
}

fn first_intent(tx: &TransactionDataBuilder, name: Option<&str>) -> Option<usize> {
    tx.commands().iter().position(|c| {
        c.as_intent()
            .is_some_and(|intent| name.map_or(true, |n| intent.name == n))
    })
}

/// Registry of intent resolvers, keyed by intent name.
#[derive(Clone, Default)]
pub struct IntentPipeline {
    resolvers: HashMap<String, Arc<dyn IntentResolver>>,
}

impl std::fmt::Debug for IntentPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.resolvers.keys().collect();
        names.sort();
        f.debug_struct("IntentPipeline")
            .field("resolvers", &names)
            .finish()
    }
}

impl IntentPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `resolver` for intents named `name`, replacing any previous one.
    pub fn register(&mut self, name: impl Into<String>, resolver: Arc<dyn IntentResolver>) {
        self.resolvers.insert(name.into(), resolver);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.resolvers.contains_key(name)
    }

    /// Run the resolver of every distinct intent name in the graph, in order of
    /// first appearance. Each resolver runs exactly once.
    pub async fn resolve(
        &self,
        tx: &mut TransactionDataBuilder,
        ctx: &ResolveContext<'_>,
    ) -> Result<(), BuildError> {
        let mut chain: Vec<(String, Arc<dyn IntentResolver>)> = Vec::new();
        for command in tx.commands() {
            let Some(intent) = command.as_intent() else {
                continue;
            };
            if chain.iter().any(|(name, _)| *name == intent.name) {
                continue;
            }
            let resolver = self
                .resolvers
                .get(&intent.name)
                .ok_or_else(|| BuildError::MissingResolver {
                    name: intent.name.clone(),
                })?;
            chain.push((intent.name.clone(), Arc::clone(resolver)));
        }
        if chain.is_empty() {
            return Ok(());
        }

        Next { chain: &chain }.run(tx, ctx).await?;

        if let Some(index) = first_intent(tx, None) {
            let name = tx.commands()[index]
                .as_intent()
                .map(|i| i.name.clone())
                .unwrap_or_default();
            return Err(BuildError::UnresolvedIntent { index, name });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surgery::ResultMapping;
    use std::collections::BTreeMap;
    use std::sync::Mutex;
    use sui_ptb_types::{Argument, Command, IntentData};

    type Log = Mutex<Vec<String>>;

    /// Replaces each of its intents with an empty `MakeMoveVec`.
    struct Replace {
        name: &'static str,
        log: Arc<Log>,
    }

    #[async_trait::async_trait]
    impl IntentResolver for Replace {
        async fn resolve(
            &self,
            tx: &mut TransactionDataBuilder,
            ctx: &ResolveContext<'_>,
            next: Next<'_>,
        ) -> Result<(), BuildError> {
            self.log.lock().unwrap().push(format!("{}:before", self.name));
            while let Some(index) = first_intent(tx, Some(self.name)) {
                tx.replace_command(
                    index,
                    vec![Command::MakeMoveVec {
                        type_tag: None,
                        elements: vec![],
                    }],
                    ResultMapping::default(),
                )?;
            }
            next.run(tx, ctx).await?;
            self.log.lock().unwrap().push(format!("{}:after", self.name));
            Ok(())
        }
    }

    /// Calls `next` without touching the graph.
    struct Lazy;

    #[async_trait::async_trait]
    impl IntentResolver for Lazy {
        async fn resolve(
            &self,
            tx: &mut TransactionDataBuilder,
            ctx: &ResolveContext<'_>,
            next: Next<'_>,
        ) -> Result<(), BuildError> {
            next.run(tx, ctx).await
        }
    }

    fn add_intent(tx: &mut TransactionDataBuilder, name: &str) {
        tx.intent(name, BTreeMap::new(), IntentData::Custom(serde_json::json!({})))
            .unwrap();
    }

    #[tokio::test]
    async fn test_resolvers_run_once_in_order_as_middleware() {
        let log = Arc::new(Log::default());
        let mut pipeline = IntentPipeline::new();
        pipeline.register("A", Arc::new(Replace { name: "A", log: log.clone() }));
        pipeline.register("B", Arc::new(Replace { name: "B", log: log.clone() }));

        let mut tx = TransactionDataBuilder::new();
        add_intent(&mut tx, "B");
        add_intent(&mut tx, "A");
        add_intent(&mut tx, "B");
        tx.merge_coins(Argument::GasCoin, vec![Argument::Result(2)])
            .unwrap();

        pipeline
            .resolve(&mut tx, &ResolveContext::offline())
            .await
            .unwrap();

        assert_eq!(*log.lock().unwrap(), vec!["B:before", "A:before", "A:after", "B:after"]);
        assert!(!tx.has_intents());
        assert_eq!(tx.commands().len(), 4);
    }

    #[tokio::test]
    async fn test_missing_resolver_is_an_error() {
        let pipeline = IntentPipeline::new();
        let mut tx = TransactionDataBuilder::new();
        add_intent(&mut tx, "Unknown");
        let err = pipeline
            .resolve(&mut tx, &ResolveContext::offline())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::MissingResolver { ref name } if name == "Unknown"));
    }

    #[tokio::test]
    async fn test_resolver_that_leaves_its_intent_fails() {
        let mut pipeline = IntentPipeline::new();
        pipeline.register("Lazy", Arc::new(Lazy));
        let mut tx = TransactionDataBuilder::new();
        add_intent(&mut tx, "Lazy");
        let err = pipeline
            .resolve(&mut tx, &ResolveContext::offline())
            .await
            .unwrap_err();
        assert!(matches!(err, BuildError::UnresolvedIntent { index: 0, .. }));
        assert_eq!(err.stage(), crate::error::ErrorStage::Structural);
    }

    #[test]
    fn test_offline_context_has_no_client() {
        let ctx = ResolveContext::offline();
        assert!(matches!(
            ctx.client("coin selection"),
            Err(BuildError::MissingClient("coin selection"))
        ));
    }
}
