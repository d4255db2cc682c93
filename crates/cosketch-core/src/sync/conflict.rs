//! Conflict resolution between concurrent operations.

use std::collections::HashMap;

use crate::config::ResolutionStrategy;
use crate::sync::operation::SyncOperation;

/// Orders or filters operations touching the same elements.
pub trait ConflictResolver {
    /// Resolve a batch of operations. The result lists the operations to
    /// apply, in application order.
    fn resolve(&self, ops: Vec<SyncOperation>) -> Vec<SyncOperation>;

    fn name(&self) -> &'static str;
}

/// Keeps only the winning operation per element.
#[derive(Debug, Clone, Copy, Default)]
pub struct LastWriteWins;

impl ConflictResolver for LastWriteWins {
    fn resolve(&self, ops: Vec<SyncOperation>) -> Vec<SyncOperation> {
        let mut winners: Vec<SyncOperation> = Vec::new();
        let mut slot: HashMap<String, usize> = HashMap::new();
        for op in ops {
            match slot.get(&op.element_id) {
                Some(&i) => {
                    if op.supersedes(&winners[i]) {
                        winners[i] = op;
                    }
                }
                None => {
                    slot.insert(op.element_id.clone(), winners.len());
                    winners.push(op);
                }
            }
        }
        winners
    }

    fn name(&self) -> &'static str {
        "last-write-wins"
    }
}

/// Keeps every operation, ordered by precedence, and records on each one the
/// earlier operations it follows for the same element.
#[derive(Debug, Clone, Copy, Default)]
pub struct CausalTransform;

impl ConflictResolver for CausalTransform {
    fn resolve(&self, mut ops: Vec<SyncOperation>) -> Vec<SyncOperation> {
        ops.sort_by(|a, b| a.precedence(b));
        for later in 0..ops.len() {
            for earlier in 0..later {
                if ops[earlier].element_id != ops[later].element_id
                    || ops[earlier].timestamp >= ops[later].timestamp
                {
                    continue;
                }
                let dep = ops[earlier].id.clone();
                if !ops[later].dependencies.contains(&dep) {
                    ops[later].dependencies.push(dep);
                }
            }
        }
        ops
    }

    fn name(&self) -> &'static str {
        "causal-transform"
    }
}

/// Resolver for a configured strategy.
pub fn resolver_for(strategy: ResolutionStrategy) -> Box<dyn ConflictResolver> {
    match strategy {
        ResolutionStrategy::LastWriteWins => Box::new(LastWriteWins),
        ResolutionStrategy::CausalTransform => Box::new(CausalTransform),
    }
}
