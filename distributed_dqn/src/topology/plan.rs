//! Static layout of a run: which nodes exist and how they are wired.
//!
//! ```text
//!                      ┌─────────┐
//!              ┌──────►│ replay  │◄───────────── learner ──► counter
//!              │       └─────────┘                  │
//!   actor i ───┘                                    ▼ publish
//!      ▲                                     ┌──────────────┐
//!      └── cache (i mod num_caches) ◄────────┤ variable slot│◄── evaluator j
//!                                            └──────────────┘
//! ```

use crate::config::{ConfigError, DistributedDqnConfig};
use crate::environment::EnvironmentVariant;

/// One actor's place in the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct ActorNode {
    pub actor_id: usize,
    /// Index of the variable cache this actor reads through
    pub cache: usize,
    /// Final epsilon of this actor's anneal
    pub epsilon: f64,
}

/// One evaluator's place in the topology.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluatorNode {
    pub evaluator_id: usize,
    pub variant: EnvironmentVariant,
    pub epsilon: f64,
}

/// Validated node layout derived from a configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct TopologyPlan {
    pub num_caches: usize,
    pub actors: Vec<ActorNode>,
    pub evaluators: Vec<EvaluatorNode>,
}

impl TopologyPlan {
    /// Lay out the nodes for `config`.
    ///
    /// Actors are dealt round-robin over the caches, so cache loads differ
    /// by at most one.
    pub fn build(config: &DistributedDqnConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let epsilons = config.epsilon_spread.epsilons(config.num_actors);
        let actors = epsilons
            .into_iter()
            .enumerate()
            .map(|(actor_id, epsilon)| ActorNode {
                actor_id,
                cache: actor_id % config.num_caches,
                epsilon,
            })
            .collect();

        let evaluators = (0..config.num_evaluators)
            .map(|evaluator_id| EvaluatorNode {
                evaluator_id,
                variant: EnvironmentVariant::for_evaluator(evaluator_id),
                epsilon: config.evaluator_epsilon,
            })
            .collect();

        Ok(Self {
            num_caches: config.num_caches,
            actors,
            evaluators,
        })
    }

    /// Number of actors reading through each cache.
    pub fn cache_loads(&self) -> Vec<usize> {
        let mut loads = vec![0; self.num_caches];
        for actor in &self.actors {
            loads[actor.cache] += 1;
        }
        loads
    }

    /// Actors wired to `cache`.
    pub fn actors_on_cache(&self, cache: usize) -> impl Iterator<Item = &ActorNode> {
        self.actors.iter().filter(move |a| a.cache == cache)
    }

    /// Thread names of every node, in launch order.
    pub fn node_names(&self) -> Vec<String> {
        let mut names = vec!["counter".to_string(), "learner".to_string()];
        names.extend(self.actors.iter().map(|a| format!("actor-{}", a.actor_id)));
        names.extend(
            self.evaluators
                .iter()
                .map(|e| format!("evaluator-{}", e.evaluator_id)),
        );
        names
    }
}
