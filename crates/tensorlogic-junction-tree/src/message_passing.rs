//! Two-sweep message passing over clique trees.
//!
//! The scheduler visits every clique in elimination order and then in
//! reverse. A clique emits a message as soon as it has heard from all but
//! one neighbor, so the forward sweep carries evidence toward the roots and
//! the backward sweep distributes it back to the leaves.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::clique_tree::{CliqueTree, SeparatorSet};
use crate::error::{PgmError, Result};
use crate::factor::Factor;

/// Semiring used to combine messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InferenceMode {
    /// Sum out separated variables (marginals, partition function)
    SumProduct,
    /// Max out separated variables (max-marginals)
    MaxProduct,
}

/// Runs the upward/downward message schedule on a clique tree.
#[derive(Debug, Clone)]
pub struct MessagePassingScheduler {
    mode: InferenceMode,
}

impl MessagePassingScheduler {
    pub fn new(mode: InferenceMode) -> Self {
        Self { mode }
    }

    pub fn sum_product() -> Self {
        Self::new(InferenceMode::SumProduct)
    }

    pub fn max_product() -> Self {
        Self::new(InferenceMode::MaxProduct)
    }

    pub fn mode(&self) -> InferenceMode {
        self.mode
    }

    /// Pass messages along the elimination order and back, returning the
    /// roots: cliques that had heard from every neighbor before sending
    /// anything.
    pub fn run(&self, tree: &mut CliqueTree) -> Result<BTreeSet<usize>> {
        tree.begin_message_passing()?;

        let order = tree.elimination_order().to_vec();
        let mut roots = BTreeSet::new();
        for &clique in order.iter().chain(order.iter().rev()) {
            if !tree.has_sent_any(clique) && tree.has_received_all(clique) {
                roots.insert(clique);
            }
            self.pass_messages(tree, clique)?;
        }

        tracing::debug!(mode = ?self.mode, roots = ?roots, "message passing finished");
        Ok(roots)
    }

    fn pass_messages(&self, tree: &mut CliqueTree, clique: usize) -> Result<()> {
        let computable = {
            let inbound = tree.inbound_messages(clique);
            tree.clique(clique)
                .factor()
                .computable_outbound_messages(&inbound)
        };

        for separator in computable {
            if tree.message(clique, separator.end()).is_some() {
                continue;
            }
            let message = self.compute_message(tree, &separator)?;
            tracing::trace!(
                from = separator.start(),
                to = separator.end(),
                separator = ?separator.variables(),
                "computed message"
            );
            tree.add_message(separator.start(), separator.end(), message)?;
        }
        Ok(())
    }

    /// Message across `separator`: the sender's running marginal with
    /// everything outside the separator eliminated, divided by the reverse
    /// message if that is already part of the marginal.
    fn compute_message(&self, tree: &mut CliqueTree, separator: &SeparatorSet) -> Result<Factor> {
        let (start, end) = (separator.start(), separator.end());
        tree.fold_messages(start, Some(end))?;

        let clique = tree.clique(start);
        let message = match self.mode {
            InferenceMode::SumProduct => clique.marginal().marginalize_to(separator.variables()),
            InferenceMode::MaxProduct => clique
                .marginal()
                .max_marginalize_to(separator.variables()),
        };

        if clique.folded_neighbors().contains(&end) {
            let reverse = tree
                .message(end, start)
                .ok_or(PgmError::InvalidMessageOrder {
                    from: end,
                    to: start,
                })?;
            return message.divide(reverse);
        }
        Ok(message)
    }
}
