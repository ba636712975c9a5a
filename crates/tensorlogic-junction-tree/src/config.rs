//! Junction tree configuration.
//!
//! Controls the choices clique tree construction makes when several
//! cliques qualify as merge targets, how disconnected components are
//! treated, and whether a graph's elimination hint is honoured.

use serde::{Deserialize, Serialize};

/// Rule for choosing the merge target when several cliques qualify.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum MergeTieBreak {
    /// Clique whose factor has the fewest non-zero entries, then lowest index
    /// - Keeps intermediate products sparse
    #[default]
    SmallestSize,

    /// Lowest clique index
    /// - Independent of factor contents
    LowestIndex,
}

/// Configuration for [`JunctionTree`](crate::JunctionTree).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JunctionTreeConfig {
    /// Merge target selection
    pub tie_break: MergeTieBreak,

    /// Join disconnected components with empty-separator edges, producing a
    /// single tree with one root instead of a forest
    pub link_components: bool,

    /// Use the factor graph's elimination hint as the message schedule
    pub use_elimination_hint: bool,
}

impl Default for JunctionTreeConfig {
    fn default() -> Self {
        Self {
            tie_break: MergeTieBreak::SmallestSize,
            link_components: false,
            use_elimination_hint: true,
        }
    }
}

impl JunctionTreeConfig {
    /// Create the default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the merge tie-break rule.
    pub fn with_tie_break(mut self, tie_break: MergeTieBreak) -> Self {
        self.tie_break = tie_break;
        self
    }

    /// Link disconnected components into one tree.
    pub fn with_link_components(mut self, enabled: bool) -> Self {
        self.link_components = enabled;
        self
    }

    /// Honour (or ignore) elimination hints.
    pub fn with_elimination_hint(mut self, enabled: bool) -> Self {
        self.use_elimination_hint = enabled;
        self
    }
}
