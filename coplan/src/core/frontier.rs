//! Worklist of action pairs waiting to be expanded.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::core::tree::PairIdx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchOrder {
    /// New pairs go before the remaining ones.
    DepthFirst,
    /// New pairs go after the remaining ones.
    BreadthFirst,
}

impl SearchOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SearchOrder::DepthFirst => "depth_first",
            SearchOrder::BreadthFirst => "breadth_first",
        }
    }
}

/// Counters shared by the search drivers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub expansions: usize,
    /// Largest deduplicated world set met while expanding.
    pub max_worlds: usize,
    /// The expansion bound stopped the search with pairs left to explore.
    pub truncated: bool,
}

impl SearchStats {
    /// True when `limit` forbids another expansion.
    pub fn exhausted(&self, limit: Option<usize>) -> bool {
        limit.is_some_and(|limit| self.expansions >= limit)
    }
}

/// Pairs are always taken from the front; the order decides where the
/// pairs of a fresh expansion are put.
#[derive(Debug, Clone)]
pub struct Frontier {
    order: SearchOrder,
    pairs: VecDeque<PairIdx>,
}

impl Frontier {
    pub fn new(order: SearchOrder, root: PairIdx) -> Self {
        Self {
            order,
            pairs: VecDeque::from([root]),
        }
    }

    pub fn pop(&mut self) -> Option<PairIdx> {
        self.pairs.pop_front()
    }

    /// Queue the pairs of one expansion, keeping their relative order.
    pub fn push_expansion(&mut self, new_pairs: Vec<PairIdx>) {
        match self.order {
            SearchOrder::DepthFirst => {
                for pair in new_pairs.into_iter().rev() {
                    self.pairs.push_front(pair);
                }
            }
            SearchOrder::BreadthFirst => self.pairs.extend(new_pairs),
        }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Pairs still queued, front first.
    pub fn remaining(&self) -> impl Iterator<Item = PairIdx> + '_ {
        self.pairs.iter().copied()
    }
}
