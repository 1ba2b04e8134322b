//! Merge engine applying ranked rules to a single pretoken.
//!
//! The pretoken starts as a chain of one-byte symbols stored in a dense arena
//! (`prev`/`next` indices plus a liveness flag). Candidate merges sit in a
//! min-heap keyed by rank; entries are never removed eagerly; instead an entry is
//! checked against the live chain when popped and dropped if one of its
//! symbols has since been consumed. Each merge pushes at most two new
//! candidates, so a pretoken of `n` bytes costs `O(n log n)`.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::merges::{MergeTable, Rank, SymbolId};

#[derive(Debug, Clone, Copy)]
struct Node {
    symbol: SymbolId,
    prev: Option<usize>,
    next: Option<usize>,
    alive: bool,
}

/// Queued merge of `node` with its successor, recorded with the symbols seen at push time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    rank: Rank,
    node: usize,
    seq: u64,
    left: SymbolId,
    right: SymbolId,
    merged: SymbolId,
}

impl Ord for Candidate {
    // Reversed so `BinaryHeap` pops the lowest rank, then the leftmost node.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .rank
            .cmp(&self.rank)
            .then_with(|| other.node.cmp(&self.node))
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Arena-backed doubly linked chain of symbols for one pretoken.
#[derive(Debug)]
struct SymbolChain {
    nodes: Vec<Node>,
}

impl SymbolChain {
    fn from_bytes(bytes: &[u8]) -> Self {
        let len = bytes.len();
        let nodes = bytes
            .iter()
            .enumerate()
            .map(|(idx, &byte)| Node {
                symbol: SymbolId::from(byte),
                prev: idx.checked_sub(1),
                next: (idx + 1 < len).then_some(idx + 1),
                alive: true,
            })
            .collect();
        Self { nodes }
    }

    /// `true` when the candidate still describes a live adjacent pair.
    fn is_current(&self, candidate: &Candidate) -> bool {
        let node = &self.nodes[candidate.node];
        if !node.alive || node.symbol != candidate.left {
            return false;
        }
        match node.next {
            Some(next) => {
                let next = &self.nodes[next];
                next.alive && next.symbol == candidate.right
            }
            None => false,
        }
    }

    /// Folds the successor of `idx` into it and returns the surviving node's index.
    fn merge_with_next(&mut self, idx: usize, merged: SymbolId) -> usize {
        let Some(consumed) = self.nodes[idx].next else {
            return idx;
        };
        let after = self.nodes[consumed].next;
        self.nodes[consumed].alive = false;
        self.nodes[idx].symbol = merged;
        self.nodes[idx].next = after;
        if let Some(after) = after {
            self.nodes[after].prev = Some(idx);
        }
        idx
    }

    /// Surviving symbols from head to tail. Node 0 is never consumed, so it is the head.
    fn symbols(&self) -> Vec<SymbolId> {
        let mut out = Vec::new();
        let mut cursor = if self.nodes.is_empty() { None } else { Some(0) };
        while let Some(idx) = cursor {
            out.push(self.nodes[idx].symbol);
            cursor = self.nodes[idx].next;
        }
        out
    }
}

#[derive(Debug, Default)]
struct MergeQueue {
    heap: BinaryHeap<Candidate>,
    seq: u64,
}

impl MergeQueue {
    /// Queues the pair starting at `idx` if the table ranks it.
    fn offer(&mut self, chain: &SymbolChain, table: &MergeTable, idx: usize) {
        let node = &chain.nodes[idx];
        let Some(next) = node.next else {
            return;
        };
        let right = chain.nodes[next].symbol;
        if let Some(target) = table.target(node.symbol, right) {
            self.heap.push(Candidate {
                rank: target.rank,
                node: idx,
                seq: self.seq,
                left: node.symbol,
                right,
                merged: target.merged,
            });
            self.seq += 1;
        }
    }

    /// Pops the best candidate that is still current, discarding stale ones.
    fn pop_current(&mut self, chain: &SymbolChain) -> Option<Candidate> {
        while let Some(candidate) = self.heap.pop() {
            if chain.is_current(&candidate) {
                return Some(candidate);
            }
        }
        None
    }
}

/// Applies every applicable merge to `bytes` and returns the final symbols in order.
pub(crate) fn merge_symbols(bytes: &[u8], table: &MergeTable) -> Vec<SymbolId> {
    let mut chain = SymbolChain::from_bytes(bytes);
    if bytes.len() < 2 {
        return chain.symbols();
    }

    let mut queue = MergeQueue {
        heap: BinaryHeap::with_capacity(bytes.len()),
        seq: 0,
    };
    for idx in 0..bytes.len() - 1 {
        queue.offer(&chain, table, idx);
    }

    while let Some(candidate) = queue.pop_current(&chain) {
        let idx = chain.merge_with_next(candidate.node, candidate.merged);
        if let Some(prev) = chain.nodes[idx].prev {
            queue.offer(&chain, table, prev);
        }
        queue.offer(&chain, table, idx);
    }

    chain.symbols()
}
