use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Dependency-count scheduler over the nodes of an evaluation plan.
///
/// Determinism rule: when several nodes are ready, the smallest plan index is
/// returned first. Plan indices follow a post-order walk from the target, so
/// this is also the sequential evaluation order.
pub(crate) struct DagScheduler {
    indeg: Vec<u32>,
    dependents: Vec<Vec<u32>>,
    ready: BinaryHeap<Reverse<u32>>,
    remaining: usize,
}

impl DagScheduler {
    /// `deps[i]` lists the plan indices node `i` reads from.
    pub(crate) fn new(deps: &[Vec<usize>]) -> Self {
        let n = deps.len();
        let mut indeg = vec![0u32; n];
        let mut dependents = vec![Vec::<u32>::new(); n];

        for (i, node_deps) in deps.iter().enumerate() {
            let mut count = 0u32;
            for &d in node_deps {
                dependents[d].push(i as u32);
                count = count.saturating_add(1);
            }
            indeg[i] = count;
        }

        let mut ready = BinaryHeap::<Reverse<u32>>::new();
        for (i, &deg) in indeg.iter().enumerate() {
            if deg == 0 {
                ready.push(Reverse(i as u32));
            }
        }

        Self {
            indeg,
            dependents,
            ready,
            remaining: n,
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.remaining
    }

    pub(crate) fn pop_ready(&mut self) -> Option<usize> {
        let Reverse(id) = self.ready.pop()?;
        Some(id as usize)
    }

    pub(crate) fn pop_ready_batch(&mut self, max: usize) -> Vec<usize> {
        let mut out = Vec::with_capacity(max.min(self.ready.len()));
        for _ in 0..max {
            let Some(node) = self.pop_ready() else {
                break;
            };
            out.push(node);
        }
        out
    }

    pub(crate) fn mark_done(&mut self, done: usize) {
        self.remaining = self.remaining.saturating_sub(1);
        for &dep in &self.dependents[done] {
            let d = &mut self.indeg[dep as usize];
            *d = d.saturating_sub(1);
            if *d == 0 {
                self.ready.push(Reverse(dep));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduler_is_topological_and_deterministic() {
        // 0 -> 2, 1 -> 2, 2 -> 3
        let deps = vec![vec![], vec![], vec![0, 1], vec![2]];
        let mut sched = DagScheduler::new(&deps);
        let mut out = Vec::new();
        while let Some(next) = sched.pop_ready() {
            out.push(next);
            sched.mark_done(next);
        }
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert_eq!(sched.remaining(), 0);
    }

    #[test]
    fn test_scheduler_batches_independent_nodes() {
        let deps = vec![vec![], vec![], vec![0, 1]];
        let mut sched = DagScheduler::new(&deps);
        assert_eq!(sched.pop_ready_batch(8), vec![0, 1]);
        sched.mark_done(0);
        assert!(sched.pop_ready_batch(8).is_empty());
        sched.mark_done(1);
        assert_eq!(sched.pop_ready_batch(8), vec![2]);
    }
}
