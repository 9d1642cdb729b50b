//! Index based view over a workflow's steps.
//!
//! Steps stay in their definition order (the arena); edges, entry points and
//! cycles are computed once over slot indices so traversal never goes back to
//! string lookups.

use std::collections::HashMap;

use super::workflow::{EdgeCondition, StepDefinition};

/// A resolved outgoing edge
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge<'a> {
    /// Arena slot of the target step
    pub target: usize,
    /// Outcome that activates the edge
    pub condition: &'a EdgeCondition,
}

/// Step graph built from a definition's step list
#[derive(Debug)]
pub struct StepGraph<'a> {
    steps: &'a [StepDefinition],
    index: HashMap<&'a str, usize>,
    edges: Vec<Vec<Edge<'a>>>,
    incoming: Vec<usize>,
    dangling: Vec<(usize, &'a str)>,
    duplicates: Vec<usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnPath,
    Done,
}

impl<'a> StepGraph<'a> {
    /// Build the graph. Duplicate IDs resolve to their first occurrence and
    /// edges to unknown IDs are kept aside as dangling references.
    pub fn build(steps: &'a [StepDefinition]) -> Self {
        let mut index = HashMap::with_capacity(steps.len());
        let mut duplicates = Vec::new();
        for (slot, step) in steps.iter().enumerate() {
            if index.contains_key(step.step_id.as_str()) {
                duplicates.push(slot);
            } else {
                index.insert(step.step_id.as_str(), slot);
            }
        }

        let mut edges = Vec::with_capacity(steps.len());
        let mut incoming = vec![0; steps.len()];
        let mut dangling = Vec::new();
        for (slot, step) in steps.iter().enumerate() {
            let mut out = Vec::with_capacity(step.next_steps.len());
            for next in &step.next_steps {
                match index.get(next.step_id.as_str()) {
                    Some(&target) => {
                        incoming[target] += 1;
                        out.push(Edge {
                            target,
                            condition: &next.condition,
                        });
                    }
                    None => dangling.push((slot, next.step_id.as_str())),
                }
            }
            edges.push(out);
        }

        Self {
            steps,
            index,
            edges,
            incoming,
            dangling,
            duplicates,
        }
    }

    /// Number of steps
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// True when the workflow has no steps
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step stored in a slot
    pub fn step(&self, slot: usize) -> &'a StepDefinition {
        &self.steps[slot]
    }

    /// Slot of a step ID
    pub fn slot_of(&self, step_id: &str) -> Option<usize> {
        self.index.get(step_id).copied()
    }

    /// Outgoing edges of a slot, in definition order
    pub fn edges(&self, slot: usize) -> &[Edge<'a>] {
        &self.edges[slot]
    }

    /// Steps no edge points at, in definition order
    pub fn entry_candidates(&self) -> Vec<usize> {
        (0..self.steps.len())
            .filter(|&slot| self.incoming[slot] == 0 && !self.duplicates.contains(&slot))
            .collect()
    }

    /// Where execution starts: the first unreferenced step
    pub fn entry(&self) -> Option<usize> {
        self.entry_candidates().into_iter().next()
    }

    /// Edges naming steps that do not exist, as (source slot, missing ID)
    pub fn dangling_references(&self) -> &[(usize, &'a str)] {
        &self.dangling
    }

    /// Slots whose ID was already taken by an earlier step
    pub fn duplicate_slots(&self) -> &[usize] {
        &self.duplicates
    }

    /// Every cycle reachable in the graph, each as a slot path that starts and
    /// ends on the same step.
    ///
    /// Iterative depth-first search with a single visited marking, so each
    /// edge is examined once and the call stack stays flat however deep the
    /// graph is.
    pub fn find_cycles(&self) -> Vec<Vec<usize>> {
        let mut marks = vec![Mark::Unvisited; self.steps.len()];
        let mut cycles: Vec<Vec<usize>> = Vec::new();

        for root in 0..self.steps.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            // (slot, next edge to examine)
            let mut path: Vec<(usize, usize)> = vec![(root, 0)];
            marks[root] = Mark::OnPath;

            while let Some(frame) = path.last_mut() {
                let slot = frame.0;
                let Some(edge) = self.edges[slot].get(frame.1) else {
                    marks[slot] = Mark::Done;
                    path.pop();
                    continue;
                };
                frame.1 += 1;

                let target = edge.target;
                match marks[target] {
                    Mark::Unvisited => {
                        marks[target] = Mark::OnPath;
                        path.push((target, 0));
                    }
                    Mark::OnPath => {
                        if let Some(start) = path.iter().position(|&(s, _)| s == target) {
                            let mut cycle: Vec<usize> = path[start..].iter().map(|&(s, _)| s).collect();
                            cycle.push(target);
                            if !cycles.contains(&cycle) {
                                cycles.push(cycle);
                            }
                        }
                    }
                    Mark::Done => {}
                }
            }
        }

        cycles
    }

    /// Render a slot path as `a -> b -> a`
    pub fn describe_path(&self, path: &[usize]) -> String {
        path.iter()
            .map(|&slot| self.steps[slot].step_id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    }
}
