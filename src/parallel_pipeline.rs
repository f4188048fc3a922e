// THEORY:
// The `parallel_pipeline` module runs the pairwise-relevance mapping strategy. The
// pixel-content segments are turned into `MergeUnit`s and merged wherever the
// collaborator says two neighbours belong to the same logical UI unit.
//
// Two passes:
// 1.  **Batched first pass**: the units are cut into ordered groups of
//     `batch_size`. Up to `concurrency_limit` groups are in flight at once. Inside a
//     group the questions are strictly sequential: each adjacent pair is asked
//     left to right, a positive answer merges the pair and skips past both, a
//     negative answer moves on by one.
// 2.  **Corrective pass**: strictly sequential over the reassembled stream. Every
//     unit that is still unmerged asks its downward neighbour first, then (only if
//     that failed) its upward neighbour. A match replaces the pair with one merged
//     unit, the list is rebuilt and scanning resumes at the merge point.
//
// Groups may finish in any order. Each one writes its result into its own slot of
// the reassembly buffer, and the stream is concatenated by slot index, never by
// arrival order. That buffer is the only state shared across in-flight groups;
// answers already given are collected per group and folded into one verdict table
// only after reassembly, so the corrective pass never asks a question twice.

use crate::core_modules::geometry::{BoundingBox, full_width_union};
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// A run of one or more adjacent pixel-content segments.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeUnit {
    pub bbox: BoundingBox,
    /// 1-based pixel-segment indices, ascending.
    pub parents: Vec<usize>,
}

impl MergeUnit {
    pub fn single(index: usize, bbox: BoundingBox) -> Self {
        Self {
            bbox,
            parents: vec![index],
        }
    }

    /// A unit built from two or more pixel segments.
    pub fn is_merged(&self) -> bool {
        self.parents.len() > 1
    }

    pub fn merged_with(&self, other: &MergeUnit) -> Result<MergeUnit> {
        let bbox = full_width_union([&self.bbox, &other.bbox])?;
        let mut parents: Vec<usize> = self.parents.iter().chain(&other.parents).copied().collect();
        parents.sort_unstable();
        parents.dedup();
        Ok(MergeUnit { bbox, parents })
    }
}

/// Answers "do these two vertically adjacent units belong together?".
#[async_trait]
pub trait RelevanceOracle: Send + Sync {
    async fn related(&self, upper: &MergeUnit, lower: &MergeUnit) -> Result<bool>;
}

type PairKey = (Vec<usize>, Vec<usize>);

struct GroupOutcome {
    units: Vec<MergeUnit>,
    verdicts: Vec<(PairKey, bool)>,
}

/// Bounded-concurrency driver of the pairwise strategy.
pub struct ParallelPipeline<'a> {
    oracle: &'a dyn RelevanceOracle,
    batch_size: usize,
    concurrency_limit: usize,
}

impl<'a> ParallelPipeline<'a> {
    pub fn new(oracle: &'a dyn RelevanceOracle, batch_size: usize, concurrency_limit: usize) -> Self {
        Self {
            oracle,
            batch_size: batch_size.max(1),
            concurrency_limit: concurrency_limit.max(1),
        }
    }

    /// Runs both passes and returns the merged stream in top-to-bottom order.
    pub async fn run(&self, units: Vec<MergeUnit>) -> Result<Vec<MergeUnit>> {
        let groups: Vec<Vec<MergeUnit>> = units.chunks(self.batch_size).map(<[MergeUnit]>::to_vec).collect();
        let group_count = groups.len();
        let mut slots: Vec<Option<GroupOutcome>> = (0..group_count).map(|_| None).collect();
        let mut first_error = None;
        let aborted = AtomicBool::new(false);

        let mut completions = stream::iter(groups.into_iter().enumerate())
            .map(|(index, group)| {
                let aborted = &aborted;
                async move {
                    if aborted.load(Ordering::Acquire) {
                        return (index, None);
                    }
                    (index, Some(self.first_pass(group).await))
                }
            })
            .buffer_unordered(self.concurrency_limit);

        // After a failure no new group starts; the ones in flight finish and are discarded.
        while let Some((index, outcome)) = completions.next().await {
            match outcome {
                None => debug!(group = index, "group skipped after failure"),
                Some(Ok(outcome)) => {
                    debug!(group = index, units = outcome.units.len(), "group complete");
                    slots[index] = Some(outcome);
                }
                Some(Err(err)) => {
                    warn!(group = index, error = %err, "group failed");
                    aborted.store(true, Ordering::Release);
                    if first_error.is_none() {
                        first_error = Some(err);
                    }
                }
            }
        }
        drop(completions);
        if let Some(err) = first_error {
            return Err(err);
        }

        let mut verdicts = HashMap::new();
        let mut stream_units = Vec::new();
        for outcome in slots.into_iter().flatten() {
            verdicts.extend(outcome.verdicts);
            stream_units.extend(outcome.units);
        }

        self.corrective_pass(stream_units, verdicts).await
    }

    /// Greedy left-to-right merge inside one group.
    async fn first_pass(&self, group: Vec<MergeUnit>) -> Result<GroupOutcome> {
        let mut units = Vec::with_capacity(group.len());
        let mut verdicts = Vec::new();
        let mut i = 0;
        while i < group.len() {
            if i + 1 < group.len() {
                let related = self.oracle.related(&group[i], &group[i + 1]).await?;
                verdicts.push(((group[i].parents.clone(), group[i + 1].parents.clone()), related));
                if related {
                    units.push(group[i].merged_with(&group[i + 1])?);
                    i += 2;
                    continue;
                }
            }
            units.push(group[i].clone());
            i += 1;
        }
        Ok(GroupOutcome { units, verdicts })
    }

    async fn ask(&self, verdicts: &mut HashMap<PairKey, bool>, upper: &MergeUnit, lower: &MergeUnit) -> Result<bool> {
        let key = (upper.parents.clone(), lower.parents.clone());
        if let Some(known) = verdicts.get(&key) {
            return Ok(*known);
        }
        let related = self.oracle.related(upper, lower).await?;
        verdicts.insert(key, related);
        Ok(related)
    }

    /// Sequential fix-up pass over the reassembled stream.
    pub(crate) async fn corrective_pass(
        &self,
        mut units: Vec<MergeUnit>,
        mut verdicts: HashMap<PairKey, bool>,
    ) -> Result<Vec<MergeUnit>> {
        let mut i = 0;
        while i < units.len() {
            if units[i].is_merged() {
                i += 1;
                continue;
            }
            if i + 1 < units.len() && self.ask(&mut verdicts, &units[i], &units[i + 1]).await? {
                units = replace_pair(&units, i)?;
                continue;
            }
            if i > 0 && self.ask(&mut verdicts, &units[i - 1], &units[i]).await? {
                units = replace_pair(&units, i - 1)?;
                i -= 1;
                continue;
            }
            i += 1;
        }
        Ok(units)
    }
}

/// Rebuilds the list with `units[at]` and `units[at + 1]` replaced by their merge.
fn replace_pair(units: &[MergeUnit], at: usize) -> Result<Vec<MergeUnit>> {
    let merged = units[at].merged_with(&units[at + 1])?;
    let mut rebuilt = Vec::with_capacity(units.len() - 1);
    rebuilt.extend_from_slice(&units[..at]);
    rebuilt.push(merged);
    rebuilt.extend_from_slice(&units[at + 2..]);
    Ok(rebuilt)
}
