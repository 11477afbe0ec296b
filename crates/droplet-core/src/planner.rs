//! Ratio decomposition: realize an arbitrary weighted mix as a binary tree
//! of 1:1 mixes.
//!
//! Given target weights and a precision bound, the planner finds the
//! smallest mixing-tree depth `d` at which integer numerators `k_i` exist
//! with `sum k_i = 2^d` and each `k_i / 2^d` within the bound of its
//! normalized target, then realizes the tree as virtual fluids and mix
//! operations in the graph. Nothing here touches the chip; materialization
//! is the engine's job.

use crate::graph::MixGraph;
use crate::id::FluidId;

/// Depth bound for the mixing-tree search. Guards the `1 << depth` shifts,
/// not a property of any chip.
pub const MAX_DEPTH: u32 = 31;

/// Errors from planning a mix.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PlanError {
    /// No integer assignment meets the precision at any depth up to
    /// [`MAX_DEPTH`].
    #[error(
        "cannot achieve targets {targets:?} within precision {precision} (tried depths 1..={MAX_DEPTH})"
    )]
    PrecisionUnachievable { targets: Vec<f64>, precision: f64 },

    /// Every entry had zero weight (or the input was empty).
    #[error("mix requires at least one fluid with nonzero weight")]
    EmptyMix,

    /// Weights must be finite and non-negative.
    #[error("invalid mix weight {0}")]
    InvalidWeight(f64),
}

/// Integer numerators `k` with `k_i / 2^depth` within `precision` of
/// `targets[i]` and `sum k = 2^depth`, or `None` when `depth` is infeasible.
///
/// Targets must be normalized. Bounds for each numerator come from clamping
/// the allowed band `t_i +/- precision` to [0, 1] and snapping to the
/// `2^-depth` grid; the assignment starts at the lower bounds and greedily
/// increments entries in order until the sum reaches `2^depth`. The greedy
/// scan makes the result order-dependent, which shapes the tree but not its
/// accuracy.
pub fn integer_ratios(depth: u32, targets: &[f64], precision: f64) -> Option<Vec<u64>> {
    let unit = 1.0 / (1u64 << depth) as f64;
    let target_sum = 1u64 << depth;

    let mut lower = Vec::with_capacity(targets.len());
    let mut upper = Vec::with_capacity(targets.len());
    let mut lower_sum: u64 = 0;
    let mut upper_sum: u64 = 0;
    for &t in targets {
        let lo = ((t - precision).max(0.0) / unit).ceil() as u64;
        let hi = ((t + precision).min(1.0) / unit).floor() as u64;
        // No point of the 2^-depth grid falls inside this entry's band.
        if lo > hi {
            return None;
        }
        lower_sum += lo;
        upper_sum += hi;
        lower.push(lo);
        upper.push(hi);
    }

    if lower_sum > target_sum || upper_sum < target_sum {
        return None;
    }

    // Select a numerator from each range so the total hits 2^depth: start
    // at the lower bounds and raise entries one step at a time, scanning in
    // input order. The feasibility checks above guarantee termination.
    while lower_sum < target_sum {
        for i in 0..targets.len() {
            if lower_sum < target_sum && lower[i] < upper[i] {
                lower[i] += 1;
                lower_sum += 1;
            }
        }
    }

    Some(lower)
}

/// Smallest feasible depth and its numerator assignment.
///
/// Tries every depth 1..=[`MAX_DEPTH`]: infeasibility at one depth says
/// nothing about the next, so no early exit is possible.
pub fn search_assignment(
    targets: &[f64],
    precision: f64,
) -> Result<(u32, Vec<u64>), PlanError> {
    for depth in 1..=MAX_DEPTH {
        if let Some(ratios) = integer_ratios(depth, targets, precision) {
            return Ok((depth, ratios));
        }
    }
    Err(PlanError::PrecisionUnachievable {
        targets: targets.to_vec(),
        precision,
    })
}

/// Plan a weighted mix of `fluids`, returning the root fluid.
///
/// Zero-weight entries are dropped; a single surviving entry is returned
/// unchanged with no operation created. Otherwise the weights are
/// normalized, an assignment is found, and the tree is built from the
/// bit decomposition of each numerator: fluid `i` is placed as a leaf at
/// level `L` for every set bit `L` of `k_i`, and each level resolves by
/// popping a pending leaf or joining two subtrees from the level below
/// with a fresh 1:1 mix.
///
/// The returned root is virtual until the engine materializes it. A fluid
/// placed at several levels is consumed once per placement and relies on
/// its generator to come back in between.
pub fn plan_mix(
    graph: &mut MixGraph,
    fluids: &[FluidId],
    weights: &[f64],
    precision: f64,
) -> Result<FluidId, PlanError> {
    debug_assert_eq!(fluids.len(), weights.len());
    for &w in weights {
        if !w.is_finite() || w < 0.0 {
            return Err(PlanError::InvalidWeight(w));
        }
    }

    // Prune zero weights.
    let entries: Vec<(FluidId, f64)> = fluids
        .iter()
        .copied()
        .zip(weights.iter().copied())
        .filter(|&(_, w)| w != 0.0)
        .collect();

    match entries.len() {
        0 => return Err(PlanError::EmptyMix),
        // Identity law: nothing to mix.
        1 => return Ok(entries[0].0),
        _ => {}
    }

    let sum: f64 = entries.iter().map(|&(_, w)| w).sum();
    let targets: Vec<f64> = entries.iter().map(|&(_, w)| w / sum).collect();

    let (depth, ratios) = search_assignment(&targets, precision)?;

    // Bit decomposition into per-level bins: fluid i contributes one leaf
    // at level L for every set bit L of its numerator.
    let mut bins: Vec<Vec<FluidId>> = vec![Vec::new(); depth as usize + 1];
    for (i, &(fluid, _)) in entries.iter().enumerate() {
        for (level, bin) in bins.iter_mut().enumerate() {
            if ratios[i] & (1u64 << level) != 0 {
                bin.push(fluid);
            }
        }
    }

    Ok(build_tree(graph, &mut bins, depth as usize))
}

/// Resolve one level of the mixing tree: take a pending leaf if the bin has
/// one, otherwise join two subtrees from the level below.
fn build_tree(graph: &mut MixGraph, bins: &mut [Vec<FluidId>], level: usize) -> FluidId {
    if let Some(leaf) = bins[level].pop() {
        leaf
    } else {
        debug_assert!(level > 0, "feasible assignments cover level 0 exactly");
        let left = build_tree(graph, bins, level - 1);
        let right = build_tree(graph, bins, level - 1);
        graph.add_mix([left, right])
    }
}
