use std::fs;

use crate::error::PipelineError;
use crate::layout::SceneLayout;
use crate::similarity::SamplePlan;

/// Fill every output slot the pool did not write.
///
/// First copies composites and masks onto the frames the sampler skipped,
/// then fills any still-missing composite from the nearest processed index.
/// Fails with `IncompleteOutput` if a composite is still missing afterwards.
/// Running it twice over the same inputs is a no-op the second time.
pub fn reconcile(
    layout: &SceneLayout,
    plan: &SamplePlan,
    total_frames: usize,
) -> Result<(), PipelineError> {
    copy_reused(layout, plan);
    let filled = fill_gaps(layout, plan, total_frames);
    if filled > 0 {
        tracing::warn!("Filled {filled} missing composites from nearest frames");
    }

    let existing = (0..total_frames)
        .filter(|&i| layout.composite_path(i).exists())
        .count();
    tracing::info!("Final check: {existing}/{total_frames} composites exist");

    if existing < total_frames {
        return Err(PipelineError::IncompleteOutput(format!(
            "expected {total_frames} composites, found {existing}"
        )));
    }
    Ok(())
}

/// Copy each reuse source's outputs onto its target. A missing source file is
/// skipped silently; gap-filling catches whatever is left.
fn copy_reused(layout: &SceneLayout, plan: &SamplePlan) {
    if plan.reuse.is_empty() {
        return;
    }

    let mut copied = 0;
    for (&target, &source) in &plan.reuse {
        let src_composite = layout.composite_path(source);
        if src_composite.exists() {
            if fs::copy(&src_composite, layout.composite_path(target)).is_ok() {
                copied += 1;
            }
        }
        let src_mask = layout.mask_path(source);
        if src_mask.exists() {
            let _ = fs::copy(&src_mask, layout.mask_path(target));
        }
    }
    tracing::info!("Copied {copied} composites for {} similar frames", plan.reuse.len());
}

/// Copy the nearest processed composite onto every still-missing slot.
///
/// Only processed indices whose composite actually exists are candidates: a
/// processed frame whose own output never appeared must borrow from a
/// neighbor, not from itself. Nearest by absolute index distance, first
/// minimum wins, so the fill is deterministic. Returns the number of slots
/// that were missing.
fn fill_gaps(layout: &SceneLayout, plan: &SamplePlan, total_frames: usize) -> usize {
    let available: Vec<usize> = plan
        .process
        .iter()
        .copied()
        .filter(|&i| layout.composite_path(i).exists())
        .collect();

    let mut missing = 0;
    for i in 0..total_frames {
        let expected = layout.composite_path(i);
        if expected.exists() {
            continue;
        }
        missing += 1;

        let mut nearest: Option<(usize, usize)> = None; // (distance, index)
        for &candidate in &available {
            let distance = candidate.abs_diff(i);
            if nearest.map_or(true, |(best, _)| distance < best) {
                nearest = Some((distance, candidate));
            }
        }

        if let Some((_, source)) = nearest {
            let _ = fs::copy(layout.composite_path(source), &expected);
        }
    }
    missing
}
