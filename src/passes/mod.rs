//! Instrumentation passes over the IR.
//!
//! The pipeline runs in a fixed dependency order:
//!
//! 1. `marker_planter` — captures line info, plants begin/end sentinels
//! 2. `debug_anchor` — normalizes phis, anchors debug locations
//! 3. `function_tracker` — assigns ids, builds the metadata table
//! 4. `inst_counter` — per-block instruction counts by category
//! 5. `line_coverage` — unsafe source-line execution tracking
//! 6. `heap_tracker` — memory-access reporting
//! 7. `external_calls` — timing around external library calls
//! 8. `cycle_counter` — cycle measurement; erases the sentinels
//!
//! Constraints behind the order: the marker planter precedes every
//! consumer of sentinels; the function tracker precedes the instruction
//! counter; the cycle counter comes last among sentinel consumers because
//! it removes them. The heap tracker and external-call tracker commute.
//!
//! Each pass takes the module and the immutable pipeline configuration
//! and returns the number of sites it changed. Zero changes is the
//! "all analyses preserved" verdict: structural anomalies are skipped
//! silently and never abort the compilation.

pub mod cycle_counter;
pub mod debug_anchor;
pub mod external_calls;
pub mod function_tracker;
pub mod heap_tracker;
pub mod inst_counter;
pub mod line_coverage;
pub mod marker_planter;

use crate::config::Config;
use crate::ir::module::{IrFunction, IrModule};
use tracing::debug;

/// Outcome of one pass over one module.
#[derive(Debug, Clone)]
pub struct PassReport {
    pub name: &'static str,
    /// Number of sites the pass changed. Zero means the IR is untouched.
    pub changes: usize,
}

/// Run the full pipeline in its fixed order, honoring the per-pass
/// toggles. Returns one report per enabled pass.
pub fn run_pipeline(module: &mut IrModule, cfg: &Config) -> Vec<PassReport> {
    type PassFn = fn(&mut IrModule, &Config) -> usize;
    let passes: [(&'static str, bool, PassFn); 8] = [
        ("marker_planter", cfg.passes.marker_planter, marker_planter::run),
        ("debug_anchor", cfg.passes.debug_anchor, debug_anchor::run),
        ("function_tracker", cfg.passes.function_tracker, function_tracker::run),
        ("inst_counter", cfg.passes.inst_counter, inst_counter::run),
        ("line_coverage", cfg.passes.line_coverage, line_coverage::run),
        ("heap_tracker", cfg.passes.heap_tracker, heap_tracker::run),
        ("external_calls", cfg.passes.external_calls, external_calls::run),
        ("cycle_counter", cfg.passes.cycle_counter, cycle_counter::run),
    ];

    let mut reports = Vec::new();
    for (name, enabled, pass) in passes {
        if !enabled {
            continue;
        }
        let changes = pass(module, cfg);
        debug!(pass = name, changes, "pass finished");
        reports.push(PassReport { name, changes });
    }
    reports
}

/// Shared eligibility filter: definitions only, no intrinsics, and no
/// names from the instrumentation's own namespace.
pub(crate) fn eligible_for_instrumentation(func: &IrFunction) -> bool {
    !func.is_declaration
        && !func.is_intrinsic
        && !func.name.starts_with("__unsafe_")
        && !func.name.starts_with("llvm.")
}
