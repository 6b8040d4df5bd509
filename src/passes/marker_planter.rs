//! Marker planting: brackets each run of unsafe instructions inside a
//! basic block with begin/end sentinels and captures source-line info
//! into the `unsafe_line_info` attachment.
//!
//! The line-info copy must happen before anything else: later transforms
//! may strip the original debug locations, but pipeline-owned attachments
//! survive. Marker placement produces at most one pair per block,
//! spanning from the first to the last unsafe instruction; safe
//! instructions between them are measured as part of the same run. The
//! unit of measurement is the contiguous region, not the individual
//! instruction.
//!
//! Unsafe instructions already inside an existing marker region do not
//! seed a new pair, so re-running the pass on marked IR is a no-op.

use crate::config::Config;
use crate::ir::markers::{make_marker, marker_kind, MarkerKind};
use crate::ir::metadata::{MetadataNode, UNSAFE_INST, UNSAFE_LINE_INFO};
use crate::ir::module::{IrFunction, IrModule};

/// Run the pass on every function definition in the module. Returns the
/// number of marker pairs planted.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }
    module.for_each_function(|func| {
        capture_line_info(func);
        insert_markers(func)
    })
}

/// Copy `{line, file}` from each unsafe instruction's debug location into
/// the `unsafe_line_info` attachment. Locations with a zero line or an
/// empty file are skipped.
fn capture_line_info(func: &mut IrFunction) {
    for block in &mut func.blocks {
        for i in 0..block.instructions.len() {
            if !block.attachments[i].has(UNSAFE_INST) {
                continue;
            }
            if let Some(loc) = &block.debug_locs[i] {
                if loc.line != 0 && !loc.file.is_empty() {
                    let node = MetadataNode::line_info(loc.line, &loc.file);
                    block.attachments[i].set(UNSAFE_LINE_INFO, node);
                }
            }
        }
        if block.term_attachments.has(UNSAFE_INST) {
            if let Some(loc) = &block.term_debug_loc {
                if loc.line != 0 && !loc.file.is_empty() {
                    let node = MetadataNode::line_info(loc.line, &loc.file);
                    block.term_attachments.set(UNSAFE_LINE_INFO, node);
                }
            }
        }
    }
}

/// Plant one begin/end pair per block around the unsafe run, if any.
/// Returns the number of pairs planted.
fn insert_markers(func: &mut IrFunction) -> usize {
    let mut pairs = 0;
    for block in &mut func.blocks {
        // Find the first and last unsafe instruction outside any existing
        // marker region.
        let mut inside = false;
        let mut first: Option<usize> = None;
        let mut last: Option<usize> = None;
        for (i, inst) in block.instructions.iter().enumerate() {
            match marker_kind(inst) {
                Some(MarkerKind::Begin) => {
                    inside = true;
                    continue;
                }
                Some(MarkerKind::End) => {
                    inside = false;
                    continue;
                }
                None => {}
            }
            if !inside && block.attachments[i].has(UNSAFE_INST) {
                if first.is_none() {
                    first = Some(i);
                }
                last = Some(i);
            }
        }
        let term_unsafe = !inside && block.term_attachments.has(UNSAFE_INST);

        match (first, last) {
            (Some(first), Some(last)) => {
                if term_unsafe {
                    // The run extends through the terminator; the end
                    // marker goes before it so the block still ends with
                    // exactly one terminator.
                    block.push_inst(make_marker(MarkerKind::End));
                } else {
                    block.insert_inst(last + 1, make_marker(MarkerKind::End));
                }
                block.insert_inst(first, make_marker(MarkerKind::Begin));
                pairs += 1;
            }
            (None, None) if term_unsafe => {
                // Only the terminator is unsafe: both sentinels sit
                // immediately before it.
                block.push_inst(make_marker(MarkerKind::Begin));
                block.push_inst(make_marker(MarkerKind::End));
                pairs += 1;
            }
            _ => {}
        }
    }
    pairs
}
