//! Debug-info anchoring: keeps line/file information reachable for later
//! passes even after transforms that would otherwise strip it.
//!
//! Two steps. First, phi placement is normalized: every phi is moved to
//! the head of its block, preserving relative order. This is a defensive
//! normalization, not a semantic change. Second, every distinct valid
//! debug location in the module is collected into a metadata node and
//! attached to a one-byte internal anchor global that is added to the
//! compiler-used set, so late passes cannot dead-strip it.
//!
//! The anchor metadata has no consumer inside this crate; it is an
//! interface to downstream tooling.

use crate::config::Config;
use crate::ir::instruction::BasicBlock;
use crate::ir::metadata::{DebugLoc, MetadataNode, MetadataOp, PRESERVED_DEBUGINFO};
use crate::ir::module::{GlobalInit, IrGlobal, IrModule};
use crate::ir::{IrConst, IrType};
use crate::runtime::COVERAGE_ANCHOR;

/// Run the pass over the whole module. Returns the number of phi moves
/// plus one for the anchor global.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }

    let mut changes = 0;
    for func in &mut module.functions {
        if func.is_declaration {
            continue;
        }
        for block in &mut func.blocks {
            changes += normalize_phis(block);
        }
    }

    let locations = collect_valid_locations(module);
    changes += anchor_locations(module, locations);
    changes
}

/// Move every phi to the block head, keeping relative order. Returns the
/// number of phis that were out of place.
fn normalize_phis(block: &mut BasicBlock) -> usize {
    let mut moved = 0;
    let mut insert_at = 0;
    for i in 0..block.instructions.len() {
        if !block.instructions[i].is_phi() {
            continue;
        }
        if i != insert_at {
            // Move the instruction together with its parallel metadata.
            let inst = block.instructions.remove(i);
            let att = block.attachments.remove(i);
            let loc = block.debug_locs.remove(i);
            block.instructions.insert(insert_at, inst);
            block.attachments.insert(insert_at, att);
            block.debug_locs.insert(insert_at, loc);
            moved += 1;
        }
        insert_at += 1;
    }
    moved
}

/// Collect every distinct valid debug location in module order.
fn collect_valid_locations(module: &IrModule) -> Vec<DebugLoc> {
    let mut seen: Vec<DebugLoc> = Vec::new();
    let mut visit = |loc: &Option<DebugLoc>| {
        if let Some(loc) = loc {
            if loc.is_valid() && !seen.contains(loc) {
                seen.push(loc.clone());
            }
        }
    };
    for func in &module.functions {
        for block in &func.blocks {
            for loc in &block.debug_locs {
                visit(loc);
            }
            visit(&block.term_debug_loc);
        }
    }
    seen
}

/// Create (or refresh) the anchor global and attach the location list.
/// Returns 1 when the anchor was created, 0 when an existing anchor was
/// refreshed in place.
fn anchor_locations(module: &mut IrModule, locations: Vec<DebugLoc>) -> usize {
    let node = MetadataNode(locations.into_iter().map(MetadataOp::Loc).collect());

    if let Some(global) = module.globals.iter_mut().find(|g| g.name == COVERAGE_ANCHOR) {
        if !node.0.is_empty() {
            global.attachments.set(PRESERVED_DEBUGINFO, node);
        }
        return 0;
    }

    let mut global = IrGlobal {
        name: COVERAGE_ANCHOR.to_string(),
        ty: IrType::I8,
        size: 1,
        align: 1,
        init: GlobalInit::Scalar(IrConst::I8(0)),
        is_static: true,
        is_const: false,
        is_used: true,
        attachments: Default::default(),
    };
    if !node.0.is_empty() {
        global.attachments.set(PRESERVED_DEBUGINFO, node);
    }
    module.globals.push(global);
    1
}
