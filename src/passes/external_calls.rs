//! External-call tracking: surrounds every call to an externally-defined,
//! non-intrinsic function with fenced timer start/end calls.
//!
//! Only direct calls whose callee is a known declaration qualify;
//! indirect calls have no known callee and are left alone. Callees and
//! host functions in the reserved runtime namespace are skipped so the
//! instrumentation never times itself. The end call lands before the
//! next non-debug instruction; the runtime tolerates a missing end via
//! its sentinel-zero convention.

use crate::config::Config;
use crate::ir::module::{IrFunction, IrModule};
use crate::ir::{AtomicOrdering, BasicBlock, CallInfo, Instruction, IrType, Operand, Value};
use crate::runtime::{is_runtime_helper, EXTERNAL_CALL_END, EXTERNAL_CALL_START};
use std::collections::HashSet;

/// Run the pass over the whole module. Returns the number of call sites
/// instrumented.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }

    module.get_or_insert_declaration(EXTERNAL_CALL_START, IrType::I64, &[]);
    module.get_or_insert_declaration(EXTERNAL_CALL_END, IrType::Void, &[IrType::I64]);

    // Names of instrumentable callees: declarations with a body elsewhere,
    // not intrinsics, not runtime helpers.
    let externals: HashSet<String> = module
        .functions
        .iter()
        .filter(|f| f.is_declaration && !f.is_intrinsic && !is_runtime_helper(&f.name))
        .map(|f| f.name.clone())
        .collect();

    let mut changes = 0;
    for func in &mut module.functions {
        if func.is_declaration || is_runtime_helper(&func.name) {
            continue;
        }
        changes += instrument_function(func, &externals);
    }
    changes
}

fn instrument_function(func: &mut IrFunction, externals: &HashSet<String>) -> usize {
    // Collect sites first; mutate afterwards.
    let mut sites: Vec<(usize, usize)> = Vec::new();
    for (bi, block) in func.blocks.iter().enumerate() {
        for (i, inst) in block.instructions.iter().enumerate() {
            if let Instruction::Call { func: callee, .. } = inst {
                if externals.contains(callee) {
                    sites.push((bi, i));
                }
            }
        }
    }
    if sites.is_empty() {
        return 0;
    }

    let start_vals: Vec<Value> = sites.iter().map(|_| func.alloc_value()).collect();

    let count = sites.len();
    for (bi, block) in func.blocks.iter_mut().enumerate() {
        let block_sites: Vec<(usize, Value)> = sites
            .iter()
            .zip(&start_vals)
            .filter(|((b, _), _)| *b == bi)
            .map(|((_, i), v)| (*i, *v))
            .collect();
        if block_sites.is_empty() {
            continue;
        }
        rebuild_block(block, &block_sites);
    }
    count
}

/// Rewrite one block given its `(call index, start value)` pairs, indices
/// relative to the pre-rewrite instruction list.
fn rebuild_block(block: &mut BasicBlock, sites: &[(usize, Value)]) {
    let old_insts = std::mem::take(&mut block.instructions);
    let old_atts = std::mem::take(&mut block.attachments);
    let old_locs = std::mem::take(&mut block.debug_locs);

    // A timer end waiting for the next non-debug instruction.
    let mut pending_end: Option<Value> = None;

    for (i, (inst, (att, loc))) in old_insts
        .into_iter()
        .zip(old_atts.into_iter().zip(old_locs.into_iter()))
        .enumerate()
    {
        if let Some(start_val) = pending_end {
            if !inst.is_debug_intrinsic() {
                pending_end = None;
                push_timer_end(block, start_val);
            }
        }
        if let Some((_, start_val)) = sites.iter().find(|(site, _)| *site == i) {
            block.push_inst(Instruction::Fence { ordering: AtomicOrdering::SeqCst });
            block.push_inst(Instruction::Call {
                func: EXTERNAL_CALL_START.to_string(),
                info: CallInfo {
                    dest: Some(*start_val),
                    args: vec![],
                    arg_types: vec![],
                    return_type: IrType::I64,
                    is_variadic: false,
                },
            });
            block.push_inst_with(inst, att, loc);
            pending_end = Some(*start_val);
            continue;
        }
        block.push_inst_with(inst, att, loc);
    }

    // The terminator is the "next instruction" for a call at the end of
    // the list: the timer end goes right before it.
    if let Some(start_val) = pending_end.take() {
        push_timer_end(block, start_val);
    }
}

fn push_timer_end(block: &mut BasicBlock, start_val: Value) {
    block.push_inst(Instruction::Fence { ordering: AtomicOrdering::SeqCst });
    block.push_inst(Instruction::Call {
        func: EXTERNAL_CALL_END.to_string(),
        info: CallInfo::void_call(vec![Operand::Value(start_val)], vec![IrType::I64]),
    });
}
