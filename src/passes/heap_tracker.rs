//! Heap tracking: reports the pointer operand of every load and store to
//! the runtime, and additionally flags accesses made from inside
//! marker-delimited unsafe regions.
//!
//! Two independent sweeps, each collecting its sites before mutating so
//! freshly inserted calls are never re-instrumented. The inserted calls
//! are opaque external calls; the pass preserves all analyses.

use crate::config::Config;
use crate::ir::markers::{marker_kind, MarkerKind};
use crate::ir::module::{IrFunction, IrModule};
use crate::ir::{CallInfo, Instruction, IrConst, IrType, Operand, Value};
use crate::runtime::{DYN_MEM_ACCESS, DYN_UNSAFE_MEM_ACCESS};

/// Run the pass on every function definition. Returns the number of
/// report calls inserted.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }

    module.get_or_insert_declaration(DYN_MEM_ACCESS, IrType::Void, &[IrType::Ptr]);
    module.get_or_insert_declaration(
        DYN_UNSAFE_MEM_ACCESS,
        IrType::Void,
        &[IrType::Ptr, IrType::I1],
    );

    module.for_each_function(|func| instrument_mem_accesses(func) + instrument_unsafe_accesses(func))
}

/// Sweep A: a generic report before every load and store.
fn instrument_mem_accesses(func: &mut IrFunction) -> usize {
    let mut inserted = 0;
    for block in &mut func.blocks {
        let sites: Vec<(usize, Value)> = block
            .instructions
            .iter()
            .enumerate()
            .filter_map(|(i, inst)| inst.memory_pointer().map(|ptr| (i, ptr)))
            .collect();
        // Insert back-to-front so earlier indices stay valid.
        for (i, ptr) in sites.iter().rev() {
            block.insert_inst(
                *i,
                Instruction::Call {
                    func: DYN_MEM_ACCESS.to_string(),
                    info: CallInfo::void_call(vec![Operand::Value(*ptr)], vec![IrType::Ptr]),
                },
            );
        }
        inserted += sites.len();
    }
    inserted
}

/// Sweep B: an additional flagged report for loads and stores inside a
/// marker region.
fn instrument_unsafe_accesses(func: &mut IrFunction) -> usize {
    let mut inserted = 0;
    for block in &mut func.blocks {
        let mut sites: Vec<(usize, Value, bool)> = Vec::new();
        let mut inside = false;
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
            if !inside {
                continue;
            }
            match inst {
                Instruction::Load { ptr, .. } => sites.push((i, *ptr, true)),
                Instruction::Store { ptr, .. } => sites.push((i, *ptr, false)),
                _ => {}
            }
        }
        for (i, ptr, is_load) in sites.iter().rev() {
            block.insert_inst(
                *i,
                Instruction::Call {
                    func: DYN_UNSAFE_MEM_ACCESS.to_string(),
                    info: CallInfo::void_call(
                        vec![Operand::Value(*ptr), Operand::Const(IrConst::Bool(*is_load))],
                        vec![IrType::Ptr, IrType::I1],
                    ),
                },
            );
        }
        inserted += sites.len();
    }
    inserted
}
