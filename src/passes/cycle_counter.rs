//! Cycle counting: replaces every marker pair with fenced measurement
//! calls and removes the sentinels. This is the last consumer of markers
//! in the pipeline.
//!
//! The rewrite is three-phase to avoid iterator invalidation: collect the
//! begin/end pairs, insert the fenced calls, then erase the sentinels.
//! Each begin is matched to the first following end in the same block;
//! nested begins are ignored (the outer begin wins) and a begin left open
//! at the end of a block is left in place without instrumentation.
//!
//! The sequentially-consistent fences exist solely to stop the CPU from
//! reordering work across the measurement boundary at run time.

use crate::config::Config;
use crate::ir::markers::{marker_kind, MarkerKind};
use crate::ir::module::{IrFunction, IrModule};
use crate::ir::{
    AtomicOrdering, BasicBlock, BlockId, CallInfo, Instruction, IrType, Operand, Terminator, Value,
};
use crate::runtime::{CYCLE_CTOR, CYCLE_END, CYCLE_PRINT_STATS, CYCLE_START, PROGRAM_START};

/// Run the pass over the whole module. Returns the number of regions
/// instrumented.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }

    module.get_or_insert_declaration(PROGRAM_START, IrType::Void, &[]);
    module.get_or_insert_declaration(CYCLE_START, IrType::I64, &[]);
    module.get_or_insert_declaration(CYCLE_END, IrType::Void, &[IrType::I64]);
    module.get_or_insert_declaration(CYCLE_PRINT_STATS, IrType::Void, &[]);

    install_module_hooks(module);

    let mut changes = 0;
    for func in &mut module.functions {
        if func.is_declaration {
            continue;
        }
        changes += instrument_function(func);
    }
    changes
}

/// Program-start notification as a priority-0 constructor and the
/// statistics dump as a priority-0 destructor.
fn install_module_hooks(module: &mut IrModule) {
    let mut ctor = IrFunction::new(CYCLE_CTOR, IrType::Void, vec![]);
    ctor.is_static = true;
    let mut entry = BasicBlock::new(BlockId(0), Terminator::Return(None));
    entry.push_inst(Instruction::Call {
        func: PROGRAM_START.to_string(),
        info: CallInfo::void_call(vec![], vec![]),
    });
    ctor.blocks.push(entry);
    module.functions.push(ctor);
    module.add_constructor(CYCLE_CTOR, 0);
    module.add_destructor(CYCLE_PRINT_STATS, 0);
}

/// A matched begin/end pair inside one block.
struct MarkerPair {
    block: usize,
    begin: usize,
    end: usize,
}

fn instrument_function(func: &mut IrFunction) -> usize {
    // Phase 1: collect pairs.
    let mut pairs: Vec<MarkerPair> = Vec::new();
    for (bi, block) in func.blocks.iter().enumerate() {
        let mut open_begin: Option<usize> = None;
        for (i, inst) in block.instructions.iter().enumerate() {
            match marker_kind(inst) {
                Some(MarkerKind::Begin) => {
                    if open_begin.is_none() {
                        open_begin = Some(i);
                    }
                }
                Some(MarkerKind::End) => {
                    if let Some(begin) = open_begin.take() {
                        pairs.push(MarkerPair { block: bi, begin, end: i });
                    }
                }
                None => {}
            }
        }
    }
    if pairs.is_empty() {
        return 0;
    }

    // One fresh SSA value per pair carries the start counter from the
    // begin call to the end call.
    let start_vals: Vec<Value> = pairs.iter().map(|_| func.alloc_value()).collect();

    // Phases 2 and 3, fused per block: rebuild the instruction list,
    // placing the fenced calls at the marker positions and dropping the
    // sentinels.
    let count = pairs.len();
    for (bi, block) in func.blocks.iter_mut().enumerate() {
        let block_pairs: Vec<(usize, usize, Value)> = pairs
            .iter()
            .zip(&start_vals)
            .filter(|(p, _)| p.block == bi)
            .map(|(p, v)| (p.begin, p.end, *v))
            .collect();
        if block_pairs.is_empty() {
            continue;
        }
        rebuild_block(block, &block_pairs);
    }
    count
}

/// Rewrite one block given its `(begin, end, start_value)` triples,
/// indices relative to the pre-rewrite instruction list.
fn rebuild_block(block: &mut BasicBlock, pairs: &[(usize, usize, Value)]) {
    let old_insts = std::mem::take(&mut block.instructions);
    let old_atts = std::mem::take(&mut block.attachments);
    let old_locs = std::mem::take(&mut block.debug_locs);

    for (i, (inst, (att, loc))) in old_insts
        .into_iter()
        .zip(old_atts.into_iter().zip(old_locs.into_iter()))
        .enumerate()
    {
        if let Some((_, _, start_val)) = pairs.iter().find(|(begin, _, _)| *begin == i) {
            block.push_inst(Instruction::Fence { ordering: AtomicOrdering::SeqCst });
            block.push_inst(Instruction::Call {
                func: CYCLE_START.to_string(),
                info: CallInfo {
                    dest: Some(*start_val),
                    args: vec![],
                    arg_types: vec![],
                    return_type: IrType::I64,
                    is_variadic: false,
                },
            });
            continue; // the begin sentinel is not copied
        }
        if let Some((_, _, start_val)) = pairs.iter().find(|(_, end, _)| *end == i) {
            block.push_inst(Instruction::Fence { ordering: AtomicOrdering::SeqCst });
            block.push_inst(Instruction::Call {
                func: CYCLE_END.to_string(),
                info: CallInfo::void_call(vec![Operand::Value(*start_val)], vec![IrType::I64]),
            });
            continue; // the end sentinel is not copied
        }
        block.push_inst_with(inst, att, loc);
    }
}
