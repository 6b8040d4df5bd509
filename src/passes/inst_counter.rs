//! Instruction counting: for every basic block, counts total
//! instructions and categorizes the ones inside marker-delimited regions,
//! then emits a single report call before the block terminator.
//!
//! Requires the dense function id planted by the function tracker;
//! functions without it are skipped silently. Sentinels and debug
//! intrinsics are never counted. Blocks with zero unsafe instructions
//! still report, so the runtime keeps an exact global
//! instructions-executed count.

use crate::config::Config;
use crate::ir::markers::{marker_kind, MarkerKind};
use crate::ir::module::{IrFunction, IrModule};
use crate::ir::{CallInfo, Instruction, IrConst, IrType, Operand};
use crate::passes::eligible_for_instrumentation;
use crate::runtime::RECORD_BLOCK;

/// Category of an unsafe instruction, indexing the per-block counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Load = 0,
    Store = 1,
    Call = 2,
    Cast = 3,
    Gep = 4,
    Other = 5,
}

/// Per-block counters: two 32-bit totals, six 16-bit category counters.
#[derive(Debug, Default, Clone, Copy)]
struct BlockCounts {
    total: u32,
    unsafe_total: u32,
    by_category: [u16; 6],
}

impl BlockCounts {
    fn has_instructions(&self) -> bool {
        self.total > 0
    }
}

/// Run the pass on every eligible function. Returns the number of report
/// calls inserted.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }

    module.get_or_insert_declaration(
        RECORD_BLOCK,
        IrType::Void,
        &[
            IrType::I32,
            IrType::I32,
            IrType::I32,
            IrType::I16,
            IrType::I16,
            IrType::I16,
            IrType::I16,
            IrType::I16,
            IrType::I16,
        ],
    );

    let mut changes = 0;
    for func in &mut module.functions {
        if !eligible_for_instrumentation(func) {
            continue;
        }
        // Missing id: the tracker never saw this function; skip silently.
        let Some(func_id) = func.func_id() else { continue };
        changes += instrument_function(func, func_id);
    }
    changes
}

fn instrument_function(func: &mut IrFunction, func_id: u32) -> usize {
    let mut inserted = 0;
    for block in &mut func.blocks {
        let counts = analyze_block(block);
        if !counts.has_instructions() {
            continue;
        }
        block.push_inst(record_block_call(func_id, &counts));
        inserted += 1;
    }
    inserted
}

/// Scan a block with a running inside-region flag flipped by the
/// sentinels. The terminator counts as an instruction; it sits after any
/// end sentinel, so it is only unsafe under an unclosed region.
fn analyze_block(block: &crate::ir::BasicBlock) -> BlockCounts {
    let mut counts = BlockCounts::default();
    let mut inside = false;

    for inst in &block.instructions {
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
        if inst.is_debug_intrinsic() {
            continue;
        }
        counts.total += 1;
        if inside {
            counts.unsafe_total += 1;
            let cat = categorize(inst) as usize;
            counts.by_category[cat] = counts.by_category[cat].saturating_add(1);
        }
    }

    counts.total += 1; // the terminator
    if inside {
        counts.unsafe_total += 1;
        let cat = Category::Other as usize;
        counts.by_category[cat] = counts.by_category[cat].saturating_add(1);
    }
    counts
}

/// Map an instruction to its unsafe category.
///
/// Stores cover the atomic update forms as well; casts count only when
/// they move a value into or out of pointer provenance; inline asm is a
/// call site like any other.
fn categorize(inst: &Instruction) -> Category {
    match inst {
        Instruction::Load { .. } => Category::Load,
        Instruction::Store { .. }
        | Instruction::AtomicCmpxchg { .. }
        | Instruction::AtomicRmw { .. } => Category::Store,
        Instruction::Call { .. }
        | Instruction::CallIndirect { .. }
        | Instruction::InlineAsm { .. } => Category::Call,
        Instruction::Cast { from_ty, to_ty, .. } if from_ty.is_pointer() || to_ty.is_pointer() => {
            Category::Cast
        }
        Instruction::GetElementPtr { .. } => Category::Gep,
        _ => Category::Other,
    }
}

fn record_block_call(func_id: u32, counts: &BlockCounts) -> Instruction {
    let mut args = vec![
        Operand::Const(IrConst::I32(func_id as i32)),
        Operand::Const(IrConst::I32(counts.total as i32)),
        Operand::Const(IrConst::I32(counts.unsafe_total as i32)),
    ];
    let mut arg_types = vec![IrType::I32, IrType::I32, IrType::I32];
    for c in counts.by_category {
        args.push(Operand::Const(IrConst::I16(c as i16)));
        arg_types.push(IrType::I16);
    }
    Instruction::Call {
        func: RECORD_BLOCK.to_string(),
        info: CallInfo::void_call(args, arg_types),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::markers::make_marker;
    use crate::ir::metadata::{Attachments, MetadataNode, UNSAFE_INST};
    use crate::ir::{BasicBlock, BlockId, IrBinOp, Terminator, Value};

    fn unsafe_attachment() -> Attachments {
        let mut att = Attachments::new();
        att.set(UNSAFE_INST, MetadataNode::default());
        att
    }

    fn load(dest: u32, ptr: u32) -> Instruction {
        Instruction::Load { dest: Value(dest), ptr: Value(ptr), ty: IrType::I32 }
    }

    fn add(dest: u32) -> Instruction {
        Instruction::BinOp {
            dest: Value(dest),
            op: IrBinOp::Add,
            lhs: Operand::Const(IrConst::I32(1)),
            rhs: Operand::Const(IrConst::I32(2)),
            ty: IrType::I32,
        }
    }

    fn call(name: &str) -> Instruction {
        Instruction::Call { func: name.to_string(), info: CallInfo::void_call(vec![], vec![]) }
    }

    /// A function with one block: alloca, begin, load, gep, call, end, add.
    fn sample_func() -> IrFunction {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        func.set_func_id(3);
        let mut block = BasicBlock::new(BlockId(0), Terminator::Return(None));
        block.push_inst(Instruction::Alloca { dest: Value(0), ty: IrType::I32, size: 4, align: 4 });
        block.push_inst(make_marker(crate::ir::markers::MarkerKind::Begin));
        block.push_inst_with(load(1, 0), unsafe_attachment(), None);
        block.push_inst_with(
            Instruction::GetElementPtr {
                dest: Value(2),
                base: Value(0),
                offset: Operand::Const(IrConst::I64(4)),
                ty: IrType::Ptr,
            },
            unsafe_attachment(),
            None,
        );
        block.push_inst_with(call("memcpy"), unsafe_attachment(), None);
        block.push_inst(make_marker(crate::ir::markers::MarkerKind::End));
        block.push_inst(add(3));
        func.blocks.push(block);
        func
    }

    fn extract_record_args(func: &IrFunction) -> Vec<i64> {
        let block = &func.blocks[0];
        match block.instructions.last().unwrap() {
            Instruction::Call { func: name, info } if name == RECORD_BLOCK => info
                .args
                .iter()
                .map(|a| match a {
                    Operand::Const(c) => c.to_i64(),
                    _ => panic!("record args are constants"),
                })
                .collect(),
            other => panic!("expected record call, got {:?}", other),
        }
    }

    #[test]
    fn counts_and_categories() {
        let mut module = IrModule::new();
        module.functions.push(sample_func());

        let changes = run(&mut module, &Config::primary());
        assert_eq!(changes, 1);

        let args = extract_record_args(&module.functions[0]);
        // func_id, total (alloca+load+gep+call+add+terminator), unsafe_total,
        // load, store, call, cast, gep, other
        assert_eq!(args, vec![3, 6, 3, 1, 0, 1, 0, 1, 0]);
    }

    #[test]
    fn markers_and_debug_intrinsics_are_not_counted() {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        func.set_func_id(0);
        let mut block = BasicBlock::new(BlockId(0), Terminator::Return(None));
        block.push_inst(make_marker(crate::ir::markers::MarkerKind::Begin));
        block.push_inst(call("llvm.dbg.value"));
        block.push_inst(make_marker(crate::ir::markers::MarkerKind::End));
        func.blocks.push(block);
        let mut module = IrModule::new();
        module.functions.push(func);

        run(&mut module, &Config::primary());
        let args = extract_record_args(&module.functions[0]);
        // only the terminator counts
        assert_eq!(args, vec![0, 1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn safe_blocks_still_report_totals() {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        func.set_func_id(7);
        let mut block = BasicBlock::new(BlockId(0), Terminator::Return(None));
        block.push_inst(add(0));
        block.push_inst(add(1));
        func.blocks.push(block);
        let mut module = IrModule::new();
        module.functions.push(func);

        run(&mut module, &Config::primary());
        let args = extract_record_args(&module.functions[0]);
        assert_eq!(args, vec![7, 3, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn category_partition_sums_to_unsafe_total() {
        let mut module = IrModule::new();
        module.functions.push(sample_func());
        run(&mut module, &Config::primary());
        let args = extract_record_args(&module.functions[0]);
        let unsafe_total = args[2];
        let category_sum: i64 = args[3..9].iter().sum();
        assert_eq!(category_sum, unsafe_total);
    }

    #[test]
    fn function_without_id_is_skipped() {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        func.blocks.push(BasicBlock::new(BlockId(0), Terminator::Return(None)));
        let mut module = IrModule::new();
        module.functions.push(func);
        let changes = run(&mut module, &Config::primary());
        assert_eq!(changes, 0);
        assert!(module.functions[0].blocks[0].instructions.is_empty());
    }

    #[test]
    fn pointer_casts_count_as_cast_others_do_not() {
        assert_eq!(
            categorize(&Instruction::Cast {
                dest: Value(0),
                src: Operand::Value(Value(1)),
                from_ty: IrType::I64,
                to_ty: IrType::Ptr,
            }),
            Category::Cast
        );
        assert_eq!(
            categorize(&Instruction::Cast {
                dest: Value(0),
                src: Operand::Value(Value(1)),
                from_ty: IrType::I64,
                to_ty: IrType::I32,
            }),
            Category::Other
        );
    }
}
