//! Function tracking: assigns each eligible function a dense id, builds
//! the module-global metadata table, wires the runtime up through a
//! module constructor/destructor, and plants a "function entered" call at
//! every eligible entry point.
//!
//! A function counts as unsafe only when at least one `unsafe_inst`
//! instruction sits inside a marker-delimited region; tags observed
//! outside an open region do not qualify.

use crate::config::Config;
use crate::ir::markers::{marker_kind, MarkerKind};
use crate::ir::metadata::UNSAFE_INST;
use crate::ir::module::{GlobalInit, IrFunction, IrGlobal, IrModule};
use crate::ir::{
    BasicBlock, BlockId, CallInfo, Instruction, IrConst, IrType, Operand, Terminator,
};
use crate::passes::eligible_for_instrumentation;
use crate::runtime::{DUMP_STATS, INIT_METADATA, METADATA_TABLE, MODULE_INIT, RECORD_FUNCTION};

/// One row of the function-metadata table:
/// `{u32 id, u8 hasUnsafeInst, u8 reserved, u16 padding}`, 8 bytes.
struct FunctionRecord {
    id: u32,
    has_unsafe: bool,
}

/// Run the pass over the whole module. Returns the number of functions
/// instrumented, or 0 when no function is eligible.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }

    // Phase 1: assign ids and analyze, in encounter order.
    let mut records: Vec<FunctionRecord> = Vec::new();
    let mut instrument: Vec<usize> = Vec::new();
    let mut next_id: u32 = 0;
    for (idx, func) in module.functions.iter_mut().enumerate() {
        if !eligible_for_instrumentation(func) {
            continue;
        }
        func.set_func_id(next_id);
        let has_unsafe = has_unsafe_inst_in_region(func);
        records.push(FunctionRecord { id: next_id, has_unsafe });
        instrument.push(idx);
        next_id += 1;
    }

    if records.is_empty() {
        return 0;
    }

    // Phase 2: runtime declarations.
    module.get_or_insert_declaration(INIT_METADATA, IrType::Void, &[IrType::Ptr, IrType::I32]);
    module.get_or_insert_declaration(RECORD_FUNCTION, IrType::Void, &[IrType::I32]);
    module.get_or_insert_declaration(DUMP_STATS, IrType::Void, &[]);

    // Phase 3: the packed table global.
    let count = records.len();
    module.globals.push(build_metadata_table(&records));

    // Phase 4: module constructor handing the table to the runtime, and
    // the statistics dump as destructor.
    module.functions.push(build_module_init(count as i32));
    module.add_constructor(MODULE_INIT, 0);
    module.add_destructor(DUMP_STATS, 0);

    // Phase 5: "function entered" call at each eligible entry point. The
    // id is read back from the attachment; a malformed node skips the
    // site.
    let mut instrumented = 0;
    for idx in instrument {
        let func = &mut module.functions[idx];
        let Some(id) = func.func_id() else { continue };
        let Some(entry) = func.blocks.first_mut() else { continue };
        entry.insert_inst(
            0,
            Instruction::Call {
                func: RECORD_FUNCTION.to_string(),
                info: CallInfo::void_call(
                    vec![Operand::Const(IrConst::I32(id as i32))],
                    vec![IrType::I32],
                ),
            },
        );
        instrumented += 1;
    }
    instrumented
}

/// True when the function contains an `unsafe_inst` tag inside an open
/// marker region.
fn has_unsafe_inst_in_region(func: &IrFunction) -> bool {
    for block in &func.blocks {
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
            if inside && block.attachments[i].has(UNSAFE_INST) {
                return true;
            }
        }
        if inside && block.term_attachments.has(UNSAFE_INST) {
            return true;
        }
    }
    false
}

/// Lay the records out as a packed, 8-byte-aligned internal constant.
fn build_metadata_table(records: &[FunctionRecord]) -> IrGlobal {
    let rows = records
        .iter()
        .map(|r| {
            GlobalInit::Compound(vec![
                GlobalInit::Scalar(IrConst::I32(r.id as i32)),
                GlobalInit::Scalar(IrConst::I8(r.has_unsafe as i8)),
                GlobalInit::Scalar(IrConst::I8(0)),
                GlobalInit::Scalar(IrConst::I16(0)),
            ])
        })
        .collect();
    IrGlobal {
        name: METADATA_TABLE.to_string(),
        ty: IrType::I8,
        size: records.len() * 8,
        align: 8,
        init: GlobalInit::Compound(rows),
        is_static: true,
        is_const: true,
        is_used: false,
        attachments: Default::default(),
    }
}

/// Synthesize the internal constructor that passes the table pointer and
/// row count to the runtime initializer.
fn build_module_init(count: i32) -> IrFunction {
    let mut ctor = IrFunction::new(MODULE_INIT, IrType::Void, vec![]);
    ctor.is_static = true;
    let table_ptr = ctor.alloc_value();
    let mut entry = BasicBlock::new(BlockId(0), Terminator::Return(None));
    entry.push_inst(Instruction::GlobalAddr { dest: table_ptr, name: METADATA_TABLE.to_string() });
    entry.push_inst(Instruction::Call {
        func: INIT_METADATA.to_string(),
        info: CallInfo::void_call(
            vec![Operand::Value(table_ptr), Operand::Const(IrConst::I32(count))],
            vec![IrType::Ptr, IrType::I32],
        ),
    });
    ctor.blocks.push(entry);
    ctor
}
