//! Line coverage: tracks which unsafe source lines actually execute.
//!
//! Two-phase. At compile time, every `unsafe_line_info` attachment found
//! inside a marker region contributes a `"file:line"` key to an ordered
//! set, registered with the runtime by a synthesized constructor before
//! anything runs. At run time, a tracking call planted in front of each
//! such instruction reports the execution. A synthesized destructor
//! prints the coverage statistics at exit.
//!
//! Malformed `unsafe_line_info` nodes skip their site; the rest of the
//! module is still instrumented.

use crate::config::Config;
use crate::ir::metadata::{UNSAFE_INST, UNSAFE_LINE_INFO};
use crate::ir::markers::{marker_kind, MarkerKind};
use crate::ir::module::{IrFunction, IrModule};
use crate::ir::{
    BasicBlock, BlockId, CallInfo, Instruction, IrConst, IrType, Operand, Terminator,
};
use crate::runtime::{
    is_runtime_helper, COVERAGE_CTOR, COVERAGE_DTOR, PRINT_COVERAGE_STATS, REGISTER_UNSAFE_LINE,
    TRACK_UNSAFE_LINE,
};
use std::collections::BTreeSet;

/// An instrumentation site found during the read-only sweep.
struct Site {
    func: usize,
    block: usize,
    inst: usize,
    line: u32,
    file: String,
}

/// Run the pass over the whole module. Returns the number of tracked
/// sites.
pub fn run(module: &mut IrModule, cfg: &Config) -> usize {
    if !cfg.primary_package {
        return 0;
    }

    module.get_or_insert_declaration(
        REGISTER_UNSAFE_LINE,
        IrType::Void,
        &[IrType::I64, IrType::Ptr],
    );
    module.get_or_insert_declaration(TRACK_UNSAFE_LINE, IrType::Void, &[IrType::I64, IrType::Ptr]);
    module.get_or_insert_declaration(PRINT_COVERAGE_STATS, IrType::Void, &[]);

    // Phase 1: read-only sweep over all functions, collecting sites and
    // the ordered set of "file:line" keys.
    let mut sites: Vec<Site> = Vec::new();
    let mut lines: BTreeSet<String> = BTreeSet::new();
    for (fi, func) in module.functions.iter().enumerate() {
        if func.is_declaration || func.is_intrinsic || is_runtime_helper(&func.name) {
            continue;
        }
        collect_sites(func, fi, &mut sites, &mut lines);
    }

    // Phase 2: plant the tracking calls. Sites are grouped per function
    // and applied back-to-front within each block so indices stay valid.
    let changes = sites.len();
    for site in sites.iter().rev() {
        let label = module.global_string(&site.file);
        let func = &mut module.functions[site.func];
        let file_ptr = func.alloc_value();
        let block = &mut func.blocks[site.block];
        block.insert_inst(site.inst, Instruction::GlobalAddr { dest: file_ptr, name: label });
        block.insert_inst(
            site.inst + 1,
            Instruction::Call {
                func: TRACK_UNSAFE_LINE.to_string(),
                info: CallInfo::void_call(
                    vec![
                        Operand::Const(IrConst::I64(site.line as i64)),
                        Operand::Value(file_ptr),
                    ],
                    vec![IrType::I64, IrType::Ptr],
                ),
            },
        );
    }

    // Phase 3: register every line at startup, before any execution.
    if !lines.is_empty() {
        let ctor = build_register_ctor(module, &lines);
        module.functions.push(ctor);
        module.add_constructor(COVERAGE_CTOR, 0);
    }

    // Phase 4: print statistics at exit.
    if changes > 0 || !lines.is_empty() {
        module.functions.push(build_print_dtor());
        module.add_destructor(COVERAGE_DTOR, 0);
    }

    changes
}

/// Gather `(site, line, file)` tuples for instructions that carry both
/// `unsafe_inst` and a well-formed `unsafe_line_info` inside an open
/// marker region.
fn collect_sites(func: &IrFunction, fi: usize, sites: &mut Vec<Site>, lines: &mut BTreeSet<String>) {
    for (bi, block) in func.blocks.iter().enumerate() {
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
            if !inside || !block.attachments[i].has(UNSAFE_INST) {
                continue;
            }
            let Some(node) = block.attachments[i].get(UNSAFE_LINE_INFO) else { continue };
            // Malformed node: refuse this site only.
            let Ok((line, file)) = node.as_line_info() else { continue };
            lines.insert(format!("{}:{}", file, line));
            sites.push(Site { func: fi, block: bi, inst: i, line, file: file.to_string() });
        }
    }
}

/// Synthesize the constructor that registers all collected lines in set
/// order.
fn build_register_ctor(module: &mut IrModule, lines: &BTreeSet<String>) -> IrFunction {
    let mut ctor = IrFunction::new(COVERAGE_CTOR, IrType::Void, vec![]);
    ctor.is_static = true;
    let mut entry = BasicBlock::new(BlockId(0), Terminator::Return(None));
    for key in lines {
        // The line is the numeric suffix after the last colon; the file
        // may itself contain colons.
        let Some(split) = key.rfind(':') else { continue };
        let file = &key[..split];
        let Ok(line) = key[split + 1..].parse::<u32>() else { continue };
        let label = module.global_string(file);
        let file_ptr = ctor.alloc_value();
        entry.push_inst(Instruction::GlobalAddr { dest: file_ptr, name: label });
        entry.push_inst(Instruction::Call {
            func: REGISTER_UNSAFE_LINE.to_string(),
            info: CallInfo::void_call(
                vec![Operand::Const(IrConst::I64(line as i64)), Operand::Value(file_ptr)],
                vec![IrType::I64, IrType::Ptr],
            ),
        });
    }
    ctor.blocks.push(entry);
    ctor
}

/// Synthesize the destructor that prints coverage statistics.
fn build_print_dtor() -> IrFunction {
    let mut dtor = IrFunction::new(COVERAGE_DTOR, IrType::Void, vec![]);
    dtor.is_static = true;
    let mut entry = BasicBlock::new(BlockId(0), Terminator::Return(None));
    entry.push_inst(Instruction::Call {
        func: PRINT_COVERAGE_STATS.to_string(),
        info: CallInfo::void_call(vec![], vec![]),
    });
    dtor.blocks.push(entry);
    dtor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::markers::make_marker;
    use crate::ir::metadata::{Attachments, MetadataNode, MetadataOp};
    use crate::ir::Value;

    fn tagged_attachment(line: u32, file: &str) -> Attachments {
        let mut att = Attachments::new();
        att.set(UNSAFE_INST, MetadataNode::default());
        att.set(UNSAFE_LINE_INFO, MetadataNode::line_info(line, file));
        att
    }

    fn store(ptr: u32) -> Instruction {
        Instruction::Store { val: Operand::Const(IrConst::I32(1)), ptr: Value(ptr), ty: IrType::I32 }
    }

    fn marked_module(line: u32, file: &str) -> IrModule {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        let mut block = BasicBlock::new(BlockId(0), Terminator::Return(None));
        block.push_inst(make_marker(MarkerKind::Begin));
        block.push_inst_with(store(0), tagged_attachment(line, file), None);
        block.push_inst(make_marker(MarkerKind::End));
        func.blocks.push(block);
        let mut module = IrModule::new();
        module.functions.push(func);
        module
    }

    #[test]
    fn tracked_site_gets_call_with_matching_args() {
        let mut module = marked_module(42, "a.rs");
        let changes = run(&mut module, &Config::primary());
        assert_eq!(changes, 1);

        let block = &module.function("f").unwrap().blocks[0];
        // begin, global_addr, track, store, end
        let Instruction::GlobalAddr { dest, name } = &block.instructions[1] else {
            panic!("expected global addr")
        };
        let (label, value) =
            module.string_literals.iter().find(|(l, _)| l == name).expect("interned");
        assert_eq!(value, "a.rs");
        assert!(!label.is_empty());
        match &block.instructions[2] {
            Instruction::Call { func, info } if func == TRACK_UNSAFE_LINE => {
                assert_eq!(
                    info.args,
                    vec![Operand::Const(IrConst::I64(42)), Operand::Value(*dest)]
                );
            }
            other => panic!("expected track call, got {:?}", other),
        }
    }

    #[test]
    fn ctor_registers_lines_in_set_order() {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        let mut block = BasicBlock::new(BlockId(0), Terminator::Return(None));
        block.push_inst(make_marker(MarkerKind::Begin));
        block.push_inst_with(store(0), tagged_attachment(9, "b.rs"), None);
        block.push_inst_with(store(0), tagged_attachment(12, "a.rs"), None);
        block.push_inst_with(store(0), tagged_attachment(12, "a.rs"), None);
        block.push_inst(make_marker(MarkerKind::End));
        func.blocks.push(block);
        let mut module = IrModule::new();
        module.functions.push(func);

        let changes = run(&mut module, &Config::primary());
        assert_eq!(changes, 3);

        assert!(module.constructors.contains(&(COVERAGE_CTOR.to_string(), 0)));
        let ctor = module.function(COVERAGE_CTOR).unwrap();
        let registered: Vec<i64> = ctor.blocks[0]
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Call { func, info } if func == REGISTER_UNSAFE_LINE => {
                    match info.args[0] {
                        Operand::Const(c) => Some(c.to_i64()),
                        _ => None,
                    }
                }
                _ => None,
            })
            .collect();
        // Duplicates collapse; "a.rs:12" sorts before "b.rs:9".
        assert_eq!(registered, vec![12, 9]);
    }

    #[test]
    fn dtor_prints_stats() {
        let mut module = marked_module(1, "a.rs");
        run(&mut module, &Config::primary());
        assert!(module.destructors.contains(&(COVERAGE_DTOR.to_string(), 0)));
        let dtor = module.function(COVERAGE_DTOR).unwrap();
        assert!(matches!(
            &dtor.blocks[0].instructions[0],
            Instruction::Call { func, .. } if func == PRINT_COVERAGE_STATS
        ));
    }

    #[test]
    fn sites_outside_regions_are_ignored() {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        let mut block = BasicBlock::new(BlockId(0), Terminator::Return(None));
        block.push_inst_with(store(0), tagged_attachment(42, "a.rs"), None);
        func.blocks.push(block);
        let mut module = IrModule::new();
        module.functions.push(func);

        assert_eq!(run(&mut module, &Config::primary()), 0);
        assert!(module.function(COVERAGE_CTOR).is_none());
        assert!(module.function(COVERAGE_DTOR).is_none());
    }

    #[test]
    fn malformed_line_info_skips_the_site_only() {
        let mut func = IrFunction::new("f", IrType::Void, vec![]);
        let mut block = BasicBlock::new(BlockId(0), Terminator::Return(None));
        block.push_inst(make_marker(MarkerKind::Begin));
        let mut bad = Attachments::new();
        bad.set(UNSAFE_INST, MetadataNode::default());
        bad.set(UNSAFE_LINE_INFO, MetadataNode(vec![MetadataOp::Str("backwards".into())]));
        block.push_inst_with(store(0), bad, None);
        block.push_inst_with(store(0), tagged_attachment(7, "a.rs"), None);
        block.push_inst(make_marker(MarkerKind::End));
        func.blocks.push(block);
        let mut module = IrModule::new();
        module.functions.push(func);

        assert_eq!(run(&mut module, &Config::primary()), 1);
    }

    #[test]
    fn non_primary_build_is_untouched() {
        let mut module = marked_module(42, "a.rs");
        let before = module.clone();
        assert_eq!(run(&mut module, &Config::non_primary()), 0);
        assert_eq!(module, before);
    }
}
