/// IR instruction definitions: the instruction set the passes rewrite.
///
/// Key types:
/// - `BlockId`: basic block identifier (u32 index, formats as ".LBB{id}")
/// - `Value`: SSA value reference (u32 index)
/// - `Operand`: either a `Value` or an `IrConst`
/// - `Instruction`: the main instruction enum
/// - `CallInfo`: shared metadata for direct and indirect calls
/// - `Terminator`: block terminators (return, branch)
/// - `BasicBlock`: a labeled instruction sequence ending in a terminator,
///   with per-instruction attachment and debug-location vectors
use super::constants::IrConst;
use super::metadata::{Attachments, DebugLoc};
use super::types::IrType;

/// A basic block identifier. Uses a u32 index for zero-cost copies
/// instead of heap-allocated String labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, ".LBB{}", self.0)
    }
}

/// An SSA value reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Value(pub u32);

/// An operand (either a value reference or a constant).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Value(Value),
    Const(IrConst),
}

/// Memory ordering for atomic operations and fences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicOrdering {
    Relaxed,
    Acquire,
    Release,
    AcqRel,
    SeqCst,
}

/// Atomic read-modify-write operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtomicRmwOp {
    Add,
    Sub,
    And,
    Or,
    Xor,
    Xchg,
}

/// Binary operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinOp {
    Add,
    Sub,
    Mul,
    And,
    Or,
    Xor,
    Shl,
    LShr,
}

/// Comparison operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrCmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Shared call metadata for both direct and indirect function calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallInfo {
    /// Destination value for the return, or None for void calls.
    pub dest: Option<Value>,
    /// Argument operands.
    pub args: Vec<Operand>,
    /// Type of each argument (parallel to `args`).
    pub arg_types: Vec<IrType>,
    /// Return type of the callee.
    pub return_type: IrType,
    /// Whether the callee is variadic.
    pub is_variadic: bool,
}

impl CallInfo {
    /// A void call with the given argument operands and types.
    pub fn void_call(args: Vec<Operand>, arg_types: Vec<IrType>) -> Self {
        CallInfo { dest: None, args, arg_types, return_type: IrType::Void, is_variadic: false }
    }
}

/// An IR instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Instruction {
    /// Allocate stack space: %dest = alloca ty
    Alloca { dest: Value, ty: IrType, size: usize, align: usize },

    /// Load from memory: %dest = load ptr
    Load { dest: Value, ptr: Value, ty: IrType },

    /// Store to memory: store val, ptr
    Store { val: Operand, ptr: Value, ty: IrType },

    /// Binary operation: %dest = op lhs, rhs
    BinOp { dest: Value, op: IrBinOp, lhs: Operand, rhs: Operand, ty: IrType },

    /// Comparison: %dest = cmp op lhs, rhs
    Cmp { dest: Value, op: IrCmpOp, lhs: Operand, rhs: Operand, ty: IrType },

    /// Direct function call: %dest = call func(args...)
    Call { func: String, info: CallInfo },

    /// Indirect function call through a pointer.
    CallIndirect { func_ptr: Operand, info: CallInfo },

    /// Get element pointer: %dest = gep base, offset
    GetElementPtr { dest: Value, base: Value, offset: Operand, ty: IrType },

    /// Type cast/conversion.
    Cast { dest: Value, src: Operand, from_ty: IrType, to_ty: IrType },

    /// Copy a value.
    Copy { dest: Value, src: Operand },

    /// Get the address of a global.
    GlobalAddr { dest: Value, name: String },

    /// Atomic read-modify-write: %dest = atomicrmw op ptr, val
    AtomicRmw { dest: Value, op: AtomicRmwOp, ptr: Operand, val: Operand, ty: IrType, ordering: AtomicOrdering },

    /// Atomic compare-exchange: %dest = cmpxchg ptr, expected, desired
    AtomicCmpxchg { dest: Value, ptr: Operand, expected: Operand, desired: Operand, ty: IrType, ordering: AtomicOrdering },

    /// Memory fence.
    Fence { ordering: AtomicOrdering },

    /// SSA phi node: merges values from different predecessor blocks.
    Phi { dest: Value, ty: IrType, incoming: Vec<(Operand, BlockId)> },

    /// Inline assembly statement. The instrumentation sentinels are
    /// side-effecting inline asm with empty constraints.
    InlineAsm { template: String, constraints: String, has_side_effects: bool },
}

/// Block terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    /// Return from function.
    Return(Option<Operand>),

    /// Unconditional branch.
    Branch(BlockId),

    /// Conditional branch.
    CondBranch { cond: Operand, true_label: BlockId, false_label: BlockId },

    /// Unreachable (e.g., after a noreturn call).
    Unreachable,
}

impl Instruction {
    /// Get the destination value defined by this instruction, if any.
    pub fn dest(&self) -> Option<Value> {
        match self {
            Instruction::Alloca { dest, .. }
            | Instruction::Load { dest, .. }
            | Instruction::BinOp { dest, .. }
            | Instruction::Cmp { dest, .. }
            | Instruction::GetElementPtr { dest, .. }
            | Instruction::Cast { dest, .. }
            | Instruction::Copy { dest, .. }
            | Instruction::GlobalAddr { dest, .. }
            | Instruction::AtomicRmw { dest, .. }
            | Instruction::AtomicCmpxchg { dest, .. }
            | Instruction::Phi { dest, .. } => Some(*dest),
            Instruction::Call { info, .. } | Instruction::CallIndirect { info, .. } => info.dest,
            Instruction::Store { .. }
            | Instruction::Fence { .. }
            | Instruction::InlineAsm { .. } => None,
        }
    }

    /// Returns true for phi nodes.
    #[inline]
    pub fn is_phi(&self) -> bool {
        matches!(self, Instruction::Phi { .. })
    }

    /// The pointer operand of a load or store, or None for anything else.
    pub fn memory_pointer(&self) -> Option<Value> {
        match self {
            Instruction::Load { ptr, .. } | Instruction::Store { ptr, .. } => Some(*ptr),
            _ => None,
        }
    }

    /// Returns true for calls to front-end debug intrinsics, which every
    /// pass skips when counting or choosing insertion points.
    pub fn is_debug_intrinsic(&self) -> bool {
        matches!(self, Instruction::Call { func, .. } if func.starts_with("llvm.dbg."))
    }
}

/// A basic block.
///
/// `attachments` and `debug_locs` are parallel to `instructions` and are
/// kept in sync by `push_inst`/`insert_inst`/`remove_inst`; their lengths
/// are always equal. The terminator carries its own attachment map and
/// debug location since the front-end can tag it like any instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BasicBlock {
    pub label: BlockId,
    pub instructions: Vec<Instruction>,
    pub terminator: Terminator,
    /// Per-instruction metadata attachments, parallel to `instructions`.
    pub attachments: Vec<Attachments>,
    /// Per-instruction debug locations, parallel to `instructions`.
    pub debug_locs: Vec<Option<DebugLoc>>,
    pub term_attachments: Attachments,
    pub term_debug_loc: Option<DebugLoc>,
}

impl BasicBlock {
    pub fn new(label: BlockId, terminator: Terminator) -> Self {
        Self {
            label,
            instructions: Vec::new(),
            terminator,
            attachments: Vec::new(),
            debug_locs: Vec::new(),
            term_attachments: Attachments::new(),
            term_debug_loc: None,
        }
    }

    /// Append an instruction with empty attachments and no debug location.
    pub fn push_inst(&mut self, inst: Instruction) {
        self.instructions.push(inst);
        self.attachments.push(Attachments::new());
        self.debug_locs.push(None);
    }

    /// Append an instruction together with its attachments and location.
    pub fn push_inst_with(&mut self, inst: Instruction, att: Attachments, loc: Option<DebugLoc>) {
        self.instructions.push(inst);
        self.attachments.push(att);
        self.debug_locs.push(loc);
    }

    /// Insert an instruction at `idx` with empty attachments and no debug
    /// location, shifting later instructions.
    pub fn insert_inst(&mut self, idx: usize, inst: Instruction) {
        self.instructions.insert(idx, inst);
        self.attachments.insert(idx, Attachments::new());
        self.debug_locs.insert(idx, None);
    }

    /// Remove and return the instruction at `idx`, dropping its metadata.
    pub fn remove_inst(&mut self, idx: usize) -> Instruction {
        self.attachments.remove(idx);
        self.debug_locs.remove(idx);
        self.instructions.remove(idx)
    }
}
