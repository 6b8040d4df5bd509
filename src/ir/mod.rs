//! The instrumentation IR.
//!
//! A small SSA-style representation: a module of functions, each a list
//! of basic blocks holding instructions plus one terminator. Metadata
//! attachments and debug locations ride alongside the instructions and
//! are the only channel the passes use to talk to each other.

pub mod constants;
pub mod instruction;
pub mod markers;
pub mod metadata;
pub mod module;
pub mod types;

pub use constants::IrConst;
pub use instruction::{
    AtomicOrdering, AtomicRmwOp, BasicBlock, BlockId, CallInfo, Instruction, IrBinOp, IrCmpOp,
    Operand, Terminator, Value,
};
pub use metadata::{Attachments, DebugLoc, MetadataError, MetadataNode, MetadataOp};
pub use module::{GlobalInit, IrFunction, IrGlobal, IrModule, IrParam};
pub use types::IrType;
