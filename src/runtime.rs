//! Runtime helper interface.
//!
//! The passes declare these functions but never define them; their bodies
//! live in the companion runtime library linked into the final binary.
//! The names form a reserved prefix space and are never themselves
//! instrumented.

/// Program-start notification, called by the cycle-counter constructor.
pub const PROGRAM_START: &str = "record_program_start";
/// Begins a cycle measurement, returning the start counter.
pub const CYCLE_START: &str = "cpu_cycle_start_measurement";
/// Ends a cycle measurement; the argument is the matching start value.
pub const CYCLE_END: &str = "cpu_cycle_end_measurement";
/// Cycle statistics dump, registered as a destructor.
pub const CYCLE_PRINT_STATS: &str = "print_cpu_cycle_stats";

/// External-call timer start, returning a timestamp.
pub const EXTERNAL_CALL_START: &str = "external_call_start";
/// External-call timer end; sentinel zero tolerates a missing start.
pub const EXTERNAL_CALL_END: &str = "external_call_end";

/// Generic memory-access report: `(ptr)`.
pub const DYN_MEM_ACCESS: &str = "dyn_mem_access";
/// Unsafe-region memory-access report: `(ptr, is_load)`.
pub const DYN_UNSAFE_MEM_ACCESS: &str = "dyn_unsafe_mem_access";

/// Hands the function-metadata table to the runtime: `(table_ptr, count)`.
pub const INIT_METADATA: &str = "__unsafe_init_metadata";
/// Function-entry report: `(func_id)`.
pub const RECORD_FUNCTION: &str = "__unsafe_record_function";
/// Per-block instruction-count report.
pub const RECORD_BLOCK: &str = "__unsafe_record_block";
/// Statistics dump, registered as a destructor.
pub const DUMP_STATS: &str = "__unsafe_dump_stats";

/// Registers an unsafe source line at startup: `(line, file_ptr)`.
pub const REGISTER_UNSAFE_LINE: &str = "register_unsafe_line";
/// Reports execution of an unsafe source line: `(line, file_ptr)`.
pub const TRACK_UNSAFE_LINE: &str = "track_unsafe_line_execution";
/// Coverage statistics dump.
pub const PRINT_COVERAGE_STATS: &str = "print_unsafe_coverage_stats";

// Names of functions and globals the passes synthesize.
pub const MODULE_INIT: &str = "__unsafe_module_init";
pub const CYCLE_CTOR: &str = "cpu_cycle_ctor";
pub const COVERAGE_CTOR: &str = "unsafe_lines_module_ctor";
pub const COVERAGE_DTOR: &str = "unsafe_lines_module_dtor";
pub const METADATA_TABLE: &str = "__unsafe_metadata_table";
pub const COVERAGE_ANCHOR: &str = "__unsafe_coverage_anchor";

/// Returns true for names inside the reserved runtime prefix space.
/// Such functions are never instrumented, neither as callees nor as
/// hosts. `dyn_unsafe_mem_access` does not share the `dyn_mem_` prefix
/// and is listed explicitly.
pub fn is_runtime_helper(name: &str) -> bool {
    name.starts_with("cpu_cycle_")
        || name.starts_with("record_")
        || name.starts_with("external_call_")
        || name.starts_with("__unsafe_")
        || name.starts_with("dyn_mem_")
        || name == DYN_UNSAFE_MEM_ACCESS
        || name == REGISTER_UNSAFE_LINE
        || name == TRACK_UNSAFE_LINE
        || name == PRINT_COVERAGE_STATS
        || name == COVERAGE_CTOR
        || name == COVERAGE_DTOR
}
