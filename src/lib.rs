//! Instrumentation passes for profiling the dynamic behavior of unsafe
//! code regions.
//!
//! An upstream front-end tags IR instructions that originate inside
//! unsafe regions with an `unsafe_inst` attachment. The passes in this
//! crate rewrite the IR so the produced binary reports, at run time,
//! which unsafe lines executed, how many unsafe instructions ran per
//! function and block by category, how many CPU cycles were spent inside
//! unsafe regions, how long external calls took, and which heap
//! addresses unsafe code touched. Aggregation and reporting live in a
//! companion runtime library; this crate only plants the calls.
//!
//! The entry point is [`passes::run_pipeline`], which runs the passes in
//! their fixed dependency order under a [`config::Config`] built once
//! from the environment.

pub mod config;
pub mod ir;
pub mod passes;
pub mod runtime;
