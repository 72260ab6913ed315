//! High-level HLSL program objects for a D3D9-class render system.
//!
//! The actual shader compilation is done by an external, vendor-supplied
//! compiler sitting behind the [`ShaderCompiler`] trait. This crate owns the
//! glue around it:
//!
//! - [`HlslProgram`]: the program object. Translates engine-side
//!   configuration (target profiles, matrix packing, optimisation level,
//!   preprocessor defines) into compile flags, invokes the compiler, and
//!   flattens the resulting constant table through `hlsl9-reflect`.
//! - [`cache`]: a binary codec that persists the compiled microcode blob
//!   together with the flattened constant map, so a later session can skip
//!   the compiler entirely.
//! - [`MicrocodeCache`]: the cache-store seam, keyed by a 32-bit hash of the
//!   shader source and its compile configuration.

#![forbid(unsafe_code)]

pub mod cache;
mod compile;
mod program;
mod store;


pub use crate::cache::CacheError;
pub use crate::compile::{
    parse_defines, CompileFlags, CompileOutput, CompileRequest, OptimisationLevel, ShaderCompiler,
};
pub use crate::program::{HlslProgram, ProgramError, ShaderStage};
pub use crate::store::{CacheStats, MemoryMicrocodeCache, MicrocodeCache};
