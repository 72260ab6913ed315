//! Constant-table reflection for D3D9-era HLSL programs.
//!
//! A shader compiler reports the uniform constants of a compiled program as a
//! tree: top-level constants, structs, nested structs, and arrays of any of
//! them. The rendering engine wants a *flat* view: one record per leaf
//! constant, keyed by its dotted name (`light.position`, `bones.matrix`),
//! carrying the compiler-assigned register slot and an engine-assigned byte
//! offset into the engine's own constant buffer.
//!
//! This crate provides:
//!
//! - [`ConstantDefinition`] / [`ConstantType`]: the per-leaf record and its
//!   closed set of semantic type tags.
//! - [`ConstantMap`]: the insertion-ordered name → definition map.
//! - [`ConstantNode`] / [`ConstantTable`]: an abstract view of a compiler's
//!   reflection output, so the flatten walk is independent of any particular
//!   native compiler's handle/descriptor API.
//! - [`flatten_table`]: the recursive flatten walk itself.
//! - [`LogicalIndexMap`]: the shared, mutex-guarded logical register →
//!   physical offset map consumed by the parameter-binding system.

#![forbid(unsafe_code)]

mod constant;
mod flatten;
mod logical;
mod node;

#[cfg(test)]
mod tests;

pub use crate::constant::{ConstantDefinition, ConstantMap, ConstantType};
pub use crate::flatten::flatten_table;
pub use crate::logical::{
    lock_logical_index_map, shared_logical_index_map, BaseKind, LogicalIndexMap, LogicalIndexUse,
    ParameterScope, SharedLogicalIndexMap,
};
pub use crate::node::{ConstantDesc, ConstantNode, ConstantTable, RegisterClass, ScalarKind};

use thiserror::Error;

/// Failures while walking a compiler's constant table.
///
/// All variants are fatal to the whole flatten pass: a constant table we
/// cannot fully describe leaves the program's parameter layout undefined, so
/// the caller must treat the compile attempt as failed.
#[derive(Debug, Error)]
pub enum ReflectError {
    /// The compiler backend could not produce a description for a node.
    #[error("cannot retrieve constant description: {0}")]
    Description(String),
    /// A non-matrix constant declared a component count outside 1..=4.
    #[error("constant `{name}` has unsupported component count {columns}")]
    UnsupportedShape {
        /// Dotted name of the offending constant.
        name: String,
        /// Reported column count.
        columns: u32,
    },
    /// A matrix constant resolved to dimensions outside 2..=4 x 2..=4.
    ///
    /// The D3D9 register file cannot produce such a constant from valid HLSL;
    /// seeing one means the reflection data is corrupt or the backend
    /// miscounted registers, so it is reported instead of leaving the
    /// definition's type unset.
    #[error("constant `{name}` has unsupported matrix shape {first_dim}x{second_dim}")]
    UnsupportedMatrixShape {
        /// Dotted name of the offending constant.
        name: String,
        /// Registers per array element.
        first_dim: u32,
        /// Minor dimension after row/column-major adjustment.
        second_dim: u32,
    },
    /// A constant reported an array length of zero.
    #[error("constant `{name}` reports zero array elements")]
    ZeroArrayLength {
        /// Dotted name of the offending constant.
        name: String,
    },
}
