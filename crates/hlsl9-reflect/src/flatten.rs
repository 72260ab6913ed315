use tracing::trace;

use crate::constant::{ConstantDefinition, ConstantMap, ConstantType};
use crate::logical::{lock_logical_index_map, BaseKind, SharedLogicalIndexMap};
use crate::node::{ConstantDesc, ConstantNode, ConstantTable, RegisterClass, ScalarKind};
use crate::ReflectError;

/// Flattens a compiler constant table into `defs`, registering every emitted
/// constant in the shared logical→physical map.
///
/// Walks the table's top-level constants in declaration order, descending
/// through struct members and accumulating dotted names
/// (`outer.inner.field`). Returns the number of bytes the new `defs` entries
/// will occupy in the cache wire format, so the codec can pre-allocate.
///
/// Any failure to describe a node aborts the whole walk; a partially
/// flattened table would publish a layout that disagrees with the registers
/// the compiler actually assigned.
pub fn flatten_table<T: ConstantTable>(
    table: &T,
    defs: &mut ConstantMap,
    logical: &SharedLogicalIndexMap,
) -> Result<usize, ReflectError> {
    let mut encoded_size = 0;
    for index in 0..table.constant_count() {
        let node = table.constant(index)?;
        flatten_node(&node, "", defs, logical, &mut encoded_size)?;
    }
    Ok(encoded_size)
}

fn flatten_node<N: ConstantNode>(
    node: &N,
    prefix: &str,
    defs: &mut ConstantMap,
    logical: &SharedLogicalIndexMap,
    encoded_size: &mut usize,
) -> Result<(), ReflectError> {
    let desc = node.desc()?;
    let name = strip_name(&desc.name);

    if desc.class == RegisterClass::Struct {
        let prefix = format!("{prefix}{name}.");
        for member in 0..desc.member_count {
            let child = node.child(member)?;
            flatten_node(&child, &prefix, defs, logical, encoded_size)?;
        }
        return Ok(());
    }

    match desc.kind {
        ScalarKind::Float | ScalarKind::Int | ScalarKind::Bool => {}
        // Samplers and other opaque objects take no constant-buffer space.
        ScalarKind::Sampler | ScalarKind::Other => return Ok(()),
    }

    let full_name = format!("{prefix}{name}");
    let const_type = semantic_type(&desc, &full_name)?;
    let element_size = const_type.element_size();
    let kind = if const_type.is_float() {
        BaseKind::Float
    } else {
        BaseKind::Int
    };

    // The physical offset is the buffer watermark at the moment this
    // constant is discovered, so registration and offset assignment must be
    // one critical section.
    let physical_index = {
        let mut map = lock_logical_index_map(logical);
        map.register(desc.register_index, desc.elements * element_size, kind)
    };

    let def = ConstantDefinition {
        const_type,
        array_size: desc.elements,
        element_size,
        logical_index: desc.register_index,
        physical_index,
    };

    if defs.insert(full_name.clone(), def) {
        *encoded_size +=
            std::mem::size_of::<usize>() + full_name.len() + ConstantDefinition::ENCODED_SIZE;
    } else {
        // First definition wins; the registers were still accounted above.
        trace!(name = %full_name, "duplicate constant name in reflection output");
    }

    Ok(())
}

/// Strips the compiler's decorations from a raw constant name: a single
/// leading `$` marking top-level globals, and one trailing `[0]` emitted for
/// arrays (the engine applies its own indexing convention when array elements
/// are queried).
fn strip_name(raw: &str) -> &str {
    let name = raw.strip_prefix('$').unwrap_or(raw);
    name.strip_suffix("[0]").unwrap_or(name)
}

fn semantic_type(desc: &ConstantDesc, name: &str) -> Result<ConstantType, ReflectError> {
    if desc.kind == ScalarKind::Float
        && matches!(
            desc.class,
            RegisterClass::MatrixRows | RegisterClass::MatrixColumns
        )
    {
        return matrix_type(desc, name);
    }

    // Bool constants are set through the int register file.
    let is_float = desc.kind == ScalarKind::Float;
    Ok(match (desc.columns, is_float) {
        (1, true) => ConstantType::Float1,
        (2, true) => ConstantType::Float2,
        (3, true) => ConstantType::Float3,
        (4, true) => ConstantType::Float4,
        (1, false) => ConstantType::Int1,
        (2, false) => ConstantType::Int2,
        (3, false) => ConstantType::Int3,
        (4, false) => ConstantType::Int4,
        _ => {
            return Err(ReflectError::UnsupportedShape {
                name: name.to_owned(),
                columns: desc.columns,
            })
        }
    })
}

/// Resolves a matrix constant's semantic type from its register footprint.
///
/// The register allocator hands a matrix one register per major dimension, so
/// `register_count / elements` recovers the major dimension independent of
/// array length. The minor dimension comes from the declared columns for
/// row-major storage, or rows for column-major.
fn matrix_type(desc: &ConstantDesc, name: &str) -> Result<ConstantType, ReflectError> {
    if desc.elements == 0 {
        return Err(ReflectError::ZeroArrayLength {
            name: name.to_owned(),
        });
    }
    let first_dim = desc.register_count / desc.elements;
    let second_dim = match desc.class {
        RegisterClass::MatrixRows => desc.columns,
        _ => desc.rows,
    };

    Ok(match (first_dim, second_dim) {
        (2, 2) => ConstantType::Matrix2x2,
        (2, 3) => ConstantType::Matrix2x3,
        (2, 4) => ConstantType::Matrix2x4,
        (3, 2) => ConstantType::Matrix3x2,
        (3, 3) => ConstantType::Matrix3x3,
        (3, 4) => ConstantType::Matrix3x4,
        (4, 2) => ConstantType::Matrix4x2,
        (4, 3) => ConstantType::Matrix4x3,
        (4, 4) => ConstantType::Matrix4x4,
        _ => {
            return Err(ReflectError::UnsupportedMatrixShape {
                name: name.to_owned(),
                first_dim,
                second_dim,
            })
        }
    })
}
