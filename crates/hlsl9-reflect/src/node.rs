use crate::ReflectError;

/// Storage class of a reflected constant, mirroring the classes a D3D9-era
/// compiler reports for constant-table entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterClass {
    Scalar,
    Vector,
    /// Matrix stored row-major: each register holds one row.
    MatrixRows,
    /// Matrix stored column-major: each register holds one column.
    MatrixColumns,
    Struct,
    /// Opaque objects (textures, vertex shaders, ...). Never consume
    /// constant-buffer space.
    Object,
}

/// Element kind of a reflected constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Float,
    Int,
    Bool,
    Sampler,
    /// Anything else the compiler may report (strings, void). Skipped.
    Other,
}

/// Description of one constant-table node, as reported by the compiler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantDesc {
    /// Raw name. Top-level globals carry a leading `$` sentinel and array
    /// nodes a trailing `[0]` suffix; the flattener strips both.
    pub name: String,
    pub class: RegisterClass,
    pub kind: ScalarKind,
    pub rows: u32,
    pub columns: u32,
    /// Array length; 1 for non-arrays.
    pub elements: u32,
    /// First register slot assigned to this constant.
    pub register_index: u32,
    /// Total registers assigned across all array elements.
    pub register_count: u32,
    /// Number of struct members (0 unless `class` is `Struct`).
    pub member_count: u32,
}

/// One node of a compiler's constant table.
///
/// This is the whole capability set the flatten walk needs: describe
/// yourself, and hand out child nodes by declaration index. Keeping the walk
/// behind this trait means a future compiler backend only has to adapt its
/// reflection API here, not re-derive the engine's layout rules.
///
/// Both methods are fallible because the underlying reflection data is
/// produced by an external component; a node that cannot be described is a
/// fatal, unexpected state for the whole compile (see
/// [`ReflectError::Description`]).
pub trait ConstantNode: Sized {
    fn desc(&self) -> Result<ConstantDesc, ReflectError>;

    /// Struct member `index` in declaration order.
    fn child(&self, index: u32) -> Result<Self, ReflectError>;
}

/// A compiler's complete constant table: the top-level constants of one
/// compiled program, in declaration order.
pub trait ConstantTable {
    type Node: ConstantNode;

    fn constant_count(&self) -> u32;

    fn constant(&self, index: u32) -> Result<Self::Node, ReflectError>;
}
