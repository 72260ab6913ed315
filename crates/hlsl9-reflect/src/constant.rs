use hashbrown::HashMap;

/// Semantic type of a single shader constant.
///
/// The D3D9 register file stores everything in 4-component float or int
/// registers, so the closed set here is the cross product of the two numeric
/// kinds with component widths 1..=4, plus the nine matrix shapes the
/// register allocator can produce. Bool constants are surfaced as the int
/// variants; samplers never reach this type because they occupy no
/// constant-buffer space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantType {
    Float1,
    Float2,
    Float3,
    Float4,
    Int1,
    Int2,
    Int3,
    Int4,
    Matrix2x2,
    Matrix2x3,
    Matrix2x4,
    Matrix3x2,
    Matrix3x3,
    Matrix3x4,
    Matrix4x2,
    Matrix4x3,
    Matrix4x4,
}

impl ConstantType {
    /// Stable tag used in the on-disk cache image.
    pub fn wire_tag(self) -> u32 {
        match self {
            ConstantType::Float1 => 0,
            ConstantType::Float2 => 1,
            ConstantType::Float3 => 2,
            ConstantType::Float4 => 3,
            ConstantType::Int1 => 4,
            ConstantType::Int2 => 5,
            ConstantType::Int3 => 6,
            ConstantType::Int4 => 7,
            ConstantType::Matrix2x2 => 8,
            ConstantType::Matrix2x3 => 9,
            ConstantType::Matrix2x4 => 10,
            ConstantType::Matrix3x2 => 11,
            ConstantType::Matrix3x3 => 12,
            ConstantType::Matrix3x4 => 13,
            ConstantType::Matrix4x2 => 14,
            ConstantType::Matrix4x3 => 15,
            ConstantType::Matrix4x4 => 16,
        }
    }

    /// Inverse of [`ConstantType::wire_tag`]. Unknown tags come from corrupt
    /// or stale cache entries and must be rejected by the decoder.
    pub fn from_wire_tag(tag: u32) -> Option<Self> {
        Some(match tag {
            0 => ConstantType::Float1,
            1 => ConstantType::Float2,
            2 => ConstantType::Float3,
            3 => ConstantType::Float4,
            4 => ConstantType::Int1,
            5 => ConstantType::Int2,
            6 => ConstantType::Int3,
            7 => ConstantType::Int4,
            8 => ConstantType::Matrix2x2,
            9 => ConstantType::Matrix2x3,
            10 => ConstantType::Matrix2x4,
            11 => ConstantType::Matrix3x2,
            12 => ConstantType::Matrix3x3,
            13 => ConstantType::Matrix3x4,
            14 => ConstantType::Matrix4x2,
            15 => ConstantType::Matrix4x3,
            16 => ConstantType::Matrix4x4,
            _ => return None,
        })
    }

    /// Storage size of one array element, in 4-component register units.
    ///
    /// D3D9 pads every scalar/vector constant to a full register, so all
    /// non-matrix types occupy 1. Matrices reserve a full register per
    /// logical row regardless of the second dimension: 2-row shapes occupy
    /// 8 units, 3-row 12, 4-row 16. These values feed both the physical
    /// buffer layout and the cache image, so they must never change.
    pub fn element_size(self) -> u32 {
        match self {
            ConstantType::Float1
            | ConstantType::Float2
            | ConstantType::Float3
            | ConstantType::Float4
            | ConstantType::Int1
            | ConstantType::Int2
            | ConstantType::Int3
            | ConstantType::Int4 => 1,
            ConstantType::Matrix2x2 | ConstantType::Matrix2x3 | ConstantType::Matrix2x4 => 8,
            ConstantType::Matrix3x2 | ConstantType::Matrix3x3 | ConstantType::Matrix3x4 => 12,
            ConstantType::Matrix4x2 | ConstantType::Matrix4x3 | ConstantType::Matrix4x4 => 16,
        }
    }

    /// Whether constants of this type live in the float register file.
    /// Matrices are always float in D3D9.
    pub fn is_float(self) -> bool {
        !matches!(
            self,
            ConstantType::Int1 | ConstantType::Int2 | ConstantType::Int3 | ConstantType::Int4
        )
    }
}

/// One flattened leaf constant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantDefinition {
    /// Semantic type tag.
    pub const_type: ConstantType,
    /// Array length (1 for non-arrays).
    pub array_size: u32,
    /// Per-element storage size in register units; see
    /// [`ConstantType::element_size`].
    pub element_size: u32,
    /// Compiler-assigned register slot.
    pub logical_index: u32,
    /// Engine-assigned byte offset into the program's constant buffer.
    pub physical_index: u32,
}

impl ConstantDefinition {
    /// Size of the fixed definition image in the cache wire format: five
    /// little-endian `u32` fields. The codec asserts its raw struct matches.
    pub const ENCODED_SIZE: usize = 20;

    /// Whether this constant is set through the float register file.
    pub fn is_float(&self) -> bool {
        self.const_type.is_float()
    }
}

/// Flat name → definition map with insertion-ordered iteration.
///
/// Two properties matter to callers:
///
/// - First insertion of a name wins; re-inserting the same dotted name is a
///   no-op. Array expansion in some compiler backends can report the same
///   constant more than once, and the first description is the authoritative
///   one.
/// - Iteration order is insertion order. The cache codec writes entries in
///   iteration order and the logical→physical map is rebuilt from it after a
///   cache load, so the order must be reproducible between a fresh compile
///   and a cached reload.
#[derive(Debug, Clone, Default)]
pub struct ConstantMap {
    entries: Vec<(String, ConstantDefinition)>,
    index: HashMap<String, usize>,
}

impl ConstantMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts `def` under `name` unless the name is already present.
    /// Returns `true` if the entry was inserted.
    pub fn insert(&mut self, name: String, def: ConstantDefinition) -> bool {
        if self.index.contains_key(&name) {
            return false;
        }
        self.index.insert(name.clone(), self.entries.len());
        self.entries.push((name, def));
        true
    }

    pub fn get(&self, name: &str) -> Option<&ConstantDefinition> {
        self.index.get(name).map(|&i| &self.entries[i].1)
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ConstantDefinition)> {
        self.entries.iter().map(|(name, def)| (name.as_str(), def))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}

impl PartialEq for ConstantMap {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}
