use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::constant::ConstantMap;

/// Numeric register file a constant is set through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseKind {
    Float,
    Int,
}

/// Variability scope of a constant. HLSL constant tables only produce
/// globals; the enum exists so the parameter system's per-object scopes can
/// share the record shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterScope {
    Global,
}

/// Layout record for one logical register slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogicalIndexUse {
    /// Byte offset into the physical constant buffer.
    pub physical_index: u32,
    /// Total size in register units (`array_size * element_size`).
    pub size: u32,
    pub scope: ParameterScope,
    pub kind: BaseKind,
}

/// Logical register slot → physical buffer layout.
///
/// `buffer_size` is the running total, in register units, of everything
/// registered so far; the physical byte offset handed to the next constant is
/// always `4 * buffer_size` at the moment of registration. The map grows
/// monotonically until [`LogicalIndexMap::clear`].
#[derive(Debug, Default)]
pub struct LogicalIndexMap {
    map: BTreeMap<u32, LogicalIndexUse>,
    buffer_size: u32,
}

/// The logical→physical map as shared between the compiling thread and
/// parameter-binding code.
///
/// Parameter setup may query the layout from another thread while a compile
/// is still populating it, so every access goes through the mutex. The
/// [`shared_logical_index_map`] constructor is the only way this crate hands
/// one out.
pub type SharedLogicalIndexMap = Arc<Mutex<LogicalIndexMap>>;

/// Creates an empty shared logical index map.
pub fn shared_logical_index_map() -> SharedLogicalIndexMap {
    Arc::new(Mutex::new(LogicalIndexMap::default()))
}

/// Locks a shared map, recovering the guard if a previous holder panicked.
/// The map's state is a plain layout table, so a poisoned lock is still
/// internally consistent.
pub fn lock_logical_index_map(map: &SharedLogicalIndexMap) -> MutexGuard<'_, LogicalIndexMap> {
    match map.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl LogicalIndexMap {
    /// Running physical buffer size in register units.
    pub fn buffer_size(&self) -> u32 {
        self.buffer_size
    }

    pub fn get(&self, logical_index: u32) -> Option<&LogicalIndexUse> {
        self.map.get(&logical_index)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Registers `size` register units under `logical_index` and returns the
    /// physical byte offset assigned to this registration.
    ///
    /// The first registration of a slot wins; later registrations keep the
    /// existing record. The running buffer size still grows on every call,
    /// matching the compiler's register accounting: a duplicate name still
    /// occupies the registers the compiler assigned to it.
    pub fn register(&mut self, logical_index: u32, size: u32, kind: BaseKind) -> u32 {
        let physical_index = self.buffer_size * 4;
        self.map.entry(logical_index).or_insert(LogicalIndexUse {
            physical_index,
            size,
            scope: ParameterScope::Global,
            kind,
        });
        self.buffer_size += size;
        physical_index
    }

    /// Repopulates the map from an already-flattened constant map, in its
    /// iteration order.
    ///
    /// Used after a cache hit, where the flatten walk never ran: the decoded
    /// definitions carry their physical offsets, and replaying them in wire
    /// order reproduces the same layout a fresh compile would have built.
    pub fn rebuild_from(&mut self, defs: &ConstantMap) {
        self.clear();
        for (_, def) in defs.iter() {
            let size = def.array_size * def.element_size;
            self.map.entry(def.logical_index).or_insert(LogicalIndexUse {
                physical_index: def.physical_index,
                size,
                scope: ParameterScope::Global,
                kind: if def.is_float() {
                    BaseKind::Float
                } else {
                    BaseKind::Int
                },
            });
            self.buffer_size += size;
        }
    }

    pub fn clear(&mut self) {
        self.map.clear();
        self.buffer_size = 0;
    }
}
