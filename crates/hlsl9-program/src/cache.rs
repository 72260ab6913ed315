//! Microcode cache codec.
//!
//! One cache entry is the compiled microcode blob plus the flattened constant
//! map, in a single self-describing byte sequence:
//!
//! ```text
//! [microcode_size: usize LE][microcode bytes]
//! [param_count: usize LE]
//! repeat param_count times:
//!   [name_len: usize LE][name bytes, UTF-8]
//!   [definition image: 5 x u32 LE]
//! ```
//!
//! Sizes are native machine word width. A cache written on a different word
//! width or endianness will not decode; entries are machine-local by design
//! (the cache key derivation is versioned, so a corrupt or foreign entry is
//! detected and recompiled rather than trusted).
//!
//! Constant entries are written in the map's insertion order, which is the
//! order the flatten walk discovered them in. Decoding replays that order, so
//! a layout rebuilt from a decoded map matches the fresh-compile layout.
//!
//! Decoding treats the input as untrusted: every declared length is checked
//! against the remaining input before any read, and malformed entries are
//! reported as [`CacheError`] instead of reading out of bounds.

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use hlsl9_reflect::{ConstantDefinition, ConstantMap, ConstantType};

/// Failures decoding a cached microcode entry.
#[derive(Debug, Error)]
pub enum CacheError {
    /// A declared length runs past the end of the entry.
    #[error("cache entry truncated reading {what}: need {needed} bytes, {remaining} remaining")]
    Truncated {
        what: &'static str,
        needed: usize,
        remaining: usize,
    },
    /// A constant name is not valid UTF-8.
    #[error("constant name in cache entry is not valid UTF-8")]
    InvalidName(#[from] std::string::FromUtf8Error),
    /// A definition image carries a type tag outside the known set.
    #[error("unknown constant type tag {0} in cache entry")]
    UnknownTypeTag(u32),
    /// A definition image carries layout fields the flattener can never
    /// produce: an element size disagreeing with the type, or an array so
    /// large the register accounting would overflow.
    #[error(
        "constant `{name}` in cache entry has invalid layout: \
         array_size {array_size}, element_size {element_size}"
    )]
    InvalidLayout {
        name: String,
        array_size: u32,
        element_size: u32,
    },
    /// The same constant name appears twice; the encoder never produces this.
    #[error("duplicate constant name `{0}` in cache entry")]
    DuplicateName(String),
    /// Bytes remain after the declared parameter entries.
    #[error("{0} trailing bytes after last constant in cache entry")]
    TrailingBytes(usize),
}

/// Fixed-size wire image of one [`ConstantDefinition`].
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct RawConstantDefinition {
    const_type: u32,
    array_size: u32,
    element_size: u32,
    logical_index: u32,
    physical_index: u32,
}

const _: () =
    assert!(std::mem::size_of::<RawConstantDefinition>() == ConstantDefinition::ENCODED_SIZE);

const WORD: usize = std::mem::size_of::<usize>();

/// Serializes a compiled program into one cache entry.
///
/// `defs_size_hint` is the byte estimate the flatten walk accumulated for the
/// parameter section; it only affects pre-allocation.
pub fn encode(microcode: &[u8], defs: &ConstantMap, defs_size_hint: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 * WORD + microcode.len() + defs_size_hint);

    out.extend_from_slice(&microcode.len().to_le_bytes());
    out.extend_from_slice(microcode);

    out.extend_from_slice(&defs.len().to_le_bytes());
    for (name, def) in defs.iter() {
        out.extend_from_slice(&name.len().to_le_bytes());
        out.extend_from_slice(name.as_bytes());

        let raw = RawConstantDefinition {
            const_type: def.const_type.wire_tag(),
            array_size: def.array_size,
            element_size: def.element_size,
            logical_index: def.logical_index,
            physical_index: def.physical_index,
        };
        out.extend_from_slice(bytemuck::bytes_of(&raw));
    }

    out
}

/// Deserializes one cache entry back into the microcode blob and the flat
/// constant map. Inverse of [`encode`].
pub fn decode(bytes: &[u8]) -> Result<(Vec<u8>, ConstantMap), CacheError> {
    let mut r = Reader { bytes, pos: 0 };

    let microcode_size = r.read_word("microcode size")?;
    let microcode = r.take(microcode_size, "microcode")?.to_vec();

    let param_count = r.read_word("parameter count")?;
    let mut defs = ConstantMap::new();
    let mut total_registers: u32 = 0;
    for _ in 0..param_count {
        let name_len = r.read_word("name length")?;
        let name = String::from_utf8(r.take(name_len, "name")?.to_vec())?;

        let raw: RawConstantDefinition =
            bytemuck::pod_read_unaligned(r.take(ConstantDefinition::ENCODED_SIZE, "definition")?);
        let const_type = ConstantType::from_wire_tag(raw.const_type)
            .ok_or(CacheError::UnknownTypeTag(raw.const_type))?;

        // The element size is fully determined by the type, and the total
        // register count across all entries must fit the accounting the
        // layout rebuild does. Anything else is a corrupt or hostile entry.
        let registers = raw
            .array_size
            .checked_mul(raw.element_size)
            .and_then(|size| total_registers.checked_add(size));
        match registers {
            Some(total) if raw.element_size == const_type.element_size() => {
                total_registers = total;
            }
            _ => {
                return Err(CacheError::InvalidLayout {
                    name,
                    array_size: raw.array_size,
                    element_size: raw.element_size,
                });
            }
        }

        let inserted = defs.insert(
            name.clone(),
            ConstantDefinition {
                const_type,
                array_size: raw.array_size,
                element_size: raw.element_size,
                logical_index: raw.logical_index,
                physical_index: raw.physical_index,
            },
        );
        if !inserted {
            return Err(CacheError::DuplicateName(name));
        }
    }

    if r.remaining() != 0 {
        return Err(CacheError::TrailingBytes(r.remaining()));
    }

    Ok((microcode, defs))
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize, what: &'static str) -> Result<&'a [u8], CacheError> {
        if len > self.remaining() {
            return Err(CacheError::Truncated {
                what,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn read_word(&mut self, what: &'static str) -> Result<usize, CacheError> {
        let bytes = self.take(WORD, what)?;
        let mut buf = [0u8; WORD];
        buf.copy_from_slice(bytes);
        Ok(usize::from_le_bytes(buf))
    }
}
