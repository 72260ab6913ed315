use std::fmt;

use bitflags::bitflags;

use hlsl9_reflect::ConstantTable;

bitflags! {
    /// Option bitmask handed to the external compiler.
    ///
    /// Exactly one of the matrix packing flags is set per request, derived
    /// from the program's `column_major_matrices` property; exactly one
    /// optimisation flag is set, derived from [`OptimisationLevel`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CompileFlags: u32 {
        const PACK_MATRIX_ROW_MAJOR = 1 << 0;
        const PACK_MATRIX_COLUMN_MAJOR = 1 << 1;
        const BACKWARDS_COMPATIBILITY = 1 << 2;
        const DEBUG = 1 << 3;
        const SKIP_OPTIMIZATION = 1 << 4;
        const OPTIMIZATION_LEVEL0 = 1 << 5;
        const OPTIMIZATION_LEVEL1 = 1 << 6;
        const OPTIMIZATION_LEVEL2 = 1 << 7;
        const OPTIMIZATION_LEVEL3 = 1 << 8;
    }
}

/// Optimisation level requested through the program's property surface.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OptimisationLevel {
    /// Compiler default (level 1).
    #[default]
    Default,
    /// Skip optimisation entirely.
    None,
    Level0,
    Level1,
    Level2,
    Level3,
}

impl OptimisationLevel {
    /// Parses the property-string form: `default`, `none`, or `0`..`3`,
    /// matched case-insensitively on the leading characters.
    pub fn parse(value: &str) -> Option<Self> {
        let v = value.trim();
        for (prefix, level) in [
            ("default", OptimisationLevel::Default),
            ("none", OptimisationLevel::None),
            ("0", OptimisationLevel::Level0),
            ("1", OptimisationLevel::Level1),
            ("2", OptimisationLevel::Level2),
            ("3", OptimisationLevel::Level3),
        ] {
            if v.len() >= prefix.len() && v[..prefix.len()].eq_ignore_ascii_case(prefix) {
                return Some(level);
            }
        }
        None
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OptimisationLevel::Default => "default",
            OptimisationLevel::None => "none",
            OptimisationLevel::Level0 => "0",
            OptimisationLevel::Level1 => "1",
            OptimisationLevel::Level2 => "2",
            OptimisationLevel::Level3 => "3",
        }
    }

    pub fn flags(self) -> CompileFlags {
        match self {
            OptimisationLevel::Default => CompileFlags::OPTIMIZATION_LEVEL1,
            OptimisationLevel::None => CompileFlags::SKIP_OPTIMIZATION,
            OptimisationLevel::Level0 => CompileFlags::OPTIMIZATION_LEVEL0,
            OptimisationLevel::Level1 => CompileFlags::OPTIMIZATION_LEVEL1,
            OptimisationLevel::Level2 => CompileFlags::OPTIMIZATION_LEVEL2,
            OptimisationLevel::Level3 => CompileFlags::OPTIMIZATION_LEVEL3,
        }
    }
}

impl fmt::Display for OptimisationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parses a preprocessor define string into name/value pairs.
///
/// Items are separated by `,` or `;`; each item is `NAME=VALUE` or a bare
/// `NAME`, which defines to `1`. Blank items are skipped.
pub fn parse_defines(text: &str) -> Vec<(String, String)> {
    let mut defines = Vec::new();
    for item in text.split([',', ';']) {
        let item = item.trim();
        if item.is_empty() {
            continue;
        }
        match item.split_once('=') {
            Some((name, value)) => {
                let name = name.trim();
                if !name.is_empty() {
                    defines.push((name.to_owned(), value.trim().to_owned()));
                }
            }
            None => defines.push((item.to_owned(), "1".to_owned())),
        }
    }
    defines
}

/// One compilation request, fully resolved: includes are already expanded
/// into `source`, and `defines` carries the built-in macros merged with the
/// user's.
#[derive(Debug, Clone)]
pub struct CompileRequest<'a> {
    pub name: &'a str,
    pub source: &'a str,
    pub entry_point: &'a str,
    /// Target profile string, e.g. `vs_2_0`.
    pub profile: &'a str,
    pub defines: &'a [(String, String)],
    pub flags: CompileFlags,
}

/// Successful compiler output: the microcode blob plus the queryable
/// constant table.
pub struct CompileOutput<T> {
    pub microcode: Vec<u8>,
    pub constant_table: T,
}

/// The external shader compiler seam.
///
/// The vendor compiler consumes source text and produces either microcode
/// plus a constant table, or a diagnostic text blob. Implementations adapt
/// the vendor API; the error type is the raw diagnostic text because that is
/// all the compiler gives back on failure.
pub trait ShaderCompiler {
    type Table: ConstantTable;

    fn compile(&self, request: &CompileRequest<'_>) -> Result<CompileOutput<Self::Table>, String>;

    /// Whether the underlying device/driver accepts `profile` as a target.
    fn is_profile_supported(&self, profile: &str) -> bool;

    /// Textual disassembly of a microcode blob, if the vendor toolchain can
    /// produce one.
    fn disassemble(&self, microcode: &[u8]) -> Option<String>;
}
