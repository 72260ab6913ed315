use thiserror::Error;
use tracing::{debug, warn};

use hlsl9_reflect::{
    flatten_table, ConstantMap, ReflectError, SharedLogicalIndexMap,
};

use crate::cache;
use crate::compile::{parse_defines, CompileFlags, CompileRequest, ShaderCompiler};
use crate::store::MicrocodeCache;

/// Built-in defines appended before the user's (mirroring the engine's
/// language marker macros), so shader source can conditionally compile for
/// this backend.
const BUILTIN_DEFINES: &[(&str, &str)] = &[("D3D9", "1")];

/// Version string folded into every cache key. Bump when the codec wire
/// format or the flatten semantics change, so stale entries miss instead of
/// decoding into a wrong layout.
const CACHE_KEY_VERSION: &str = "hlsl9 microcode cache v1";

/// Pipeline stage a program compiles for. Determines the fallback target
/// profile when none is configured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

/// Errors surfaced by [`HlslProgram::prepare`].
#[derive(Debug, Error)]
pub enum ProgramError {
    /// The external compiler rejected the source. `diagnostics` is the
    /// compiler's raw error text.
    #[error("cannot compile HLSL program `{name}`: {diagnostics}")]
    Compile { name: String, diagnostics: String },
    /// The compiler's constant table could not be walked. Unexpected for
    /// source the compiler just accepted; treated as an internal error.
    #[error(transparent)]
    Reflection(#[from] ReflectError),
}

/// A high-level shader program: source text in, microcode plus a parameter
/// layout out.
///
/// Configuration mirrors the engine's property surface: `target`,
/// `column_major_matrices`, `optimisation_level`, `backwards_compatibility`,
/// plus the preprocessor define string. After a successful
/// [`prepare`](HlslProgram::prepare) the flat constant map is published
/// read-only until [`unload`](HlslProgram::unload); the logical→physical map
/// is shared and may be read concurrently by parameter-binding code.
pub struct HlslProgram {
    name: String,
    stage: ShaderStage,
    source: String,
    entry_point: String,
    target: String,
    preprocessor_defines: String,
    column_major_matrices: bool,
    backwards_compatibility: bool,
    debug: bool,
    optimisation_level: crate::OptimisationLevel,

    microcode: Option<Vec<u8>>,
    parameters: ConstantMap,
    logical: SharedLogicalIndexMap,
    encoded_defs_size: usize,
    compile_error: bool,
}

impl HlslProgram {
    pub fn new(
        name: impl Into<String>,
        stage: ShaderStage,
        source: impl Into<String>,
        entry_point: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            stage,
            source: source.into(),
            entry_point: entry_point.into(),
            target: String::new(),
            preprocessor_defines: String::new(),
            // D3D9 HLSL defaults to column-major packing.
            column_major_matrices: true,
            backwards_compatibility: false,
            debug: false,
            optimisation_level: crate::OptimisationLevel::Default,
            microcode: None,
            parameters: ConstantMap::new(),
            logical: hlsl9_reflect::shared_logical_index_map(),
            encoded_defs_size: 0,
            compile_error: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    /// Resolved target profile: the configured one, or the stage's baseline
    /// profile when none was set.
    pub fn target(&self) -> &str {
        if self.target.is_empty() {
            match self.stage {
                ShaderStage::Vertex => "vs_2_0",
                ShaderStage::Pixel => "ps_2_0",
            }
        } else {
            &self.target
        }
    }

    /// Sets the target from a space-separated preference list. The first
    /// profile the compiler supports wins; if none is supported, the first
    /// listed profile is used unconditionally (its compile failure is the
    /// most useful diagnostic).
    pub fn set_target<C: ShaderCompiler>(&mut self, compiler: &C, target: &str) {
        let mut profiles = target.split_whitespace();
        let Some(first) = profiles.next() else {
            self.target.clear();
            return;
        };
        if compiler.is_profile_supported(first) {
            self.target = first.to_owned();
            return;
        }
        for profile in profiles {
            if compiler.is_profile_supported(profile) {
                self.target = profile.to_owned();
                return;
            }
        }
        self.target = first.to_owned();
    }

    pub fn column_major_matrices(&self) -> bool {
        self.column_major_matrices
    }

    pub fn set_column_major_matrices(&mut self, column_major: bool) {
        self.column_major_matrices = column_major;
    }

    pub fn backwards_compatibility(&self) -> bool {
        self.backwards_compatibility
    }

    pub fn set_backwards_compatibility(&mut self, enabled: bool) {
        self.backwards_compatibility = enabled;
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    pub fn set_debug(&mut self, enabled: bool) {
        self.debug = enabled;
    }

    pub fn optimisation_level(&self) -> crate::OptimisationLevel {
        self.optimisation_level
    }

    pub fn set_optimisation_level(&mut self, level: crate::OptimisationLevel) {
        self.optimisation_level = level;
    }

    pub fn preprocessor_defines(&self) -> &str {
        &self.preprocessor_defines
    }

    pub fn set_preprocessor_defines(&mut self, defines: impl Into<String>) {
        self.preprocessor_defines = defines.into();
    }

    /// Whether this program can run: the compile must not have failed and the
    /// resolved target profile must be accepted by the compiler.
    pub fn is_supported<C: ShaderCompiler>(&self, compiler: &C) -> bool {
        !self.compile_error && compiler.is_profile_supported(self.target())
    }

    pub fn has_compile_error(&self) -> bool {
        self.compile_error
    }

    pub fn microcode(&self) -> Option<&[u8]> {
        self.microcode.as_deref()
    }

    /// Read-only diagnostic property: the raw microcode bytes as (lossy)
    /// text. Empty before a successful compile.
    pub fn microcode_text(&self) -> String {
        match &self.microcode {
            Some(blob) => String::from_utf8_lossy(blob).into_owned(),
            None => String::new(),
        }
    }

    /// Read-only diagnostic property: vendor disassembly of the compiled
    /// microcode, when available.
    pub fn disassembly<C: ShaderCompiler>(&self, compiler: &C) -> Option<String> {
        compiler.disassemble(self.microcode.as_deref()?)
    }

    /// The published flat constant map. Empty until a successful prepare.
    pub fn constant_definitions(&self) -> &ConstantMap {
        &self.parameters
    }

    /// The shared logical→physical register map consumed by the parameter
    /// system. Cloning the handle is cheap; all access is mutex-guarded.
    pub fn logical_index_map(&self) -> SharedLogicalIndexMap {
        self.logical.clone()
    }

    /// 32-bit cache key over the source text and everything that changes the
    /// compiler's output: entry point, resolved profile, flags, defines.
    pub fn source_key(&self) -> u32 {
        let mut hasher = blake3::Hasher::new();
        hasher.update(CACHE_KEY_VERSION.as_bytes());
        for field in [
            self.source.as_str(),
            self.entry_point.as_str(),
            self.target(),
            self.preprocessor_defines.as_str(),
        ] {
            hasher.update(&(field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        hasher.update(&self.compile_flags().bits().to_le_bytes());
        let digest = hasher.finalize();
        let mut key = [0u8; 4];
        key.copy_from_slice(&digest.as_bytes()[..4]);
        u32::from_le_bytes(key)
    }

    /// Compiles the program, going through `store` first: on a cache hit the
    /// compiler is never invoked; on a miss the result is compiled, reflected
    /// and (when the store allows saves) persisted.
    ///
    /// A cached entry that fails to decode is treated as absent: the failure
    /// is logged and the program is recompiled, never left holding partially
    /// decoded state.
    pub fn prepare<C, S>(&mut self, compiler: &C, store: &mut S) -> Result<(), ProgramError>
    where
        C: ShaderCompiler,
        S: MicrocodeCache,
    {
        let key = self.source_key();
        // Each prepare is a fresh attempt; the error flag reflects only the
        // latest one.
        self.compile_error = false;

        if let Some(blob) = store.load(key) {
            match cache::decode(&blob) {
                Ok((microcode, defs)) => {
                    debug!(name = %self.name, key, "loaded microcode from cache");
                    self.install(microcode, defs);
                    return Ok(());
                }
                Err(err) => {
                    warn!(
                        name = %self.name,
                        key,
                        error = %err,
                        "corrupt cached microcode entry, recompiling"
                    );
                }
            }
        }

        self.compile_microcode(compiler)?;

        if store.saves_enabled() {
            // `microcode` is always present after a successful compile.
            if let Some(microcode) = self.microcode.as_deref() {
                let blob = cache::encode(microcode, &self.parameters, self.encoded_defs_size);
                store.store(key, blob);
            }
        }

        Ok(())
    }

    fn compile_microcode<C: ShaderCompiler>(&mut self, compiler: &C) -> Result<(), ProgramError> {
        let mut defines: Vec<(String, String)> = BUILTIN_DEFINES
            .iter()
            .map(|&(name, value)| (name.to_owned(), value.to_owned()))
            .collect();
        defines.extend(parse_defines(&self.preprocessor_defines));

        let request = CompileRequest {
            name: &self.name,
            source: &self.source,
            entry_point: &self.entry_point,
            profile: self.target(),
            defines: &defines,
            flags: self.compile_flags(),
        };

        debug!(name = %self.name, profile = request.profile, "compiling HLSL program");
        let output = match compiler.compile(&request) {
            Ok(output) => output,
            Err(diagnostics) => {
                self.compile_error = true;
                return Err(ProgramError::Compile {
                    name: self.name.clone(),
                    diagnostics,
                });
            }
        };

        self.parameters.clear();
        {
            let mut logical = hlsl9_reflect::lock_logical_index_map(&self.logical);
            logical.clear();
        }
        self.encoded_defs_size =
            match flatten_table(&output.constant_table, &mut self.parameters, &self.logical) {
                Ok(size) => size,
                Err(err) => {
                    self.compile_error = true;
                    return Err(err.into());
                }
            };
        self.microcode = Some(output.microcode);
        Ok(())
    }

    /// Installs a decoded cache entry and rebuilds the logical→physical map
    /// from the decoded definitions, in their wire order.
    fn install(&mut self, microcode: Vec<u8>, defs: ConstantMap) {
        let mut encoded_defs_size = 0;
        for (name, _) in defs.iter() {
            encoded_defs_size += std::mem::size_of::<usize>()
                + name.len()
                + hlsl9_reflect::ConstantDefinition::ENCODED_SIZE;
        }

        {
            let mut logical = hlsl9_reflect::lock_logical_index_map(&self.logical);
            logical.rebuild_from(&defs);
        }
        self.parameters = defs;
        self.encoded_defs_size = encoded_defs_size;
        self.microcode = Some(microcode);
    }

    fn compile_flags(&self) -> CompileFlags {
        let mut flags = if self.column_major_matrices {
            CompileFlags::PACK_MATRIX_COLUMN_MAJOR
        } else {
            CompileFlags::PACK_MATRIX_ROW_MAJOR
        };
        if self.backwards_compatibility {
            flags |= CompileFlags::BACKWARDS_COMPATIBILITY;
        }
        if self.debug {
            flags |= CompileFlags::DEBUG;
        }
        flags | self.optimisation_level.flags()
    }

    /// Drops the compiled state: the flat map, the size estimate and the
    /// microcode blob are all released unconditionally.
    pub fn unload(&mut self) {
        self.parameters.clear();
        self.encoded_defs_size = 0;
        self.microcode = None;
    }
}
