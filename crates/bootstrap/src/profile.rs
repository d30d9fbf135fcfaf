//! Build profiles.
//!
//! Each profile carries only the knobs it needs; everything that varies by
//! profile is answered by one exhaustive match here.

use crate::components::ComponentSet;
use std::fmt;
use std::path::PathBuf;

/// Number of stages in a self-hosting build, always within `[1, 3]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapDepth(u8);

impl BootstrapDepth {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 3;

    /// Out-of-range requests are clamped, never rejected.
    pub fn clamped(requested: u32) -> Self {
        let depth = requested.clamp(u32::from(Self::MIN), u32::from(Self::MAX));
        Self(depth as u8)
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl Default for BootstrapDepth {
    fn default() -> Self {
        Self(2)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildType {
    Release,
    Debug,
}

impl BuildType {
    pub fn as_str(self) -> &'static str {
        match self {
            BuildType::Release => "Release",
            BuildType::Debug => "Debug",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Profile {
    /// Single optimized stage for day-to-day development.
    Dev { shared_libs: bool },
    /// Single debuggable stage.
    Debug { shared_libs: bool },
    /// Staged build where every stage starts from empty directories, so
    /// stages can be compared against each other.
    Staging { depth: BootstrapDepth },
    /// Self-hosting build.
    Bootstrap { depth: BootstrapDepth },
    /// Runtime libraries only, built with the supplied compiler.
    Runtimes,
    /// Product toolchain defaulting to the LLVM runtime stack, with the
    /// atomic builtins kept in compiler-rt.
    Atomic {
        depth: BootstrapDepth,
        dylib: bool,
        binutils_include: Option<PathBuf>,
    },
}

impl Profile {
    pub fn name(&self) -> &'static str {
        match self {
            Profile::Dev { .. } => "dev",
            Profile::Debug { .. } => "debug",
            Profile::Staging { .. } => "staging",
            Profile::Bootstrap { .. } => "bootstrap",
            Profile::Runtimes => "runtimes",
            Profile::Atomic { .. } => "atomic",
        }
    }

    pub fn depth(&self) -> usize {
        match self {
            Profile::Dev { .. } | Profile::Debug { .. } | Profile::Runtimes => 1,
            Profile::Staging { depth }
            | Profile::Bootstrap { depth }
            | Profile::Atomic { depth, .. } => depth.get(),
        }
    }

    pub fn build_type(&self) -> BuildType {
        if self.is_debug() {
            BuildType::Debug
        } else {
            BuildType::Release
        }
    }

    /// Debug profiles use a reduced, debuggable flag set.
    pub fn is_debug(&self) -> bool {
        matches!(self, Profile::Debug { .. })
    }

    /// Whether each stage wipes its directories before configuring.
    pub fn clean_stages(&self) -> bool {
        matches!(self, Profile::Staging { .. })
    }

    /// Whether stages stop after the runtime sub-build.
    pub fn runtimes_only(&self) -> bool {
        matches!(self, Profile::Runtimes)
    }

    /// Components of the last stage. Earlier stages always use
    /// [`ComponentSet::minimal`].
    pub fn final_components(&self) -> ComponentSet {
        match self {
            Profile::Dev { .. } | Profile::Debug { .. } => ComponentSet::minimal(),
            Profile::Staging { .. }
            | Profile::Bootstrap { .. }
            | Profile::Runtimes
            | Profile::Atomic { .. } => ComponentSet::full(),
        }
    }

    /// Compiler driving stage 1 when the caller names none.
    pub fn default_compiler(&self) -> &'static str {
        match self {
            Profile::Staging { .. } | Profile::Bootstrap { .. } => "cc",
            Profile::Dev { .. }
            | Profile::Debug { .. }
            | Profile::Runtimes
            | Profile::Atomic { .. } => "clang",
        }
    }

    /// Cache entries this profile adds to the main build.
    pub fn main_options(&self) -> Vec<(String, String)> {
        let mut opts = Vec::new();
        match self {
            Profile::Dev { shared_libs } | Profile::Debug { shared_libs } => {
                if *shared_libs {
                    opts.push(("BUILD_SHARED_LIBS", "ON".to_string()));
                }
            }
            Profile::Atomic {
                dylib,
                binutils_include,
                ..
            } => {
                opts.extend([
                    ("CLANG_DEFAULT_LINKER", "lld".to_string()),
                    ("CLANG_DEFAULT_CXX_STDLIB", "libc++".to_string()),
                    ("CLANG_DEFAULT_RTLIB", "compiler-rt".to_string()),
                ]);
                if *dylib {
                    opts.push(("LLVM_LINK_LLVM_DYLIB", "ON".to_string()));
                }
                if let Some(dir) = binutils_include {
                    opts.push(("LLVM_BINUTILS_INCDIR", dir.display().to_string()));
                }
            }
            Profile::Staging { .. } | Profile::Bootstrap { .. } | Profile::Runtimes => {}
        }
        opts.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
    }

    /// Cache entries this profile adds to the runtime sub-build. openmp and
    /// compiler-rt are only configured there.
    pub fn runtime_options(&self) -> Vec<(String, String)> {
        match self {
            Profile::Atomic { .. } => [
                ("COMPILER_RT_EXCLUDE_ATOMIC_BUILTIN", "NO"),
                ("LIBOMP_LIBFLAGS", "-lm"),
                ("OPENMP_ENABLE_LIBOMPTARGET", "OFF"),
            ]
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
            Profile::Dev { .. }
            | Profile::Debug { .. }
            | Profile::Staging { .. }
            | Profile::Bootstrap { .. }
            | Profile::Runtimes => Vec::new(),
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
