//! Compiler and linker resolution.
//!
//! A stage is driven by a C compiler, its paired C++ driver and a linker.
//! Stage 1 takes them from the caller; every later stage takes them from the
//! previous stage's install prefix.

use crate::error::{Error, Result};
use crate::process::prepend_search_path;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Dynamic loader search path variable for the host.
pub const LIBRARY_PATH_VAR: &str = if cfg!(target_os = "macos") {
    "DYLD_LIBRARY_PATH"
} else {
    "LD_LIBRARY_PATH"
};

/// Driver names installed into `<prefix>/bin` by every stage.
pub const STAGE_COMPILER: &str = "clang";
pub const STAGE_CXX_COMPILER: &str = "clang++";
pub const STAGE_LINKER: &str = "ld.lld";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFamily {
    Clang,
    Gcc,
    /// The generic `cc` driver.
    SystemCc,
}

impl CompilerFamily {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "clang" => Some(Self::Clang),
            "gcc" => Some(Self::Gcc),
            "cc" => Some(Self::SystemCc),
            _ => None,
        }
    }

    fn cxx_token(self) -> &'static str {
        match self {
            Self::Clang => "clang++",
            Self::Gcc => "g++",
            Self::SystemCc => "c++",
        }
    }

    /// Classify a compiler by executable name.
    pub fn of(compiler: &Path) -> Option<Self> {
        split_driver_name(file_name(compiler)?).map(|(family, _, _)| family)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkerFamily {
    Lld,
    Gold,
    Bfd,
    Mold,
    Other,
}

impl LinkerFamily {
    /// Classify a linker by executable name.
    pub fn of(linker: &Path) -> Self {
        let name = file_name(linker).unwrap_or_default();
        let base = strip_version(name);
        match base {
            "ld.lld" | "lld" | "ld64.lld" | "lld-link" => Self::Lld,
            "ld.gold" | "gold" => Self::Gold,
            "ld" | "ld.bfd" => Self::Bfd,
            "mold" | "ld.mold" => Self::Mold,
            _ => Self::Other,
        }
    }
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

fn is_version(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_digit() || c == '.')
}

/// `ld.lld-18` -> `ld.lld`
fn strip_version(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((base, version)) if is_version(version) => base,
        _ => name,
    }
}

/// Split `<target>-<family>-<version>` into (family, prefix, suffix).
///
/// Only a trailing version may follow the family token, so `clang-tidy` or
/// `gcc-ar` are not mistaken for compilers.
fn split_driver_name(name: &str) -> Option<(CompilerFamily, &str, &str)> {
    let tokens: Vec<&str> = name.split('-').collect();
    let (idx, family) = tokens
        .iter()
        .enumerate()
        .rev()
        .find_map(|(i, t)| CompilerFamily::from_token(t).map(|f| (i, f)))?;

    if !tokens[idx + 1..].iter().all(|t| is_version(t)) {
        return None;
    }

    let prefix_len: usize = tokens[..idx].iter().map(|t| t.len() + 1).sum();
    let family_end = prefix_len + tokens[idx].len();
    Some((family, &name[..prefix_len], &name[family_end..]))
}

/// `llvm-ar` for `clang`, `llvm-ar-18` for `clang-18`.
fn llvm_tool_name(compiler: &str, tool: &str) -> Option<String> {
    match split_driver_name(compiler)? {
        (CompilerFamily::Clang, _, suffix) => Some(format!("{tool}{suffix}")),
        _ => None,
    }
}

/// Name of the C++ driver paired with the C driver `name`.
pub fn cxx_driver_name(name: &str) -> Option<String> {
    let (family, prefix, suffix) = split_driver_name(name)?;
    Some(format!("{prefix}{}{suffix}", family.cxx_token()))
}

/// Whether this compiler/linker pairing can do ThinLTO.
pub fn supports_thin_lto(compiler: &Path, linker: &Path) -> bool {
    CompilerFamily::of(compiler) == Some(CompilerFamily::Clang)
        && LinkerFamily::of(linker) == LinkerFamily::Lld
}

/// Resolved executables for one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolchainPaths {
    pub compiler: PathBuf,
    pub cxx_compiler: PathBuf,
    pub linker: PathBuf,
    /// Library directory the compiler needs at run time, when it was built
    /// by an earlier stage and is not on the system search path.
    pub library_dir: Option<PathBuf>,
    /// LLVM archiver matching the compiler; `None` when there is none.
    pub archiver: Option<PathBuf>,
    pub ranlib: Option<PathBuf>,
}

impl ToolchainPaths {
    /// Pair `compiler` with its C++ driver from the same directory.
    pub fn from_compiler(compiler: &Path, linker: &Path) -> Result<Self> {
        let cxx_name = file_name(compiler)
            .and_then(cxx_driver_name)
            .ok_or_else(|| Error::UnrecognizedCompiler {
                path: compiler.to_path_buf(),
            })?;

        let llvm_tool = |tool: &str| {
            file_name(compiler)
                .and_then(|name| llvm_tool_name(name, tool))
                .map(|name| compiler.with_file_name(name))
        };

        Ok(Self {
            compiler: compiler.to_path_buf(),
            cxx_compiler: compiler.with_file_name(cxx_name),
            linker: linker.to_path_buf(),
            library_dir: None,
            archiver: llvm_tool("llvm-ar"),
            ranlib: llvm_tool("llvm-ranlib"),
        })
    }

    /// Toolchain installed by a previous stage under `prefix`.
    pub fn from_install_prefix(prefix: &Path) -> Self {
        let bin = prefix.join("bin");
        Self {
            compiler: bin.join(STAGE_COMPILER),
            cxx_compiler: bin.join(STAGE_CXX_COMPILER),
            linker: bin.join(STAGE_LINKER),
            library_dir: Some(prefix.join("lib")),
            archiver: Some(bin.join("llvm-ar")),
            ranlib: Some(bin.join("llvm-ranlib")),
        }
    }

    /// Resolve caller-supplied tools, which may be bare names on `PATH`.
    ///
    /// All three executables must exist before any process is spawned. The
    /// LLVM archive tools are optional; a missing one only rules out ThinLTO.
    pub fn resolve_external(compiler: &Path, linker: &Path) -> Result<Self> {
        let compiler = find_tool(compiler)?;
        let linker = find_tool(linker)?;
        let mut paths = Self::from_compiler(&compiler, &linker)?;
        find_tool(&paths.cxx_compiler)?;
        paths.archiver = paths.archiver.and_then(|p| find_tool(&p).ok());
        paths.ranlib = paths.ranlib.and_then(|p| find_tool(&p).ok());
        Ok(paths)
    }

    pub fn compiler_family(&self) -> Option<CompilerFamily> {
        CompilerFamily::of(&self.compiler)
    }

    pub fn supports_thin_lto(&self) -> bool {
        self.thin_lto_blocker().is_none()
    }

    /// Why this toolchain cannot build with ThinLTO, if it cannot.
    pub fn thin_lto_blocker(&self) -> Option<&'static str> {
        if !supports_thin_lto(&self.compiler, &self.linker) {
            Some("needs clang with lld")
        } else if self.archiver.is_none() || self.ranlib.is_none() {
            Some("llvm-ar/llvm-ranlib not found next to the compiler")
        } else {
            None
        }
    }

    /// Environment overrides needed to run this toolchain.
    pub fn environment(&self) -> BTreeMap<String, OsString> {
        let mut env = BTreeMap::new();
        if let Some(dir) = &self.library_dir {
            env.insert(
                LIBRARY_PATH_VAR.to_string(),
                prepend_search_path(LIBRARY_PATH_VAR, dir),
            );
        }
        env
    }
}

/// Locate an executable, either by path or on `PATH`.
pub fn find_tool(tool: &Path) -> Result<PathBuf> {
    which::which(tool).map_err(|e| Error::ToolNotFound {
        tool: tool.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    #[test]
    fn test_cxx_driver_for_known_families() {
        assert_eq!(cxx_driver_name("clang").as_deref(), Some("clang++"));
        assert_eq!(cxx_driver_name("clang-18").as_deref(), Some("clang++-18"));
        assert_eq!(cxx_driver_name("gcc").as_deref(), Some("g++"));
        assert_eq!(cxx_driver_name("gcc-13").as_deref(), Some("g++-13"));
        assert_eq!(cxx_driver_name("cc").as_deref(), Some("c++"));
        assert_eq!(
            cxx_driver_name("x86_64-linux-gnu-gcc-13").as_deref(),
            Some("x86_64-linux-gnu-g++-13")
        );
    }

    #[test]
    fn test_tools_named_like_compilers_are_rejected() {
        assert!(cxx_driver_name("clang-tidy").is_none());
        assert!(cxx_driver_name("gcc-ar").is_none());
        assert!(cxx_driver_name("icx").is_none());
        assert!(cxx_driver_name("tcc").is_none());
    }

    #[test]
    fn test_from_compiler_keeps_directory() {
        let paths = ToolchainPaths::from_compiler(
            Path::new("/opt/llvm/bin/clang-18"),
            Path::new("/usr/bin/ld"),
        )
        .unwrap();
        assert_eq!(paths.cxx_compiler, PathBuf::from("/opt/llvm/bin/clang++-18"));
        assert!(paths.library_dir.is_none());
    }

    #[test]
    fn test_unrecognized_compiler() {
        let err = ToolchainPaths::from_compiler(Path::new("/usr/bin/icx"), Path::new("/usr/bin/ld"))
            .unwrap_err();
        assert!(matches!(err, Error::UnrecognizedCompiler { .. }));
    }

    #[test]
    fn test_install_prefix_layout() {
        let paths = ToolchainPaths::from_install_prefix(Path::new("/w/install/stage1"));
        assert_eq!(paths.compiler, PathBuf::from("/w/install/stage1/bin/clang"));
        assert_eq!(paths.cxx_compiler, PathBuf::from("/w/install/stage1/bin/clang++"));
        assert_eq!(paths.linker, PathBuf::from("/w/install/stage1/bin/ld.lld"));
        assert_eq!(paths.library_dir, Some(PathBuf::from("/w/install/stage1/lib")));
        assert_eq!(paths.archiver, Some(PathBuf::from("/w/install/stage1/bin/llvm-ar")));
        assert!(paths.supports_thin_lto());
    }

    #[test]
    fn test_archive_tools_follow_driver_version() {
        assert_eq!(llvm_tool_name("clang-18", "llvm-ar").as_deref(), Some("llvm-ar-18"));
        assert_eq!(llvm_tool_name("clang", "llvm-ranlib").as_deref(), Some("llvm-ranlib"));
        assert!(llvm_tool_name("gcc-13", "llvm-ar").is_none());

        let paths = ToolchainPaths::from_compiler(
            Path::new("/opt/llvm/bin/clang-18"),
            Path::new("/opt/llvm/bin/ld.lld-18"),
        )
        .unwrap();
        assert_eq!(paths.archiver, Some(PathBuf::from("/opt/llvm/bin/llvm-ar-18")));
        assert_eq!(paths.ranlib, Some(PathBuf::from("/opt/llvm/bin/llvm-ranlib-18")));
    }

    #[test]
    fn test_missing_archive_tools_rule_out_thin_lto() {
        let tmp = tempfile::TempDir::new().unwrap();
        for tool in ["clang-18", "clang++-18", "ld.lld-18"] {
            let path = tmp.path().join(tool);
            std::fs::write(&path, "#!/bin/sh\n").unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let paths = ToolchainPaths::resolve_external(
            &tmp.path().join("clang-18"),
            &tmp.path().join("ld.lld-18"),
        )
        .unwrap();
        assert!(paths.archiver.is_none());
        assert!(!paths.supports_thin_lto());
        assert!(paths.thin_lto_blocker().unwrap().contains("llvm-ar"));
    }

    #[test]
    fn test_thin_lto_only_for_clang_with_lld() {
        let yes = [("clang", "ld.lld"), ("clang-18", "ld.lld-18"), ("clang", "lld")];
        for (cc, ld) in yes {
            assert!(supports_thin_lto(Path::new(cc), Path::new(ld)), "{cc} + {ld}");
        }

        let no = [("gcc", "ld.lld"), ("clang", "ld"), ("clang", "ld.gold"), ("cc", "mold")];
        for (cc, ld) in no {
            assert!(!supports_thin_lto(Path::new(cc), Path::new(ld)), "{cc} + {ld}");
        }
    }

    #[test]
    fn test_environment_only_for_staged_toolchains() {
        let external =
            ToolchainPaths::from_compiler(Path::new("/usr/bin/gcc"), Path::new("/usr/bin/ld"))
                .unwrap();
        assert!(external.environment().is_empty());

        let staged = ToolchainPaths::from_install_prefix(Path::new("/w/install/stage1"));
        let env = staged.environment();
        let value = env.get(LIBRARY_PATH_VAR).unwrap();
        let first = std::env::split_paths(value).next().unwrap();
        assert_eq!(first, PathBuf::from("/w/install/stage1/lib"));
    }
}
