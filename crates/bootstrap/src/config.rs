//! Pipeline configuration.
//!
//! [`BuildSettings`] is the pure description of what to build. The
//! [`BootstrapConfigBuilder`] adds the filesystem side (source tree, build
//! root, external tools), resolves every tool path once and freezes the
//! result into a [`BootstrapConfig`] before any process is spawned.
//!
//! Defaults can come from a `bootstrap.toml` ([`ConfigFile`]); command-line
//! values are applied on top.

use crate::error::{Error, Result};
use crate::profile::Profile;
use crate::toolchain::{find_tool, CompilerFamily, ToolchainPaths};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "bootstrap.toml";
pub const DEFAULT_PACKAGE_FORMAT: &str = "TXZ";

/// Memory allocator linked into the built tools.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Allocator {
    /// Keep the C library's malloc.
    #[default]
    System,
    /// Replace malloc with the named library, linked as `-l<name>`.
    Replace(String),
}

impl Allocator {
    pub fn from_name(name: &str) -> Self {
        match name.trim() {
            "" | "system" | "libc" => Allocator::System,
            other => Allocator::Replace(other.to_string()),
        }
    }

    pub fn link_flag(&self) -> Option<String> {
        match self {
            Allocator::System => None,
            Allocator::Replace(lib) => Some(format!("-l{lib}")),
        }
    }
}

/// What to build, independent of where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildSettings {
    pub profile: Profile,
    pub assertions: bool,
    pub thin_lto: bool,
    pub allocator: Allocator,
    pub skip_tests: bool,
    /// Extra `-D` entries for main builds, applied last.
    pub extra_options: Vec<(String, String)>,
}

impl BuildSettings {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            assertions: false,
            thin_lto: false,
            allocator: Allocator::System,
            skip_tests: false,
            extra_options: Vec::new(),
        }
    }
}

/// Job count for the build tool: host parallelism unless requested,
/// clamped to `ceiling`, never below one.
pub fn resolve_jobs(requested: Option<usize>, ceiling: Option<usize>) -> usize {
    let jobs = requested.unwrap_or_else(|| {
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(1)
    });
    let jobs = match ceiling {
        Some(max) => jobs.min(max),
        None => jobs,
    };
    jobs.max(1)
}

/// Frozen, validated configuration of one pipeline run.
#[derive(Debug, Clone)]
pub struct BootstrapConfig {
    settings: BuildSettings,
    source_root: PathBuf,
    build_root: PathBuf,
    install_prefix: Option<PathBuf>,
    cmake: PathBuf,
    ninja: PathBuf,
    cpack: Option<PathBuf>,
    package_format: String,
    stage1: ToolchainPaths,
    jobs: usize,
    depth: usize,
    clean: bool,
    config_only: bool,
    skip_package: bool,
}

impl BootstrapConfig {
    pub fn builder(settings: BuildSettings) -> BootstrapConfigBuilder {
        BootstrapConfigBuilder::new(settings)
    }

    pub fn settings(&self) -> &BuildSettings {
        &self.settings
    }

    pub fn profile(&self) -> &Profile {
        &self.settings.profile
    }

    /// Monorepo root containing `llvm/` and `runtimes/`.
    pub fn source_root(&self) -> &Path {
        &self.source_root
    }

    pub fn project_source(&self) -> PathBuf {
        self.source_root.join("llvm")
    }

    pub fn runtimes_source(&self) -> PathBuf {
        self.source_root.join("runtimes")
    }

    pub fn build_root(&self) -> &Path {
        &self.build_root
    }

    /// Caller-chosen install prefix for the final stage.
    pub fn install_prefix(&self) -> Option<&Path> {
        self.install_prefix.as_deref()
    }

    pub fn cmake(&self) -> &Path {
        &self.cmake
    }

    pub fn ninja(&self) -> &Path {
        &self.ninja
    }

    /// `None` when packaging was skipped or `cpack` is not installed.
    pub fn cpack(&self) -> Option<&Path> {
        self.cpack.as_deref()
    }

    pub fn package_format(&self) -> &str {
        &self.package_format
    }

    pub fn stage1_toolchain(&self) -> &ToolchainPaths {
        &self.stage1
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }

    /// Number of stages to run, after clamping.
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn clean(&self) -> bool {
        self.clean
    }

    pub fn config_only(&self) -> bool {
        self.config_only
    }

    pub fn skip_package(&self) -> bool {
        self.skip_package
    }
}

#[derive(Debug, Clone)]
pub struct BootstrapConfigBuilder {
    settings: BuildSettings,
    source_root: Option<PathBuf>,
    build_root: Option<PathBuf>,
    install_prefix: Option<PathBuf>,
    cmake: Option<PathBuf>,
    ninja: Option<PathBuf>,
    cpack: Option<PathBuf>,
    package_format: Option<String>,
    cc: Option<PathBuf>,
    ld: Option<PathBuf>,
    jobs: Option<usize>,
    max_jobs: Option<usize>,
    clean: bool,
    config_only: bool,
    skip_package: bool,
}

impl BootstrapConfigBuilder {
    fn new(settings: BuildSettings) -> Self {
        Self {
            settings,
            source_root: None,
            build_root: None,
            install_prefix: None,
            cmake: None,
            ninja: None,
            cpack: None,
            package_format: None,
            cc: None,
            ld: None,
            jobs: None,
            max_jobs: None,
            clean: false,
            config_only: false,
            skip_package: false,
        }
    }

    pub fn source_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_root = Some(path.into());
        self
    }

    pub fn build_root(mut self, path: impl Into<PathBuf>) -> Self {
        self.build_root = Some(path.into());
        self
    }

    pub fn install_prefix(mut self, path: impl Into<PathBuf>) -> Self {
        self.install_prefix = Some(path.into());
        self
    }

    pub fn cmake(mut self, path: impl Into<PathBuf>) -> Self {
        self.cmake = Some(path.into());
        self
    }

    pub fn ninja(mut self, path: impl Into<PathBuf>) -> Self {
        self.ninja = Some(path.into());
        self
    }

    pub fn cpack(mut self, path: impl Into<PathBuf>) -> Self {
        self.cpack = Some(path.into());
        self
    }

    pub fn package_format(mut self, format: impl Into<String>) -> Self {
        self.package_format = Some(format.into());
        self
    }

    /// Compiler driving stage 1.
    pub fn compiler(mut self, path: impl Into<PathBuf>) -> Self {
        self.cc = Some(path.into());
        self
    }

    /// Linker used by stage 1.
    pub fn linker(mut self, path: impl Into<PathBuf>) -> Self {
        self.ld = Some(path.into());
        self
    }

    pub fn jobs(mut self, jobs: usize) -> Self {
        self.jobs = Some(jobs);
        self
    }

    pub fn max_jobs(mut self, max: usize) -> Self {
        self.max_jobs = Some(max);
        self
    }

    pub fn clean(mut self, clean: bool) -> Self {
        self.clean = clean;
        self
    }

    pub fn config_only(mut self, config_only: bool) -> Self {
        self.config_only = config_only;
        self
    }

    pub fn skip_package(mut self, skip: bool) -> Self {
        self.skip_package = skip;
        self
    }

    pub fn settings_mut(&mut self) -> &mut BuildSettings {
        &mut self.settings
    }

    /// Validate paths and resolve every external tool.
    pub fn build(self) -> Result<BootstrapConfig> {
        let source_root = self
            .source_root
            .ok_or_else(|| Error::Config("source root is required".to_string()))?;
        let source_root = source_root
            .canonicalize()
            .map_err(|e| Error::io(&source_root, e))?;
        for tree in ["llvm", "runtimes"] {
            if !source_root.join(tree).is_dir() {
                return Err(Error::Config(format!(
                    "{} has no {tree}/ directory; expected an LLVM monorepo",
                    source_root.display()
                )));
            }
        }

        let build_root = self
            .build_root
            .ok_or_else(|| Error::Config("build root is required".to_string()))?;
        let build_root = std::path::absolute(&build_root).map_err(|e| Error::io(&build_root, e))?;

        let install_prefix = match self.install_prefix {
            Some(p) => Some(std::path::absolute(&p).map_err(|e| Error::io(&p, e))?),
            None => None,
        };

        let cmake = find_tool(self.cmake.as_deref().unwrap_or(Path::new("cmake")))?;
        let ninja = find_tool(self.ninja.as_deref().unwrap_or(Path::new("ninja")))?;

        let cpack = if self.skip_package {
            None
        } else {
            let tool = self.cpack.unwrap_or_else(|| PathBuf::from("cpack"));
            find_tool(&tool).ok()
        };

        let cc = self
            .cc
            .unwrap_or_else(|| PathBuf::from(self.settings.profile.default_compiler()));
        let ld = self.ld.unwrap_or_else(|| default_linker(&cc));
        let stage1 = ToolchainPaths::resolve_external(&cc, &ld)?;

        for (key, _) in &self.settings.extra_options {
            if key.is_empty() || key.contains('=') {
                return Err(Error::Config(format!("invalid cache entry name '{key}'")));
            }
        }

        let mut depth = self.settings.profile.depth();
        if self.config_only && depth > 1 {
            log::warn!("--config-only stops after configure; only stage 1 will run");
            depth = 1;
        }

        Ok(BootstrapConfig {
            settings: self.settings,
            source_root,
            build_root,
            install_prefix,
            cmake,
            ninja,
            cpack,
            package_format: self
                .package_format
                .unwrap_or_else(|| DEFAULT_PACKAGE_FORMAT.to_string()),
            stage1,
            jobs: resolve_jobs(self.jobs, self.max_jobs),
            depth,
            clean: self.clean,
            config_only: self.config_only,
            skip_package: self.skip_package,
        })
    }
}

/// `ld.lld` for clang, the system linker otherwise.
fn default_linker(compiler: &Path) -> PathBuf {
    match CompilerFamily::of(compiler) {
        Some(CompilerFamily::Clang) => PathBuf::from("ld.lld"),
        _ => PathBuf::from("ld"),
    }
}

/// Contents of `bootstrap.toml`. Every field is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    #[serde(default)]
    pub tools: ToolsSection,
    #[serde(default)]
    pub build: BuildSection,
    /// Extra cache entries for main builds.
    #[serde(default)]
    pub cmake: BTreeMap<String, String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ToolsSection {
    pub cmake: Option<PathBuf>,
    pub ninja: Option<PathBuf>,
    pub cpack: Option<PathBuf>,
    pub cc: Option<PathBuf>,
    pub ld: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BuildSection {
    pub max_jobs: Option<usize>,
    pub allocator: Option<String>,
    pub package_format: Option<String>,
}

impl ConfigFile {
    /// Load `path`, or `bootstrap.toml` in the working directory when no
    /// path is given. A missing default file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(CONFIG_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|e| Error::io(&path, e))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }

    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Seed `builder` with the file's values; later builder calls win.
    pub fn apply(self, mut builder: BootstrapConfigBuilder) -> BootstrapConfigBuilder {
        if let Some(p) = self.tools.cmake {
            builder = builder.cmake(p);
        }
        if let Some(p) = self.tools.ninja {
            builder = builder.ninja(p);
        }
        if let Some(p) = self.tools.cpack {
            builder = builder.cpack(p);
        }
        if let Some(p) = self.tools.cc {
            builder = builder.compiler(p);
        }
        if let Some(p) = self.tools.ld {
            builder = builder.linker(p);
        }
        if let Some(max) = self.build.max_jobs {
            builder = builder.max_jobs(max);
        }
        if let Some(format) = self.build.package_format {
            builder = builder.package_format(format);
        }
        let settings = builder.settings_mut();
        if let Some(name) = self.build.allocator {
            settings.allocator = Allocator::from_name(&name);
        }
        settings.extra_options.extend(self.cmake);
        builder
    }
}
