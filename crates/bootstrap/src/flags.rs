//! Flag and cache-entry synthesis.
//!
//! One [`StageFlags`] value is derived per stage and shared by the runtime
//! sub-build and the main build of that stage, so optimization settings
//! cannot diverge between a runtime and the driver consuming it.

use crate::components::Runtime;
use crate::config::BuildSettings;
use crate::error::SubBuild;
use crate::stage::{SpecDirs, StageRule, StageSpec};
use crate::toolchain::{CompilerFamily, ToolchainPaths};
use std::path::Path;

/// Flags every non-debug build gets.
const BASE_FLAGS: &[&str] = &["-pipe", "-march=native"];
/// Replaces [`BASE_FLAGS`] for debug builds.
const DEBUG_FLAGS: &[&str] = &["-g", "-fno-omit-frame-pointer"];
const THIN_LTO_FLAG: &str = "-flto=thin";

/// Targets an intermediate stage installs: enough to drive the next stage.
const BOOTSTRAP_TARGETS: &[&str] = &[
    "install-clang",
    "install-clang-resource-headers",
    "install-lld",
    "install-llvm-ar",
    "install-llvm-ranlib",
];

/// Ordered CMake cache entries. Setting a key again replaces the earlier
/// value and moves it to the end.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheVars(Vec<(String, String)>);

impl CacheVars {
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        self.0.retain(|(k, _)| *k != key);
        self.0.push((key, value.into()));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// `-DKEY=VALUE` arguments in insertion order.
    pub fn to_args(&self) -> Vec<String> {
        self.0.iter().map(|(k, v)| format!("-D{k}={v}")).collect()
    }
}

/// Append `flag` unless it is already present.
fn push_unique(flags: &mut Vec<String>, flag: impl Into<String>) {
    let flag = flag.into();
    if !flags.contains(&flag) {
        flags.push(flag);
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "ON"
    } else {
        "OFF"
    }
}

/// Compiler, C++ and linker flags shared by both sub-builds of a stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageFlags {
    pub c_flags: Vec<String>,
    pub cxx_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub thin_lto: bool,
    /// ThinLTO was requested but the toolchain cannot do it.
    pub thin_lto_downgraded: bool,
}

#[derive(Debug, Clone, Copy)]
pub struct FlagSynthesizer<'a> {
    settings: &'a BuildSettings,
}

impl<'a> FlagSynthesizer<'a> {
    pub fn new(settings: &'a BuildSettings) -> Self {
        Self { settings }
    }

    /// Derive the flag set for a stage driven by `toolchain`.
    pub fn stage_flags(&self, toolchain: &ToolchainPaths) -> StageFlags {
        let base = if self.settings.profile.is_debug() {
            DEBUG_FLAGS
        } else {
            BASE_FLAGS
        };
        let mut c_flags: Vec<String> = base.iter().map(ToString::to_string).collect();
        let mut link_flags = Vec::new();

        let eligible = toolchain.supports_thin_lto();
        let thin_lto = self.settings.thin_lto && eligible;
        if thin_lto {
            push_unique(&mut c_flags, THIN_LTO_FLAG);
            push_unique(&mut link_flags, THIN_LTO_FLAG);
        }

        if let Some(flag) = self.settings.allocator.link_flag() {
            push_unique(&mut link_flags, flag);
        }

        StageFlags {
            cxx_flags: c_flags.clone(),
            c_flags,
            link_flags,
            thin_lto,
            thin_lto_downgraded: self.settings.thin_lto && !eligible,
        }
    }

    /// Entries shared by every sub-build.
    fn common_options(&self, toolchain: &ToolchainPaths, flags: &StageFlags) -> CacheVars {
        let mut opts = CacheVars::default();
        opts.set("CMAKE_BUILD_TYPE", self.settings.profile.build_type().as_str());
        opts.set("LLVM_ENABLE_ASSERTIONS", on_off(self.settings.assertions));
        // Static libraries of any stage may be linked by a later one
        opts.set("CMAKE_POSITION_INDEPENDENT_CODE", "ON");
        opts.set("LLVM_USE_LINKER", toolchain.linker.display().to_string());
        if flags.thin_lto {
            if let (Some(ar), Some(ranlib)) = (&toolchain.archiver, &toolchain.ranlib) {
                opts.set("CMAKE_AR", ar.display().to_string());
                opts.set("CMAKE_RANLIB", ranlib.display().to_string());
            }
        }
        opts
    }

    /// Cache entries of the runtime sub-build.
    pub fn runtime_options(
        &self,
        rule: &StageRule,
        toolchain: &ToolchainPaths,
        flags: &StageFlags,
    ) -> CacheVars {
        let mut opts = self.common_options(toolchain, flags);
        opts.set("LLVM_ENABLE_RUNTIMES", rule.components.runtimes_list());

        // Rely on compiler-rt and the LLVM unwinder instead of libgcc
        if toolchain.compiler_family() == Some(CompilerFamily::Clang) {
            let components = &rule.components;
            if components.contains_runtime(Runtime::CompilerRt) {
                opts.set("COMPILER_RT_USE_BUILTINS_LIBRARY", "ON");
            }
            if components.contains_runtime(Runtime::Libcxx) {
                opts.set("LIBCXX_USE_COMPILER_RT", "ON");
            }
            if components.contains_runtime(Runtime::Libcxxabi) {
                opts.set("LIBCXXABI_USE_COMPILER_RT", "ON");
                opts.set("LIBCXXABI_USE_LLVM_UNWINDER", "ON");
            }
            if components.contains_runtime(Runtime::Libunwind) {
                opts.set("LIBUNWIND_USE_COMPILER_RT", "ON");
            }
        }

        for (key, value) in self.settings.profile.runtime_options() {
            opts.set(key, value);
        }
        opts
    }

    /// Cache entries of the main build.
    pub fn main_options(
        &self,
        rule: &StageRule,
        toolchain: &ToolchainPaths,
        flags: &StageFlags,
    ) -> CacheVars {
        let mut opts = self.common_options(toolchain, flags);
        opts.set("LLVM_ENABLE_PROJECTS", rule.components.projects_list());
        if flags.thin_lto {
            opts.set("LLVM_ENABLE_LTO", "Thin");
        }
        for (key, value) in self.settings.profile.main_options() {
            opts.set(key, value);
        }
        for (key, value) in &self.settings.extra_options {
            opts.set(key.as_str(), value.as_str());
        }
        opts
    }

    /// Link flags of the main build, pointing at the stage's runtime.
    pub fn main_link_flags(
        &self,
        toolchain: &ToolchainPaths,
        flags: &StageFlags,
        runtime_prefix: &Path,
    ) -> Vec<String> {
        let mut link = flags.link_flags.clone();
        if toolchain.compiler_family() == Some(CompilerFamily::Clang) {
            push_unique(&mut link, "--rtlib=compiler-rt");
        }
        push_unique(&mut link, format!("-L{}", runtime_prefix.join("lib").display()));
        link
    }

    pub fn runtime_targets(&self, rule: &StageRule) -> Vec<String> {
        let mut targets = vec!["install".to_string()];
        if rule.runtimes_only && rule.is_final && !self.settings.skip_tests {
            targets.push("check-runtimes".to_string());
        }
        targets
    }

    pub fn main_targets(&self, rule: &StageRule) -> Vec<String> {
        if !rule.is_final {
            return BOOTSTRAP_TARGETS.iter().map(ToString::to_string).collect();
        }
        let mut targets = vec!["install".to_string()];
        if !self.settings.skip_tests {
            targets.push("check-llvm".to_string());
            targets.extend(
                rule.components
                    .projects
                    .iter()
                    .filter_map(|p| p.check_target())
                    .map(ToString::to_string),
            );
        }
        targets
    }

    pub fn runtime_spec(
        &self,
        rule: &StageRule,
        toolchain: &ToolchainPaths,
        flags: &StageFlags,
        dirs: SpecDirs,
    ) -> StageSpec {
        StageSpec {
            stage: rule.index,
            sub_build: SubBuild::Runtime,
            source_root: dirs.source,
            build_dir: dirs.build,
            install_prefix: dirs.install,
            compiler: toolchain.compiler.clone(),
            cxx_compiler: toolchain.cxx_compiler.clone(),
            linker: toolchain.linker.clone(),
            c_flags: flags.c_flags.clone(),
            cxx_flags: flags.cxx_flags.clone(),
            link_flags: flags.link_flags.clone(),
            components: rule.components.clone(),
            build_targets: self.runtime_targets(rule),
            extra_env: toolchain.environment(),
            options: self.runtime_options(rule, toolchain, flags),
            enable_assertions: self.settings.assertions,
            thin_lto: flags.thin_lto,
        }
    }

    pub fn main_spec(
        &self,
        rule: &StageRule,
        toolchain: &ToolchainPaths,
        flags: &StageFlags,
        dirs: SpecDirs,
        runtime_prefix: &Path,
    ) -> StageSpec {
        StageSpec {
            stage: rule.index,
            sub_build: SubBuild::Main,
            source_root: dirs.source,
            build_dir: dirs.build,
            install_prefix: dirs.install,
            compiler: toolchain.compiler.clone(),
            cxx_compiler: toolchain.cxx_compiler.clone(),
            linker: toolchain.linker.clone(),
            c_flags: flags.c_flags.clone(),
            cxx_flags: flags.cxx_flags.clone(),
            link_flags: self.main_link_flags(toolchain, flags, runtime_prefix),
            components: rule.components.clone(),
            build_targets: self.main_targets(rule),
            extra_env: toolchain.environment(),
            options: self.main_options(rule, toolchain, flags),
            enable_assertions: self.settings.assertions,
            thin_lto: flags.thin_lto,
        }
    }
}
