//! Stage descriptions: the rule a stage is generated from, the concrete
//! spec handed to the runner, and the result it produced.

use crate::components::ComponentSet;
use crate::error::SubBuild;
use crate::flags::CacheVars;
use serde::Serialize;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

/// Where a stage's compiler comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolchainSource {
    /// Caller-supplied compiler and linker.
    External,
    /// Install prefix of the previous stage.
    PreviousStage,
}

/// Generation rule for one stage of a plan. Specs are derived from it
/// fresh on every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageRule {
    /// 1-based position in the pipeline.
    pub index: usize,
    pub is_final: bool,
    pub components: ComponentSet,
    /// Wipe this stage's directories before configuring.
    pub clean: bool,
    /// Stop after the runtime sub-build.
    pub runtimes_only: bool,
    pub toolchain: ToolchainSource,
}

impl StageRule {
    pub fn name(&self) -> String {
        format!("stage{}", self.index)
    }

    /// BuildSpace name of this stage's runtime sub-build.
    pub fn runtime_name(&self) -> String {
        format!("stage{}-runtimes", self.index)
    }

    pub fn sub_build_name(&self, sub_build: SubBuild) -> String {
        match sub_build {
            SubBuild::Runtime => self.runtime_name(),
            SubBuild::Main => self.name(),
        }
    }
}

/// Directories one sub-build works in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecDirs {
    pub source: PathBuf,
    pub build: PathBuf,
    pub install: PathBuf,
}

/// Everything needed for one configure + build cycle. Never mutated after
/// construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSpec {
    pub stage: usize,
    pub sub_build: SubBuild,
    pub source_root: PathBuf,
    pub build_dir: PathBuf,
    pub install_prefix: PathBuf,
    pub compiler: PathBuf,
    pub cxx_compiler: PathBuf,
    pub linker: PathBuf,
    pub c_flags: Vec<String>,
    pub cxx_flags: Vec<String>,
    pub link_flags: Vec<String>,
    pub components: ComponentSet,
    pub build_targets: Vec<String>,
    pub extra_env: BTreeMap<String, OsString>,
    pub options: CacheVars,
    pub enable_assertions: bool,
    /// Derived from the toolchain, never set directly.
    pub thin_lto: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Success,
    ConfigureFailed,
    BuildFailed,
}

/// Outcome of one stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    pub index: usize,
    pub status: StageStatus,
    /// Install prefix feeding the next stage; set on success.
    pub install_prefix: Option<PathBuf>,
    /// Install prefix of the stage's runtime libraries; set on success.
    pub runtime_prefix: Option<PathBuf>,
}

impl StageResult {
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_names() {
        let rule = StageRule {
            index: 2,
            is_final: false,
            components: ComponentSet::minimal(),
            clean: false,
            runtimes_only: false,
            toolchain: ToolchainSource::PreviousStage,
        };
        assert_eq!(rule.name(), "stage2");
        assert_eq!(rule.sub_build_name(SubBuild::Runtime), "stage2-runtimes");
        assert_eq!(rule.sub_build_name(SubBuild::Main), "stage2");
    }
}
