//! Per-stage run manifest.
//!
//! Each stage attempt leaves `bootstrap-stage.json` in its build directory,
//! recording when it ran, with which toolchain, and how it ended.

use crate::error::{Error, Result, Step, SubBuild};
use crate::space::BuildSpace;
use crate::stage::{StageSpec, StageStatus};
use crate::toolchain::ToolchainPaths;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "bootstrap-stage.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageManifest {
    pub stage: usize,
    pub profile: String,
    pub status: String,
    pub created_at_utc: String,
    pub finished_at_utc: Option<String>,
    pub compiler: PathBuf,
    pub cxx_compiler: PathBuf,
    pub linker: PathBuf,
    pub projects: Vec<String>,
    pub runtimes: Vec<String>,
    pub assertions: bool,
    pub thin_lto: bool,
    pub install_prefix: Option<PathBuf>,
    pub failed_sub_build: Option<SubBuild>,
    pub failed_step: Option<Step>,
    pub failed_command: Option<String>,
}

impl StageManifest {
    /// Start a manifest for a stage that is about to run.
    pub fn begin(stage: usize, profile: &str, toolchain: &ToolchainPaths) -> Self {
        Self {
            stage,
            profile: profile.to_string(),
            status: "running".to_string(),
            created_at_utc: chrono::Utc::now().to_rfc3339(),
            finished_at_utc: None,
            compiler: toolchain.compiler.clone(),
            cxx_compiler: toolchain.cxx_compiler.clone(),
            linker: toolchain.linker.clone(),
            projects: Vec::new(),
            runtimes: Vec::new(),
            assertions: false,
            thin_lto: false,
            install_prefix: None,
            failed_sub_build: None,
            failed_step: None,
            failed_command: None,
        }
    }

    /// Note what a sub-build of this stage is configured with. The runtime
    /// sub-build contributes the runtimes, the main build the projects.
    pub fn record(&mut self, spec: &StageSpec) {
        match spec.sub_build {
            SubBuild::Runtime => self.runtimes = spec.components.runtime_names(),
            SubBuild::Main => self.projects = spec.components.project_names(),
        }
        self.assertions = spec.enable_assertions;
        self.thin_lto = spec.thin_lto;
    }

    pub fn succeed(&mut self, install_prefix: &Path) {
        self.status = status_name(StageStatus::Success).to_string();
        self.install_prefix = Some(install_prefix.to_path_buf());
        self.finished_at_utc = Some(chrono::Utc::now().to_rfc3339());
    }

    /// Record a failure; `error` is the stage-located pipeline error.
    pub fn fail(&mut self, error: &Error) {
        let (sub_build, step) = match error.location() {
            Some((_, sub_build, step)) => (Some(sub_build), Some(step)),
            None => (None, None),
        };
        let status = match step {
            Some(Step::Build) => StageStatus::BuildFailed,
            _ => StageStatus::ConfigureFailed,
        };
        self.status = status_name(status).to_string();
        self.failed_sub_build = sub_build;
        self.failed_step = step;
        self.failed_command = error.failed_command().map(ToString::to_string);
        self.finished_at_utc = Some(chrono::Utc::now().to_rfc3339());
    }

    pub fn is_success(&self) -> bool {
        self.status == status_name(StageStatus::Success)
    }

    pub fn write(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(MANIFEST_FILE);
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("serializing stage manifest: {e}")))?;
        std::fs::write(&path, json + "\n").map_err(|e| Error::io(&path, e))?;
        Ok(path)
    }

    pub fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read(path).map_err(|e| Error::io(path, e))?;
        serde_json::from_slice(&raw)
            .map_err(|e| Error::Config(format!("parsing {}: {e}", path.display())))
    }
}

fn status_name(status: StageStatus) -> &'static str {
    match status {
        StageStatus::Success => "success",
        StageStatus::ConfigureFailed => "configure-failed",
        StageStatus::BuildFailed => "build-failed",
    }
}

/// All stage manifests under `space`, ordered by stage directory name.
pub fn collect(space: &BuildSpace) -> Result<Vec<StageManifest>> {
    let mut manifests = Vec::new();
    for name in space.build_stages()? {
        let path = space.root().join("build").join(&name).join(MANIFEST_FILE);
        if path.is_file() {
            manifests.push(StageManifest::read(&path)?);
        }
    }
    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::ComponentSet;
    use crate::config::BuildSettings;
    use crate::error::ProcessStatus;
    use crate::flags::FlagSynthesizer;
    use crate::profile::Profile;
    use crate::stage::{SpecDirs, StageRule, ToolchainSource};
    use tempfile::TempDir;

    fn toolchain() -> ToolchainPaths {
        ToolchainPaths::from_install_prefix(Path::new("/w/install/stage1"))
    }

    #[test]
    fn test_success_round_trip() {
        let tmp = TempDir::new().unwrap();
        let mut manifest = StageManifest::begin(2, "bootstrap", &toolchain());
        manifest.succeed(Path::new("/w/install/stage2"));
        let path = manifest.write(tmp.path()).unwrap();

        let read = StageManifest::read(&path).unwrap();
        assert!(read.is_success());
        assert_eq!(read, manifest);
        assert!(read.finished_at_utc.is_some());
    }

    #[test]
    fn test_failure_records_location() {
        let err = Error::BuildFailed {
            command: "ninja -C /w/build/stage2".to_string(),
            status: ProcessStatus(Some(1)),
        }
        .at(2, SubBuild::Main, Step::Build);

        let mut manifest = StageManifest::begin(2, "bootstrap", &toolchain());
        manifest.fail(&err);
        assert_eq!(manifest.status, "build-failed");
        assert_eq!(manifest.failed_sub_build, Some(SubBuild::Main));
        assert_eq!(manifest.failed_command.as_deref(), Some("ninja -C /w/build/stage2"));
    }

    #[test]
    fn test_record_takes_components_per_sub_build() {
        let settings = BuildSettings::new(Profile::Dev { shared_libs: false });
        let synth = FlagSynthesizer::new(&settings);
        let rule = StageRule {
            index: 1,
            is_final: true,
            components: ComponentSet::full(),
            clean: false,
            runtimes_only: false,
            toolchain: ToolchainSource::External,
        };
        let flags = synth.stage_flags(&toolchain());
        let dirs = || SpecDirs {
            source: PathBuf::from("/src/llvm"),
            build: PathBuf::from("/w/build/stage1"),
            install: PathBuf::from("/w/install/stage1"),
        };

        let mut manifest = StageManifest::begin(1, "dev", &toolchain());
        manifest.record(&synth.runtime_spec(&rule, &toolchain(), &flags, dirs()));
        assert!(manifest.projects.is_empty());
        assert_eq!(manifest.runtimes[0], "compiler-rt");
        assert_eq!(manifest.runtimes.len(), 5);

        let rt = Path::new("/w/install/stage1-runtimes");
        manifest.record(&synth.main_spec(&rule, &toolchain(), &flags, dirs(), rt));
        assert!(manifest.projects.iter().any(|p| p == "lldb"));
        assert_eq!(manifest.runtimes.len(), 5);
        assert!(!manifest.assertions && !manifest.thin_lto);
    }

    #[test]
    fn test_collect_reads_stage_dirs() {
        let tmp = TempDir::new().unwrap();
        let space = BuildSpace::new(tmp.path());
        let dir = space.build_dir("stage1").unwrap();
        space.build_dir("stage1-runtimes").unwrap();
        StageManifest::begin(1, "dev", &toolchain()).write(&dir).unwrap();

        let all = collect(&space).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].status, "running");
    }
}
