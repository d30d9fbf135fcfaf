//! Stage sequencing.
//!
//! Stages run strictly one after another: stage *i+1* is driven by the
//! compiler stage *i* installed, so its toolchain is only resolved once
//! stage *i* is complete. Within a stage the runtime sub-build must finish
//! before the main build is configured, since the main build links against
//! it. The first failure aborts the run; nothing already built is removed.

use crate::components::ComponentSet;
use crate::config::BootstrapConfig;
use crate::error::{Error, Result, Step, SubBuild, Warning};
use crate::flags::FlagSynthesizer;
use crate::manifest::StageManifest;
use crate::package::{PackageOutcome, Packager};
use crate::process::ProcessRunner;
use crate::profile::Profile;
use crate::runner::StageRunner;
use crate::space::BuildSpace;
use crate::stage::{SpecDirs, StageResult, StageRule, StageStatus, ToolchainSource};
use crate::toolchain::ToolchainPaths;
use std::fmt;
use std::path::{Path, PathBuf};

/// Ordered stage rules for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePlan {
    stages: Vec<StageRule>,
}

impl PipelinePlan {
    /// Plan `depth` stages for `profile`. Depth is clamped to `[1, 3]`.
    pub fn new(profile: &Profile, depth: usize) -> Self {
        let depth = depth.clamp(1, 3);
        let stages = (1..=depth)
            .map(|index| {
                let is_final = index == depth;
                StageRule {
                    index,
                    is_final,
                    components: if is_final {
                        profile.final_components()
                    } else {
                        ComponentSet::minimal()
                    },
                    clean: profile.clean_stages(),
                    runtimes_only: profile.runtimes_only(),
                    toolchain: if index == 1 {
                        ToolchainSource::External
                    } else {
                        ToolchainSource::PreviousStage
                    },
                }
            })
            .collect();
        Self { stages }
    }

    /// Never empty.
    pub fn stages(&self) -> &[StageRule] {
        &self.stages
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageState {
    Pending,
    RuntimeConfiguring,
    RuntimeBuilding,
    RuntimeReady,
    MainConfiguring,
    MainBuilding,
    Installed,
    Complete,
    Failed,
}

impl StageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Complete | StageState::Failed)
    }

    /// Legal transitions. Configure-only runs skip the building states and
    /// runtime-only stages go straight from `RuntimeReady` to `Installed`.
    pub fn can_advance_to(self, next: StageState) -> bool {
        use StageState::{
            Complete, Failed, Installed, MainBuilding, MainConfiguring, Pending, RuntimeBuilding,
            RuntimeConfiguring, RuntimeReady,
        };
        match (self, next) {
            (state, Failed) => !state.is_terminal(),
            (Pending, RuntimeConfiguring)
            | (RuntimeConfiguring, RuntimeBuilding | RuntimeReady)
            | (RuntimeBuilding, RuntimeReady)
            | (RuntimeReady, MainConfiguring | Installed)
            | (MainConfiguring, MainBuilding | Complete)
            | (MainBuilding, Installed)
            | (Installed, Complete) => true,
            _ => false,
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StageState::Pending => "pending",
            StageState::RuntimeConfiguring => "runtime-configuring",
            StageState::RuntimeBuilding => "runtime-building",
            StageState::RuntimeReady => "runtime-ready",
            StageState::MainConfiguring => "main-configuring",
            StageState::MainBuilding => "main-building",
            StageState::Installed => "installed",
            StageState::Complete => "complete",
            StageState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// What happened during a run, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ToolchainResolved {
        stage: usize,
        toolchain: ToolchainPaths,
    },
    Entered {
        stage: usize,
        state: StageState,
    },
}

/// Result of a whole pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    pub stages: Vec<StageResult>,
    pub events: Vec<PipelineEvent>,
    pub warnings: Vec<Warning>,
    pub packaged: bool,
    pub failure: Option<Error>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// 0 when every stage completed, otherwise derived from the first
    /// failing external process.
    pub fn exit_code(&self) -> i32 {
        self.failure.as_ref().map_or(0, Error::exit_code)
    }

    /// States `stage` went through, in order.
    pub fn states(&self, stage: usize) -> Vec<StageState> {
        self.events
            .iter()
            .filter_map(|e| match e {
                PipelineEvent::Entered { stage: s, state } if *s == stage => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Toolchain resolved for `stage`, if the pipeline got that far.
    pub fn toolchain(&self, stage: usize) -> Option<&ToolchainPaths> {
        self.events.iter().find_map(|e| match e {
            PipelineEvent::ToolchainResolved { stage: s, toolchain } if *s == stage => {
                Some(toolchain)
            }
            _ => None,
        })
    }
}

pub struct Orchestrator<'a> {
    config: &'a BootstrapConfig,
    process: &'a dyn ProcessRunner,
    space: BuildSpace,
    plan: PipelinePlan,
    state: StageState,
    events: Vec<PipelineEvent>,
    warnings: Vec<Warning>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(config: &'a BootstrapConfig, process: &'a dyn ProcessRunner) -> Self {
        Self {
            config,
            process,
            space: BuildSpace::new(config.build_root()),
            plan: PipelinePlan::new(config.profile(), config.depth()),
            state: StageState::Pending,
            events: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn plan(&self) -> &PipelinePlan {
        &self.plan
    }

    /// Run every stage, then package the final one.
    pub fn run(mut self) -> PipelineReport {
        log::info!(
            "=== {} build: {} stage(s), {} jobs ===",
            self.config.profile(),
            self.plan.stages().len(),
            self.config.jobs()
        );

        if self.config.clean() {
            if let Err(e) = self.space.clear() {
                return self.finish(Vec::new(), Some(e), false);
            }
        }

        let rules = self.plan.stages().to_vec();
        let mut results: Vec<StageResult> = Vec::new();

        for rule in &rules {
            let previous = results.last().and_then(|r| r.install_prefix.as_deref());
            let toolchain = match self.resolve_toolchain(rule, previous) {
                Ok(t) => t,
                Err(e) => return self.finish(results, Some(e), false),
            };

            log::info!(
                "=== Stage {}/{} with {} ===",
                rule.index,
                self.plan.stages().len(),
                toolchain.compiler.display()
            );
            let mut manifest =
                StageManifest::begin(rule.index, self.config.profile().name(), &toolchain);

            match self.run_stage(rule, &toolchain, &mut manifest) {
                Ok(result) => {
                    if let Some(prefix) = &result.install_prefix {
                        manifest.succeed(prefix);
                    }
                    self.write_manifest(rule, &manifest);
                    results.push(result);
                }
                Err(e) => {
                    self.enter(rule.index, StageState::Failed);
                    manifest.fail(&e);
                    self.write_manifest(rule, &manifest);
                    results.push(StageResult {
                        index: rule.index,
                        status: match e.location() {
                            Some((_, _, Step::Build)) => StageStatus::BuildFailed,
                            _ => StageStatus::ConfigureFailed,
                        },
                        install_prefix: None,
                        runtime_prefix: None,
                    });
                    return self.finish(results, Some(e), false);
                }
            }
        }

        let packaged = self.package();
        self.finish(results, None, packaged)
    }

    fn resolve_toolchain(
        &mut self,
        rule: &StageRule,
        previous: Option<&Path>,
    ) -> Result<ToolchainPaths> {
        self.state = StageState::Pending;
        self.enter(rule.index, StageState::Pending);

        let toolchain = match (rule.toolchain, previous) {
            (ToolchainSource::External, _) => self.config.stage1_toolchain().clone(),
            (ToolchainSource::PreviousStage, Some(prefix)) => {
                ToolchainPaths::from_install_prefix(prefix)
            }
            (ToolchainSource::PreviousStage, None) => {
                return Err(Error::Config(format!(
                    "stage {} has no previous stage to take its compiler from",
                    rule.index
                )))
            }
        };
        self.events.push(PipelineEvent::ToolchainResolved {
            stage: rule.index,
            toolchain: toolchain.clone(),
        });
        Ok(toolchain)
    }

    fn run_stage(
        &mut self,
        rule: &StageRule,
        toolchain: &ToolchainPaths,
        manifest: &mut StageManifest,
    ) -> Result<StageResult> {
        let config = self.config;
        let synth = FlagSynthesizer::new(config.settings());
        let runner = StageRunner::new(self.process, config.cmake(), config.ninja(), config.jobs());
        let index = rule.index;
        let at = move |sub: SubBuild, step: Step| move |e: Error| e.at(index, sub, step);

        let flags = synth.stage_flags(toolchain);
        if flags.thin_lto_downgraded {
            let warning = Warning::IncompatibleOptimizationRequest {
                stage: rule.index,
                compiler: toolchain.compiler.clone(),
                linker: toolchain.linker.clone(),
                reason: toolchain
                    .thin_lto_blocker()
                    .unwrap_or("unsupported toolchain")
                    .to_string(),
            };
            log::warn!("{warning}");
            self.warnings.push(warning);
        }

        // Runtime sub-build
        let rt_install_is_final = rule.runtimes_only && rule.is_final;
        let rt_dirs = self
            .dirs(rule, SubBuild::Runtime, config.runtimes_source(), rt_install_is_final)
            .map_err(at(SubBuild::Runtime, Step::Configure))?;
        let runtime_prefix = rt_dirs.install.clone();
        let rt_spec = synth.runtime_spec(rule, toolchain, &flags, rt_dirs);
        manifest.record(&rt_spec);

        self.enter(rule.index, StageState::RuntimeConfiguring);
        runner
            .configure(&rt_spec)
            .map_err(at(SubBuild::Runtime, Step::Configure))?;
        if !config.config_only() {
            self.enter(rule.index, StageState::RuntimeBuilding);
            runner.build(&rt_spec).map_err(at(SubBuild::Runtime, Step::Build))?;
        }
        self.enter(rule.index, StageState::RuntimeReady);

        if rule.runtimes_only {
            self.enter(rule.index, StageState::Installed);
            self.enter(rule.index, StageState::Complete);
            return Ok(StageResult {
                index: rule.index,
                status: StageStatus::Success,
                install_prefix: Some(runtime_prefix.clone()),
                runtime_prefix: Some(runtime_prefix),
            });
        }

        // Main build, only once the runtime it links against is installed
        let main_dirs = self
            .dirs(rule, SubBuild::Main, config.project_source(), rule.is_final)
            .map_err(at(SubBuild::Main, Step::Configure))?;
        let install_prefix = main_dirs.install.clone();
        let main_spec = synth.main_spec(rule, toolchain, &flags, main_dirs, &runtime_prefix);
        manifest.record(&main_spec);

        self.enter(rule.index, StageState::MainConfiguring);
        runner
            .configure(&main_spec)
            .map_err(at(SubBuild::Main, Step::Configure))?;
        if !config.config_only() {
            self.enter(rule.index, StageState::MainBuilding);
            runner.build(&main_spec).map_err(at(SubBuild::Main, Step::Build))?;
            self.enter(rule.index, StageState::Installed);
        }
        self.enter(rule.index, StageState::Complete);

        Ok(StageResult {
            index: rule.index,
            status: StageStatus::Success,
            install_prefix: Some(install_prefix),
            runtime_prefix: Some(runtime_prefix),
        })
    }

    /// Directories of one sub-build, wiped first when the stage is clean.
    /// `use_caller_prefix` routes the install to the caller's prefix.
    fn dirs(
        &self,
        rule: &StageRule,
        sub: SubBuild,
        source: PathBuf,
        use_caller_prefix: bool,
    ) -> Result<SpecDirs> {
        let name = rule.sub_build_name(sub);
        if rule.clean {
            self.space.remove_build_dir(&name)?;
            self.space.remove_install_dir(&name)?;
        }
        let install = match self.config.install_prefix() {
            Some(prefix) if use_caller_prefix => {
                std::fs::create_dir_all(prefix).map_err(|e| Error::io(prefix, e))?;
                prefix.to_path_buf()
            }
            _ => self.space.install_dir(&name)?,
        };
        Ok(SpecDirs {
            source,
            build: self.space.build_dir(&name)?,
            install,
        })
    }

    fn enter(&mut self, stage: usize, state: StageState) {
        debug_assert!(
            state == StageState::Pending || self.state.can_advance_to(state),
            "stage {stage}: {} -> {state}",
            self.state
        );
        log::debug!("stage {stage}: {state}");
        self.state = state;
        self.events.push(PipelineEvent::Entered { stage, state });
    }

    fn write_manifest(&self, rule: &StageRule, manifest: &StageManifest) {
        let sub = if rule.runtimes_only {
            SubBuild::Runtime
        } else {
            SubBuild::Main
        };
        let written = self
            .space
            .build_dir(&rule.sub_build_name(sub))
            .and_then(|dir| manifest.write(&dir));
        if let Err(e) = written {
            log::warn!("could not write stage manifest: {e}");
        }
    }

    fn package(&mut self) -> bool {
        if self.config.skip_package() || self.config.config_only() {
            return false;
        }
        let Some(last) = self.plan.stages().last() else {
            return false;
        };
        let sub = if last.runtimes_only {
            SubBuild::Runtime
        } else {
            SubBuild::Main
        };
        let build_dir = match self.space.build_dir(&last.sub_build_name(sub)) {
            Ok(dir) => dir,
            Err(e) => {
                log::warn!("packaging skipped: {e}");
                return false;
            }
        };

        let packager =
            Packager::new(self.process, self.config.cpack(), self.config.package_format());
        match packager.package(&build_dir) {
            PackageOutcome::Archived => true,
            PackageOutcome::Skipped(warning) => {
                self.warnings.push(warning);
                false
            }
        }
    }

    fn finish(
        self,
        stages: Vec<StageResult>,
        failure: Option<Error>,
        packaged: bool,
    ) -> PipelineReport {
        match &failure {
            None => log::info!("=== Build complete: {} stage(s) ===", stages.len()),
            Some(e) => {
                log::error!("Pipeline aborted: {e}");
                if let Some(cmd) = e.failed_command() {
                    log::error!("Reproduce with: {cmd}");
                }
            }
        }
        PipelineReport {
            stages,
            events: self.events,
            warnings: self.warnings,
            packaged,
            failure,
        }
    }
}
