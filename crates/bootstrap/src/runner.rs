//! Configure and build one sub-build.

use crate::error::{Error, Result};
use crate::process::{Invocation, ProcessRunner};
use crate::stage::StageSpec;
use std::path::Path;

/// Runs CMake and Ninja for a [`StageSpec`].
///
/// Failures are never retried; the error carries the exact command line.
pub struct StageRunner<'a> {
    process: &'a dyn ProcessRunner,
    cmake: &'a Path,
    ninja: &'a Path,
    jobs: usize,
}

impl<'a> StageRunner<'a> {
    pub fn new(
        process: &'a dyn ProcessRunner,
        cmake: &'a Path,
        ninja: &'a Path,
        jobs: usize,
    ) -> Self {
        Self {
            process,
            cmake,
            ninja,
            jobs: jobs.max(1),
        }
    }

    pub fn configure_invocation(&self, spec: &StageSpec) -> Invocation {
        let mut args = vec![
            "-G".to_string(),
            "Ninja".to_string(),
            format!("-DCMAKE_MAKE_PROGRAM={}", self.ninja.display()),
            format!("-DCMAKE_INSTALL_PREFIX={}", spec.install_prefix.display()),
            format!("-DCMAKE_C_COMPILER={}", spec.compiler.display()),
            format!("-DCMAKE_CXX_COMPILER={}", spec.cxx_compiler.display()),
        ];
        if !spec.c_flags.is_empty() {
            args.push(format!("-DCMAKE_C_FLAGS={}", spec.c_flags.join(" ")));
        }
        if !spec.cxx_flags.is_empty() {
            args.push(format!("-DCMAKE_CXX_FLAGS={}", spec.cxx_flags.join(" ")));
        }
        if !spec.link_flags.is_empty() {
            let link = spec.link_flags.join(" ");
            for kind in ["EXE", "SHARED", "MODULE"] {
                args.push(format!("-DCMAKE_{kind}_LINKER_FLAGS={link}"));
            }
        }
        args.extend(spec.options.to_args());
        args.push("-S".to_string());
        args.push(spec.source_root.display().to_string());
        args.push("-B".to_string());
        args.push(spec.build_dir.display().to_string());

        Invocation::new(self.cmake, &spec.build_dir)
            .args(args)
            .envs(&spec.extra_env)
    }

    pub fn build_invocation(&self, spec: &StageSpec) -> Invocation {
        Invocation::new(self.ninja, &spec.build_dir)
            .arg("-C")
            .arg(spec.build_dir.display().to_string())
            .arg("-j")
            .arg(self.jobs.to_string())
            .args(spec.build_targets.iter().cloned())
            .envs(&spec.extra_env)
    }

    /// Run the configure tool.
    pub fn configure(&self, spec: &StageSpec) -> Result<()> {
        let inv = self.configure_invocation(spec);
        log::info!("Configuring {} ({})", spec.build_dir.display(), spec.sub_build);
        let status = self.process.run(&inv)?;
        if !status.success() {
            let command = inv.command_line();
            log::error!("cmake failed: {command}");
            return Err(Error::ConfigureFailed { command, status });
        }
        Ok(())
    }

    /// Run the build tool over the [`StageSpec`] build targets.
    pub fn build(&self, spec: &StageSpec) -> Result<()> {
        let inv = self.build_invocation(spec);
        log::info!(
            "Building {} with {} jobs: {}",
            spec.build_dir.display(),
            self.jobs,
            spec.build_targets.join(" ")
        );
        let status = self.process.run(&inv)?;
        if !status.success() {
            let command = inv.command_line();
            log::error!("ninja failed: {command}");
            return Err(Error::BuildFailed { command, status });
        }
        Ok(())
    }

    /// Configure, then build. Build is never attempted after a failed
    /// configure.
    pub fn configure_and_build(&self, spec: &StageSpec) -> Result<()> {
        self.configure(spec)?;
        self.build(spec)
    }
}
