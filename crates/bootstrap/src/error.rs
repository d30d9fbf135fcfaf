//! Error and warning types for the bootstrap pipeline.
//!
//! Fatal conditions are [`Error`] values and abort the pipeline where they
//! occur. Conditions that only degrade the result are [`Warning`] values and
//! are collected on the pipeline report.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Exit status of an external process. `None` means the process was
/// terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessStatus(pub Option<i32>);

impl ProcessStatus {
    pub const SUCCESS: Self = Self(Some(0));

    pub fn success(self) -> bool {
        self.0 == Some(0)
    }

    /// Code to hand back to our own caller for a failed process.
    pub fn failure_code(self) -> i32 {
        match self.0 {
            Some(code) if code != 0 => code,
            _ => 1,
        }
    }
}

impl fmt::Display for ProcessStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit status {code}"),
            None => f.write_str("terminated by signal"),
        }
    }
}

/// Which sub-build of a stage was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubBuild {
    Runtime,
    Main,
}

impl fmt::Display for SubBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SubBuild::Runtime => "runtime",
            SubBuild::Main => "main",
        })
    }
}

/// Which external step of a sub-build was running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Step {
    Configure,
    Build,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Step::Configure => "configure",
            Step::Build => "build",
        })
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("unrecognized compiler '{}': cannot derive a matching C++ driver", path.display())]
    UnrecognizedCompiler { path: PathBuf },

    #[error("{tool} not found: {reason}")]
    ToolNotFound { tool: String, reason: String },

    #[error("configure failed ({status}): {command}")]
    ConfigureFailed {
        command: String,
        status: ProcessStatus,
    },

    #[error("build failed ({status}): {command}")]
    BuildFailed {
        command: String,
        status: ProcessStatus,
    },

    #[error("failed to spawn: {command}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("stage {stage} / {sub_build} / {step}: {source}")]
    Stage {
        stage: usize,
        sub_build: SubBuild,
        step: Step,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an error with the stage position it happened at.
    pub(crate) fn at(self, stage: usize, sub_build: SubBuild, step: Step) -> Self {
        Error::Stage {
            stage,
            sub_build,
            step,
            source: Box::new(self),
        }
    }

    /// Process exit code this error should map to.
    ///
    /// External failures propagate the child's status; everything else is 1.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ConfigureFailed { status, .. } | Error::BuildFailed { status, .. } => {
                status.failure_code()
            }
            Error::Stage { source, .. } => source.exit_code(),
            _ => 1,
        }
    }

    /// The literal command line of the external process that failed, if any.
    pub fn failed_command(&self) -> Option<&str> {
        match self {
            Error::ConfigureFailed { command, .. }
            | Error::BuildFailed { command, .. }
            | Error::Spawn { command, .. } => Some(command),
            Error::Stage { source, .. } => source.failed_command(),
            _ => None,
        }
    }

    /// Stage position of the failure as `(stage, sub-build, step)`.
    pub fn location(&self) -> Option<(usize, SubBuild, Step)> {
        match self {
            Error::Stage {
                stage,
                sub_build,
                step,
                ..
            } => Some((*stage, *sub_build, *step)),
            _ => None,
        }
    }
}

/// Non-fatal conditions recorded while running the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    /// ThinLTO was requested but the stage's compiler/linker pair cannot do it.
    IncompatibleOptimizationRequest {
        stage: usize,
        compiler: PathBuf,
        linker: PathBuf,
        reason: String,
    },
    /// The packaging tool is not installed.
    PackagingUnavailable { tool: String },
    /// The packaging tool ran and failed.
    PackagingFailed {
        command: String,
        status: ProcessStatus,
    },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Warning::IncompatibleOptimizationRequest {
                stage,
                compiler,
                linker,
                reason,
            } => write!(
                f,
                "stage {stage}: ThinLTO disabled for {} with {}: {reason}",
                compiler.display(),
                linker.display()
            ),
            Warning::PackagingUnavailable { tool } => {
                write!(f, "packaging skipped, {tool} is not available")
            }
            Warning::PackagingFailed { command, status } => {
                write!(f, "packaging failed ({status}): {command}")
            }
        }
    }
}
