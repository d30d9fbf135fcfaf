//! # bootstrap
//!
//! Staged, self-hosting builds of an LLVM toolchain.
//!
//! Stage 1 is built with a caller-supplied compiler; every later stage is
//! built with the compiler the stage before it installed. Each stage is two
//! CMake/Ninja sub-builds: the runtime libraries first, then the compiler
//! and tools linked against them.
//!
//! ```text
//! BootstrapConfig ──► PipelinePlan ──► Orchestrator
//!                                        │  per stage:
//!                                        │    ToolchainPaths  (external / previous install)
//!                                        │    FlagSynthesizer (StageFlags → StageSpec x2)
//!                                        │    StageRunner     (cmake, ninja)
//!                                        ▼
//!                                   PipelineReport
//! ```
//!
//! All external processes go through [`ProcessRunner`], so the whole
//! pipeline can be driven against a recording fake.

pub mod components;
pub mod config;
pub mod error;
pub mod flags;
pub mod manifest;
pub mod package;
pub mod pipeline;
pub mod process;
pub mod profile;
pub mod runner;
pub mod space;
pub mod stage;
pub mod toolchain;

pub use components::{ComponentSet, Project, Runtime};
pub use config::{BootstrapConfig, BootstrapConfigBuilder, BuildSettings, ConfigFile};
pub use error::{Error, ProcessStatus, Result, Step, SubBuild, Warning};
pub use pipeline::{Orchestrator, PipelineEvent, PipelinePlan, PipelineReport, StageState};
pub use process::{Invocation, ProcessRunner, SystemRunner};
pub use profile::{BootstrapDepth, Profile};
pub use space::BuildSpace;
pub use toolchain::ToolchainPaths;
