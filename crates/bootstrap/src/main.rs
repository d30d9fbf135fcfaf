//! # bh
//!
//! Drive staged LLVM toolchain builds.
//!
//! ## Usage
//!
//! ```bash
//! bh dev --src-dir ~/llvm-project               # one stage, clang + lld
//! bh bootstrap --depth 3 --cc gcc               # self-hosting, 3 stages
//! bh staging --thin-lto                         # every stage from scratch
//! bh runtimes --cc clang                        # runtime libraries only
//! bh atomic --dylib --install-prefix /opt/llvm  # product toolchain
//! bh status                                     # manifests of the last run
//! ```

use anyhow::{Context, Result};
use bootstrap::config::Allocator;
use bootstrap::{
    manifest, BootstrapConfig, BootstrapDepth, BuildSettings, BuildSpace, ConfigFile,
    Orchestrator, Profile, SystemRunner,
};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;

mod cli;

use cli::{Cmd, CommonArgs};

fn main() -> Result<ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = cli::Cli::parse();
    match cli.cmd {
        Cmd::Dev {
            shared_libs,
            common,
        } => build(Profile::Dev { shared_libs }, common),
        Cmd::Debug {
            shared_libs,
            common,
        } => build(Profile::Debug { shared_libs }, common),
        Cmd::Staging { depth, common } => build(
            Profile::Staging {
                depth: BootstrapDepth::clamped(depth),
            },
            common,
        ),
        Cmd::Bootstrap { depth, common } => build(
            Profile::Bootstrap {
                depth: BootstrapDepth::clamped(depth),
            },
            common,
        ),
        Cmd::Runtimes { common } => build(Profile::Runtimes, common),
        Cmd::Atomic {
            depth,
            dylib,
            binutils_include,
            common,
        } => build(
            Profile::Atomic {
                depth: BootstrapDepth::clamped(depth),
                dylib,
                binutils_include,
            },
            common,
        ),
        Cmd::Status { build_root } => status(&build_root),
    }
}

fn build(profile: Profile, args: CommonArgs) -> Result<ExitCode> {
    let file = ConfigFile::load(args.config.as_deref()).context("Failed to load bootstrap.toml")?;

    let mut settings = BuildSettings::new(profile);
    settings.assertions = args.assertions;
    settings.thin_lto = args.thin_lto;
    settings.skip_tests = args.skip_tests;

    let mut builder = file
        .apply(BootstrapConfig::builder(settings))
        .source_root(args.src_dir)
        .build_root(args.build_root)
        .clean(args.clean)
        .config_only(args.config_only)
        .skip_package(args.skip_package);
    if let Some(prefix) = args.install_prefix {
        builder = builder.install_prefix(prefix);
    }
    if let Some(cmake) = args.cmake {
        builder = builder.cmake(cmake);
    }
    if let Some(ninja) = args.ninja {
        builder = builder.ninja(ninja);
    }
    if let Some(cc) = args.cc {
        builder = builder.compiler(cc);
    }
    if let Some(ld) = args.ld {
        builder = builder.linker(ld);
    }
    if let Some(jobs) = args.jobs {
        builder = builder.jobs(jobs);
    }
    let settings = builder.settings_mut();
    if let Some(name) = &args.allocator {
        settings.allocator = Allocator::from_name(name);
    }
    settings.extra_options.extend(args.define);

    let config = builder.build().context("Invalid bootstrap configuration")?;
    let report = Orchestrator::new(&config, &SystemRunner).run();

    if let Some(err) = &report.failure {
        eprintln!();
        if let Some((stage, sub_build, step)) = err.location() {
            eprintln!("FAILED: stage {stage}, {sub_build} {step}");
        } else {
            eprintln!("FAILED: {err}");
        }
        if let Some(command) = err.failed_command() {
            eprintln!("  {command}");
        }
    } else if let Some(prefix) = report.stages.last().and_then(|s| s.install_prefix.as_ref()) {
        println!();
        println!("Toolchain installed to {}", prefix.display());
        if !report.warnings.is_empty() {
            println!("{} warning(s):", report.warnings.len());
            for warning in &report.warnings {
                println!("  {warning}");
            }
        }
    }

    Ok(exit_code(report.exit_code()))
}

fn status(build_root: &Path) -> Result<ExitCode> {
    let space = BuildSpace::new(build_root);
    let manifests = manifest::collect(&space)
        .with_context(|| format!("Failed to read manifests under {}", build_root.display()))?;

    if manifests.is_empty() {
        println!("No stages recorded under {}", build_root.display());
        return Ok(ExitCode::SUCCESS);
    }

    for m in &manifests {
        println!(
            "stage{:<2} {:<10} {:<17} {}",
            m.stage,
            m.profile,
            m.status,
            m.finished_at_utc.as_deref().unwrap_or("-")
        );
        println!("         cc: {}", m.compiler.display());
        if !m.projects.is_empty() {
            println!("         projects: {}", m.projects.join(";"));
        }
        println!("         runtimes: {}", m.runtimes.join(";"));
        if m.thin_lto {
            println!("         thinlto: on");
        }
        if let Some(prefix) = &m.install_prefix {
            println!("         installed: {}", prefix.display());
        }
        if let Some(command) = &m.failed_command {
            println!("         failed: {command}");
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Exit codes outside `0..=255` collapse to a generic failure.
fn exit_code(code: i32) -> ExitCode {
    u8::try_from(code).map_or(ExitCode::FAILURE, ExitCode::from)
}
