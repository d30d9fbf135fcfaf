use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "bh")]
#[command(about = "Staged self-hosting LLVM toolchain builds")]
pub struct Cli {
    #[command(subcommand)]
    pub cmd: Cmd,
}

#[derive(Subcommand)]
pub enum Cmd {
    /// Single optimized stage with the minimal component set.
    Dev {
        /// Build LLVM as shared libraries.
        #[arg(long)]
        shared_libs: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Single debuggable stage with the minimal component set.
    Debug {
        /// Build LLVM as shared libraries.
        #[arg(long)]
        shared_libs: bool,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Staged build where every stage starts from empty directories.
    Staging {
        /// Number of stages (clamped to 1..=3).
        #[arg(long, default_value_t = 3)]
        depth: u32,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Self-hosting build: each stage is compiled by the previous one.
    Bootstrap {
        /// Number of stages (clamped to 1..=3).
        #[arg(long, default_value_t = 2)]
        depth: u32,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// Runtime libraries only, with the supplied compiler.
    Runtimes {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Product toolchain defaulting to lld, libc++ and compiler-rt.
    Atomic {
        /// Number of stages (clamped to 1..=3).
        #[arg(long, default_value_t = 2)]
        depth: u32,

        /// Link the tools against a single libLLVM.
        #[arg(long)]
        dylib: bool,

        /// binutils include directory for the gold plugin.
        #[arg(long, value_name = "DIR")]
        binutils_include: Option<PathBuf>,

        #[command(flatten)]
        common: CommonArgs,
    },

    /// List the stage manifests left under a build root.
    Status {
        #[arg(long, value_name = "DIR", default_value = "bootstrap-out")]
        build_root: PathBuf,
    },
}

/// Options shared by every build subcommand.
#[derive(Args)]
pub struct CommonArgs {
    /// LLVM monorepo checkout (contains llvm/ and runtimes/).
    #[arg(long, value_name = "DIR", default_value = ".")]
    pub src_dir: PathBuf,

    /// Where build/ and install/ trees are created.
    #[arg(long, value_name = "DIR", default_value = "bootstrap-out")]
    pub build_root: PathBuf,

    /// Install prefix of the final stage.
    #[arg(long, value_name = "DIR")]
    pub install_prefix: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub cmake: Option<PathBuf>,

    #[arg(long, value_name = "PATH")]
    pub ninja: Option<PathBuf>,

    /// C compiler driving stage 1.
    #[arg(long, value_name = "PATH")]
    pub cc: Option<PathBuf>,

    /// Linker driving stage 1.
    #[arg(long, value_name = "PATH")]
    pub ld: Option<PathBuf>,

    #[arg(short, long)]
    pub jobs: Option<usize>,

    #[arg(long)]
    pub assertions: bool,

    /// Request ThinLTO; dropped with a warning for toolchains that cannot do it.
    #[arg(long)]
    pub thin_lto: bool,

    /// Replace malloc with this library (e.g. mimalloc).
    #[arg(long, value_name = "LIB")]
    pub allocator: Option<String>,

    /// Remove all build and install trees before stage 1.
    #[arg(long)]
    pub clean: bool,

    /// Stop every sub-build after configure.
    #[arg(long)]
    pub config_only: bool,

    #[arg(long)]
    pub skip_tests: bool,

    #[arg(long)]
    pub skip_package: bool,

    /// Extra cache entry for the main builds (repeatable).
    #[arg(short = 'D', value_name = "KEY=VALUE", value_parser = parse_define)]
    pub define: Vec<(String, String)>,

    /// Defaults file (bootstrap.toml in the working directory if omitted).
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,
}

fn parse_define(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_define() {
        assert_eq!(
            parse_define("LLVM_TARGETS_TO_BUILD=X86;AArch64"),
            Ok(("LLVM_TARGETS_TO_BUILD".to_string(), "X86;AArch64".to_string()))
        );
        assert!(parse_define("=ON").is_err());
        assert!(parse_define("LLVM_ENABLE_ZSTD").is_err());
    }

    #[test]
    fn test_bootstrap_defaults() {
        let cli = Cli::try_parse_from(["bh", "bootstrap", "--cc", "gcc"]).unwrap();
        match cli.cmd {
            Cmd::Bootstrap { depth, common } => {
                assert_eq!(depth, 2);
                assert_eq!(common.cc, Some(PathBuf::from("gcc")));
                assert!(!common.thin_lto);
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn test_defines_repeat() {
        let cli = Cli::try_parse_from(["bh", "dev", "-D", "A=1", "-D", "B=2"]).unwrap();
        let Cmd::Dev { common, .. } = cli.cmd else {
            panic!("wrong subcommand");
        };
        assert_eq!(common.define.len(), 2);
    }
}
