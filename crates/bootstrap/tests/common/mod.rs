//! Shared fixtures: a throwaway monorepo with fake tools and a recording
//! process runner.

#![allow(dead_code)]

use bootstrap::{
    BootstrapConfig, BootstrapConfigBuilder, BuildSettings, Invocation, ProcessRunner,
    ProcessStatus, Profile,
};
use std::cell::RefCell;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

type Rule = Box<dyn Fn(&Invocation) -> bool>;

/// Records every invocation and returns success, except for invocations
/// matched by a scripted failure.
#[derive(Default)]
pub struct FakeRunner {
    calls: RefCell<Vec<Invocation>>,
    failures: Vec<(Rule, i32)>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exit with `code` for every invocation `rule` matches.
    pub fn fail_when(mut self, code: i32, rule: impl Fn(&Invocation) -> bool + 'static) -> Self {
        self.failures.push((Box::new(rule), code));
        self
    }

    /// Fail `program` when run for the sub-build named `sub_build`
    /// (`stage2`, `stage1-runtimes`, ...).
    pub fn fail_in(self, program: &'static str, sub_build: &'static str, code: i32) -> Self {
        self.fail_when(code, move |inv| {
            inv.program_name() == program && inv.cwd.ends_with(Path::new("build").join(sub_build))
        })
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn calls_to(&self, program: &str) -> Vec<Invocation> {
        self.calls
            .borrow()
            .iter()
            .filter(|inv| inv.program_name() == program)
            .cloned()
            .collect()
    }

    /// `program@sub-build` for every call, in order.
    pub fn trace(&self) -> Vec<String> {
        self.calls
            .borrow()
            .iter()
            .map(|inv| {
                let dir = inv
                    .cwd
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                format!("{}@{dir}", inv.program_name())
            })
            .collect()
    }
}

impl ProcessRunner for FakeRunner {
    fn run(&self, invocation: &Invocation) -> bootstrap::Result<ProcessStatus> {
        self.calls.borrow_mut().push(invocation.clone());
        for (rule, code) in &self.failures {
            if rule(invocation) {
                return Ok(ProcessStatus(Some(*code)));
            }
        }
        Ok(ProcessStatus::SUCCESS)
    }
}

/// Temporary workspace: `src/{llvm,runtimes}`, `bin/` with executable
/// stand-ins for every external tool, and an empty `out/` build root.
pub struct TestEnv {
    pub dir: TempDir,
}

impl TestEnv {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src/llvm")).unwrap();
        std::fs::create_dir_all(root.join("src/runtimes")).unwrap();
        std::fs::create_dir_all(root.join("bin")).unwrap();

        let env = Self { dir };
        for tool in [
            "cmake", "ninja", "cpack", "clang", "clang++", "ld.lld", "gcc", "g++", "ld",
        ] {
            env.add_tool(tool);
        }
        env
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn bin(&self, tool: &str) -> PathBuf {
        self.root().join("bin").join(tool)
    }

    pub fn out(&self) -> PathBuf {
        self.root().join("out")
    }

    pub fn add_tool(&self, name: &str) -> PathBuf {
        let path = self.bin(name);
        std::fs::write(&path, "#!/bin/sh\nexit 0\n").unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub fn remove_tool(&self, name: &str) {
        std::fs::remove_file(self.bin(name)).unwrap();
    }

    /// Builder wired to the fake tools, driven by clang + lld.
    pub fn builder(&self, settings: BuildSettings) -> BootstrapConfigBuilder {
        BootstrapConfig::builder(settings)
            .source_root(self.root().join("src"))
            .build_root(self.out())
            .cmake(self.bin("cmake"))
            .ninja(self.bin("ninja"))
            .cpack(self.bin("cpack"))
            .compiler(self.bin("clang"))
            .linker(self.bin("ld.lld"))
            .jobs(8)
    }

    pub fn config(&self, profile: Profile) -> BootstrapConfig {
        self.builder(BuildSettings::new(profile)).build().unwrap()
    }
}

/// Value of `-D<key>=...` in a configure invocation.
pub fn define<'a>(inv: &'a Invocation, key: &str) -> Option<&'a str> {
    let prefix = format!("-D{key}=");
    inv.args.iter().find_map(|a| a.strip_prefix(prefix.as_str()))
}
