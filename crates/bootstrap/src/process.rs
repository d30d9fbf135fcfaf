//! External process invocation.
//!
//! Every configure, build and packaging step goes through [`ProcessRunner`],
//! so the pipeline can be driven against a recording runner in tests.

use crate::error::{Error, ProcessStatus, Result};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;

/// A fully described child process: program, arguments, working directory
/// and the environment overrides layered over the inherited environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, OsString>,
}

impl Invocation {
    pub fn new(program: impl Into<PathBuf>, cwd: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: cwd.into(),
            env: BTreeMap::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn envs(mut self, env: &BTreeMap<String, OsString>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Name of the program without its directory.
    pub fn program_name(&self) -> &str {
        self.program
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Shell-style rendering that can be pasted to reproduce the step.
    pub fn command_line(&self) -> String {
        let mut parts = Vec::with_capacity(self.env.len() + self.args.len() + 2);
        parts.push(format!("cd {} &&", quote(&self.cwd.to_string_lossy())));
        for (key, value) in &self.env {
            parts.push(format!("{key}={}", quote(&value.to_string_lossy())));
        }
        parts.push(quote(&self.program.to_string_lossy()));
        parts.extend(self.args.iter().map(|a| quote(a)));
        parts.join(" ")
    }
}

fn quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_=./:+,@%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', r"'\''"))
    }
}

/// Runs a child process to completion and reports its exit status.
pub trait ProcessRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessStatus>;
}

/// Spawns real processes with inherited stdio.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl ProcessRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> Result<ProcessStatus> {
        log::debug!("running: {}", invocation.command_line());

        let status = Command::new(&invocation.program)
            .args(&invocation.args)
            .current_dir(&invocation.cwd)
            .envs(&invocation.env)
            .status()
            .map_err(|source| Error::Spawn {
                command: invocation.command_line(),
                source,
            })?;

        Ok(ProcessStatus(status.code()))
    }
}

/// Prepend `dir` to the search path held in `var` of the current process.
pub fn prepend_search_path(var: &str, dir: &Path) -> OsString {
    let mut paths = vec![dir.to_path_buf()];
    if let Some(existing) = std::env::var_os(var) {
        paths.extend(std::env::split_paths(&existing));
    }
    // join_paths only fails on entries containing the separator itself
    std::env::join_paths(&paths).unwrap_or_else(|_| dir.as_os_str().to_os_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_line_quotes_flag_lists() {
        let inv = Invocation::new("/usr/bin/cmake", "/b/stage1")
            .arg("-GNinja")
            .arg("-DCMAKE_C_FLAGS=-pipe -march=native");
        assert_eq!(
            inv.command_line(),
            "cd /b/stage1 && /usr/bin/cmake -GNinja '-DCMAKE_C_FLAGS=-pipe -march=native'"
        );
    }

    #[test]
    fn test_command_line_includes_env_overrides() {
        let mut env = BTreeMap::new();
        env.insert("LD_LIBRARY_PATH".to_string(), OsString::from("/i/stage1/lib"));
        let inv = Invocation::new("ninja", "/b").envs(&env).args(["-j", "8"]);
        assert_eq!(
            inv.command_line(),
            "cd /b && LD_LIBRARY_PATH=/i/stage1/lib ninja -j 8"
        );
        assert_eq!(inv.program_name(), "ninja");
    }

    #[test]
    fn test_prepend_search_path_puts_dir_first() {
        let joined = prepend_search_path("BH_TEST_UNSET_VARIABLE", Path::new("/i/stage2/lib"));
        assert_eq!(joined, OsString::from("/i/stage2/lib"));
    }
}
