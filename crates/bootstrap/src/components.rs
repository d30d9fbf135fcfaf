//! Toolchain projects and runtime libraries enabled for a build.

use std::collections::BTreeSet;
use std::fmt;

/// Projects of the main tree, enabled through `LLVM_ENABLE_PROJECTS`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Project {
    Clang,
    ClangToolsExtra,
    Lld,
    Lldb,
    Mlir,
    Polly,
}

impl Project {
    pub fn name(self) -> &'static str {
        match self {
            Project::Clang => "clang",
            Project::ClangToolsExtra => "clang-tools-extra",
            Project::Lld => "lld",
            Project::Lldb => "lldb",
            Project::Mlir => "mlir",
            Project::Polly => "polly",
        }
    }

    /// Test target run for this project at the final stage.
    pub fn check_target(self) -> Option<&'static str> {
        match self {
            Project::Clang => Some("check-clang"),
            Project::ClangToolsExtra => Some("check-clang-tools"),
            Project::Lld => Some("check-lld"),
            Project::Mlir => Some("check-mlir"),
            Project::Polly => Some("check-polly"),
            // Needs a debuggable inferior; too host-dependent for a gate
            Project::Lldb => None,
        }
    }
}

impl fmt::Display for Project {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Runtime libraries, enabled through `LLVM_ENABLE_RUNTIMES`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Runtime {
    CompilerRt,
    Libcxx,
    Libcxxabi,
    Libunwind,
    Openmp,
}

impl Runtime {
    pub fn name(self) -> &'static str {
        match self {
            Runtime::CompilerRt => "compiler-rt",
            Runtime::Libcxx => "libcxx",
            Runtime::Libcxxabi => "libcxxabi",
            Runtime::Libunwind => "libunwind",
            Runtime::Openmp => "openmp",
        }
    }
}

impl fmt::Display for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The projects and runtimes one stage builds.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentSet {
    pub projects: BTreeSet<Project>,
    pub runtimes: BTreeSet<Runtime>,
}

impl ComponentSet {
    /// What it takes to produce a working compiler, linker and runtime.
    pub fn minimal() -> Self {
        Self {
            projects: [Project::Clang, Project::Lld].into(),
            runtimes: [Runtime::CompilerRt].into(),
        }
    }

    /// Minimal set plus extended tooling and auxiliary projects.
    pub fn full() -> Self {
        Self {
            projects: [
                Project::Clang,
                Project::ClangToolsExtra,
                Project::Lld,
                Project::Lldb,
                Project::Mlir,
                Project::Polly,
            ]
            .into(),
            runtimes: [
                Runtime::CompilerRt,
                Runtime::Libcxx,
                Runtime::Libcxxabi,
                Runtime::Libunwind,
                Runtime::Openmp,
            ]
            .into(),
        }
    }

    pub fn contains_project(&self, project: Project) -> bool {
        self.projects.contains(&project)
    }

    pub fn contains_runtime(&self, runtime: Runtime) -> bool {
        self.runtimes.contains(&runtime)
    }

    /// Components in `self` that are not in `other`.
    pub fn difference(&self, other: &Self) -> Self {
        Self {
            projects: self.projects.difference(&other.projects).copied().collect(),
            runtimes: self.runtimes.difference(&other.runtimes).copied().collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.projects.is_empty() && self.runtimes.is_empty()
    }

    pub fn project_names(&self) -> Vec<String> {
        self.projects.iter().map(|p| p.name().to_string()).collect()
    }

    pub fn runtime_names(&self) -> Vec<String> {
        self.runtimes.iter().map(|r| r.name().to_string()).collect()
    }

    /// Value for `LLVM_ENABLE_PROJECTS`.
    pub fn projects_list(&self) -> String {
        join(self.projects.iter().map(|p| p.name()))
    }

    /// Value for `LLVM_ENABLE_RUNTIMES`.
    pub fn runtimes_list(&self) -> String {
        join(self.runtimes.iter().map(|r| r.name()))
    }
}

fn join<'a>(names: impl Iterator<Item = &'a str>) -> String {
    names.collect::<Vec<_>>().join(";")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_is_subset_of_full() {
        let minimal = ComponentSet::minimal();
        assert!(minimal.difference(&ComponentSet::full()).is_empty());

        let extra = ComponentSet::full().difference(&minimal);
        assert_eq!(extra.projects_list(), "clang-tools-extra;lldb;mlir;polly");
        assert_eq!(extra.runtimes_list(), "libcxx;libcxxabi;libunwind;openmp");
        for project in [Project::ClangToolsExtra, Project::Lldb, Project::Mlir, Project::Polly] {
            assert!(extra.contains_project(project));
        }
        assert!(!extra.contains_project(Project::Clang));
        assert!(!extra.contains_runtime(Runtime::CompilerRt));
    }

    #[test]
    fn test_lists_are_semicolon_separated() {
        let set = ComponentSet::minimal();
        assert_eq!(set.projects_list(), "clang;lld");
        assert_eq!(set.runtimes_list(), "compiler-rt");
    }

    #[test]
    fn test_full_lists_keep_declaration_order() {
        let set = ComponentSet::full();
        assert_eq!(
            set.projects_list(),
            "clang;clang-tools-extra;lld;lldb;mlir;polly"
        );
        assert_eq!(
            set.runtimes_list(),
            "compiler-rt;libcxx;libcxxabi;libunwind;openmp"
        );
    }
}
