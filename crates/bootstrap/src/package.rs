//! Archive the final stage's build tree with CPack.

use crate::error::{ProcessStatus, Warning};
use crate::process::{Invocation, ProcessRunner};
use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackageOutcome {
    Archived,
    /// Not archived; the build itself still counts as successful.
    Skipped(Warning),
}

pub struct Packager<'a> {
    process: &'a dyn ProcessRunner,
    cpack: Option<&'a Path>,
    format: &'a str,
}

impl<'a> Packager<'a> {
    pub fn new(process: &'a dyn ProcessRunner, cpack: Option<&'a Path>, format: &'a str) -> Self {
        Self {
            process,
            cpack,
            format,
        }
    }

    /// Run `cpack -G <format>` inside `build_dir`. Never fails the pipeline.
    pub fn package(&self, build_dir: &Path) -> PackageOutcome {
        let Some(cpack) = self.cpack else {
            let warning = Warning::PackagingUnavailable {
                tool: "cpack".to_string(),
            };
            log::warn!("{warning}");
            return PackageOutcome::Skipped(warning);
        };

        log::info!("Packaging {}", build_dir.display());
        let inv = Invocation::new(cpack, build_dir).args(["-G", self.format]);
        let command = inv.command_line();
        let status = match self.process.run(&inv) {
            Ok(status) => status,
            Err(e) => {
                log::warn!("{e}");
                ProcessStatus(None)
            }
        };

        if status.success() {
            PackageOutcome::Archived
        } else {
            let warning = Warning::PackagingFailed { command, status };
            log::warn!("{warning}");
            PackageOutcome::Skipped(warning)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use std::cell::RefCell;

    struct Fixed {
        status: ProcessStatus,
        calls: RefCell<Vec<Invocation>>,
    }

    impl ProcessRunner for Fixed {
        fn run(&self, invocation: &Invocation) -> Result<ProcessStatus> {
            self.calls.borrow_mut().push(invocation.clone());
            Ok(self.status)
        }
    }

    fn fixed(code: i32) -> Fixed {
        Fixed {
            status: ProcessStatus(Some(code)),
            calls: RefCell::new(Vec::new()),
        }
    }

    #[test]
    fn test_missing_tool_is_soft() {
        let runner = fixed(0);
        let outcome = Packager::new(&runner, None, "TXZ").package(Path::new("/w/build/stage2"));
        assert!(matches!(
            outcome,
            PackageOutcome::Skipped(Warning::PackagingUnavailable { .. })
        ));
        assert!(runner.calls.borrow().is_empty());
    }

    #[test]
    fn test_runs_cpack_in_build_dir() {
        let runner = fixed(0);
        let outcome = Packager::new(&runner, Some(Path::new("/usr/bin/cpack")), "TGZ")
            .package(Path::new("/w/build/stage2"));
        assert_eq!(outcome, PackageOutcome::Archived);

        let calls = runner.calls.borrow();
        assert_eq!(calls[0].args, vec!["-G", "TGZ"]);
        assert_eq!(calls[0].cwd, Path::new("/w/build/stage2"));
    }

    #[test]
    fn test_cpack_failure_is_a_warning() {
        let runner = fixed(2);
        let outcome = Packager::new(&runner, Some(Path::new("/usr/bin/cpack")), "TXZ")
            .package(Path::new("/w/build/stage2"));
        assert!(matches!(
            outcome,
            PackageOutcome::Skipped(Warning::PackagingFailed { .. })
        ));
    }
}
