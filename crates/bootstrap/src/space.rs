//! On-disk layout of a pipeline run.
//!
//! ```text
//! <root>/build/<stage>     build tree of one sub-build
//! <root>/install/<stage>  install prefix of one sub-build
//! ```
//!
//! Directories are created on first use and left in place afterwards, so a
//! failed stage can be inspected. Concurrent runs against one root are not
//! supported.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Area {
    Build,
    Install,
}

impl Area {
    fn dir(self) -> &'static str {
        match self {
            Area::Build => "build",
            Area::Install => "install",
        }
    }
}

#[derive(Debug, Clone)]
pub struct BuildSpace {
    root: PathBuf,
}

impl BuildSpace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Build directory of `stage`, created if missing.
    pub fn build_dir(&self, stage: &str) -> Result<PathBuf> {
        self.ensure(Area::Build, stage)
    }

    /// Install directory of `stage`, created if missing.
    pub fn install_dir(&self, stage: &str) -> Result<PathBuf> {
        self.ensure(Area::Install, stage)
    }

    /// Delete the build directory of `stage` for a from-scratch rebuild.
    pub fn remove_build_dir(&self, stage: &str) -> Result<()> {
        self.remove(Area::Build, stage)
    }

    /// Delete the install directory of `stage` for a from-scratch rebuild.
    pub fn remove_install_dir(&self, stage: &str) -> Result<()> {
        self.remove(Area::Install, stage)
    }

    /// Delete the whole space. Only for an explicitly requested clean slate
    /// before the first stage.
    pub fn clear(&self) -> Result<()> {
        for area in [Area::Build, Area::Install] {
            let dir = self.root.join(area.dir());
            if dir.exists() {
                log::info!("Removing {}", dir.display());
                std::fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
            }
        }
        Ok(())
    }

    /// Stage names that currently have a build directory.
    pub fn build_stages(&self) -> Result<Vec<String>> {
        let dir = self.root.join(Area::Build.dir());
        if !dir.is_dir() {
            return Ok(Vec::new());
        }
        let entries = std::fs::read_dir(&dir).map_err(|e| Error::io(&dir, e))?;
        let mut names = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&dir, e))?;
            if entry.path().is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn path(&self, area: Area, stage: &str) -> Result<PathBuf> {
        let valid = !stage.is_empty()
            && stage != "."
            && stage != ".."
            && !stage.contains(['/', '\\']);
        if !valid {
            return Err(Error::Config(format!("invalid stage name '{stage}'")));
        }
        Ok(self.root.join(area.dir()).join(stage))
    }

    fn ensure(&self, area: Area, stage: &str) -> Result<PathBuf> {
        let dir = self.path(area, stage)?;
        if !dir.is_dir() {
            log::debug!("creating {}", dir.display());
            std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        Ok(dir)
    }

    fn remove(&self, area: Area, stage: &str) -> Result<()> {
        let dir = self.path(area, stage)?;
        if dir.exists() {
            log::info!("Removing {}", dir.display());
            std::fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_dir_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let space = BuildSpace::new(tmp.path());

        let first = space.build_dir("stage1").unwrap();
        std::fs::write(first.join("CMakeCache.txt"), "").unwrap();
        let second = space.build_dir("stage1").unwrap();

        assert_eq!(first, second);
        assert_eq!(first, tmp.path().join("build/stage1"));
        // Existing contents survive the second call
        assert!(second.join("CMakeCache.txt").exists());
    }

    #[test]
    fn test_build_and_install_do_not_alias() {
        let tmp = TempDir::new().unwrap();
        let space = BuildSpace::new(tmp.path());
        assert_ne!(
            space.build_dir("stage1").unwrap(),
            space.install_dir("stage1").unwrap()
        );
        assert_ne!(
            space.build_dir("stage1").unwrap(),
            space.build_dir("stage1-runtimes").unwrap()
        );
    }

    #[test]
    fn test_remove_only_touches_one_stage() {
        let tmp = TempDir::new().unwrap();
        let space = BuildSpace::new(tmp.path());
        let one = space.install_dir("stage1").unwrap();
        let two = space.install_dir("stage2").unwrap();

        space.remove_install_dir("stage2").unwrap();
        assert!(one.is_dir());
        assert!(!two.exists());

        // Removing a missing directory is not an error
        space.remove_install_dir("stage2").unwrap();
        space.remove_build_dir("stage9").unwrap();
    }

    #[test]
    fn test_clear_removes_everything() {
        let tmp = TempDir::new().unwrap();
        let space = BuildSpace::new(tmp.path());
        space.build_dir("stage1").unwrap();
        space.install_dir("stage1").unwrap();

        space.clear().unwrap();
        assert!(!tmp.path().join("build").exists());
        assert!(!tmp.path().join("install").exists());
        assert!(space.build_stages().unwrap().is_empty());
    }

    #[test]
    fn test_rejects_path_like_stage_names() {
        let tmp = TempDir::new().unwrap();
        let space = BuildSpace::new(tmp.path());
        for name in ["", "..", "a/b", "../stage1"] {
            assert!(space.build_dir(name).is_err(), "{name:?}");
        }
    }

    #[test]
    fn test_build_stages_sorted() {
        let tmp = TempDir::new().unwrap();
        let space = BuildSpace::new(tmp.path());
        space.build_dir("stage2").unwrap();
        space.build_dir("stage1").unwrap();
        assert_eq!(space.build_stages().unwrap(), vec!["stage1", "stage2"]);
    }
}
