#[cfg(test)]
pub mod fixtures {
    use crate::BacklistContext;
    use anyhow::Result;
    use std::fs;
    use std::path::{Path, PathBuf};
    use tempfile::TempDir;

    /// A scratch directory tree plus an optional configuration file in it.
    pub struct TestTree {
        pub temp_dir: TempDir,
        pub config_path: PathBuf,
    }

    impl TestTree {
        pub fn new() -> Result<Self> {
            let temp_dir = tempfile::tempdir()?;
            let config_path = temp_dir.path().join("config.toml");
            Ok(Self {
                temp_dir,
                config_path,
            })
        }

        pub fn path(&self) -> &Path {
            self.temp_dir.path()
        }

        pub fn join(&self, relative: &str) -> PathBuf {
            self.temp_dir.path().join(relative)
        }

        pub fn create_file(&self, relative: &str, content: &str) -> Result<PathBuf> {
            let path = self.join(relative);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, content)?;
            Ok(path)
        }

        pub fn create_dir(&self, relative: &str) -> Result<PathBuf> {
            let path = self.join(relative);
            fs::create_dir_all(&path)?;
            Ok(path)
        }

        pub fn write_config(&self, content: &str) -> Result<()> {
            fs::write(&self.config_path, content)?;
            Ok(())
        }

        pub fn context(&self) -> Result<BacklistContext> {
            BacklistContext::new_explicit(self.config_path.clone())
        }
    }
}
