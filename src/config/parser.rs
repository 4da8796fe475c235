use super::Config;
use crate::manifest::Mode;
use anyhow::{Context, Result, bail};
use memmap2::MmapOptions;
use std::collections::HashSet;
use std::fs::File;
use std::path::Path;

/// Files at least this large are memory-mapped instead of read.
const MMAP_THRESHOLD: u64 = 4096;

/// Reads, parses and checks a configuration file.
///
/// # Errors
///
/// Returns an error if the file cannot be read, is not UTF-8, is not valid
/// TOML or fails [`validate_config`].
pub fn parse_config_file(path: &Path) -> Result<Config> {
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to stat config file: {}", path.display()))?;

    if metadata.len() < MMAP_THRESHOLD {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        parse_config_str(&content)
    } else {
        let file = File::open(path)
            .with_context(|| format!("Failed to open config file: {}", path.display()))?;
        // SAFETY: the map is read-only and dropped before this function returns.
        let mmap = unsafe { MmapOptions::new().map(&file)? };

        let content = simdutf8::basic::from_utf8(&mmap)
            .map_err(|e| anyhow::anyhow!("Invalid UTF-8 in config file: {e}"))?;

        parse_config_str(content)
    }
}

/// Parses and checks configuration text.
///
/// # Errors
///
/// Returns an error if the text is not valid TOML or fails [`validate_config`].
pub fn parse_config_str(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse TOML config")?;

    validate_config(&config)?;
    Ok(config)
}

/// Structural checks that serde cannot express.
///
/// # Errors
///
/// Returns the first problem found.
pub fn validate_config(config: &Config) -> Result<()> {
    if config.performance.parallel_threads == 0 {
        bail!("Parallel threads must be at least 1");
    }

    let mut manifests = HashSet::new();
    for (i, watch) in config.watch.iter().enumerate() {
        if watch.manifest.as_os_str().is_empty() {
            bail!("watch #{}: manifest path is empty", i + 1);
        }
        if watch.mode.trim().is_empty() {
            bail!("watch #{}: mode is empty", i + 1);
        }
        watch
            .mode
            .parse::<Mode>()
            .with_context(|| format!("watch #{}", i + 1))?;
        if !manifests.insert(watch.manifest.clone()) {
            bail!(
                "Duplicate watch job for manifest {}",
                watch.manifest.display()
            );
        }
    }

    for backup in &config.backup {
        if backup.name.trim().is_empty() {
            bail!("No name given to a backup configuration");
        }
        if backup.paths.is_empty() {
            bail!("backup '{}': no paths configured", backup.name);
        }
        if let Some(base) = &backup.base
            && !base.as_os_str().is_empty()
            && !base.is_absolute()
            && !base.starts_with("~")
        {
            bail!(
                "backup '{}': base path {} must be absolute",
                backup.name,
                base.display()
            );
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::tempdir;

    #[test]
    fn test_parse_valid_config() -> Result<()> {
        let toml_content = r#"
[log]
level = "debug"

[[watch]]
manifest = "/srv/sync/.stignore"
mode = "syncthing"
fail_after_secs = 30
[watch.hooks]
pre = ["echo pre"]

[[watch]]
manifest = "/srv/home.list"
scan_path = "/home"
mode = "restic"
append = false

[[backup]]
name = "documents"
base = "/home/me"
paths = ["documents", "notes/"]
[backup.restic]
repo = "/mnt/backup"
extra_args = "--tag daily"
password = "secret"
"#;

        let config = parse_config_str(toml_content)?;
        assert_eq!(config.log.level, "debug");
        assert_eq!(config.watch.len(), 2);
        assert!(config.watch[0].append);
        assert_eq!(config.watch[0].hooks.pre, vec!["echo pre"]);
        assert_eq!(config.watch[0].fail_after_secs, Some(30));
        assert!(!config.watch[1].append);
        assert_eq!(config.watch[1].scan_path, Some(PathBuf::from("/home")));
        assert_eq!(config.backup[0].restic.repo, "/mnt/backup");
        assert_eq!(config.backup[0].paths.len(), 2);
        Ok(())
    }

    #[test]
    fn test_parse_empty_config() -> Result<()> {
        let config = parse_config_str("")?;
        assert_eq!(config, Config::default());
        assert_eq!(config.log.level, "info");
        Ok(())
    }

    #[test]
    fn test_parse_malformed_toml() {
        let result = parse_config_str("[[watch]\nmanifest = \"/a\"\n");
        assert!(result.is_err());
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Failed to parse TOML")
        );
    }

    #[test]
    fn test_invalid_mode() {
        let result = parse_config_str("[[watch]]\nmanifest = \"/a\"\nmode = \"rsync\"\n");
        let err = result.unwrap_err();
        assert!(format!("{err:#}").contains("rsync"));
    }

    #[test]
    fn test_empty_mode() {
        let result = parse_config_str("[[watch]]\nmanifest = \"/a\"\nmode = \"\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_manifest() {
        let result = parse_config_str("[[watch]]\nmanifest = \"\"\nmode = \"restic\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_duplicate_manifest() {
        let content = r#"
[[watch]]
manifest = "/a.list"
mode = "restic"

[[watch]]
manifest = "/a.list"
mode = "syncthing"
"#;
        let err = parse_config_str(content).unwrap_err();
        assert!(err.to_string().contains("Duplicate watch job"));
    }

    #[test]
    fn test_backup_without_name() {
        let result = parse_config_str("[[backup]]\nname = \" \"\npaths = [\"/tmp\"]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_backup_without_paths() {
        let err = parse_config_str("[[backup]]\nname = \"docs\"\n").unwrap_err();
        assert!(err.to_string().contains("no paths"));
    }

    #[test]
    fn test_relative_backup_base() {
        let result =
            parse_config_str("[[backup]]\nname = \"docs\"\nbase = \"home\"\npaths = [\"a\"]\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_parallel_threads() {
        let result = parse_config_str("[performance]\nparallel_threads = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_data_types() {
        let result = parse_config_str("[[watch]]\nmanifest = \"/a\"\nmode = \"restic\"\nappend = \"yes\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_invalid_utf8() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("bad.toml");
        let mut bytes = vec![b'#'; MMAP_THRESHOLD as usize];
        bytes.extend_from_slice(&[0xFF, 0xFE, 0xFD]);
        std::fs::write(&path, bytes)?;

        let err = parse_config_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid UTF-8"));
        Ok(())
    }

    #[test]
    fn test_parse_large_config_mmap() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("large.toml");

        let mut content = String::new();
        for i in 0..200 {
            content.push_str(&format!(
                "[[watch]]\nmanifest = \"/srv/job-{i}/.stignore\"\nmode = \"syncthing\"\n\n"
            ));
        }
        assert!(content.len() as u64 >= MMAP_THRESHOLD);
        std::fs::write(&path, &content)?;

        let config = parse_config_file(&path)?;
        assert_eq!(config.watch.len(), 200);
        Ok(())
    }
}
