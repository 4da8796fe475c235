use super::{Entry, Manifest, Mode, TreeWalker};
use crate::utils::paths::make_absolute;
use crate::utils::thread_pool;
use anyhow::Result;
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{Level, info, span};

/// Walks every root concurrently and writes the results into one manifest.
///
/// Each root gets its own walker and ignore stack. All walks run to
/// completion before anything is written. If any of them failed, the error of
/// the first failing root (in the order given) is returned and the manifest
/// file is left untouched.
///
/// Relative paths are resolved against the current directory. Returns the
/// number of lines added.
///
/// # Errors
///
/// Returns the first walk error, or an error opening or writing the manifest.
pub fn generate(manifest_path: &Path, mode: Mode, append: bool, roots: &[PathBuf]) -> Result<usize> {
    let span = span!(
        Level::INFO,
        "generate",
        manifest = %manifest_path.display(),
        %mode,
        roots = roots.len()
    );
    let _guard = span.enter();

    let manifest_path = make_absolute(manifest_path)?;
    let roots = roots
        .iter()
        .map(|root| make_absolute(root))
        .collect::<Result<Vec<_>>>()?;

    let mut manifest = Manifest::open(&manifest_path, mode, append)?;
    let walked = walk_roots(&roots, mode, &manifest_path)?;

    let mut added = 0;
    for (root, entries) in &walked {
        added += manifest.write_entries(root, entries)?;
    }
    manifest.close()?;

    info!(added, "Manifest generated");
    Ok(added)
}

/// Walks the roots on the walk pool, returning entries in root order.
///
/// # Errors
///
/// Returns the error of the first root that failed.
pub fn walk_roots(
    roots: &[PathBuf],
    mode: Mode,
    skip: &Path,
) -> Result<Vec<(PathBuf, Vec<Entry>)>> {
    let results: Vec<Result<Vec<Entry>>> = thread_pool::run_in_pool(|| {
        roots
            .par_iter()
            .map(|root| TreeWalker::new(root.clone(), mode).skip_path(skip).walk())
            .collect()
    })?;

    roots
        .iter()
        .cloned()
        .zip(results)
        .map(|(root, result)| result.map(|entries| (root, entries)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_generate_multiple_roots() -> Result<()> {
        let temp = TempDir::new()?;
        let a = temp.path().join("a");
        let b = temp.path().join("b");
        fs::create_dir_all(&a)?;
        fs::create_dir_all(&b)?;
        fs::write(a.join("one"), "")?;
        fs::write(b.join("two"), "")?;

        let manifest = temp.path().join("out.list");
        let added = generate(&manifest, Mode::Restic, false, &[a.clone(), b.clone()])?;
        assert_eq!(added, 2);

        let content = fs::read_to_string(&manifest)?;
        let one = a.join("one");
        let two = b.join("two");
        assert!(content.lines().any(|l| l == one.to_string_lossy()));
        assert!(content.lines().any(|l| l == two.to_string_lossy()));
        Ok(())
    }

    #[test]
    fn test_failing_root_leaves_manifest_untouched() -> Result<()> {
        let temp = TempDir::new()?;
        let good = temp.path().join("good");
        let bad = temp.path().join("bad");
        fs::create_dir_all(&good)?;
        fs::create_dir_all(&bad)?;
        fs::write(good.join("file"), "")?;
        fs::write(bad.join(".gitignore"), "[broken\n")?;

        let manifest = temp.path().join("out.list");
        fs::write(&manifest, "previous\n")?;

        let result = generate(&manifest, Mode::Restic, false, &[good, bad]);
        assert!(result.is_err());
        assert_eq!(fs::read_to_string(&manifest)?, "previous\n");
        Ok(())
    }
}
