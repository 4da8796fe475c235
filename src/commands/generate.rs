use crate::manifest::{self, Mode};
use crate::output;
use anyhow::Result;
use std::path::{Path, PathBuf};

pub fn execute(mode: Mode, output_path: &Path, append: bool, roots: &[PathBuf]) -> Result<()> {
    output::verbose(&format!(
        "Walking {} root(s) in {mode} mode",
        roots.len()
    ));

    let added = manifest::generate(output_path, mode, append, roots)?;

    if append {
        output::success(&format!(
            "Added {added} new entries to {}",
            output_path.display()
        ));
    } else {
        output::success(&format!("Wrote {added} entries to {}", output_path.display()));
    }
    Ok(())
}
