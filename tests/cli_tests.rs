mod common;

use anyhow::Result;
use assert_cmd::Command;
use common::TestTree;
use predicates::prelude::*;
use std::fs;

/// The binary with a scratch home and configuration, isolated from the caller's environment.
fn backlist(tree: &TestTree) -> Result<Command> {
    let mut cmd = Command::cargo_bin("backlist")?;
    cmd.env("HOME", tree.path())
        .env("XDG_CONFIG_HOME", tree.join(".config"))
        .env("XDG_CACHE_HOME", tree.join(".cache"))
        .env_remove("BACKLIST_CONFIG")
        .env_remove("RESTIC_PASSWORD")
        .env_remove("RUST_LOG")
        .arg("--config")
        .arg(tree.join("config.toml"));
    Ok(cmd)
}

#[test]
fn test_generate_writes_restic_manifest() -> Result<()> {
    let tree = TestTree::with_entries(&["data/keep.txt", "data/cache/blob"])?;
    tree.file("data/.gitignore", "cache/\n")?;
    let out = tree.join("data.list");

    backlist(&tree)?
        .arg("generate")
        .args(["--mode", "restic", "-o"])
        .arg(&out)
        .arg(tree.join("data"))
        .assert()
        .success()
        .stderr(predicate::str::contains("Wrote"));

    let content = fs::read_to_string(&out)?;
    assert!(content.contains("keep.txt"));
    assert!(!content.contains("blob"));
    Ok(())
}

#[test]
fn test_generate_syncthing_append_is_idempotent() -> Result<()> {
    let tree = TestTree::with_entries(&["folder/a.tmp", "folder/b"])?;
    tree.file("folder/.gitignore", "*.tmp\n")?;
    let out = tree.join("folder/.stignore");

    for _ in 0..2 {
        backlist(&tree)?
            .args(["generate", "-m", "syncthing", "--append", "-o"])
            .arg(&out)
            .arg(tree.join("folder"))
            .assert()
            .success();
    }

    let content = fs::read_to_string(&out)?;
    assert_eq!(content.matches("/a.tmp").count(), 1);
    assert!(!content.contains("/b\n"));
    Ok(())
}

#[test]
fn test_generate_missing_root_fails() -> Result<()> {
    let tree = TestTree::new()?;

    backlist(&tree)?
        .args(["generate", "-m", "restic", "-o"])
        .arg(tree.join("out.list"))
        .arg(tree.join("missing"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("Error:"));
    Ok(())
}

#[test]
fn test_generate_rejects_unknown_mode() -> Result<()> {
    let tree = TestTree::new()?;

    backlist(&tree)?
        .args(["generate", "-m", "borg", "-o", "x", "."])
        .assert()
        .failure()
        .stderr(predicate::str::contains("borg"));
    Ok(())
}

#[test]
fn test_completion_bash() -> Result<()> {
    let tree = TestTree::new()?;

    backlist(&tree)?
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backlist"));
    Ok(())
}

#[test]
fn test_backup_unknown_name() -> Result<()> {
    let tree = TestTree::new()?;
    tree.file("config.toml", "[log]\nlevel = \"warn\"\n")?;

    backlist(&tree)?
        .args(["backup", "photos"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No backup named 'photos'"));
    Ok(())
}

#[test]
fn test_backup_without_password_fails_when_not_interactive() -> Result<()> {
    let tree = TestTree::with_entries(&["docs/a"])?;
    tree.file(
        "config.toml",
        &format!(
            "[[backup]]\nname = \"docs\"\nbase = \"{}\"\npaths = [\"docs\"]\n\n[backup.restic]\nrepo = \"/srv/restic\"\n",
            tree.path().display()
        ),
    )?;

    backlist(&tree)?
        .args(["backup", "docs"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No password"));
    Ok(())
}

#[test]
fn test_invalid_config_is_reported() -> Result<()> {
    let tree = TestTree::new()?;
    tree.file("config.toml", "[[watch]]\nmanifest = \"/a.list\"\nmode = \"borg\"\n")?;

    backlist(&tree)?
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load configuration"));
    Ok(())
}

#[test]
fn test_run_without_jobs_warns() -> Result<()> {
    let tree = TestTree::new()?;

    backlist(&tree)?
        .arg("run")
        .assert()
        .success()
        .stderr(predicate::str::contains("No watch jobs configured"));
    Ok(())
}
