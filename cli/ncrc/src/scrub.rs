// Copyright 2025 The ncrc Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Removing embedded channel credentials from conda's package metadata

use anyhow::Result;
use glob::Pattern;
use ncutils::safe_write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubOutcome {
    Scrubbed,
    AlreadyClean,
    /// Missing, unreadable or not writable
    Skipped,
}

#[derive(Debug, Default)]
pub struct ScrubReport {
    pub scrubbed: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Remove every occurrence of `secret` from the file at `path`.
pub fn scrub_file(path: &Path, secret: &str) -> ScrubOutcome {
    if secret.is_empty() {
        return ScrubOutcome::AlreadyClean;
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            log::debug!("skipping {}: {}", path.display(), e);
            return ScrubOutcome::Skipped;
        }
    };
    if !content.contains(secret) {
        return ScrubOutcome::AlreadyClean;
    }

    let read_only = std::fs::metadata(path)
        .map(|m| m.permissions().readonly())
        .unwrap_or(true);
    if read_only {
        log::warn!("{} is read-only, leaving it as is", path.display());
        return ScrubOutcome::Skipped;
    }

    match safe_write(path, content.replace(secret, "").as_bytes()) {
        Ok(()) => ScrubOutcome::Scrubbed,
        Err(e) => {
            log::warn!("could not scrub {}: {:#}", path.display(), e);
            ScrubOutcome::Skipped
        }
    }
}

/// Glob patterns of every metadata file conda may have written for `package`.
pub fn metadata_patterns(env_prefix: &Path, pkgs_dirs: &[PathBuf], package: &str) -> Vec<String> {
    let package = Pattern::escape(package);
    let escaped = |dir: &Path| Pattern::escape(&dir.to_string_lossy());

    let mut patterns = vec![format!("{}/conda-meta/{}-*.json", escaped(env_prefix), package)];
    for dir in pkgs_dirs {
        patterns.push(format!("{}/{}-*/info/repodata_record.json", escaped(dir), package));
        patterns.push(format!("{}/urls.txt", escaped(dir)));
    }
    patterns
}

/// Scrub `secret` from all metadata of `package` installed into `env_prefix`.
pub fn scrub_installed(
    env_prefix: &Path,
    pkgs_dirs: &[PathBuf],
    package: &str,
    secret: &str,
) -> Result<ScrubReport> {
    let mut report = ScrubReport::default();

    for pattern in metadata_patterns(env_prefix, pkgs_dirs, package) {
        for path in glob::glob(&pattern)?.filter_map(|entry| entry.ok()) {
            match scrub_file(&path, secret) {
                ScrubOutcome::Scrubbed => report.scrubbed.push(path),
                ScrubOutcome::Skipped => report.skipped.push(path),
                ScrubOutcome::AlreadyClean => {}
            }
        }
    }

    log::info!(
        "scrubbed credentials from {} file(s), skipped {}",
        report.scrubbed.len(),
        report.skipped.len()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use std::fs;

    const SECRET: &str = "jdoe:123456@";

    fn record() -> String {
        format!(
            r#"{{"channel": "https://{s}conda.example.org/ncrc-moose", "url": "https://{s}conda.example.org/ncrc-moose/linux-64/ncrc-moose-1.0-0.conda", "name": "ncrc-moose"}}"#,
            s = SECRET
        )
    }

    #[test]
    fn removes_exactly_the_secret() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ncrc-moose-1.0-0.json");
        fs::write(&path, record()).unwrap();

        assert_eq!(scrub_file(&path, SECRET), ScrubOutcome::Scrubbed);

        let scrubbed = fs::read_to_string(&path).unwrap();
        assert!(!scrubbed.contains(SECRET));
        assert_eq!(scrubbed, record().replace(SECRET, ""));
        let json: Value = serde_json::from_str(&scrubbed).unwrap();
        assert_eq!(json["channel"], "https://conda.example.org/ncrc-moose");
    }

    #[test]
    fn second_pass_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        fs::write(&path, record()).unwrap();

        assert_eq!(scrub_file(&path, SECRET), ScrubOutcome::Scrubbed);
        let first = fs::read_to_string(&path).unwrap();
        assert_eq!(scrub_file(&path, SECRET), ScrubOutcome::AlreadyClean);
        assert_eq!(fs::read_to_string(&path).unwrap(), first);
    }

    #[test]
    fn missing_file_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(scrub_file(&dir.path().join("gone.json"), SECRET), ScrubOutcome::Skipped);
    }

    #[test]
    fn read_only_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        fs::write(&path, record()).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms).unwrap();

        assert_eq!(scrub_file(&path, SECRET), ScrubOutcome::Skipped);
        assert_eq!(fs::read_to_string(&path).unwrap(), record());
    }

    #[test]
    fn scrubs_every_metadata_location() {
        let root = tempfile::tempdir().unwrap();
        let env = root.path().join("envs/moose");
        let pkgs = root.path().join("pkgs");
        fs::create_dir_all(env.join("conda-meta")).unwrap();
        fs::create_dir_all(pkgs.join("ncrc-moose-1.0-0/info")).unwrap();

        let files = [
            env.join("conda-meta/ncrc-moose-1.0-0.json"),
            pkgs.join("ncrc-moose-1.0-0/info/repodata_record.json"),
            pkgs.join("urls.txt"),
        ];
        for file in &files {
            fs::write(file, record()).unwrap();
        }
        let unrelated = env.join("conda-meta/python-3.11.0-0.json");
        fs::write(&unrelated, record()).unwrap();

        let report = scrub_installed(&env, &[pkgs], "ncrc-moose", SECRET).unwrap();

        assert_eq!(report.scrubbed.len(), files.len());
        assert!(report.skipped.is_empty());
        for file in &files {
            assert!(!fs::read_to_string(file).unwrap().contains(SECRET));
        }
        assert!(fs::read_to_string(&unrelated).unwrap().contains(SECRET));
    }
}
