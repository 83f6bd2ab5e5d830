use crate::error::{Error, Result};
use crate::validators::compose::normalize_path;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

/// Files bigger than this are left out of a snapshot.
const MAX_FILE_BYTES: u64 = 1024 * 1024;

const SKIPPED_DIRS: &[&str] = &["node_modules", "target", ".git"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Dockerfile,
    Yaml,
    Javascript,
    Sh,
    Text,
}

impl Language {
    pub fn detect(path: &str) -> Self {
        let name = path.rsplit('/').next().unwrap_or(path).to_lowercase();
        if name == "dockerfile" || name.starts_with("dockerfile.") || name.ends_with(".dockerfile") {
            return Language::Dockerfile;
        }
        match name.rsplit_once('.').map(|(_, ext)| ext) {
            Some("yml" | "yaml") => Language::Yaml,
            Some("js" | "mjs" | "cjs" | "ts") => Language::Javascript,
            Some("sh" | "bash") => Language::Sh,
            _ => Language::Text,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkspaceFile {
    pub path: String,
    pub content: String,
    pub language: Language,
}

impl WorkspaceFile {
    pub fn new(path: &str, content: impl Into<String>) -> Self {
        let path = normalize_path(path);
        Self {
            language: Language::detect(&path),
            path,
            content: content.into(),
        }
    }
}

/// Files keyed by their workspace-relative path.
pub type WorkspaceFiles = BTreeMap<String, WorkspaceFile>;

/// Build a snapshot from `(path, content)` pairs.
pub fn snapshot<'a>(entries: impl IntoIterator<Item = (&'a str, &'a str)>) -> WorkspaceFiles {
    entries
        .into_iter()
        .map(|(path, content)| {
            let file = WorkspaceFile::new(path, content);
            (file.path.clone(), file)
        })
        .collect()
}

/// Look a file up by path, ignoring a leading `./`.
pub fn get<'a>(files: &'a WorkspaceFiles, path: &str) -> Option<&'a WorkspaceFile> {
    files.get(&normalize_path(path))
}

/// Every file path plus every directory that contains one.
pub fn paths(files: &WorkspaceFiles) -> Vec<String> {
    let mut all = BTreeSet::new();
    for path in files.keys() {
        let mut dir = path.as_str();
        while let Some((parent, _)) = dir.rsplit_once('/') {
            all.insert(parent.to_string());
            dir = parent;
        }
        all.insert(path.clone());
    }
    all.into_iter().collect()
}

/// Snapshot a directory: its regular files and those one level down.
///
/// Hidden entries, dependency folders, oversized and non-UTF-8 files are
/// skipped.
pub fn load_dir(dir: &Path) -> Result<WorkspaceFiles> {
    if !dir.exists() {
        return Err(Error::PathNotFound(dir.to_path_buf()));
    }
    if !dir.is_dir() {
        return Err(Error::NotADirectory(dir.to_path_buf()));
    }

    let mut files = WorkspaceFiles::new();
    collect(dir, "", 1, &mut files)?;
    info!(dir = %dir.display(), files = files.len(), "loaded workspace");
    Ok(files)
}

fn collect(dir: &Path, prefix: &str, depth: usize, files: &mut WorkspaceFiles) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        if name.starts_with('.') {
            continue;
        }
        let rel = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}/{name}")
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if depth > 0 && !SKIPPED_DIRS.contains(&name.as_str()) {
                collect(&entry.path(), &rel, depth - 1, files)?;
            }
            continue;
        }
        if !file_type.is_file() || entry.metadata()?.len() > MAX_FILE_BYTES {
            continue;
        }

        match fs::read_to_string(entry.path()) {
            Ok(content) => {
                let file = WorkspaceFile::new(&rel, content);
                files.insert(file.path.clone(), file);
            }
            Err(e) => debug!(path = %rel, error = %e, "skipping unreadable file"),
        }
    }
    Ok(())
}
