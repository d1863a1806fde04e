use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tempfile::Builder;

use crate::catalog::CatalogKind;
use crate::error::IndicatorError;

const CURRENT_DIR: &str = "current";
const VINTAGES_DIR: &str = "vintages";
const HISTORY_FILE: &str = "sync_history.json";
pub const SYNC_SUMMARY_FILE: &str = "sync_summary.json";
pub const VINTAGE_SUMMARY_FILE: &str = "summary.json";

/// On-disk layout of the metadata cache:
///
/// ```text
/// <root>/current/{dataflows,indicators,codelists}.json
/// <root>/current/sync_summary.json
/// <root>/vintages/<YYYY-MM-DD>/...      copy of current + summary.json
/// <root>/sync_history.json
/// ```
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

impl Store {
    pub fn new() -> Result<Self, IndicatorError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(
                    dirs.home_dir()
                        .join(".cache")
                        .join("unicef-indicators")
                        .join("metadata"),
                )
                .ok()
            })
            .ok_or_else(|| {
                IndicatorError::Filesystem("unable to resolve cache directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn current_dir(&self) -> Utf8PathBuf {
        self.root.join(CURRENT_DIR)
    }

    pub fn vintages_dir(&self) -> Utf8PathBuf {
        self.root.join(VINTAGES_DIR)
    }

    pub fn vintage_dir(&self, vintage: &str) -> Utf8PathBuf {
        self.vintages_dir().join(vintage)
    }

    pub fn history_path(&self) -> Utf8PathBuf {
        self.root.join(HISTORY_FILE)
    }

    pub fn catalog_path(dir: &Utf8Path, kind: CatalogKind) -> Utf8PathBuf {
        dir.join(kind.file_name())
    }

    pub fn vintage_exists(&self, vintage: &str) -> bool {
        self.vintage_dir(vintage).as_std_path().is_dir()
    }

    /// Dated vintage names, newest first.
    pub fn list_vintages(&self) -> Result<Vec<String>, IndicatorError> {
        let dir = self.vintages_dir();
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let entries =
            fs::read_dir(dir.as_std_path()).map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
            if !entry.path().is_dir() {
                continue;
            }
            // Skip leftovers from interrupted copies.
            if let Some(name) = entry.file_name().to_str().filter(|name| !name.starts_with('.')) {
                names.push(name.to_string());
            }
        }
        names.sort_by(|a, b| b.cmp(a));
        Ok(names)
    }

    pub fn write_json<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<(), IndicatorError> {
        let content = serde_json::to_vec_pretty(value)
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        Self::write_bytes_atomic(path, &content)
    }

    /// Reads a JSON file; a missing file is `None`.
    pub fn read_json<T: DeserializeOwned>(path: &Utf8Path) -> Result<Option<T>, IndicatorError> {
        if !path.as_std_path().exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(path.as_std_path())
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        let value = serde_json::from_str(&content)
            .map_err(|err| IndicatorError::Filesystem(format!("{path}: {err}")))?;
        Ok(Some(value))
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), IndicatorError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        Ok(())
    }

    pub fn copy_dir_recursive(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IndicatorError> {
        fs::create_dir_all(dest.as_std_path())
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        for entry in walk_dir(source.as_std_path())? {
            let relative = entry
                .strip_prefix(source.as_std_path())
                .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
            let target = dest.as_std_path().join(relative);
            if entry.is_dir() {
                fs::create_dir_all(&target)
                    .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
            } else {
                if let Some(parent) = target.parent() {
                    fs::create_dir_all(parent)
                        .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
                }
                fs::copy(&entry, &target).map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
            }
        }
        Ok(())
    }

    /// Copies `source` into a temp dir next to `dest`, then renames it into
    /// place so readers never see a half-written directory.
    pub fn copy_dir_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), IndicatorError> {
        let parent = dest
            .parent()
            .ok_or_else(|| IndicatorError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        let temp_dir = Builder::new()
            .prefix(".vintage-copy")
            .tempdir_in(parent.as_std_path())
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        let temp_path = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
            .map_err(|_| IndicatorError::Filesystem("invalid temp dir".to_string()))?;
        Self::copy_dir_recursive(source, &temp_path)?;
        atomic_rename_dir(temp_path.as_std_path(), dest.as_std_path())
            .map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        Ok(())
    }
}

fn walk_dir(root: &Path) -> Result<Vec<PathBuf>, IndicatorError> {
    let mut items = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(path) = stack.pop() {
        let entries =
            fs::read_dir(&path).map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|err| IndicatorError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.is_dir() {
                stack.push(path.clone());
            }
            items.push(path);
        }
    }
    Ok(items)
}

pub fn atomic_rename_dir(from: &Path, to: &Path) -> io::Result<()> {
    if to.exists() {
        fs::remove_dir_all(to)?;
    }
    fs::rename(from, to)
}
