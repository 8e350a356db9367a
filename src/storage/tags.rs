//! Snapshot tags: short names aliasing stored handles.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::Handle;
use crate::models::parse::is_valid_tag;
use crate::{Error, Result};

/// Tags file, a JSON object mapping tag to handle.
pub struct TagStore {
    path: PathBuf,
    tags: BTreeMap<String, String>,
}

impl TagStore {
    /// Load `<workdir>/tags.json`, starting empty if it doesn't exist.
    pub fn open(workdir: &Path) -> Result<Self> {
        let path = workdir.join("tags.json");
        let tags = match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self { path, tags })
    }

    /// Handle a tag points at.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.tags.get(tag).map(String::as_str)
    }

    pub fn exists(&self, tag: &str) -> bool {
        self.tags.contains_key(tag)
    }

    /// All tags on a handle, sorted.
    pub fn handle_to_tags(&self, handle: &Handle) -> Vec<String> {
        self.tags
            .iter()
            .filter(|(_, h)| h.as_str() == handle.as_str())
            .map(|(t, _)| t.clone())
            .collect()
    }

    /// Tag names with their handles, sorted by tag.
    pub fn list(&self) -> Vec<(String, String)> {
        self.tags
            .iter()
            .map(|(t, h)| (t.clone(), h.clone()))
            .collect()
    }

    /// Point `tag` at `handle`, overwriting any previous target, and save.
    pub fn add(&mut self, tag: &str, handle: &Handle) -> Result<()> {
        if !is_valid_tag(tag) {
            return Err(Error::InvalidTag(tag.to_string()));
        }
        if handle.is_online() {
            return Err(Error::InvalidHandle(handle.to_string()));
        }
        self.tags.insert(tag.to_string(), handle.to_string());
        self.save()
    }

    /// Remove a tag and save. Returns whether the tag existed.
    pub fn remove(&mut self, tag: &str) -> Result<bool> {
        let existed = self.tags.remove(tag).is_some();
        if existed {
            self.save()?;
        }
        Ok(existed)
    }

    fn save(&self) -> Result<()> {
        let dir = self
            .path
            .parent()
            .ok_or_else(|| Error::Other(format!("Invalid tags path {}", self.path.display())))?;
        fs::create_dir_all(dir)?;
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, &self.tags)?;
        tmp.write_all(b"\n")?;
        tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }
}
