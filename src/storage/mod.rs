//! Storage layer for snapshots and tags.
//!
//! Snapshots live under `<workdir>/snapshots/<YYYY>/<MM>/<handle>.gz`, one
//! gzip-compressed JSON document per capture. Files are written to a temp
//! file next to their final location and renamed into place once complete,
//! so an interrupted write never leaves a truncated snapshot behind.
//!
//! Tags are kept in `<workdir>/tags.json` (see [`tags`]).

pub mod tags;

pub use tags::TagStore;

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

use crate::models::{Handle, Snapshot};
use crate::{Error, Result};

/// Snapshot file extension.
const EXTENSION: &str = "gz";

/// On-disk snapshot database.
pub struct SnapshotStore {
    root: PathBuf,
}

impl SnapshotStore {
    /// Open the store under `workdir`, creating the directory if needed.
    pub fn open(workdir: &Path) -> Result<Self> {
        let root = workdir.join("snapshots");
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path of a stored handle.
    fn path_of(&self, handle: &str) -> PathBuf {
        // Handle format guarantees "YYYY-MM-..."
        let year = handle.get(0..4).unwrap_or("0000");
        let month = handle.get(5..7).unwrap_or("00");
        self.root
            .join(year)
            .join(month)
            .join(format!("{}.{}", handle, EXTENSION))
    }

    fn stored<'a>(&self, handle: &'a Handle) -> Result<&'a str> {
        match handle {
            Handle::Stored(s) => Ok(s),
            Handle::Online => Err(Error::InvalidHandle(handle.to_string())),
        }
    }

    /// All stored handles, oldest first.
    pub fn list(&self) -> Result<Vec<Handle>> {
        let mut handles = Vec::new();
        for year in read_dirs(&self.root)? {
            for month in read_dirs(&year)? {
                for entry in fs::read_dir(&month)? {
                    let path = entry?.path();
                    if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                        continue;
                    }
                    let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                        continue;
                    };
                    match Handle::parse(stem) {
                        Ok(handle @ Handle::Stored(_)) => handles.push(handle),
                        _ => tracing::debug!("Ignoring stray file {}", path.display()),
                    }
                }
            }
        }
        handles.sort();
        Ok(handles)
    }

    pub fn exists(&self, handle: &Handle) -> bool {
        match handle {
            Handle::Stored(s) => self.path_of(s).is_file(),
            Handle::Online => false,
        }
    }

    /// The `n`th most recent handle, 1 being the latest.
    pub fn nth_latest(&self, n: usize) -> Result<Option<Handle>> {
        if n == 0 {
            return Ok(None);
        }
        let handles = self.list()?;
        Ok(handles.len().checked_sub(n).map(|i| handles[i].clone()))
    }

    /// Read and decode a stored snapshot.
    pub fn read(&self, handle: &Handle) -> Result<Snapshot> {
        let name = self.stored(handle)?;
        let path = self.path_of(name);
        tracing::debug!("Reading snapshot `{}`", name);
        let file = File::open(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::SnapshotNotFound(name.to_string()),
            _ => Error::Io(e),
        })?;
        let snapshot = serde_json::from_reader(BufReader::new(GzDecoder::new(file)))?;
        Ok(snapshot)
    }

    /// Persist a snapshot under the handle derived from its capture time.
    pub fn write(&self, snapshot: &Snapshot) -> Result<Handle> {
        let handle = snapshot.handle();
        let name = self.stored(&handle)?;
        let path = self.path_of(name);
        let dir = path
            .parent()
            .ok_or_else(|| Error::Other(format!("Invalid snapshot path {}", path.display())))?;
        fs::create_dir_all(dir)?;

        tracing::debug!("Writing snapshot `{}`", name);
        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut encoder =
                GzEncoder::new(BufWriter::new(tmp.as_file_mut()), Compression::default());
            serde_json::to_writer(&mut encoder, snapshot)?;
            let mut inner = encoder.finish()?;
            inner.flush()?;
        }
        tmp.persist(&path).map_err(|e| Error::Io(e.error))?;
        Ok(handle)
    }

    /// Remove a stored snapshot. There is no undo.
    pub fn delete(&self, handle: &Handle) -> Result<()> {
        let name = self.stored(handle)?;
        let path = self.path_of(name);
        tracing::debug!("Purging `{}` from snapshot database", path.display());
        fs::remove_file(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => Error::SnapshotNotFound(name.to_string()),
            _ => Error::Io(e),
        })
    }
}

fn read_dirs(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let mut dirs = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            dirs.push(path);
        }
    }
    Ok(dirs)
}

/// Resolve a snapshot reference.
///
/// - `"0"`: the live board ([`Handle::Online`])
/// - `N`: the Nth most recent stored snapshot, 1 being the latest
/// - a stored handle
/// - a tag name
pub fn resolve_reference(
    store: &SnapshotStore,
    tags: &TagStore,
    reference: &str,
) -> Result<Handle> {
    let invalid = || Error::InvalidReference(reference.to_string());

    if reference == "0" {
        return Ok(Handle::Online);
    }
    if !reference.is_empty() && reference.chars().all(|c| c.is_ascii_digit()) {
        let n: usize = reference.parse().map_err(|_| invalid())?;
        return store.nth_latest(n)?.ok_or_else(invalid);
    }
    if let Ok(handle @ Handle::Stored(_)) = Handle::parse(reference) {
        if store.exists(&handle) {
            return Ok(handle);
        }
    }
    if let Some(handle) = tags.get(reference) {
        return Handle::parse(handle);
    }
    Err(invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{TestEnv, board, card};

    fn store_with(env: &TestEnv, minutes: &[u32]) -> SnapshotStore {
        let store = SnapshotStore::open(env.path()).unwrap();
        for m in minutes {
            store.write(&board(*m)).unwrap();
        }
        store
    }

    #[test]
    fn test_write_and_read_roundtrip() {
        let env = TestEnv::new();
        let store = SnapshotStore::open(env.path()).unwrap();
        let mut snapshot = board(3);
        snapshot.add_card(card("c1", "Shiny", "l-91", Some("bug 1")));

        let handle = store.write(&snapshot).unwrap();
        assert_eq!(handle.as_str(), "2021-08-02Z09-03-00");
        assert!(
            env.path()
                .join("snapshots/2021/08/2021-08-02Z09-03-00.gz")
                .is_file()
        );
        assert_eq!(store.read(&handle).unwrap(), snapshot);
    }

    #[test]
    fn test_list_is_ascending_and_ignores_strays() {
        let env = TestEnv::new();
        let store = store_with(&env, &[7, 1, 4]);
        fs::write(store.root().join("2021/08/notes.txt"), "x").unwrap();
        fs::write(store.root().join("2021/08/garbage.gz"), "x").unwrap();

        let handles: Vec<String> = store.list().unwrap().iter().map(|h| h.to_string()).collect();
        assert_eq!(
            handles,
            vec![
                "2021-08-02Z09-01-00",
                "2021-08-02Z09-04-00",
                "2021-08-02Z09-07-00"
            ]
        );
    }

    #[test]
    fn test_nth_latest() {
        let env = TestEnv::new();
        let store = store_with(&env, &[1, 2, 3]);
        assert_eq!(
            store.nth_latest(1).unwrap().unwrap().as_str(),
            "2021-08-02Z09-03-00"
        );
        assert_eq!(
            store.nth_latest(3).unwrap().unwrap().as_str(),
            "2021-08-02Z09-01-00"
        );
        assert_eq!(store.nth_latest(4).unwrap(), None);
        assert_eq!(store.nth_latest(0).unwrap(), None);
    }

    #[test]
    fn test_read_missing_snapshot() {
        let env = TestEnv::new();
        let store = SnapshotStore::open(env.path()).unwrap();
        let handle = Handle::parse("2020-01-01Z00-00-00").unwrap();
        assert!(matches!(store.read(&handle), Err(Error::SnapshotNotFound(_))));
        assert!(store.read(&Handle::Online).is_err());
    }

    #[test]
    fn test_delete() {
        let env = TestEnv::new();
        let store = store_with(&env, &[1]);
        let handle = store.nth_latest(1).unwrap().unwrap();
        store.delete(&handle).unwrap();
        assert!(!store.exists(&handle));
        assert!(matches!(store.delete(&handle), Err(Error::SnapshotNotFound(_))));
    }

    #[test]
    fn test_resolve_reference_grammar() {
        let env = TestEnv::new();
        let store = store_with(&env, &[1, 2]);
        let mut tags = TagStore::open(env.path()).unwrap();
        tags.add("triaged", &Handle::parse("2021-08-02Z09-01-00").unwrap())
            .unwrap();

        assert_eq!(resolve_reference(&store, &tags, "0").unwrap(), Handle::Online);
        assert_eq!(
            resolve_reference(&store, &tags, "1").unwrap().as_str(),
            "2021-08-02Z09-02-00"
        );
        assert_eq!(
            resolve_reference(&store, &tags, "2021-08-02Z09-02-00")
                .unwrap()
                .as_str(),
            "2021-08-02Z09-02-00"
        );
        assert_eq!(
            resolve_reference(&store, &tags, "triaged").unwrap().as_str(),
            "2021-08-02Z09-01-00"
        );
    }

    #[test]
    fn test_resolve_reference_invalid() {
        let env = TestEnv::new();
        let store = store_with(&env, &[1]);
        let tags = TagStore::open(env.path()).unwrap();
        for reference in ["5", "nope", "2021-08-02Z09-09-09", ""] {
            assert!(matches!(
                resolve_reference(&store, &tags, reference),
                Err(Error::InvalidReference(_))
            ));
        }
    }
}
