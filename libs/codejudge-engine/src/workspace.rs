/// Workspace Manager - Ephemeral Job Files
///
/// **Core Responsibility:**
/// Give every job its own source, input and artifact paths plus a private
/// scratch directory, and make sure all of them are gone once the job is over.
///
/// **Rules:**
/// - Every file name is derived from a fresh random identifier, never a counter
/// - A name that already exists on disk is never reused (create-new semantics)
/// - Each materialized file is owned by a `FileHandle`; dropping the handle
///   removes the file, so cleanup runs on success, classified failure, error,
///   panic and future cancellation alike
/// - Child processes run inside the job's `ScratchDir`, which is removed
///   recursively with everything the program wrote there
///
/// Layout under the base directory:
/// `codes/<id>.<ext>`, `inputs/<id>.txt`, `outputs/<id>.out`, `jobs/<id>/`

use crate::error::{EngineError, Result};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

const CODES_DIR: &str = "codes";
const INPUTS_DIR: &str = "inputs";
const OUTPUTS_DIR: &str = "outputs";
const JOBS_DIR: &str = "jobs";

/// Attempts at drawing an unused identifier before giving up
const MAX_ID_ATTEMPTS: usize = 4;

/// Filesystem operations the workspace needs
pub trait WorkspaceFs: fmt::Debug + Send + Sync {
    fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// Create `path` with `contents`; fails with `AlreadyExists` if it is present
    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()>;

    fn remove(&self, path: &Path) -> io::Result<()>;

    /// Create a single directory; fails with `AlreadyExists` if it is present
    fn create_dir(&self, path: &Path) -> io::Result<()>;

    fn remove_dir_all(&self, path: &Path) -> io::Result<()>;
}

/// Source of job identifiers
pub trait IdGenerator: fmt::Debug + Send + Sync {
    fn next_id(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

/// Real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct DiskFs;

impl WorkspaceFs for DiskFs {
    fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir_all(path)
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)?;
        file.write_all(contents)
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_file(path)
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        std::fs::create_dir(path)
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        std::fs::remove_dir_all(path)
    }
}

/// In-memory filesystem for exercising the workspace without touching disk
#[derive(Debug, Default)]
pub struct MemoryFs {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
    dirs: Mutex<HashSet<PathBuf>>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.lock().map(|f| f.contains_key(path)).unwrap_or(false)
    }

    pub fn read(&self, path: &Path) -> Option<Vec<u8>> {
        self.files.lock().ok().and_then(|f| f.get(path).cloned())
    }

    pub fn file_count(&self) -> usize {
        self.files.lock().map(|f| f.len()).unwrap_or(0)
    }

    /// Directories created through `create_dir`
    pub fn dir_count(&self) -> usize {
        self.dirs.lock().map(|d| d.len()).unwrap_or(0)
    }

    /// Simulate a file produced by an external tool (e.g. a compiler)
    pub fn insert(&self, path: &Path, contents: &[u8]) {
        if let Ok(mut files) = self.files.lock() {
            files.insert(path.to_path_buf(), contents.to_vec());
        }
    }
}

fn poisoned() -> io::Error {
    io::Error::new(io::ErrorKind::Other, "memory fs lock poisoned")
}

impl WorkspaceFs for MemoryFs {
    fn create_dir_all(&self, _path: &Path) -> io::Result<()> {
        Ok(())
    }

    fn create_new(&self, path: &Path, contents: &[u8]) -> io::Result<()> {
        let mut files = self.files.lock().map_err(|_| poisoned())?;
        if files.contains_key(path) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "file exists"));
        }
        files.insert(path.to_path_buf(), contents.to_vec());
        Ok(())
    }

    fn remove(&self, path: &Path) -> io::Result<()> {
        let mut files = self.files.lock().map_err(|_| poisoned())?;
        match files.remove(path) {
            Some(_) => Ok(()),
            None => Err(io::Error::new(io::ErrorKind::NotFound, "no such file")),
        }
    }

    fn create_dir(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.lock().map_err(|_| poisoned())?;
        if !dirs.insert(path.to_path_buf()) {
            return Err(io::Error::new(io::ErrorKind::AlreadyExists, "directory exists"));
        }
        Ok(())
    }

    fn remove_dir_all(&self, path: &Path) -> io::Result<()> {
        let mut dirs = self.dirs.lock().map_err(|_| poisoned())?;
        if !dirs.remove(path) {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such directory"));
        }
        dirs.retain(|d| !d.starts_with(path));
        drop(dirs);

        let mut files = self.files.lock().map_err(|_| poisoned())?;
        files.retain(|f, _| !f.starts_with(path));
        Ok(())
    }
}

/// Owned ephemeral file. Removed on `release` or on drop, whichever comes first.
pub struct FileHandle {
    id: String,
    path: PathBuf,
    fs: Arc<dyn WorkspaceFs>,
    released: bool,
}

impl FileHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now. A file that was never created is not an error.
    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_quietly(self.fs.as_ref(), &self.path)
    }
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("id", &self.id)
            .field("path", &self.path)
            .finish()
    }
}

impl Drop for FileHandle {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_quietly(self.fs.as_ref(), &self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove job file");
        }
    }
}

fn remove_quietly(fs: &dyn WorkspaceFs, path: &Path) -> io::Result<()> {
    match fs.remove(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed job file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Release several handles, reporting the first failure after attempting all of them
pub fn release_all<I>(handles: I) -> io::Result<()>
where
    I: IntoIterator<Item = FileHandle>,
{
    let mut first_error = None;
    for handle in handles {
        if let Err(e) = handle.release() {
            first_error.get_or_insert(e);
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Private working directory of one job. Removed recursively on `release` or drop.
pub struct ScratchDir {
    path: PathBuf,
    fs: Arc<dyn WorkspaceFs>,
    released: bool,
}

impl ScratchDir {
    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn release(mut self) -> io::Result<()> {
        self.released = true;
        remove_dir_quietly(self.fs.as_ref(), &self.path)
    }
}

impl fmt::Debug for ScratchDir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScratchDir").field("path", &self.path).finish()
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = remove_dir_quietly(self.fs.as_ref(), &self.path) {
            warn!(path = %self.path.display(), error = %e, "Failed to remove job directory");
        }
    }
}

fn remove_dir_quietly(fs: &dyn WorkspaceFs, path: &Path) -> io::Result<()> {
    match fs.remove_dir_all(path) {
        Ok(()) => {
            debug!(path = %path.display(), "Removed job directory");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[derive(Debug, Clone)]
pub struct WorkspaceManager {
    base: PathBuf,
    fs: Arc<dyn WorkspaceFs>,
    ids: Arc<dyn IdGenerator>,
}

impl WorkspaceManager {
    /// Disk-backed manager with random UUID identifiers
    pub fn new(base: impl Into<PathBuf>) -> Self {
        Self::with_parts(base, Arc::new(DiskFs), Arc::new(UuidGenerator))
    }

    pub fn with_parts(
        base: impl Into<PathBuf>,
        fs: Arc<dyn WorkspaceFs>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        Self {
            base: base.into(),
            fs,
            ids,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base
    }

    /// Create the directory layout. Idempotent.
    pub fn init(&self) -> Result<()> {
        for dir in [CODES_DIR, INPUTS_DIR, OUTPUTS_DIR, JOBS_DIR] {
            let path = self.base.join(dir);
            self.fs.create_dir_all(&path).map_err(|e| {
                EngineError::Infrastructure(format!(
                    "failed to create workspace dir {}: {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(())
    }

    /// Write source code to `codes/<id>.<extension>`
    pub fn materialize_source(&self, source: &str, extension: &str) -> Result<FileHandle> {
        self.materialize(CODES_DIR, extension, source.as_bytes())
    }

    /// Write stdin contents to `inputs/<id>.txt`
    pub fn materialize_input(&self, stdin: &str) -> Result<FileHandle> {
        self.materialize(INPUTS_DIR, "txt", stdin.as_bytes())
    }

    /// Reserve `outputs/<source id>.out` for a compiled artifact.
    /// Nothing is written; the handle only guarantees removal.
    pub fn reserve_artifact(&self, source: &FileHandle) -> FileHandle {
        FileHandle {
            id: source.id.clone(),
            path: self.base.join(OUTPUTS_DIR).join(format!("{}.out", source.id)),
            fs: self.fs.clone(),
            released: false,
        }
    }

    /// Create `jobs/<source id>/` as the working directory for the job's processes
    pub fn create_scratch(&self, source: &FileHandle) -> Result<ScratchDir> {
        let path = self.base.join(JOBS_DIR).join(&source.id);
        self.fs.create_dir(&path).map_err(|e| {
            EngineError::Infrastructure(format!(
                "failed to create job directory {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(job_dir = %path.display(), "Created job directory");

        Ok(ScratchDir {
            path,
            fs: self.fs.clone(),
            released: false,
        })
    }

    fn materialize(&self, dir: &str, extension: &str, contents: &[u8]) -> Result<FileHandle> {
        let mut last_error = None;

        for _ in 0..MAX_ID_ATTEMPTS {
            let id = self.ids.next_id();
            let path = self.base.join(dir).join(format!("{}.{}", id, extension));

            match self.fs.create_new(&path, contents) {
                Ok(()) => {
                    debug!(job_file = %path.display(), "Materialized job file");
                    return Ok(FileHandle {
                        id,
                        path,
                        fs: self.fs.clone(),
                        released: false,
                    });
                }
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    warn!(id = %id, "Generated job id already in use, drawing another");
                    last_error = Some(e);
                }
                Err(e) => {
                    // A partially written file must not outlive the failed attempt
                    let _ = remove_quietly(self.fs.as_ref(), &path);
                    return Err(EngineError::Infrastructure(format!(
                        "failed to write {}: {}",
                        path.display(),
                        e
                    )));
                }
            }
        }

        Err(EngineError::Infrastructure(format!(
            "could not allocate a unique job file: {}",
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string())
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashSet, VecDeque};

    /// Hands out a scripted sequence of ids
    #[derive(Debug)]
    struct ScriptedIds(Mutex<VecDeque<String>>);

    impl ScriptedIds {
        fn new(ids: &[&str]) -> Self {
            Self(Mutex::new(ids.iter().map(|s| s.to_string()).collect()))
        }
    }

    impl IdGenerator for ScriptedIds {
        fn next_id(&self) -> String {
            self.0
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| "exhausted".to_string())
        }
    }

    fn memory_manager(ids: Arc<dyn IdGenerator>) -> (WorkspaceManager, Arc<MemoryFs>) {
        let fs = Arc::new(MemoryFs::new());
        let manager = WorkspaceManager::with_parts("/jobs", fs.clone(), ids);
        (manager, fs)
    }

    #[test]
    fn test_materialize_writes_under_layout() {
        let (manager, fs) = memory_manager(Arc::new(ScriptedIds::new(&["abc", "def"])));

        let source = manager.materialize_source("int main(){}", "cpp").unwrap();
        let input = manager.materialize_input("42").unwrap();

        assert_eq!(source.path(), Path::new("/jobs/codes/abc.cpp"));
        assert_eq!(input.path(), Path::new("/jobs/inputs/def.txt"));
        assert_eq!(fs.read(input.path()).unwrap(), b"42");
        assert_eq!(fs.file_count(), 2);
    }

    #[test]
    fn test_drop_removes_files() {
        let (manager, fs) = memory_manager(Arc::new(UuidGenerator));

        {
            let _source = manager.materialize_source("print(1)", "py").unwrap();
            let _input = manager.materialize_input("").unwrap();
            assert_eq!(fs.file_count(), 2);
        }

        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn test_release_on_error_path() {
        let (manager, fs) = memory_manager(Arc::new(UuidGenerator));

        fn failing_stage(_input: &FileHandle) -> std::result::Result<(), &'static str> {
            Err("stage blew up")
        }

        let outcome = (|| {
            let input = manager.materialize_input("data").unwrap();
            failing_stage(&input)?;
            Ok::<_, &'static str>(())
        })();

        assert!(outcome.is_err());
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn test_release_on_panic() {
        let fs = Arc::new(MemoryFs::new());
        let manager = WorkspaceManager::with_parts("/jobs", fs.clone(), Arc::new(UuidGenerator));

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _source = manager.materialize_source("x", "sh").unwrap();
            panic!("classifier exploded");
        }));

        assert!(result.is_err());
        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn test_artifact_shares_source_id_and_is_removed() {
        let (manager, fs) = memory_manager(Arc::new(ScriptedIds::new(&["job1"])));

        let source = manager.materialize_source("int main(){}", "c").unwrap();
        let artifact = manager.reserve_artifact(&source);
        assert_eq!(artifact.path(), Path::new("/jobs/outputs/job1.out"));

        // compiler output appears later
        fs.insert(artifact.path(), b"\x7fELF");
        release_all([source, artifact]).unwrap();

        assert_eq!(fs.file_count(), 0);
    }

    #[test]
    fn test_release_of_never_created_artifact_is_ok() {
        let (manager, _fs) = memory_manager(Arc::new(UuidGenerator));
        let source = manager.materialize_source("x", "c").unwrap();
        let artifact = manager.reserve_artifact(&source);
        assert!(artifact.release().is_ok());
    }

    #[test]
    fn test_colliding_id_is_skipped() {
        let (manager, fs) = memory_manager(Arc::new(ScriptedIds::new(&["same", "same", "other"])));

        let first = manager.materialize_input("a").unwrap();
        let second = manager.materialize_input("b").unwrap();

        assert_eq!(first.id(), "same");
        assert_eq!(second.id(), "other");
        assert_eq!(fs.read(first.path()).unwrap(), b"a");
        assert_eq!(fs.read(second.path()).unwrap(), b"b");
    }

    #[test]
    fn test_exhausted_ids_is_infrastructure_error() {
        let ids = Arc::new(ScriptedIds::new(&["dup", "dup", "dup", "dup"]));
        let (manager, fs) = memory_manager(ids);
        fs.insert(Path::new("/jobs/inputs/dup.txt"), b"taken");

        let err = manager.materialize_input("b").unwrap_err();
        assert!(matches!(err, EngineError::Infrastructure(_)));
    }

    #[test]
    fn test_scratch_dir_removed_with_contents() {
        let (manager, fs) = memory_manager(Arc::new(ScriptedIds::new(&["job7"])));
        let source = manager.materialize_source("x", "sh").unwrap();

        let scratch = manager.create_scratch(&source).unwrap();
        assert_eq!(scratch.path(), Path::new("/jobs/jobs/job7"));

        // the program leaves a file behind
        fs.insert(&scratch.path().join("scratch.txt"), b"secret");
        drop(scratch);

        assert_eq!(fs.dir_count(), 0);
        assert_eq!(fs.file_count(), 1);
        assert!(!fs.contains(Path::new("/jobs/jobs/job7/scratch.txt")));
    }

    #[test]
    fn test_existing_scratch_dir_is_not_reused() {
        let (manager, _fs) = memory_manager(Arc::new(ScriptedIds::new(&["a"])));
        let source = manager.materialize_source("x", "sh").unwrap();

        let _first = manager.create_scratch(&source).unwrap();
        let err = manager.create_scratch(&source).unwrap_err();
        assert!(matches!(err, EngineError::Infrastructure(_)));
    }

    #[test]
    fn test_uuid_ids_are_unique() {
        let ids = UuidGenerator;
        let generated: HashSet<String> = (0..1000).map(|_| ids.next_id()).collect();
        assert_eq!(generated.len(), 1000);
    }

    #[test]
    fn test_disk_workspace_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let manager = WorkspaceManager::new(dir.path());
        manager.init().unwrap();

        let source = manager.materialize_source("echo hi", "sh").unwrap();
        let path = source.path().to_path_buf();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "echo hi");

        let scratch = manager.create_scratch(&source).unwrap();
        let scratch_path = scratch.path().to_path_buf();
        std::fs::create_dir(scratch_path.join("nested")).unwrap();
        std::fs::write(scratch_path.join("nested/out.txt"), "x").unwrap();

        drop(source);
        scratch.release().unwrap();
        assert!(!path.exists());
        assert!(!scratch_path.exists());
    }
}
