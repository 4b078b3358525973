use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

pub type FileContext = BTreeMap<String, Value>;

/// One logical file travelling through a pipeline.
///
/// A `FileRecord` is a shared handle: clones refer to the same file, and a
/// stage that renames a record renames it for every stage holding it.
/// Identity is handle identity, see [`FileRecord::same_file`].
#[derive(Clone)]
pub struct FileRecord {
    inner: Arc<RwLock<FileState>>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FileSnapshot {
    pub name: String,
    pub directory: PathBuf,
    pub original_name: String,
    pub original_directory: PathBuf,
    pub context: FileContext,
}

#[derive(Debug)]
struct FileState {
    name: String,
    directory: PathBuf,
    original_name: String,
    original_directory: PathBuf,
    context: FileContext,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, directory: impl Into<PathBuf>) -> Self {
        let name = name.into();
        let directory = directory.into();
        Self {
            inner: Arc::new(RwLock::new(FileState {
                original_name: name.clone(),
                original_directory: directory.clone(),
                name,
                directory,
                context: FileContext::new(),
            })),
        }
    }

    /// Splits `path` into a parent directory and file name. A bare name
    /// lives in `.`.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let directory = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        Self::new(name, directory)
    }

    pub fn same_file(&self, other: &FileRecord) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn name(&self) -> String {
        self.read().name.clone()
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.write().name = name.into();
    }

    pub fn directory(&self) -> PathBuf {
        self.read().directory.clone()
    }

    pub fn set_directory(&self, directory: impl Into<PathBuf>) {
        self.write().directory = directory.into();
    }

    pub fn original_name(&self) -> String {
        self.read().original_name.clone()
    }

    pub fn original_directory(&self) -> PathBuf {
        self.read().original_directory.clone()
    }

    /// Current output path relative to a destination root.
    pub fn relative_path(&self) -> PathBuf {
        let state = self.read();
        state.directory.join(&state.name)
    }

    pub fn context_get(&self, key: &str) -> Option<Value> {
        self.read().context.get(key).cloned()
    }

    pub fn context_insert(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.write().context.insert(key.into(), value)
    }

    pub fn context_remove(&self, key: &str) -> Option<Value> {
        self.write().context.remove(key)
    }

    pub fn snapshot(&self) -> FileSnapshot {
        let state = self.read();
        FileSnapshot {
            name: state.name.clone(),
            directory: state.directory.clone(),
            original_name: state.original_name.clone(),
            original_directory: state.original_directory.clone(),
            context: state.context.clone(),
        }
    }

    // Poisoning is ignored: every write leaves the state consistent.
    fn read(&self) -> RwLockReadGuard<'_, FileState> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FileState> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for FileRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.read();
        f.debug_struct("FileRecord")
            .field("name", &state.name)
            .field("directory", &state.directory)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_path_nested_path_expected_parent_and_name() {
        let file = FileRecord::from_path("fixtures/sub/hello.md");
        assert_eq!(file.name(), "hello.md");
        assert_eq!(file.directory(), PathBuf::from("fixtures/sub"));
        assert_eq!(file.original_name(), "hello.md");
        assert_eq!(file.original_directory(), PathBuf::from("fixtures/sub"));
    }

    #[test]
    fn from_path_bare_name_expected_current_directory() {
        let file = FileRecord::from_path("file");
        assert_eq!(file.directory(), PathBuf::from("."));
        assert_eq!(file.relative_path(), PathBuf::from("./file"));
    }

    #[test]
    fn set_name_on_clone_expected_visible_through_original_and_snapshot_untouched() {
        let file = FileRecord::from_path("a/page.md");
        let alias = file.clone();
        alias.set_name("page.html");
        alias.set_directory("b");

        assert!(file.same_file(&alias));
        assert_eq!(file.name(), "page.html");
        assert_eq!(file.directory(), PathBuf::from("b"));
        assert_eq!(file.original_name(), "page.md");
        assert_eq!(file.original_directory(), PathBuf::from("a"));
    }

    #[test]
    fn same_file_equal_fields_distinct_records_expected_false() {
        let left = FileRecord::from_path("a/page.md");
        let right = FileRecord::from_path("a/page.md");
        assert!(!left.same_file(&right));
        assert_eq!(left.snapshot(), right.snapshot());
    }

    #[test]
    fn context_insert_expected_shared_across_clones() {
        let file = FileRecord::from_path("page.md");
        let alias = file.clone();
        assert_eq!(alias.context_insert("title", json!("Hi")), None);
        assert_eq!(file.context_get("title"), Some(json!("Hi")));
        assert_eq!(file.context_remove("title"), Some(json!("Hi")));
        assert!(alias.snapshot().context.is_empty());
    }
}
