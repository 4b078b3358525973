use std::ffi::OsString;
use std::path::{Component, Path, PathBuf, is_separator};

const GLOB_META: [char; 3] = ['*', '?', '['];

pub fn has_glob_meta(pattern: &str) -> bool {
    pattern.contains(GLOB_META)
}

/// Lexically normalizes a path: drops `.` segments, folds `..` into the
/// preceding segment where one exists, and yields `.` for an empty result.
pub fn clean_path(path: impl AsRef<Path>) -> PathBuf {
    let mut cleaned = PathBuf::new();
    let mut poppable = 0usize;
    for component in path.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if poppable > 0 {
                    cleaned.pop();
                    poppable -= 1;
                } else if !cleaned.has_root() {
                    cleaned.push("..");
                }
            }
            Component::Normal(part) => {
                cleaned.push(part);
                poppable += 1;
            }
            Component::RootDir | Component::Prefix(_) => cleaned.push(component.as_os_str()),
        }
    }
    if cleaned.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        cleaned
    }
}

/// Directory holding the literal (glob-free) prefix of `pattern`.
pub fn literal_base(pattern: &str) -> PathBuf {
    let literal = match pattern.find(GLOB_META) {
        Some(index) => &pattern[..index],
        None => pattern,
    };
    match literal.rfind(is_separator) {
        Some(0) => PathBuf::from(&literal[..1]),
        Some(index) => clean_path(&literal[..index]),
        None => PathBuf::from("."),
    }
}

/// Deepest directory shared by every base.
pub fn common_base<I>(bases: I) -> PathBuf
where
    I: IntoIterator<Item = PathBuf>,
{
    let mut common: Option<Vec<OsString>> = None;
    for base in bases {
        let segments: Vec<OsString> = base
            .components()
            .filter(|component| !matches!(component, Component::CurDir))
            .map(|component| component.as_os_str().to_os_string())
            .collect();
        common = Some(match common.take() {
            None => segments,
            Some(previous) => previous
                .into_iter()
                .zip(segments)
                .take_while(|(left, right)| left == right)
                .map(|(left, _)| left)
                .collect(),
        });
    }

    let base: PathBuf = common.unwrap_or_default().into_iter().collect();
    if base.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        base
    }
}

/// `directory` expressed relative to `base`, `.` when they coincide.
/// Directories outside `base` are returned unchanged.
pub fn relative_directory(directory: &Path, base: &Path) -> PathBuf {
    let directory = clean_path(directory);
    if base == Path::new(".") {
        return directory;
    }
    match directory.strip_prefix(base) {
        Ok(relative) if relative.as_os_str().is_empty() => PathBuf::from("."),
        Ok(relative) => relative.to_path_buf(),
        Err(_) => directory,
    }
}
