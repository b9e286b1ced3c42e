//! Lexical path normalization. Nothing here touches the filesystem.

use std::path::{Component, Path, PathBuf};

/// Lexically clean `path`: drop `.` segments, resolve `..` against the
/// preceding segment, strip trailing separators.
///
/// Empty input yields an empty path. A relative path that cleans down to
/// nothing yields `.`; `..` at the filesystem root stays at the root.
pub fn normalize(path: &Path) -> PathBuf {
    if path.as_os_str().is_empty() {
        return PathBuf::new();
    }

    let mut out: Vec<Component> = Vec::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match out.last() {
                Some(Component::Normal(_)) => {
                    out.pop();
                }
                Some(Component::RootDir) | Some(Component::Prefix(_)) => {}
                _ => out.push(component),
            },
            other => out.push(other),
        }
    }

    if out.is_empty() {
        return PathBuf::from(".");
    }
    out.iter().collect()
}

/// Slash-separated form of `path` relative to `base`.
///
/// Paths outside `base` keep their full normalized form; `base` itself
/// maps to the empty string.
pub fn relative_slash(path: &Path, base: &Path) -> String {
    match path.strip_prefix(base) {
        Ok(rel) => join_slash(rel),
        Err(_) => path.to_string_lossy().replace('\\', "/"),
    }
}

fn join_slash(rel: &Path) -> String {
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// True when `path` lies strictly below `ancestor` (component-wise, so
/// `/a/bc` is not below `/a/b`).
pub fn is_strict_descendant(path: &Path, ancestor: &Path) -> bool {
    path != ancestor && path.starts_with(ancestor)
}
