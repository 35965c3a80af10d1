use std::path::{Component, Path, PathBuf};

/// Relative name of `path` under `root`, with `/` between components and no
/// leading separator. `None` when a component is not valid UTF-8 and so
/// cannot become part of an object key.
///
/// # Panics
///
/// Panics if `path` is not under `root`; callers only pass paths produced by
/// scanning `root`.
pub fn relative_name(root: &Path, path: &Path) -> Option<String> {
    let root = without_cur_dir(root);
    let path = without_cur_dir(path);
    let relative = path.strip_prefix(&root).unwrap_or_else(|_| {
        panic!(
            "{} is not under local root {}",
            path.display(),
            root.display()
        )
    });

    let mut name = String::new();
    for component in relative.components() {
        match component {
            Component::Normal(part) => {
                if !name.is_empty() {
                    name.push('/');
                }
                name.push_str(part.to_str()?);
            }
            Component::RootDir | Component::CurDir | Component::Prefix(_) => continue,
            Component::ParentDir => {
                panic!("{} escapes local root {}", path.display(), root.display())
            }
        }
    }
    Some(name)
}

fn without_cur_dir(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

/// Normalizes a destination path into the prefix prepended to every relative
/// name: empty for the bucket root, otherwise ending in exactly one `/`.
/// Whitespace is significant in keys and is kept as given.
pub fn key_prefix(destination: &str) -> String {
    let mut trimmed = destination;
    loop {
        if let Some(rest) = trimmed.strip_prefix("./") {
            trimmed = rest;
        } else if let Some(rest) = trimmed.strip_prefix('/') {
            trimmed = rest;
        } else {
            break;
        }
    }
    let trimmed = trimmed.trim_end_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        return String::new();
    }
    format!("{trimmed}/")
}

pub fn remote_key(prefix: &str, name: &str) -> String {
    format!("{prefix}{name}")
}

/// Inverse of [`remote_key`]. `None` for keys outside the prefix.
pub fn strip_key_prefix<'a>(prefix: &str, key: &'a str) -> Option<&'a str> {
    key.strip_prefix(prefix)
}
