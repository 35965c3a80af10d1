use std::collections::HashSet;

use super::lister::RemoteObjectSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiffResult {
    /// Local names absent remotely, in local order.
    pub missing: Vec<String>,
    /// Remote names absent locally, in listing order. Empty unless deletions
    /// were requested.
    pub deleted: Vec<String>,
    /// Names present on both sides.
    pub found: usize,
}

pub fn diff<S: AsRef<str>>(
    local: &[S],
    remote: &RemoteObjectSet,
    want_deletions: bool,
) -> DiffResult {
    let mut seen: HashSet<&str> = HashSet::with_capacity(local.len());
    let mut result = DiffResult::default();

    for name in local {
        let name: &str = name.as_ref();
        if !seen.insert(name) {
            continue;
        }
        if remote.contains(name) {
            result.found += 1;
        } else {
            result.missing.push(name.to_string());
        }
    }

    if want_deletions {
        result.deleted = remote
            .iter()
            .filter(|name| !seen.contains(name))
            .map(str::to_string)
            .collect();
    }

    result
}
