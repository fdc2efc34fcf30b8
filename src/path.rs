//! Remote path normalization.
//!
//! HPSS paths are plain `/`-separated strings; nothing here touches the
//! local filesystem.

/// Removes `.`, `..`, and empty segments from a path.
///
/// `..` pops the previous retained segment but never climbs past the
/// root: `clean("..")` is `"/"`. The result always carries a single
/// leading `/`, and `clean` is idempotent.
pub fn clean(path: &str) -> String {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }
    format!("/{}", segments.join("/"))
}

/// Resolves a logical path under the configured remote subtree.
///
/// This is the form handed to remote commands.
pub fn resolve(base_dir: &str, path: &str) -> String {
    format!("{}{}", base_dir, clean(path))
}

/// Full display form: remote root + subtree + cleaned path.
pub fn absolute(root: &str, base_dir: &str, path: &str) -> String {
    format!("{}/{}{}", root, base_dir, clean(path))
}

#[cfg(test)]
#[path = "../tests/unit/path.rs"]
mod tests;
