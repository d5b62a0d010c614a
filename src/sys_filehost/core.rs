//! Pure path mapping for stored files. No Hyper types here.

use std::path::PathBuf;

/// Map a request path under the public prefix to a file inside the storage
/// directory, or `None` when the name is empty or tries to escape.
pub fn map_stored_path(base_dir: &std::path::Path, rel: &str) -> Option<PathBuf> {
    let name = sanitize_filename::sanitize(rel.trim_matches('/'));
    if name.is_empty() {
        return None;
    }
    Some(base_dir.join(name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn plain_names_resolve_inside_the_dir() {
        let p = map_stored_path(Path::new("upload"), "abc-1-1.png").unwrap();
        assert_eq!(p, Path::new("upload").join("abc-1-1.png"));
    }

    #[test]
    fn traversal_and_empty_names_are_refused() {
        let p = map_stored_path(Path::new("upload"), "../secret.txt").unwrap();
        assert!(p.starts_with("upload"));
        assert!(!p.to_string_lossy().contains("../"));
        assert!(map_stored_path(Path::new("upload"), "/").is_none());
        assert!(map_stored_path(Path::new("upload"), "").is_none());
    }
}
