//! Pure string helpers for file names, thumb paths and `||`-delimited lists.

use serde_json::{Map, Value};

/// Delimiter used when a file list is flattened to a single string at the
/// form-value boundary.
pub const LIST_DELIMITER: &str = "||";

/// Extension of a file name or path: everything after the last `.`,
/// or `""` when there is none.
pub fn file_ext(file: &str) -> &str {
    match file.rfind('.') {
        Some(pos) => &file[pos + 1..],
        None => "",
    }
}

/// Bare file name of a path, with any `/` or `\` directory prefix stripped.
pub fn base_name(file: &str) -> &str {
    match file.rfind(['/', '\\']) {
        Some(pos) => &file[pos + 1..],
        None => file,
    }
}

/// Thumbnail path for a stored file: the final extension dot becomes
/// `!<size>.`, where `<size>` is `<w>x<h>` or the literal tag `thumb`.
/// An empty input yields an empty output.
pub fn thumb_path(file: &str, size: Option<(u32, u32)>) -> String {
    if file.is_empty() {
        return String::new();
    }
    let tag = match size {
        Some((w, h)) => format!("{w}x{h}"),
        None => "thumb".to_string(),
    };
    match file.rfind('.') {
        Some(pos) => format!("{}!{}.{}", &file[..pos], tag, &file[pos + 1..]),
        None => file.to_string(),
    }
}

/// Append a file to a `||`-delimited list. Duplicates are allowed.
pub fn list_append(list: &str, file: &str) -> String {
    if list.is_empty() {
        file.to_string()
    } else {
        format!("{list}{LIST_DELIMITER}{file}")
    }
}

/// Remove the first exact occurrence of `file` from a `||`-delimited list.
/// Later duplicates are left in place.
pub fn list_remove(list: &str, file: &str) -> String {
    let mut entries: Vec<&str> = list.split(LIST_DELIMITER).collect();
    if let Some(pos) = entries.iter().position(|e| *e == file) {
        entries.remove(pos);
    }
    entries.join(LIST_DELIMITER)
}

/// Split a `||`-delimited form value into its entries, skipping empties.
pub fn list_entries(list: &str) -> Vec<String> {
    list.split(LIST_DELIMITER)
        .filter(|e| !e.is_empty())
        .map(str::to_string)
        .collect()
}

/// Shallow merge of JSON objects: later maps win on exact key matches,
/// nested objects are replaced wholesale rather than merged.
pub fn merge(maps: &[&Map<String, Value>]) -> Map<String, Value> {
    let mut out = Map::new();
    for m in maps {
        for (k, v) in m.iter() {
            out.insert(k.clone(), v.clone());
        }
    }
    out
}
