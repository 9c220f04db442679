//! Path classification used while discovering media files.

use std::ffi::OsStr;
use std::path::Path;

/// Extensions accepted when no override list is configured (lowercase, without dot).
pub const DEFAULT_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "webp", "bmp"];

/// Return `true` if `path` has an allowed media extension.
///
/// Matching is case-insensitive and purely name based; file contents are never read.
#[must_use]
pub fn is_supported_media<S: AsRef<str>>(path: &Path, exts: Option<&[S]>) -> bool {
    let Some(ext) = path
        .extension()
        .and_then(OsStr::to_str)
        .map(str::to_ascii_lowercase)
    else {
        return false;
    };
    match exts {
        Some(list) => list.iter().any(|e| e.as_ref() == ext),
        None => DEFAULT_EXTENSIONS.contains(&ext.as_str()),
    }
}

/// Return `true` for dot-prefixed directory names such as `.git` or `.trash`.
#[must_use]
pub fn is_hidden(name: &OsStr) -> bool {
    name.as_encoded_bytes().starts_with(b".")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_match(path: &str) -> bool {
        is_supported_media::<&str>(Path::new(path), None)
    }

    #[test]
    fn accepts_default_extensions_case_insensitively() {
        assert!(default_match("/p/a.jpg"));
        assert!(default_match("/p/b.JPEG"));
        assert!(default_match("/p/c.Png"));
        assert!(default_match("/p/d.gif"));
        assert!(default_match("/p/e.webp"));
    }

    #[test]
    fn rejects_unknown_or_missing_extension() {
        assert!(!default_match("/p/notes.txt"));
        assert!(!default_match("/p/README"));
        assert!(!default_match("/p/.jpg"));
        assert!(!default_match("/p/archive.jpg.zip"));
    }

    #[test]
    fn override_list_replaces_defaults() {
        let exts = vec!["heic".to_string()];
        assert!(is_supported_media(Path::new("x.HEIC"), Some(&exts)));
        assert!(!is_supported_media(Path::new("x.jpg"), Some(&exts)));
    }

    #[test]
    fn dot_prefixed_names_are_hidden() {
        assert!(is_hidden(OsStr::new(".trash")));
        assert!(is_hidden(OsStr::new(".")));
        assert!(!is_hidden(OsStr::new("holiday")));
        assert!(!is_hidden(OsStr::new("a.b")));
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_dot_prefixed_names_are_hidden() {
        use std::os::unix::ffi::OsStrExt;

        assert!(is_hidden(OsStr::from_bytes(b".cache\xff")));
        assert!(!is_hidden(OsStr::from_bytes(b"\xffcache")));
    }
}
