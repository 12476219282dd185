use std::path::{Component, Path};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generates a collision-resistant filename stem.
///
/// The unix-millis prefix keeps directory listings roughly
/// chronological, the random suffix keeps two uploads landing in the
/// same millisecond apart. The stem is never used as a correctness
/// key, only to avoid clobbering files.
pub fn generate_name_stem() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis();

    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(8)
        .map(char::from)
        .collect();

    format!("{}_{}", millis, suffix)
}

/// Whether a client-supplied name can safely be joined onto a storage
/// tree.
///
/// Stored names are a single path component this service generated
/// itself, so anything with separators, parent references or a leading
/// dot never refers to a stored file and must not reach the
/// filesystem.
pub fn is_safe_file_name(name: &str) -> bool {
    if name.starts_with('.') {
        return false;
    }

    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// The stored name of the compressed copy derived from the original's
/// stored name.
///
/// The compressed copy is always a JPEG regardless of the input codec.
pub fn compressed_file_name(file_name: &str) -> String {
    Path::new(file_name)
        .with_extension("jpg")
        .to_string_lossy()
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_stems_do_not_collide() {
        let mut names: Vec<String> = (0..512).map(|_| generate_name_stem()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), 512);
    }

    #[test]
    fn test_safe_file_names() {
        assert!(is_safe_file_name("1693200000000_a1b2c3d4.png"));
        assert!(is_safe_file_name("photo.jpg"));

        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name("."));
        assert!(!is_safe_file_name(".."));
        assert!(!is_safe_file_name("../../../etc/passwd"));
        assert!(!is_safe_file_name("/etc/passwd"));
        assert!(!is_safe_file_name("nested/name.png"));
        assert!(!is_safe_file_name("..\u{2f}secret.txt"));
        assert!(!is_safe_file_name(".hidden"));
    }

    #[test]
    fn test_compressed_name_swaps_extension() {
        assert_eq!(
            compressed_file_name("1693200000000_a1b2c3d4.png"),
            "1693200000000_a1b2c3d4.jpg",
        );
        assert_eq!(
            compressed_file_name("1693200000000_a1b2c3d4.jpg"),
            "1693200000000_a1b2c3d4.jpg",
        );
    }
}
