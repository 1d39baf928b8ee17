//! File names for delivered recordings.

use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;

use crate::models::artifact::MediaFormat;

/// `YYYY-MM-DD_HH-MM-SS.<ext>`, zero padded, extension from `format`.
pub fn timestamped(at: NaiveDateTime, format: MediaFormat) -> String {
    format!("{}.{}", at.format("%Y-%m-%d_%H-%M-%S"), format.extension())
}

/// Candidate paths for `file_name` in `dir`: the name itself, then `stem-1.ext`, `stem-2.ext`, ...
pub fn candidates<'a>(dir: &'a Path, file_name: &'a str) -> impl Iterator<Item = PathBuf> + 'a {
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (file_name, None),
    };
    (0u32..).map(move |n| {
        let name = match (n, ext) {
            (0, _) => file_name.to_string(),
            (n, Some(ext)) => format!("{}-{}.{}", stem, n, ext),
            (n, None) => format!("{}-{}", stem, n),
        };
        dir.join(name)
    })
}

/// Whether `name` is a bare file name (no separators, no parent references).
pub fn is_plain_file_name(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && name != ".."
        && !name.contains(['/', '\\'])
        && !name.contains('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn timestamp_is_zero_padded() {
        let at = NaiveDate::from_ymd_opt(2024, 3, 7)
            .unwrap()
            .and_hms_opt(9, 5, 2)
            .unwrap();
        assert_eq!(timestamped(at, MediaFormat::Webm), "2024-03-07_09-05-02.webm");
        assert_eq!(timestamped(at, MediaFormat::Mp4), "2024-03-07_09-05-02.mp4");
    }

    #[test]
    fn candidates_add_numeric_suffix() {
        let dir = Path::new("/out");
        let names: Vec<PathBuf> = candidates(dir, "clip.mp4").take(3).collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("/out/clip.mp4"),
                PathBuf::from("/out/clip-1.mp4"),
                PathBuf::from("/out/clip-2.mp4"),
            ]
        );
    }

    #[test]
    fn candidates_without_extension() {
        let dir = Path::new("/out");
        let second = candidates(dir, "clip").nth(1).unwrap();
        assert_eq!(second, PathBuf::from("/out/clip-1"));
    }

    #[test]
    fn rejects_path_like_names() {
        assert!(is_plain_file_name("a.webm"));
        assert!(!is_plain_file_name("../a.webm"));
        assert!(!is_plain_file_name("dir/a.webm"));
        assert!(!is_plain_file_name(""));
    }
}
