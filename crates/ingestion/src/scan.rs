//! GeoTIFF discovery.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::{IngestionError, Result};

/// Options for [`find_rasters`].
#[derive(Debug, Clone)]
pub struct ScanOptions {
    /// Accepted extensions, compared case-insensitively
    pub extensions: Vec<String>,
    /// Descend into subdirectories
    pub recursive: bool,
    /// File names to leave out (for example a previous composite)
    pub exclude: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            extensions: vec!["tif".to_string(), "tiff".to_string()],
            recursive: true,
            exclude: Vec::new(),
        }
    }
}

impl ScanOptions {
    /// Non-recursive scan excluding the given file names.
    pub fn flat_excluding(exclude: &[&str]) -> Self {
        Self {
            recursive: false,
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }
}

/// Find raster files under `root`, sorted by path.
pub fn find_rasters(root: &Path, options: &ScanOptions) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(IngestionError::FileRead(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("Directory does not exist: {}", root.display()),
        )));
    }

    let mut walker = WalkDir::new(root).min_depth(1);
    if !options.recursive {
        walker = walker.max_depth(1);
    }

    let mut files = Vec::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "Skipping unreadable directory entry");
                continue;
            }
        };

        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let matches_ext = path
            .extension()
            .and_then(|s| s.to_str())
            .is_some_and(|ext| options.extensions.iter().any(|x| x.eq_ignore_ascii_case(ext)));
        if !matches_ext {
            continue;
        }

        let excluded = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|name| options.exclude.iter().any(|x| x == name));
        if excluded {
            debug!(path = %path.display(), "Excluded from scan");
            continue;
        }

        files.push(path.to_path_buf());
    }

    files.sort();
    debug!(root = %root.display(), count = files.len(), "Scanned for rasters");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(path: &Path) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, b"").unwrap();
    }

    #[test]
    fn test_recursive_scan_sorted() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("b.tif"));
        touch(&dir.path().join("sub/a.TIFF"));
        touch(&dir.path().join("notes.txt"));
        touch(&dir.path().join("a.tif"));

        let files = find_rasters(dir.path(), &ScanOptions::default()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.strip_prefix(dir.path()).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.tif"),
                PathBuf::from("b.tif"),
                PathBuf::from("sub/a.TIFF")
            ]
        );
    }

    #[test]
    fn test_flat_scan_with_exclusion() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("flood_x.tif"));
        touch(&dir.path().join("flood_ALL_events.tif"));
        touch(&dir.path().join("nested/flood_y.tif"));

        let options = ScanOptions::flat_excluding(&["flood_ALL_events.tif"]);
        let files = find_rasters(dir.path(), &options).unwrap();
        assert_eq!(files, vec![dir.path().join("flood_x.tif")]);
    }

    #[test]
    fn test_missing_root() {
        let dir = tempfile::tempdir().unwrap();
        let result = find_rasters(&dir.path().join("absent"), &ScanOptions::default());
        assert!(matches!(result, Err(IngestionError::FileRead(_))));
    }
}
