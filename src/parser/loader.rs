use std::path::{Path, PathBuf};

use glob::glob;

use crate::util::{Result, SyncError};

/// Every `.sql` file under `folder`, recursively, in stable path order.
/// A missing or unreadable folder is a hard error; an empty listing is not.
pub fn sql_files(folder: &Path) -> Result<Vec<PathBuf>> {
    if !folder.is_dir() {
        return Err(SyncError::SourceUnreadable {
            path: folder.display().to_string(),
            message: "not a directory".to_string(),
        });
    }
    let pattern = folder.join("**").join("*.sql");
    let entries = glob(&pattern.to_string_lossy()).map_err(|e| SyncError::SourceUnreadable {
        path: folder.display().to_string(),
        message: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = entries.filter_map(|entry| entry.ok()).collect();
    files.sort();
    Ok(files)
}

pub fn read_file(path: &Path) -> Result<String> {
    std::fs::read_to_string(path).map_err(|e| SyncError::SourceUnreadable {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn missing_folder_is_source_unreadable() {
        let err = sql_files(Path::new("/nonexistent/scripts")).unwrap_err();
        assert!(matches!(err, SyncError::SourceUnreadable { .. }));
    }

    #[test]
    fn listing_is_recursive_and_sorted() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("tables")).unwrap();
        fs::write(dir.path().join("z_views.sql"), "").unwrap();
        fs::write(dir.path().join("tables").join("orders.sql"), "").unwrap();
        fs::write(dir.path().join("readme.txt"), "").unwrap();

        let files = sql_files(dir.path()).unwrap();
        let names: Vec<String> = files
            .iter()
            .map(|p| {
                p.strip_prefix(dir.path())
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect();
        assert_eq!(names, vec!["tables/orders.sql", "z_views.sql"]);
    }
}
