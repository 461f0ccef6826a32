//! Point-in-time copies of live SQLite databases.
//!
//! Copying a database file byte for byte while another process writes to it
//! can capture a torn page or miss the WAL. When the source is a SQLite
//! database we take an online backup into a temporary file first and upload
//! that instead. Anything else is uploaded as is.

use std::fs::File;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use rusqlite::{Connection, DatabaseName, OpenFlags};
use tempfile::NamedTempFile;

const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// The file a cycle actually uploads. A consistent copy lives in a
/// `NamedTempFile` and is removed when this is dropped.
#[derive(Debug)]
pub struct StagedSource {
    source: PathBuf,
    copy: Option<NamedTempFile>,
}

impl StagedSource {
    fn raw(path: &Path) -> Self {
        StagedSource { source: path.to_path_buf(), copy: None }
    }

    pub fn path(&self) -> &Path {
        match &self.copy {
            Some(copy) => copy.path(),
            None => &self.source,
        }
    }

    pub fn is_consistent_copy(&self) -> bool {
        self.copy.is_some()
    }
}

/// Returns true when `path` starts with the SQLite file header.
pub fn is_sqlite(path: &Path) -> io::Result<bool> {
    let mut header = [0u8; 16];
    let mut file = File::open(path)?;

    match file.read_exact(&mut header) {
        Ok(()) => Ok(&header == SQLITE_HEADER),
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(false),
        Err(e) => Err(e),
    }
}

/// Copies the main database of `source` into `dest` with the online backup api.
pub fn backup_database(source: &Path, dest: &Path) -> rusqlite::Result<()> {
    let conn = Connection::open_with_flags(
        source,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.backup(DatabaseName::Main, dest, None)
}

/// Picks what to upload for `source`. Falls back to the raw file whenever a
/// consistent copy is disabled, not applicable, or fails.
pub fn stage(source: &Path, consistent_copy: bool, staging_dir: &Path) -> StagedSource {
    if !consistent_copy {
        return StagedSource::raw(source);
    }

    match is_sqlite(source) {
        Ok(true) => {}
        Ok(false) => return StagedSource::raw(source),
        Err(e) => {
            tracing::warn!(source = %source.display(), error = %e, "could not inspect source, uploading it as is");
            return StagedSource::raw(source);
        }
    }

    // created with O_EXCL and owner-only permissions, removed on drop
    let dest = match tempfile::Builder::new().prefix("ferry-").suffix(".db").tempfile_in(staging_dir) {
        Ok(dest) => dest,
        Err(e) => {
            tracing::warn!(dir = %staging_dir.display(), error = %e, "could not create staging file, uploading raw file");
            return StagedSource::raw(source);
        }
    };

    match backup_database(source, dest.path()) {
        Ok(()) => {
            tracing::debug!(staged = %dest.path().display(), "took consistent sqlite copy");
            StagedSource { source: source.to_path_buf(), copy: Some(dest) }
        }
        Err(e) => {
            tracing::warn!(source = %source.display(), error = %e, "sqlite backup failed, uploading raw file");
            StagedSource::raw(source)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn make_db(path: &Path, rows: i64) {
        let conn = Connection::open(path).unwrap();
        conn.execute_batch("CREATE TABLE memories (id INTEGER PRIMARY KEY, text TEXT NOT NULL)")
            .unwrap();
        for i in 0..rows {
            conn.execute("INSERT INTO memories (text) VALUES (?1)", [format!("memory {i}")])
                .unwrap();
        }
    }

    #[test]
    fn detects_sqlite_header() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("zion.db");
        let text = tmp.path().join("notes.txt");
        let tiny = tmp.path().join("tiny");
        make_db(&db, 1);
        std::fs::write(&text, "hello there, this is plain text").unwrap();
        std::fs::write(&tiny, "SQL").unwrap();

        assert!(is_sqlite(&db).unwrap());
        assert!(!is_sqlite(&text).unwrap());
        assert!(!is_sqlite(&tiny).unwrap());
    }

    #[test]
    fn staged_copy_is_readable_and_cleaned_up() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("zion.db");
        make_db(&db, 25);

        let staged_path = {
            let staged = stage(&db, true, tmp.path());
            assert!(staged.is_consistent_copy());
            assert_ne!(staged.path(), db.as_path());

            let conn = Connection::open(staged.path()).unwrap();
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM memories", [], |r| r.get(0)).unwrap();
            assert_eq!(count, 25);

            staged.path().to_path_buf()
        };

        assert!(!staged_path.exists());
        assert!(db.exists());
    }

    #[cfg(unix)]
    #[test]
    fn staged_copy_is_private_to_the_owner() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("zion.db");
        make_db(&db, 3);

        let staged = stage(&db, true, tmp.path());
        assert!(staged.is_consistent_copy());
        let mode = std::fs::metadata(staged.path()).unwrap().permissions().mode();
        assert_eq!(mode & 0o077, 0);
        assert!(staged.path().file_name().unwrap().to_string_lossy().starts_with("ferry-"));
    }

    #[test]
    fn non_sqlite_sources_are_used_directly() {
        let tmp = TempDir::new().unwrap();
        let src = tmp.path().join("journal.md");
        std::fs::write(&src, "# day one").unwrap();

        let staged = stage(&src, true, tmp.path());
        assert!(!staged.is_consistent_copy());
        assert_eq!(staged.path(), src.as_path());
        drop(staged);
        assert!(src.exists());
    }

    #[test]
    fn disabled_consistent_copy_uses_raw_file() {
        let tmp = TempDir::new().unwrap();
        let db = tmp.path().join("zion.db");
        make_db(&db, 1);

        let staged = stage(&db, false, tmp.path());
        assert!(!staged.is_consistent_copy());
        assert_eq!(staged.path(), db.as_path());
    }
}
