//! Struct archiving functionality
//!
//! To archive a stream of records create an `Archiver` in the session's
//! archive directory and `serialise` one flat, serde-serialisable record per
//! cycle into it.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::{Path, PathBuf};
use std::fs::{File, OpenOptions};
use csv::WriterBuilder;
pub use csv::Writer;
use serde::Serialize;
use thiserror::Error;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>
}

// ---------------------------------------------------------------------------
// ENUMERATIONS
// ---------------------------------------------------------------------------

/// Errors which can occur while archiving.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Cannot open the archive file {0:?}: {1}")]
    CannotOpen(PathBuf, std::io::Error),

    #[error("The archiver has not been opened")]
    NotOpen,

    #[error("Cannot write the record: {0}")]
    WriteError(csv::Error),

    #[error("Cannot flush the archive: {0}")]
    FlushError(std::io::Error)
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, ArchiveError> {
        let mut session_path = session.arch_root.clone();
        session_path.push(path);

        Self::from_full_path(session_path)
    }

    /// Create a new archiver writing to the given file, truncating it if it
    /// already exists.
    pub fn from_full_path<P: AsRef<Path>>(path: P) -> Result<Self, ArchiveError> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .write(true)
            .truncate(true)
            .create(true)
            .open(&path)
            .map_err(|e| ArchiveError::CannotOpen(path.clone(), e))?;

        let w = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            writer: Some(w)
        })
    }

    /// Returns true if the archiver has an open file.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Serialise a record into the archive.
    ///
    /// The record must be flat (no nested sequences), the header row is
    /// taken from the field names of the first record written.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), ArchiveError> {
        match self.writer {
            Some(ref mut w) => {
                w.serialize(record).map_err(ArchiveError::WriteError)?;
                w.flush().map_err(ArchiveError::FlushError)
            },
            None => Err(ArchiveError::NotOpen)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Rec {
        time_s: f64,
        speed_ms: f64
    }

    #[test]
    fn test_unopened_archiver() {
        let mut a = Archiver::default();
        assert!(!a.is_open());
        assert!(matches!(
            a.serialise(Rec { time_s: 0.0, speed_ms: 0.0 }),
            Err(ArchiveError::NotOpen)
        ));
    }

    #[test]
    fn test_write_records() {
        let path = std::env::temp_dir()
            .join(format!("archive_test_{}.csv", std::process::id()));

        {
            let mut a = Archiver::from_full_path(&path).unwrap();
            a.serialise(Rec { time_s: 0.0, speed_ms: 1.5 }).unwrap();
            a.serialise(Rec { time_s: 0.02, speed_ms: 1.25 }).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines, vec!["time_s,speed_ms", "0.0,1.5", "0.02,1.25"]);

        std::fs::remove_file(&path).ok();
    }
}
