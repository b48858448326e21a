//! Size-based, tailable log file rotation
//!
//! The live file always keeps its configured name. When a write would take it past
//! `max_size` bytes, older files shift up by one (`app.log` -> `app1.log` ->
//! `app2.log` ...) and a fresh live file is opened. At most `max_files` files exist
//! at any time, the live one included.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// A writer that rotates its target file once it reaches a size limit
#[derive(Debug)]
pub struct RotatingFile {
    path: PathBuf,
    max_size: u64,
    max_files: usize,
    file: File,
    size: u64,
}

impl RotatingFile {
    /// Open (or create) the live file in append mode
    pub fn open(path: impl Into<PathBuf>, max_size: u64, max_files: usize) -> io::Result<Self> {
        let path = path.into();
        let file = open_append(&path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path,
            max_size: max_size.max(1),
            max_files: max_files.max(1),
            file,
            size,
        })
    }

    /// Path of the live file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Bytes currently in the live file
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Path of the `index`-th rotated file; 0 is the live file
    pub fn rotated_path(&self, index: usize) -> PathBuf {
        rotated_path(&self.path, index)
    }

    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;

        if self.max_files > 1 {
            let oldest = self.rotated_path(self.max_files - 1);
            if oldest.exists() {
                fs::remove_file(&oldest)?;
            }
            for index in (1..self.max_files - 1).rev() {
                let from = self.rotated_path(index);
                if from.exists() {
                    fs::rename(&from, self.rotated_path(index + 1))?;
                }
            }
            fs::rename(&self.path, self.rotated_path(1))?;
            self.file = open_append(&self.path)?;
        } else {
            self.file = OpenOptions::new()
                .create(true)
                .write(true)
                .truncate(true)
                .open(&self.path)?;
        }

        self.size = 0;
        Ok(())
    }
}

impl Write for RotatingFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.size > 0 && self.size + buf.len() as u64 > self.max_size {
            self.rotate()?;
        }
        self.file.write_all(buf)?;
        self.size += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// `dir/app.log` with index 2 becomes `dir/app2.log`
pub fn rotated_path(path: &Path, index: usize) -> PathBuf {
    if index == 0 {
        return path.to_path_buf();
    }

    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}{}.{}", stem, index, ext.to_string_lossy()),
        None => format!("{}{}", stem, index),
    };
    path.with_file_name(name)
}
