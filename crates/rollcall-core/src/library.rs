//! Image library: enrollment photos waiting to be turned into signatures.
//!
//! One photo per person, stored as `<name>.<ext>` in a single directory.

use crate::codec::{validate_name, NameError};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
const DEFAULT_EXTENSION: &str = "jpg";

#[derive(Error, Debug)]
pub enum LibraryError {
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    #[error("a photo named {0:?} is already in the library")]
    DuplicateName(String),
    #[error("{}: not a supported image file", .0.display())]
    UnsupportedFormat(PathBuf),
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// A photo in the library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LibraryEntry {
    pub name: String,
    pub path: PathBuf,
}

pub struct ImageLibrary {
    dir: PathBuf,
}

impl ImageLibrary {
    /// Open (creating if needed) the library directory.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, LibraryError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).map_err(|source| LibraryError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy `source` into the library under `name`, keeping its extension.
    pub fn add(&self, source: &Path, name: &str) -> Result<PathBuf, LibraryError> {
        validate_name(name)?;
        if self.find(name)?.is_some() {
            return Err(LibraryError::DuplicateName(name.to_string()));
        }

        let extension = match source.extension().and_then(|e| e.to_str()) {
            Some(ext) if is_image_extension(ext) => ext.to_ascii_lowercase(),
            Some(_) => return Err(LibraryError::UnsupportedFormat(source.to_path_buf())),
            None => DEFAULT_EXTENSION.to_string(),
        };

        let target = self.dir.join(format!("{name}.{extension}"));
        fs::copy(source, &target).map_err(|source_err| LibraryError::Io {
            path: source.to_path_buf(),
            source: source_err,
        })?;
        tracing::info!(name, path = %target.display(), "added photo to library");
        Ok(target)
    }

    /// Delete the photo stored under `name`. Returns whether one existed.
    pub fn remove(&self, name: &str) -> Result<bool, LibraryError> {
        let Some(entry) = self.find(name)? else {
            return Ok(false);
        };
        fs::remove_file(&entry.path).map_err(|source| LibraryError::Io {
            path: entry.path.clone(),
            source,
        })?;
        tracing::info!(name, "removed photo from library");
        Ok(true)
    }

    /// Photo stored under `name`, if any.
    pub fn find(&self, name: &str) -> Result<Option<LibraryEntry>, LibraryError> {
        Ok(self.entries()?.into_iter().find(|e| e.name == name))
    }

    /// All photos, sorted by name.
    pub fn entries(&self) -> Result<Vec<LibraryEntry>, LibraryError> {
        let io_err = |source| LibraryError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = Vec::new();
        for item in fs::read_dir(&self.dir).map_err(io_err)? {
            let path = item.map_err(io_err)?.path();
            if !path.is_file() {
                continue;
            }
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(is_image_extension);
            let name = path.file_stem().and_then(|s| s.to_str()).map(str::to_string);
            if let (true, Some(name)) = (is_image, name) {
                entries.push(LibraryEntry { name, path });
            }
        }
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }
}

fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
}
