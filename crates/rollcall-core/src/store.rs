//! Enrollment store: the durable name → signatures table.
//!
//! Enrollment appends one row to the record file; removal rewrites the whole
//! table atomically. The store is not synchronized: callers must keep
//! recognition paused while mutating it.

use crate::augment::{augment, AugmentError};
use crate::codec::{self, CodecError, NameError};
use crate::library::{ImageLibrary, LibraryError};
use crate::pipeline::{FacePipeline, PipelineError};
use crate::preprocess::prepare_enrollment;
use crate::retry::{FileAccessError, RetryPolicy};
use crate::types::{PersonRecord, SIGNATURES_PER_PERSON};
use image::DynamicImage;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0:?} is already enrolled")]
    DuplicateName(String),
    #[error("invalid name: {0}")]
    InvalidName(#[from] NameError),
    #[error("no face detected for {name:?} at brightness {factor}; use a clear frontal photo")]
    NoFaceDetected { name: String, factor: f32 },
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("signature dimension {actual} does not match the store's {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("record must hold 8 signatures, got {0}")]
    WrongSignatureCount(usize),
    #[error("face pipeline: {0}")]
    Pipeline(#[source] PipelineError),
    #[error("{}: corrupt record file: {source}", path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: CodecError,
    },
    #[error(transparent)]
    File(#[from] FileAccessError),
    #[error(transparent)]
    Library(#[from] LibraryError),
}

impl From<AugmentError> for StoreError {
    fn from(err: AugmentError) -> Self {
        StoreError::InvalidImage(err.to_string())
    }
}

/// Outcome of enrolling every new photo in the image library.
#[derive(Debug, Default)]
pub struct SyncReport {
    pub enrolled: Vec<String>,
    pub skipped: Vec<String>,
    pub failed: Vec<(String, String)>,
}

pub struct EnrollmentStore {
    path: PathBuf,
    records: Vec<PersonRecord>,
    retry: RetryPolicy,
}

impl EnrollmentStore {
    /// Open the store at `path`, loading existing records. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>, retry: RetryPolicy) -> Result<Self, StoreError> {
        let mut store = Self {
            path: path.into(),
            records: Vec::new(),
            retry,
        };
        store.load()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[PersonRecord] {
        &self.records
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&PersonRecord> {
        self.records.iter().find(|r| r.name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Signature dimension shared by all records, `None` while empty.
    pub fn dimension(&self) -> Option<usize> {
        self.records
            .first()
            .and_then(|r| r.signatures.first())
            .map(|s| s.dimension())
    }

    /// Replace the in-memory records with the file's contents.
    pub fn load(&mut self) -> Result<(), StoreError> {
        let text = self.retry.run(&self.path, || match fs::read_to_string(&self.path) {
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            other => other,
        })?;
        self.records = codec::deserialize(&text).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        tracing::info!(path = %self.path.display(), people = self.records.len(), "loaded enrollment store");
        Ok(())
    }

    /// Atomically rewrite the record file from memory.
    pub fn persist(&self) -> Result<(), StoreError> {
        let text = codec::serialize(&self.records);
        let tmp = self.path.with_extension("tmp");
        self.retry.run(&self.path, || {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(&tmp, &text)?;
            fs::rename(&tmp, &self.path)
        })?;
        tracing::debug!(path = %self.path.display(), people = self.records.len(), "persisted enrollment store");
        Ok(())
    }

    /// Enroll `name` from an image file.
    pub fn add_person_from_path(
        &mut self,
        name: &str,
        image_path: &Path,
        pipeline: &mut FacePipeline,
    ) -> Result<&PersonRecord, StoreError> {
        let image = image::open(image_path)
            .map_err(|e| StoreError::InvalidImage(format!("{}: {e}", image_path.display())))?;
        self.add_person(name, &image, pipeline)
    }

    /// Enroll `name`: preprocess, augment, encode every variant, append the record.
    ///
    /// Nothing is stored unless all eight variants produce a signature.
    pub fn add_person(
        &mut self,
        name: &str,
        image: &DynamicImage,
        pipeline: &mut FacePipeline,
    ) -> Result<&PersonRecord, StoreError> {
        let name = name.trim();
        codec::validate_name(name)?;
        if self.contains(name) {
            return Err(StoreError::DuplicateName(name.to_string()));
        }

        let record = build_record(name, image, pipeline)?;
        self.insert(record)
    }

    /// Append an already encoded record to memory and the record file.
    pub fn insert(&mut self, record: PersonRecord) -> Result<&PersonRecord, StoreError> {
        codec::validate_name(&record.name)?;
        if self.contains(&record.name) {
            return Err(StoreError::DuplicateName(record.name));
        }
        if record.signatures.len() != SIGNATURES_PER_PERSON {
            return Err(StoreError::WrongSignatureCount(record.signatures.len()));
        }
        let dim = record.signatures[0].dimension();
        let expected = self.dimension().unwrap_or(dim);
        if let Some(bad) = record.signatures.iter().find(|s| s.dimension() != expected) {
            return Err(StoreError::DimensionMismatch {
                expected,
                actual: bad.dimension(),
            });
        }

        self.append_row(&codec::serialize_row(&record))?;
        tracing::info!(name = %record.name, dim, "enrolled person");
        self.records.push(record);
        Ok(&self.records[self.records.len() - 1])
    }

    /// Remove `name`. Returns `false` (and touches nothing) for an unknown name.
    pub fn remove_person(&mut self, name: &str) -> Result<bool, StoreError> {
        let Some(idx) = self.records.iter().position(|r| r.name == name) else {
            return Ok(false);
        };
        let removed = self.records.remove(idx);
        if let Err(err) = self.persist() {
            self.records.insert(idx, removed);
            return Err(err);
        }
        tracing::info!(name, "removed person from enrollment store");
        Ok(true)
    }

    /// Enroll every library photo whose name is not yet known.
    ///
    /// Each photo is its own attempt: failures are reported per name and the
    /// remaining photos are still processed.
    pub fn sync_from_library(
        &mut self,
        library: &ImageLibrary,
        pipeline: &mut FacePipeline,
    ) -> Result<SyncReport, StoreError> {
        let mut report = SyncReport::default();
        for entry in library.entries()? {
            if self.contains(&entry.name) {
                report.skipped.push(entry.name);
                continue;
            }
            match self.add_person_from_path(&entry.name, &entry.path, pipeline) {
                Ok(_) => report.enrolled.push(entry.name),
                Err(err) => {
                    tracing::warn!(name = %entry.name, error = %err, "skipping library photo");
                    report.failed.push((entry.name, err.to_string()));
                }
            }
        }
        tracing::info!(
            enrolled = report.enrolled.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "library sync finished"
        );
        Ok(report)
    }

    fn append_row(&self, row: &str) -> Result<(), StoreError> {
        self.retry.run(&self.path, || {
            if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            let mut chunk = String::new();
            if file.metadata()?.len() == 0 {
                chunk.push_str(codec::HEADER);
                chunk.push('\n');
            }
            chunk.push_str(row);
            chunk.push('\n');
            file.write_all(chunk.as_bytes())
        })?;
        Ok(())
    }
}

/// Encode all augmentation variants of an enrollment photo.
pub fn build_record(
    name: &str,
    image: &DynamicImage,
    pipeline: &mut FacePipeline,
) -> Result<PersonRecord, StoreError> {
    let prepared = prepare_enrollment(image)?;
    let variants = augment(&prepared)?;

    let mut signatures = Vec::with_capacity(SIGNATURES_PER_PERSON);
    for (factor, variant) in variants.iter() {
        let signature = pipeline.encode(variant).map_err(|err| match err {
            PipelineError::NoFaceDetected => StoreError::NoFaceDetected {
                name: name.to_string(),
                factor,
            },
            other => StoreError::Pipeline(other),
        })?;
        tracing::debug!(name, factor, "encoded enrollment variant");
        signatures.push(signature);
    }

    Ok(PersonRecord {
        name: name.to_string(),
        signatures,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{bright_face_pipeline, mean_color_pipeline, uniform_record};
    use image::{Rgb, RgbImage};
    use tempfile::TempDir;

    fn photo(color: [u8; 3]) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 30, Rgb(color)))
    }

    fn open(dir: &TempDir) -> EnrollmentStore {
        EnrollmentStore::open(dir.path().join("signatures.csv"), RetryPolicy::no_retry()).unwrap()
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        assert!(store.is_empty());
        assert_eq!(store.dimension(), None);
        assert!(!store.path().exists());
    }

    #[test]
    fn test_add_person_stores_eight_signatures() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let mut pipeline = mean_color_pipeline();

        let record = store.add_person("Alice", &photo([100, 80, 60]), &mut pipeline).unwrap();
        assert_eq!(record.signatures.len(), 8);
        // Factor 0.25 variant is darker than the primary
        assert!(record.signatures[0].values[0] < record.signatures[3].values[0]);
        assert_eq!(store.len(), 1);

        let reopened = open(&dir);
        assert_eq!(reopened.records(), store.records());
    }

    #[test]
    fn test_duplicate_name_rejected_store_unchanged() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let mut pipeline = mean_color_pipeline();
        store.add_person("Alice", &photo([100, 80, 60]), &mut pipeline).unwrap();
        let before = fs::read(store.path()).unwrap();

        let err = store.add_person("Alice", &photo([1, 2, 3]), &mut pipeline).unwrap_err();
        assert!(matches!(err, StoreError::DuplicateName(ref n) if n == "Alice"));
        assert_eq!(store.len(), 1);
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_partial_failure_stores_nothing() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        // The 0.25 variant of a mid-grey photo falls below the locator's threshold.
        let mut pipeline = bright_face_pipeline(40.0);

        let err = store.add_person("Dim", &photo([100, 100, 100]), &mut pipeline).unwrap_err();
        assert!(matches!(err, StoreError::NoFaceDetected { factor, .. } if factor == 0.25));
        assert!(store.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_invalid_name_and_image() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        let mut pipeline = mean_color_pipeline();
        assert!(matches!(
            store.add_person("", &photo([9, 9, 9]), &mut pipeline),
            Err(StoreError::InvalidName(_))
        ));
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        assert!(matches!(
            store.add_person("Eve", &empty, &mut pipeline),
            Err(StoreError::InvalidImage(_))
        ));
        assert!(matches!(
            store.add_person_from_path("Eve", &dir.path().join("missing.jpg"), &mut pipeline),
            Err(StoreError::InvalidImage(_))
        ));
    }

    #[test]
    fn test_remove_keeps_other_rows_identical() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        for (name, seed) in [("Alice", 0.1f32), ("Bob", 0.2), ("Carol", 0.3)] {
            store.insert(uniform_record(name, vec![seed, seed / 3.0])).unwrap();
        }
        let before = fs::read_to_string(store.path()).unwrap();
        let lines: Vec<&str> = before.lines().collect();

        assert!(store.remove_person("Bob").unwrap());
        let after = fs::read_to_string(store.path()).unwrap();
        assert_eq!(after, format!("{}\n{}\n{}\n", lines[0], lines[1], lines[3]));
        assert_eq!(store.names().collect::<Vec<_>>(), vec!["Alice", "Carol"]);
    }

    #[test]
    fn test_remove_missing_name() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.insert(uniform_record("Alice", vec![0.5])).unwrap();
        let before = fs::read(store.path()).unwrap();
        assert!(!store.remove_person("Zed").unwrap());
        assert_eq!(store.len(), 1);
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn test_insert_rejects_dimension_mismatch() {
        let dir = TempDir::new().unwrap();
        let mut store = open(&dir);
        store.insert(uniform_record("Alice", vec![0.5, 0.5])).unwrap();
        assert!(matches!(
            store.insert(uniform_record("Bob", vec![0.5])),
            Err(StoreError::DimensionMismatch { expected: 2, actual: 1 })
        ));
    }

    #[test]
    fn test_corrupt_file_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("signatures.csv");
        fs::write(&path, "name,dim,signatures\nAlice,3,1,2\n").unwrap();
        let err = EnrollmentStore::open(&path, RetryPolicy::no_retry()).err().unwrap();
        assert!(matches!(err, StoreError::Corrupt { .. }));
    }

    #[test]
    fn test_sync_from_library() {
        let dir = TempDir::new().unwrap();
        let library = ImageLibrary::open(dir.path().join("images")).unwrap();
        photo([200, 180, 160]).save(library.dir().join("Alice.png")).unwrap();
        photo([90, 90, 90]).save(library.dir().join("Bob.png")).unwrap();
        fs::write(library.dir().join("Broken.jpg"), b"garbage").unwrap();

        let mut store = open(&dir);
        let mut pipeline = mean_color_pipeline();
        store.insert(uniform_record("Bob", vec![0.1, 0.1, 0.1])).unwrap();

        let report = store.sync_from_library(&library, &mut pipeline).unwrap();
        assert_eq!(report.enrolled, vec!["Alice"]);
        assert_eq!(report.skipped, vec!["Bob"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "Broken");
        assert_eq!(store.len(), 2);
    }
}
