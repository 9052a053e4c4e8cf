//! Enroll a person, recognize them from a camera-sized frame and mark them present.

use chrono::{NaiveDate, NaiveTime};
use image::{DynamicImage, Rgb, RgbImage};
use rollcall_core::ledger::{name_session_file, WindowPrompt};
use rollcall_core::testing::mean_color_pipeline;
use rollcall_core::{
    Annotator, EnrollmentStore, Ledger, MarkOutcome, Recognizer, RecognizerConfig, RetryPolicy,
};
use tempfile::TempDir;

const ALICE: [u8; 3] = [200, 150, 100];
const STRANGER: [u8; 3] = [20, 60, 220];

struct Operator(Vec<&'static str>);

impl WindowPrompt for Operator {
    fn ask_window(&mut self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.remove(0).to_string())
    }

    fn report(&mut self, _message: &str) {}
}

fn frame(color: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(160, 120, Rgb(color))
}

fn at(h: u32, m: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(h, m, 0).unwrap()
}

#[test]
fn test_enroll_recognize_and_mark() {
    let dir = TempDir::new().unwrap();
    let mut store =
        EnrollmentStore::open(dir.path().join("signatures.csv"), RetryPolicy::no_retry()).unwrap();
    let mut recognizer = Recognizer::new(mean_color_pipeline(), RecognizerConfig::default());

    let photo = DynamicImage::ImageRgb8(RgbImage::from_pixel(64, 48, Rgb(ALICE)));
    let record = store
        .add_person("Alice", &photo, recognizer.pipeline_mut())
        .unwrap();
    assert_eq!(record.signatures.len(), 8);

    let decision = recognizer.identify(&frame(ALICE), store.records()).unwrap();
    assert_eq!(decision.name.as_deref(), Some("Alice"));
    assert!(decision.confidence > 50);
    let face = decision.face.clone().unwrap();
    assert_eq!((face.width, face.height), (160.0, 120.0));

    let stranger = recognizer.identify(&frame(STRANGER), store.records()).unwrap();
    assert_eq!(stranger.name, None);
    assert!(stranger.face.is_some());

    let annotated = Annotator::new().annotate(&frame(ALICE), &decision);
    assert_eq!(*annotated.get_pixel(0, 60), Rgb([0, 255, 0]));

    let today = NaiveDate::from_ymd_opt(2026, 10, 18).unwrap();
    let mut operator = Operator(vec!["09:00 AM - 10:00 AM"]);
    let session = name_session_file(today.and_time(at(9, 0)), &mut operator).unwrap();
    let ledger = Ledger::new(&dir.path().join("attendance"), &session, RetryPolicy::no_retry());
    assert!(ledger
        .path()
        .ends_with("attendance_09-00-00_to_10-00-00_date-2026-10-18.csv"));

    let name = decision.name_or_empty();
    assert_eq!(ledger.mark(name, at(9, 5), |_| true).unwrap(), MarkOutcome::Marked);
    assert_eq!(ledger.mark(name, at(9, 10), |_| true).unwrap(), MarkOutcome::AlreadyMarked);
    assert_eq!(
        ledger.mark(stranger.name_or_empty(), at(9, 12), |_| true).unwrap(),
        MarkOutcome::EmptyName
    );

    let entries = ledger.entries().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "Alice");
    assert_eq!(entries[0].time, at(9, 5));
}

#[test]
fn test_store_survives_reopen_and_removal() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("signatures.csv");
    let mut pipeline = mean_color_pipeline();
    {
        let mut store = EnrollmentStore::open(&path, RetryPolicy::no_retry()).unwrap();
        for (name, color) in [("Alice", ALICE), ("Bob", STRANGER)] {
            let photo = DynamicImage::ImageRgb8(RgbImage::from_pixel(32, 32, Rgb(color)));
            store.add_person(name, &photo, &mut pipeline).unwrap();
        }
    }

    let mut store = EnrollmentStore::open(&path, RetryPolicy::no_retry()).unwrap();
    assert_eq!(store.names().collect::<Vec<_>>(), vec!["Alice", "Bob"]);
    assert!(store.remove_person("Alice").unwrap());

    let mut recognizer = Recognizer::new(pipeline, RecognizerConfig::default());
    let decision = recognizer.identify(&frame(ALICE), store.records()).unwrap();
    assert_ne!(decision.name.as_deref(), Some("Alice"));
}
