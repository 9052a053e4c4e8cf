use crate::types::{FaceSignature, PersonRecord};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Best candidate for a query signature.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    /// Index of the candidate in the gallery.
    pub index: usize,
    /// Smallest Euclidean distance between the query and the candidate's signatures.
    pub distance: f32,
}

/// Strategy for picking the closest enrolled person for a query signature.
pub trait Matcher: Send {
    /// `None` only when the gallery is empty.
    fn best_match(&self, query: &FaceSignature, gallery: &[PersonRecord]) -> Option<MatchResult>;
}

/// Coarse-then-fine search.
///
/// First pass compares the query with each person's primary signature only
/// and keeps the closest person; second pass takes the minimum distance over
/// all eight signatures of that person. Ties go to the earlier record.
pub struct TwoPassMatcher;

impl Matcher for TwoPassMatcher {
    fn best_match(&self, query: &FaceSignature, gallery: &[PersonRecord]) -> Option<MatchResult> {
        let mut best: Option<(usize, f32)> = None;
        for (i, record) in gallery.iter().enumerate() {
            let Some(primary) = record.primary() else {
                continue;
            };
            let d = query.euclidean_distance(primary);
            if best.map_or(true, |(_, best_d)| d < best_d) {
                best = Some((i, d));
            }
        }

        let (index, _) = best?;
        Some(MatchResult {
            index,
            distance: min_distance(query, &gallery[index]),
        })
    }
}

/// Nearest neighbour over every signature of every person.
pub struct ExhaustiveMatcher;

impl Matcher for ExhaustiveMatcher {
    fn best_match(&self, query: &FaceSignature, gallery: &[PersonRecord]) -> Option<MatchResult> {
        gallery
            .iter()
            .enumerate()
            .map(|(index, record)| MatchResult {
                index,
                distance: min_distance(query, record),
            })
            .fold(None, |best: Option<MatchResult>, candidate| match best {
                Some(b) if b.distance <= candidate.distance => Some(b),
                _ => Some(candidate),
            })
    }
}

fn min_distance(query: &FaceSignature, record: &PersonRecord) -> f32 {
    record
        .signatures
        .iter()
        .map(|s| query.euclidean_distance(s))
        .fold(f32::INFINITY, f32::min)
}

/// Which [`Matcher`] the recognizer uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MatchStrategy {
    #[default]
    TwoPass,
    Exhaustive,
}

impl MatchStrategy {
    pub fn matcher(self) -> Box<dyn Matcher> {
        match self {
            MatchStrategy::TwoPass => Box::new(TwoPassMatcher),
            MatchStrategy::Exhaustive => Box::new(ExhaustiveMatcher),
        }
    }
}

impl FromStr for MatchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "two-pass" | "two_pass" | "twopass" => Ok(MatchStrategy::TwoPass),
            "exhaustive" => Ok(MatchStrategy::Exhaustive),
            other => Err(format!("unknown match strategy {other:?} (expected two-pass or exhaustive)")),
        }
    }
}

/// `round(100 × (1 − distance))`, clamped to `0..=100`.
pub fn confidence_from_distance(distance: f32) -> u8 {
    if !distance.is_finite() {
        return 0;
    }
    (100.0 * (1.0 - distance)).round().clamp(0.0, 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{record, uniform_record};

    fn query(values: &[f32]) -> FaceSignature {
        FaceSignature::new(values.to_vec())
    }

    /// Primary signature `primary`, the other seven `rest`.
    fn split_record(name: &str, primary: Vec<f32>, rest: Vec<f32>) -> PersonRecord {
        let mut sigs = vec![rest; 8];
        sigs[3] = primary;
        record(name, sigs)
    }

    #[test]
    fn test_confidence_formula_and_clamp() {
        assert_eq!(confidence_from_distance(0.0), 100);
        assert_eq!(confidence_from_distance(0.5), 50);
        assert_eq!(confidence_from_distance(0.494), 51);
        assert_eq!(confidence_from_distance(0.9), 10);
        assert_eq!(confidence_from_distance(1.7), 0);
        assert_eq!(confidence_from_distance(f32::INFINITY), 0);
        assert_eq!(confidence_from_distance(-0.2), 100);
    }

    #[test]
    fn test_two_pass_picks_closest_primary() {
        let gallery = vec![
            uniform_record("far", vec![5.0, 5.0]),
            uniform_record("near", vec![1.0, 0.0]),
        ];
        let m = TwoPassMatcher.best_match(&query(&[1.0, 0.1]), &gallery).unwrap();
        assert_eq!(m.index, 1);
        assert!((m.distance - 0.1).abs() < 1e-6);
    }

    #[test]
    fn test_two_pass_refines_over_all_signatures() {
        // Primary is 0.4 away, but another variant matches exactly.
        let gallery = vec![split_record("A", vec![0.4, 0.0], vec![0.0, 0.0])];
        let m = TwoPassMatcher.best_match(&query(&[0.0, 0.0]), &gallery).unwrap();
        assert_eq!(m.distance, 0.0);
    }

    #[test]
    fn test_two_pass_keeps_coarse_candidate() {
        // A's primary is closer, B has an exact non-primary variant. Two-pass stays with A.
        let gallery = vec![
            split_record("A", vec![0.3, 0.0], vec![0.3, 0.0]),
            split_record("B", vec![0.9, 0.0], vec![0.0, 0.0]),
        ];
        let p = query(&[0.0, 0.0]);
        let two_pass = TwoPassMatcher.best_match(&p, &gallery).unwrap();
        assert_eq!(two_pass.index, 0);
        assert!((two_pass.distance - 0.3).abs() < 1e-6);

        let exhaustive = ExhaustiveMatcher.best_match(&p, &gallery).unwrap();
        assert_eq!(exhaustive.index, 1);
        assert_eq!(exhaustive.distance, 0.0);
    }

    #[test]
    fn test_tie_goes_to_first_record() {
        let gallery = vec![
            uniform_record("first", vec![1.0]),
            uniform_record("second", vec![-1.0]),
        ];
        assert_eq!(TwoPassMatcher.best_match(&query(&[0.0]), &gallery).unwrap().index, 0);
        assert_eq!(ExhaustiveMatcher.best_match(&query(&[0.0]), &gallery).unwrap().index, 0);
    }

    #[test]
    fn test_empty_gallery() {
        assert!(TwoPassMatcher.best_match(&query(&[1.0]), &[]).is_none());
        assert!(ExhaustiveMatcher.best_match(&query(&[1.0]), &[]).is_none());
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("two-pass".parse::<MatchStrategy>(), Ok(MatchStrategy::TwoPass));
        assert_eq!("Exhaustive".parse::<MatchStrategy>(), Ok(MatchStrategy::Exhaustive));
        assert!("fuzzy".parse::<MatchStrategy>().is_err());
    }
}
