//! Equal-population value segments (A = most valuable)

use crate::error::CltvError;
use std::fmt;

/// Segment labels run from `A` to `Z`.
pub const MAX_SEGMENTS: usize = 26;

/// A value segment; rank 0 is the highest-value bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Segment(u8);

impl Segment {
    pub fn label(self) -> char {
        (b'A' + self.0) as char
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Assign each value to one of `buckets` equal-population segments.
///
/// Values are ranked descending and split by rank, so tied values at a
/// boundary can land in different segments. Fewer values than buckets
/// leaves the lowest segments empty.
pub fn assign_segments(values: &[f64], buckets: usize) -> Result<Vec<Segment>, CltvError> {
    if buckets == 0 || buckets > MAX_SEGMENTS {
        return Err(CltvError::InvalidParameter(format!(
            "segment count must be between 1 and {MAX_SEGMENTS}, got {buckets}"
        )));
    }

    let n = values.len();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&i, &j| values[j].total_cmp(&values[i]));

    let mut segments = vec![Segment(0); n];
    for (rank, &index) in order.iter().enumerate() {
        segments[index] = Segment((rank * buckets / n) as u8);
    }
    Ok(segments)
}

/// Per-segment aggregate of the segmented value
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentSummary {
    pub segment: Segment,
    pub count: usize,
    pub sum: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

/// Count, sum, mean, min and max of `values` per segment, best segment first.
pub fn summarize(values: &[f64], segments: &[Segment]) -> Vec<SegmentSummary> {
    let mut summaries: Vec<SegmentSummary> = Vec::new();
    for (&value, &segment) in values.iter().zip(segments) {
        match summaries.iter_mut().find(|s| s.segment == segment) {
            Some(s) => {
                s.count += 1;
                s.sum += value;
                s.min = s.min.min(value);
                s.max = s.max.max(value);
            }
            None => summaries.push(SegmentSummary {
                segment,
                count: 1,
                sum: value,
                mean: 0.0,
                min: value,
                max: value,
            }),
        }
    }
    for s in &mut summaries {
        s.mean = s.sum / s.count as f64;
    }
    summaries.sort_by_key(|s| s.segment);
    summaries
}
