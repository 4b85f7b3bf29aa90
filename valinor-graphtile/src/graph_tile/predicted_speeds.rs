//! # Predicted (historical) speeds
//!
//! A week of average speeds is split into 5 minute buckets.
//! That is a lot of data per edge, so tiles store a truncated DCT-II of the week
//! ([`COEFFICIENT_COUNT`] coefficients per profile) and decode single buckets with a DCT-III.
//!
//! Profiles are exchanged as text by base64 encoding the coefficients as big-endian `i16`s.
use base64::{Engine as _, engine::general_purpose::STANDARD};
use std::sync::LazyLock;
use thiserror::Error;
use zerocopy::{I16, LE, U32};

/// Width of each speed bucket.
pub const SPEED_BUCKET_SIZE_MINUTES: u32 = 5;
const SPEED_BUCKET_SIZE_SECONDS: u32 = SPEED_BUCKET_SIZE_MINUTES * 60;
pub const BUCKETS_PER_WEEK: usize = (7 * 24 * 60) / SPEED_BUCKET_SIZE_MINUTES as usize;

/// Number of DCT coefficients kept per profile.
pub const COEFFICIENT_COUNT: usize = 200;

/// Size of a decoded profile: one big-endian `i16` per coefficient.
const ENCODED_PROFILE_SIZE: usize = 2 * COEFFICIENT_COUNT;

/// Cosine basis, one row per bucket, pre-scaled by the DCT normalization factors.
static COS_TABLE: LazyLock<Box<[[f32; COEFFICIENT_COUNT]]>> = LazyLock::new(|| {
    #[expect(clippy::cast_precision_loss, reason = "BUCKETS_PER_WEEK is far below 2^24")]
    let buckets = BUCKETS_PER_WEEK as f32;
    let angle_step = std::f32::consts::PI / buckets;
    let norm = (2.0 / buckets).sqrt();

    (0..BUCKETS_PER_WEEK)
        .map(|bucket| {
            #[expect(clippy::cast_precision_loss, reason = "bucket < 2016")]
            let center = bucket as f32 + 0.5;
            let mut row = [0f32; COEFFICIENT_COUNT];
            for (c, value) in row.iter_mut().enumerate() {
                #[expect(clippy::cast_precision_loss, reason = "c < 200")]
                let basis = (angle_step * center * c as f32).cos() * norm;
                // The DC term carries an extra 1/sqrt(2)
                *value = if c == 0 {
                    basis * std::f32::consts::FRAC_1_SQRT_2
                } else {
                    basis
                };
            }
            row
        })
        .collect()
});

#[derive(Debug, Error)]
pub enum PredictedSpeedCodecError {
    #[error("Base64 decoding error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("Decoded {count} bytes; expected {ENCODED_PROFILE_SIZE}")]
    IncorrectByteCount { count: usize },
}

/// The bucket containing a time, measured in seconds from midnight Sunday (local time).
///
/// Returns `None` for times past the end of the week.
#[inline]
pub const fn bucket_for_seconds(seconds_from_start_of_week: u32) -> Option<usize> {
    let bucket = (seconds_from_start_of_week / SPEED_BUCKET_SIZE_SECONDS) as usize;
    if bucket < BUCKETS_PER_WEEK {
        Some(bucket)
    } else {
        None
    }
}

/// Human readable start of a bucket, ex: `Mon 08:35`.
///
/// Bucket indexes wrap around at the end of the week.
pub fn bucket_label(bucket: usize) -> String {
    const DAYS: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
    let minutes = (bucket % BUCKETS_PER_WEEK) * SPEED_BUCKET_SIZE_MINUTES as usize;
    let day = DAYS[minutes / (24 * 60)];
    let minute_of_day = minutes % (24 * 60);
    format!("{day} {:02}:{:02}", minute_of_day / 60, minute_of_day % 60)
}

/// Compresses a week of speeds (kph) into profile coefficients.
pub fn compress_speed_buckets(speeds: &[f32; BUCKETS_PER_WEEK]) -> [i16; COEFFICIENT_COUNT] {
    let mut sums = [0f32; COEFFICIENT_COUNT];
    for (row, &speed) in COS_TABLE.iter().zip(speeds) {
        for (sum, &basis) in sums.iter_mut().zip(row) {
            *sum += speed * basis;
        }
    }

    #[expect(clippy::cast_possible_truncation, reason = "saturating float to int cast")]
    sums.map(|sum| sum.round() as i16)
}

/// Decodes the speed (kph) of a single bucket in `[0, BUCKETS_PER_WEEK)`.
///
/// # Panics
///
/// Panics if the bucket is out of range.
pub fn decompress_speed_bucket(coefficients: &[i16; COEFFICIENT_COUNT], bucket: usize) -> f32 {
    COS_TABLE[bucket]
        .iter()
        .zip(coefficients)
        .fold(0.0, |speed, (&basis, &c)| basis.mul_add(f32::from(c), speed))
}

/// Encodes profile coefficients as base64 (big-endian `i16`s).
pub fn encode_compressed_speeds(coefficients: &[i16; COEFFICIENT_COUNT]) -> String {
    let raw: Vec<u8> = coefficients.iter().flat_map(|c| c.to_be_bytes()).collect();
    STANDARD.encode(raw)
}

/// Decodes base64 profile text into coefficients.
///
/// # Errors
///
/// Fails on invalid base64 or if the payload isn't exactly [`COEFFICIENT_COUNT`] values.
pub fn decode_compressed_speeds(
    encoded: &str,
) -> Result<[i16; COEFFICIENT_COUNT], PredictedSpeedCodecError> {
    let raw = STANDARD.decode(encoded.trim().as_bytes())?;
    if raw.len() != ENCODED_PROFILE_SIZE {
        return Err(PredictedSpeedCodecError::IncorrectByteCount { count: raw.len() });
    }

    let mut coefficients = [0i16; COEFFICIENT_COUNT];
    for (c, pair) in coefficients.iter_mut().zip(raw.chunks_exact(2)) {
        *c = i16::from_be_bytes([pair[0], pair[1]]);
    }
    Ok(coefficients)
}

/// Borrowed view of the predicted speed sections of a tile.
///
/// `offsets` has one entry per directed edge: the start of the edge's profile in `profiles`,
/// measured in coefficients. Entries for edges without a profile are meaningless,
/// so check [`DirectedEdge::has_predicted_speed`](super::DirectedEdge::has_predicted_speed) first.
#[derive(Debug, Clone, Copy)]
pub struct PredictedSpeeds<'a> {
    offsets: &'a [U32<LE>],
    profiles: &'a [I16<LE>],
}

impl<'a> PredictedSpeeds<'a> {
    pub(crate) fn new(offsets: &'a [U32<LE>], profiles: &'a [I16<LE>]) -> Self {
        Self { offsets, profiles }
    }

    /// Number of profiles in the section.
    pub fn profile_count(&self) -> usize {
        self.profiles.len() / COEFFICIENT_COUNT
    }

    /// The coefficients of the profile for an edge.
    ///
    /// Returns `None` if the offset points outside the profile section.
    pub fn profile(&self, directed_edge_index: usize) -> Option<[i16; COEFFICIENT_COUNT]> {
        let start = self.offsets.get(directed_edge_index)?.get() as usize;
        let profile = self.profiles.get(start..start + COEFFICIENT_COUNT)?;

        let mut coefficients = [0i16; COEFFICIENT_COUNT];
        for (c, value) in coefficients.iter_mut().zip(profile) {
            *c = value.get();
        }
        Some(coefficients)
    }

    /// The predicted speed (kph) of an edge at a time of week.
    ///
    /// `seconds_from_start_of_week` is measured from midnight Sunday, local time.
    pub fn speed(&self, directed_edge_index: usize, seconds_from_start_of_week: u32) -> Option<f32> {
        let bucket = bucket_for_seconds(seconds_from_start_of_week)?;
        let coefficients = self.profile(directed_edge_index)?;
        Some(decompress_speed_bucket(&coefficients, bucket))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bucket_layout() {
        assert_eq!(BUCKETS_PER_WEEK, 2016);
        assert_eq!(bucket_for_seconds(0), Some(0));
        assert_eq!(bucket_for_seconds(299), Some(0));
        assert_eq!(bucket_for_seconds(300), Some(1));
        assert_eq!(bucket_for_seconds(7 * 24 * 3600 - 1), Some(2015));
        assert_eq!(bucket_for_seconds(7 * 24 * 3600), None);
    }

    #[test]
    fn test_bucket_labels() {
        assert_eq!(bucket_label(0), "Sun 00:00");
        assert_eq!(bucket_label(1), "Sun 00:05");
        assert_eq!(bucket_label(288 + 103), "Mon 08:35");
        assert_eq!(bucket_label(2015), "Sat 23:55");
    }

    #[test]
    fn test_constant_week() {
        let coefficients = compress_speed_buckets(&[50.0; BUCKETS_PER_WEEK]);

        // A flat week is all DC
        assert!(coefficients[0] > 0);
        assert!(coefficients[1..].iter().all(|&c| c == 0));

        for bucket in [0, 1, 1000, 2015] {
            let speed = decompress_speed_bucket(&coefficients, bucket);
            assert!((speed - 50.0).abs() < 0.1, "bucket {bucket}: {speed}");
        }
    }

    #[test]
    fn test_base64_roundtrip() {
        let mut coefficients = [0i16; COEFFICIENT_COUNT];
        coefficients[0] = 2245;
        coefficients[1] = -17;
        coefficients[199] = i16::MIN;

        let encoded = encode_compressed_speeds(&coefficients);
        assert_eq!(decode_compressed_speeds(&encoded).unwrap(), coefficients);
    }

    #[test]
    fn test_decode_errors() {
        assert!(matches!(
            decode_compressed_speeds("not base64!"),
            Err(PredictedSpeedCodecError::Base64(_))
        ));
        assert!(matches!(
            decode_compressed_speeds("AAAA"),
            Err(PredictedSpeedCodecError::IncorrectByteCount { count: 3 })
        ));
    }

    #[test]
    fn test_view_lookup() {
        let mut raw = vec![I16::<LE>::new(0); 2 * COEFFICIENT_COUNT];
        let profile = compress_speed_buckets(&[80.0; BUCKETS_PER_WEEK]);
        for (slot, value) in raw[COEFFICIENT_COUNT..].iter_mut().zip(profile) {
            *slot = I16::new(value);
        }
        #[expect(clippy::cast_possible_truncation)]
        let offsets = [U32::new(0), U32::new(COEFFICIENT_COUNT as u32), U32::new(u32::MAX)];
        let speeds = PredictedSpeeds::new(&offsets, &raw);

        assert_eq!(speeds.profile_count(), 2);
        assert_eq!(speeds.profile(1), Some(profile));
        let speed = speeds.speed(1, 12 * 3600).unwrap();
        assert!((speed - 80.0).abs() < 0.1);
        assert!(speeds.speed(0, 0).unwrap().abs() < f32::EPSILON);
        assert_eq!(speeds.profile(2), None);
        assert_eq!(speeds.speed(1, 8 * 24 * 3600), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn prop_smooth_week_roundtrip(
            base in 20.0f32..80.0,
            amplitude in 0.0f32..20.0,
            phase in 0.0f32..std::f32::consts::TAU,
        ) {
            let mut speeds = [0f32; BUCKETS_PER_WEEK];
            for (i, speed) in speeds.iter_mut().enumerate() {
                // One cycle per day
                #[expect(clippy::cast_precision_loss)]
                let t = i as f32 * std::f32::consts::TAU / 288.0;
                *speed = base + amplitude * (t + phase).sin();
            }

            let coefficients = compress_speed_buckets(&speeds);
            for (bucket, &expected) in speeds.iter().enumerate() {
                let decoded = decompress_speed_bucket(&coefficients, bucket);
                prop_assert!((decoded - expected).abs() <= 2.0, "bucket {}: {} vs {}", bucket, decoded, expected);
            }
        }
    }
}
