//! Packed render-order key.
//!
//! ```text
//! 63              32 31               0
//! +----------------+------------------+
//! |    priority    | distance (fixed) |
//! +----------------+------------------+
//! ```
//!
//! Keys compare as plain integers, so the order is lexicographic over
//! `(priority, quantized distance)`.

/// Fixed-point scale applied to camera distances (10 fractional bits).
pub const DISTANCE_SCALE: f32 = 1024.0;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OrderKey(u64);

impl OrderKey {
    #[must_use]
    pub fn new(priority: u32, distance: f32) -> Self {
        Self((u64::from(priority) << 32) | u64::from(Self::quantize(distance)))
    }

    /// Quantizes a camera distance. Negative and NaN distances map to 0,
    /// distances past the representable range saturate.
    #[must_use]
    pub fn quantize(distance: f32) -> u32 {
        if distance.is_nan() || distance <= 0.0 {
            return 0;
        }
        let scaled = distance * DISTANCE_SCALE;
        if scaled >= u32::MAX as f32 {
            u32::MAX
        } else {
            scaled as u32
        }
    }

    #[inline]
    #[must_use]
    pub fn priority(self) -> u32 {
        (self.0 >> 32) as u32
    }

    #[inline]
    #[must_use]
    pub fn quantized_distance(self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }

    #[inline]
    #[must_use]
    pub fn raw(self) -> u64 {
        self.0
    }
}
