//! Region id encodings for partition images
//!
//! The preferred path is an explicit integer id per pixel. The normalized
//! float mode stores `id / num_regions` in a single color channel, which is
//! how GPU rasterizers commonly write ids into a render target. That channel
//! is lossy: once the channel's quantization error exceeds `0.5 / num_regions`
//! two ids decode to the same value, so every format carries a region budget.

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Storage format of a normalized float id channel
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelFormat {
    /// 8-bit unsigned normalized (`RGBA8` style targets)
    Unorm8,
    /// 16-bit unsigned normalized
    Unorm16,
    /// IEEE half float (11 significant bits)
    Float16,
    /// IEEE single float (24 significant bits)
    Float32,
}

impl ChannelFormat {
    /// Spacing between representable values just below 1.0
    pub fn step(self) -> f64 {
        match self {
            ChannelFormat::Unorm8 => 1.0 / 255.0,
            ChannelFormat::Unorm16 => 1.0 / 65_535.0,
            ChannelFormat::Float16 => 2f64.powi(-11),
            ChannelFormat::Float32 => 2f64.powi(-24),
        }
    }

    /// Largest region count whose ids survive an encode/decode round trip
    ///
    /// At `num_regions = 1 / step` every `id / num_regions` lands exactly on
    /// the channel grid; below it the rounding error stays under half an id.
    pub fn max_regions(self) -> usize {
        match self {
            ChannelFormat::Unorm8 => 255,
            ChannelFormat::Unorm16 => 65_535,
            ChannelFormat::Float16 => 1 << 11,
            ChannelFormat::Float32 => 1 << 24,
        }
    }

    /// Round a value in `[0, 1]` to the nearest value this format can store
    pub fn quantize(self, value: f64) -> f64 {
        match self {
            ChannelFormat::Unorm8 | ChannelFormat::Unorm16 => {
                let levels = 1.0 / self.step();
                (value.clamp(0.0, 1.0) * levels).round() / levels
            }
            ChannelFormat::Float16 => {
                if value == 0.0 {
                    return 0.0;
                }
                // Subnormal halves share the spacing of the smallest normal exponent.
                let exponent = value.abs().log2().floor().max(-14.0);
                let spacing = 2f64.powf(exponent - 10.0);
                (value / spacing).round() * spacing
            }
            ChannelFormat::Float32 => value as f32 as f64,
        }
    }

    /// Get a human-readable name for this format
    pub fn name(self) -> &'static str {
        match self {
            ChannelFormat::Unorm8 => "unorm8",
            ChannelFormat::Unorm16 => "unorm16",
            ChannelFormat::Float16 => "float16",
            ChannelFormat::Float32 => "float32",
        }
    }
}

/// How the rasterizer hands region ids to the aggregation engine
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IdEncoding {
    /// Exact `u32` id per pixel
    #[default]
    Integer,
    /// `id / num_regions` stored in a single float channel
    NormalizedFloat(ChannelFormat),
}

impl IdEncoding {
    /// Largest region count this encoding can represent without aliasing
    pub fn max_regions(self) -> usize {
        match self {
            IdEncoding::Integer => u32::MAX as usize,
            IdEncoding::NormalizedFloat(format) => format.max_regions(),
        }
    }

    /// Whether ids pass through a lossy channel
    #[inline]
    pub fn is_lossy(self) -> bool {
        matches!(self, IdEncoding::NormalizedFloat(_))
    }
}

/// Encode a region id as a quantized `id / num_regions` channel value
pub fn encode_normalized(id: u32, num_regions: usize, format: ChannelFormat) -> f32 {
    let value = id as f64 / num_regions as f64;
    format.quantize(value) as f32
}

/// Decode a channel value back into a region id
///
/// Uses `round`, not `floor`: a value that quantized to just below
/// `id / num_regions` still decodes to `id`. Values that decode outside
/// `[0, num_regions)` are passed through as out-of-range ids (non-finite and
/// negative values become `u32::MAX`) so partition validation reports them.
pub fn decode_normalized(value: f32, num_regions: usize) -> u32 {
    let id = (value as f64 * num_regions as f64).round();
    if !id.is_finite() || id < 0.0 {
        return u32::MAX;
    }
    id.min(u32::MAX as f64) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trips(num_regions: usize, format: ChannelFormat) -> bool {
        (0..num_regions as u32)
            .all(|id| decode_normalized(encode_normalized(id, num_regions, format), num_regions) == id)
    }

    #[test]
    fn test_ids_survive_within_budget() {
        assert!(round_trips(ChannelFormat::Unorm8.max_regions(), ChannelFormat::Unorm8));
        assert!(round_trips(200, ChannelFormat::Unorm8));
        assert!(round_trips(ChannelFormat::Float16.max_regions(), ChannelFormat::Float16));
        assert!(round_trips(1500, ChannelFormat::Float16));
        assert!(round_trips(10_000, ChannelFormat::Unorm16));
        assert!(round_trips(100_000, ChannelFormat::Float32));
    }

    #[test]
    fn test_float32_near_budget() {
        let n = ChannelFormat::Float32.max_regions() - 3;
        for id in [0u32, 1, 2, (n / 2) as u32, (n - 2) as u32, (n - 1) as u32] {
            assert_eq!(decode_normalized(encode_normalized(id, n, ChannelFormat::Float32), n), id);
        }
    }

    #[test]
    fn test_ids_alias_beyond_budget() {
        // 512 regions in an 8-bit channel: ids 0 and 1 both quantize to 0/255.
        let a = encode_normalized(0, 512, ChannelFormat::Unorm8);
        let b = encode_normalized(1, 512, ChannelFormat::Unorm8);
        assert_eq!(decode_normalized(a, 512), decode_normalized(b, 512));
        assert!(!round_trips(512, ChannelFormat::Unorm8));
    }

    #[test]
    fn test_decode_out_of_range() {
        assert_eq!(decode_normalized(1.0, 10), 10);
        assert_eq!(decode_normalized(0.96, 10), 10);
        assert_eq!(decode_normalized(-0.2, 10), u32::MAX);
        assert_eq!(decode_normalized(f32::NAN, 10), u32::MAX);
        assert_eq!(decode_normalized(f32::INFINITY, 10), u32::MAX);
        assert_eq!(decode_normalized(-0.01, 10), 0);
    }

    #[test]
    fn test_float16_quantize() {
        let q = ChannelFormat::Float16.quantize(0.75 + 2f64.powi(-13));
        assert_eq!(q, 0.75);
        assert_eq!(ChannelFormat::Float16.quantize(0.0), 0.0);
    }

    #[test]
    fn test_integer_budget() {
        assert_eq!(IdEncoding::Integer.max_regions(), u32::MAX as usize);
        assert!(!IdEncoding::Integer.is_lossy());
        assert!(IdEncoding::NormalizedFloat(ChannelFormat::Float32).is_lossy());
    }
}
