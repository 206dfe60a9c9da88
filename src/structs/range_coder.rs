use anyhow::{Context, Result};

use crate::here;

/// Top of the renormalization window: after every `encode`/`decode` step
/// `range` is renormalized back up to at least `TOP` by shifting out
/// whole bytes.
const TOP: u64 = 1 << 56;
/// Underflow threshold: once `range` drops below this without the
/// no-carry shortcut being available, `range` is clamped so the encoder
/// never straddles a `BOTTOM`-aligned boundary (range-underflow
/// renormalization).
const BOTTOM: u64 = 1 << 48;

/// A probability model: a monotone cumulative frequency table over a
/// contiguous range of integer symbols `[min_index, max_index]`.
pub trait PModel {
    /// Frequency of symbol `index`.
    fn c_freq(&self, index: u32) -> u32;
    /// Sum of `c_freq` over all symbols strictly less than `index`.
    fn cum_freq(&self, index: u32) -> u32;
    fn min_index(&self) -> u32;
    fn max_index(&self) -> u32;

    fn total_freq(&self) -> u32 {
        self.cum_freq(self.max_index() + 1)
    }
}

/// Flat distribution over `[0, N)`, each symbol weighted 1. Used for the
/// header fields (width, height, per-unit quantized parameter indices).
pub struct UniformDistribution {
    level: u32,
}

impl UniformDistribution {
    pub fn new(level: u32) -> Self {
        assert!(level > 0);
        UniformDistribution { level }
    }
}

impl PModel for UniformDistribution {
    fn c_freq(&self, _index: u32) -> u32 {
        1
    }

    fn cum_freq(&self, index: u32) -> u32 {
        index.min(self.level)
    }

    fn min_index(&self) -> u32 {
        0
    }

    fn max_index(&self) -> u32 {
        self.level - 1
    }

    fn total_freq(&self) -> u32 {
        self.level
    }
}

/// A `PModel` backed by an explicit per-symbol frequency table (the
/// per-pixel mixture-distribution histogram). Every entry must be `>= 1`
/// (the mixture distribution guarantees this — see
/// `MixtureDistribution::as_histogram`), so `total_freq` never underflows
/// to zero even under floor-probability symbols.
pub struct FreqTable {
    cumulative: Vec<u32>,
}

impl FreqTable {
    /// `freq[i]` is the frequency for symbol `i`; `freq.len()` symbols
    /// numbered `0..freq.len()`.
    pub fn new(freq: &[u32]) -> Self {
        debug_assert!(!freq.is_empty());
        debug_assert!(freq.iter().all(|&f| f >= 1));
        let mut cumulative = Vec::with_capacity(freq.len() + 1);
        let mut running = 0u32;
        cumulative.push(0);
        for &f in freq {
            running += f;
            cumulative.push(running);
        }
        FreqTable { cumulative }
    }
}

impl PModel for FreqTable {
    fn c_freq(&self, index: u32) -> u32 {
        self.cumulative[index as usize + 1] - self.cumulative[index as usize]
    }

    fn cum_freq(&self, index: u32) -> u32 {
        self.cumulative[index as usize]
    }

    fn min_index(&self) -> u32 {
        0
    }

    fn max_index(&self) -> u32 {
        self.cumulative.len() as u32 - 2
    }

    fn total_freq(&self) -> u32 {
        *self.cumulative.last().unwrap()
    }
}

/// Byte-oriented 64-bit carryless range encoder.
pub struct RangeEncoder {
    low: u64,
    range: u64,
    out: Vec<u8>,
}

impl Default for RangeEncoder {
    fn default() -> Self {
        RangeEncoder {
            low: 0,
            range: u64::MAX,
            out: Vec::new(),
        }
    }
}

impl RangeEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encodes `symbol` under `model`, the way `RangeEncoder::encode` does.
    pub fn encode<M: PModel>(&mut self, symbol: u32, model: &M) {
        let total = model.total_freq() as u64;
        let cum = model.cum_freq(symbol) as u64;
        let freq = model.c_freq(symbol) as u64;

        debug_assert!(total > 0, "PModel total_freq must be nonzero");
        debug_assert!(freq > 0, "cannot encode a zero-probability symbol");

        let unit = self.range / total;
        self.low = self.low.wrapping_add(unit * cum);
        self.range = unit * freq;

        self.renormalize();
    }

    fn renormalize(&mut self) {
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) < TOP {
                // top byte of [low, low+range) is fixed: safe to emit without carry
            } else if self.range < BOTTOM {
                self.range = self.low.wrapping_neg() & (BOTTOM - 1);
            } else {
                break;
            }
            self.out.push((self.low >> 56) as u8);
            self.low <<= 8;
            self.range <<= 8;
        }
    }

    /// Flushes the remaining state (8 bytes) and returns the encoded
    /// bitstream, the way `RangeEncoder::finish` does.
    pub fn finish(mut self) -> Vec<u8> {
        for _ in 0..8 {
            self.out.push((self.low >> 56) as u8);
            self.low <<= 8;
        }
        self.out
    }
}

/// Byte-oriented 64-bit carryless range decoder, the mirror image of
/// `RangeEncoder`.
pub struct RangeDecoder<'a> {
    low: u64,
    range: u64,
    code: u64,
    input: &'a [u8],
    pos: usize,
}

impl<'a> RangeDecoder<'a> {
    /// Reads the initial 8-byte code value, the way `RangeDecoder::start`
    /// does.
    pub fn start(input: &'a [u8]) -> Result<Self> {
        let mut dec = RangeDecoder {
            low: 0,
            range: u64::MAX,
            code: 0,
            input,
            pos: 0,
        };
        for _ in 0..8 {
            dec.code = (dec.code << 8) | dec.next_byte() as u64;
        }
        Ok(dec)
    }

    fn next_byte(&mut self) -> u8 {
        let b = self.input.get(self.pos).copied().unwrap_or(0);
        self.pos += 1;
        b
    }

    /// Decodes the next symbol under `model`, the way
    /// `RangeDecoder::decode` / `binary_search_encoded_index` do.
    pub fn decode<M: PModel>(&mut self, model: &M) -> Result<u32> {
        let total = model.total_freq() as u64;
        debug_assert!(total > 0);

        let unit = self.range / total;
        let value = ((self.code.wrapping_sub(self.low)) / unit).min(total - 1);

        let symbol = self.binary_search(model, value as u32).context(here!())?;

        let cum = model.cum_freq(symbol) as u64;
        let freq = model.c_freq(symbol) as u64;
        self.low = self.low.wrapping_add(unit * cum);
        self.range = unit * freq;

        self.renormalize();

        Ok(symbol)
    }

    fn binary_search<M: PModel>(&self, model: &M, f: u32) -> Result<u32> {
        let mut lo = model.min_index();
        let mut hi = model.max_index();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if model.cum_freq(mid + 1) <= f {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        if model.cum_freq(lo) <= f && f < model.cum_freq(lo + 1) {
            Ok(lo)
        } else {
            anyhow::bail!("range decoder: symbol search failed for cumulative value {}", f)
        }
    }

    fn renormalize(&mut self) {
        loop {
            if (self.low ^ self.low.wrapping_add(self.range)) < TOP {
            } else if self.range < BOTTOM {
                self.range = self.low.wrapping_neg() & (BOTTOM - 1);
            } else {
                break;
            }
            self.low <<= 8;
            self.range <<= 8;
            self.code = (self.code << 8) | self.next_byte() as u64;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_uniform_roundtrip() {
        let symbols = [3u32, 250, 0, 255, 128, 128, 7];
        let model = UniformDistribution::new(256);

        let mut enc = RangeEncoder::new();
        for &s in &symbols {
            enc.encode(s, &model);
        }
        let bytes = enc.finish();

        let mut dec = RangeDecoder::start(&bytes).unwrap();
        for &s in &symbols {
            assert_eq!(dec.decode(&model).unwrap(), s);
        }
    }

    #[test]
    fn test_freq_table_roundtrip() {
        let freq: Vec<u32> = (0..256u32).map(|i| 1 + (i % 5)).collect();
        let model = FreqTable::new(&freq);
        let symbols = [0u32, 1, 255, 254, 100, 100, 100, 50];

        let mut enc = RangeEncoder::new();
        for &s in &symbols {
            enc.encode(s, &model);
        }
        let bytes = enc.finish();

        let mut dec = RangeDecoder::start(&bytes).unwrap();
        for &s in &symbols {
            assert_eq!(dec.decode(&model).unwrap(), s);
        }
    }

    #[test]
    fn test_long_random_stream_roundtrip() {
        use rand::{Rng, SeedableRng};
        let mut rng = rand_chacha::ChaCha8Rng::seed_from_u64(42);
        let freq: Vec<u32> = (0..256u32).map(|i| 1 + (i % 7) * 3).collect();
        let model = FreqTable::new(&freq);

        let symbols: Vec<u32> = (0..4096).map(|_| rng.gen_range(0..256)).collect();

        let mut enc = RangeEncoder::new();
        for &s in &symbols {
            enc.encode(s, &model);
        }
        let bytes = enc.finish();

        let mut dec = RangeDecoder::start(&bytes).unwrap();
        for &s in &symbols {
            assert_eq!(dec.decode(&model).unwrap(), s);
        }
    }
}
