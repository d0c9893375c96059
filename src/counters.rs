//! Bit-packed HyperLogLog register array.
//!
//! Stores one probabilistic cardinality counter per logical index (in this
//! crate, one counter per `(vertex, hop)` pair is held by the
//! [`crate::engine::NeighbourhoodEngine`]). Registers are packed
//! `register_size` bits wide into dense chunks of [`BitFieldVec`], mirroring
//! `webgraph-algo`'s `utils::hyper_log_log` counter array but without its
//! atomic backend: the engine's concurrency model (`spec.md` §5) serialises
//! all mutation, so plain `BitFieldVec`s are enough and let the array grow
//! in place as new vertices appear.

use crate::error::{EngineError, Result};
use std::hash::{BuildHasher, Hasher};
use sux::bits::BitFieldVec;
use value_traits::slices::{SliceByValue, SliceByValueMut};

/// Registers are kept in chunks of at most this many registers, so that a
/// single allocation never grows unboundedly as the vertex set grows.
const MAX_REGISTERS_PER_CHUNK: usize = 1 << 20;

/// The growth factor applied, compounded, whenever an array needs to hold
/// more counters than it currently has room for.
const GROWTH_FACTOR: f64 = 1.1;

/// A 64-bit avalanche mix used to hash elements added to a counter.
///
/// Plays the role of the Jenkins 96-bit mix described in `spec.md` §4.A:
/// any two arrays built with the same `seed` hash identically, which is the
/// only requirement for later unioning them.
#[derive(Debug, Clone, Copy)]
struct SeededHasher(u64);

impl BuildHasher for SeededHasher {
    type Hasher = SeededMixHasher;

    fn build_hasher(&self) -> Self::Hasher {
        SeededMixHasher(self.0)
    }
}

struct SeededMixHasher(u64);

impl Hasher for SeededMixHasher {
    fn finish(&self) -> u64 {
        // splitmix64 finalizer
        let mut z = self.0;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
        z ^ (z >> 31)
    }

    fn write(&mut self, bytes: &[u8]) {
        for chunk in bytes.chunks(8) {
            let mut buf = [0u8; 8];
            buf[..chunk.len()].copy_from_slice(chunk);
            self.0 = (self.0 ^ u64::from_le_bytes(buf)).wrapping_mul(0x9e3779b97f4a7c15);
            self.0 = self.0.rotate_left(31);
        }
    }
}

/// Returns the logarithm of the number of registers needed to attain the
/// given relative standard deviation.
pub fn log_2_number_of_registers(rsd: f64) -> usize {
    ((1.106 / rsd).powi(2)).log2().ceil() as usize
}

/// Returns the relative standard deviation attained by `log_2_num_registers`.
pub fn relative_standard_deviation(log_2_num_registers: usize) -> f64 {
    let c = match log_2_num_registers {
        4 => 1.106,
        5 => 1.070,
        6 => 1.054,
        7 => 1.046,
        _ => 1.04,
    };
    c / ((1u64 << log_2_num_registers) as f64).sqrt()
}

/// Returns the register size in bits needed to count up to `n` distinct
/// elements without the per-register rank overflowing.
pub fn register_size_from_number_of_elements(n: usize) -> usize {
    std::cmp::max(
        5,
        (((n.max(1) as f64).ln() / 2f64.ln()) / 2f64.ln())
            .ln()
            .ceil()
            .max(0.0) as usize,
    )
}

/// Builder for [`PackedCounterArray`].
#[derive(Debug, Clone)]
pub struct PackedCounterArrayBuilder {
    log_2_num_registers: usize,
    num_elements_upper_bound: usize,
    seed: u64,
}

impl Default for PackedCounterArrayBuilder {
    fn default() -> Self {
        Self {
            log_2_num_registers: 4,
            num_elements_upper_bound: 1,
            seed: 0,
        }
    }
}

impl PackedCounterArrayBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `log2 m`, the low-level alternative to [`Self::rsd`].
    pub fn log_2_num_registers(mut self, log_2_num_registers: usize) -> Self {
        self.log_2_num_registers = log_2_num_registers;
        self
    }

    /// Sets the desired relative standard deviation, the high-level
    /// alternative to [`Self::log_2_num_registers`].
    pub fn rsd(mut self, rsd: f64) -> Self {
        self.log_2_num_registers = log_2_number_of_registers(rsd);
        self
    }

    /// Sets an upper bound on the number of distinct elements any single
    /// counter will ever hold; this determines `register_size`.
    pub fn num_elements_upper_bound(mut self, n: usize) -> Self {
        self.num_elements_upper_bound = n;
        self
    }

    /// Sets the hash seed. Two arrays that will ever be unioned or compared
    /// must share the same seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Builds an array with room for `len` counters.
    pub fn build(self, len: usize) -> Result<PackedCounterArray> {
        if self.log_2_num_registers < 4 || self.log_2_num_registers > 30 {
            return Err(EngineError::InvalidArgument(format!(
                "log_2_num_registers must be in [4, 30], got {}",
                self.log_2_num_registers
            )));
        }
        PackedCounterArray::new(
            self.log_2_num_registers,
            self.num_elements_upper_bound,
            self.seed,
            len,
        )
    }
}

/// A chunk-packed array of HyperLogLog counters, generalised over an
/// arbitrary, growable number of logical counters.
pub struct PackedCounterArray {
    log_2_num_registers: usize,
    num_registers: usize,
    num_registers_minus_1: u64,
    register_size: usize,
    alpha_m_m: f64,
    sentinel_mask: u64,
    seed: u64,
    /// Registers per chunk, always `<= MAX_REGISTERS_PER_CHUNK / num_registers`.
    counters_per_chunk: usize,
    /// Number of `u64` words needed to hold one counter's registers.
    counter_longwords: usize,
    /// A mask with a `1` in the most significant bit of each register,
    /// expanded to exactly `counter_longwords` words (resolves `spec.md`
    /// §9's open question (b): the pattern is materialised in full rather
    /// than wrapped with a modulus).
    msb_mask: Vec<u64>,
    /// Same as `msb_mask` but for the least significant bit of each register.
    lsb_mask: Vec<u64>,
    /// Mask of the bits actually used in the last word of a counter.
    residual_mask: u64,
    chunks: Vec<BitFieldVec<Vec<u64>>>,
    /// Logical number of counters currently exposed to callers.
    num_counters: usize,
}

impl PackedCounterArray {
    fn new(
        log_2_num_registers: usize,
        num_elements_upper_bound: usize,
        seed: u64,
        len: usize,
    ) -> Result<Self> {
        let num_registers = 1usize << log_2_num_registers;
        let register_size = register_size_from_number_of_elements(num_elements_upper_bound);
        let sentinel_mask = 1u64 << ((1u64 << register_size) - 2);
        let alpha = match log_2_num_registers {
            4 => 0.673,
            5 => 0.697,
            6 => 0.709,
            _ => 0.7213 / (1.0 + 1.079 / num_registers as f64),
        };
        let counter_longwords = (num_registers * register_size + 63) / 64;
        let (msb_mask, lsb_mask) = build_masks(num_registers, register_size, counter_longwords);
        let residual_bits = counter_longwords * 64 - num_registers * register_size;
        let residual_mask = if residual_bits == 0 {
            u64::MAX
        } else {
            u64::MAX >> residual_bits
        };

        let counters_per_chunk = std::cmp::max(1, MAX_REGISTERS_PER_CHUNK / num_registers);

        let mut array = Self {
            log_2_num_registers,
            num_registers,
            num_registers_minus_1: (num_registers - 1) as u64,
            register_size,
            alpha_m_m: alpha * (num_registers as f64).powi(2),
            sentinel_mask,
            seed,
            counters_per_chunk,
            counter_longwords,
            msb_mask,
            lsb_mask,
            residual_mask,
            chunks: Vec::new(),
            num_counters: 0,
        };
        array.add_counters(len)?;
        Ok(array)
    }

    pub fn log_2_num_registers(&self) -> usize {
        self.log_2_num_registers
    }

    pub fn num_registers(&self) -> usize {
        self.num_registers
    }

    pub fn register_size(&self) -> usize {
        self.register_size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn len(&self) -> usize {
        self.num_counters
    }

    pub fn is_empty(&self) -> bool {
        self.num_counters == 0
    }

    pub fn counter_longwords(&self) -> usize {
        self.counter_longwords
    }

    fn same_shape(&self, other: &Self) -> bool {
        self.log_2_num_registers == other.log_2_num_registers
            && self.register_size == other.register_size
            && self.seed == other.seed
    }

    fn locate(&self, k: usize) -> (usize, usize) {
        let chunk = k / self.counters_per_chunk;
        let offset = (k % self.counters_per_chunk) * self.num_registers;
        (chunk, offset)
    }

    fn hash_one<T: std::hash::Hash>(&self, value: T) -> u64 {
        let builder = SeededHasher(self.seed);
        builder.hash_one(value)
    }

    /// Adds `value` to counter `k`, i.e. records it as a (possibly
    /// already-seen) member of the set counter `k` is tracking.
    pub fn add<T: std::hash::Hash>(&mut self, k: usize, value: T) {
        assert!(k < self.num_counters, "counter index {k} out of bounds");
        let x = self.hash_one(value);
        let j = (x & self.num_registers_minus_1) as usize;
        let r = ((x >> self.log_2_num_registers) | self.sentinel_mask).trailing_zeros() as u64 + 1;

        let (chunk, offset) = self.locate(k);
        let bits = &mut self.chunks[chunk];
        let current = bits.index_value(offset + j);
        if r > current {
            bits.set_value(offset + j, r);
        }
    }

    /// Returns the HyperLogLog cardinality estimate for counter `k`.
    pub fn count(&self, k: usize) -> f64 {
        if k >= self.num_counters {
            // spec.md §7: an out-of-range index on query is not an error,
            // zero is simply a valid answer.
            return 0.0;
        }
        let (chunk, offset) = self.locate(k);
        let bits = &self.chunks[chunk];
        let mut harmonic_mean = 0.0;
        let mut zeroes = 0usize;
        for i in 0..self.num_registers {
            let value = bits.index_value(offset + i);
            if value == 0 {
                zeroes += 1;
            }
            harmonic_mean += 1.0 / (1u64 << value) as f64;
        }
        let mut estimate = self.alpha_m_m / harmonic_mean;
        if zeroes != 0 && estimate < 2.5 * self.num_registers as f64 {
            estimate = self.num_registers as f64 * (self.num_registers as f64 / zeroes as f64).ln();
        }
        estimate
    }

    /// Zeroes every register of counter `k`, leaving surrounding counters
    /// untouched.
    pub fn clear_counter(&mut self, k: usize) {
        let (chunk, offset) = self.locate(k);
        let bits = &mut self.chunks[chunk];
        for i in 0..self.num_registers {
            bits.set_value(offset + i, 0);
        }
    }

    /// Copies counter `k`'s raw registers into a dense scratch buffer of
    /// [`Self::counter_longwords`] words.
    pub fn get_counter(&self, k: usize, dest: &mut Vec<u64>) {
        dest.clear();
        dest.resize(self.counter_longwords, 0);
        let (chunk, offset) = self.locate(k);
        let bits = &self.chunks[chunk];
        self.pack_registers(bits, offset, dest);
    }

    /// Overwrites counter `k`'s registers from a dense scratch buffer
    /// produced by [`Self::get_counter`] (on a compatibly-shaped array).
    pub fn set_counter(&mut self, src: &[u64], k: usize) {
        let (chunk, offset) = self.locate(k);
        let register_size = self.register_size;
        let num_registers = self.num_registers;
        let bits = &mut self.chunks[chunk];
        for i in 0..num_registers {
            let bit_pos = i * register_size;
            let word = bit_pos / 64;
            let bit_off = bit_pos % 64;
            let mut value = src[word] >> bit_off;
            if bit_off + register_size > 64 {
                value |= src[word + 1] << (64 - bit_off);
            }
            value &= (1u64 << register_size) - 1;
            bits.set_value(offset + i, value);
        }
    }

    fn pack_registers(&self, bits: &BitFieldVec<Vec<u64>>, offset: usize, dest: &mut [u64]) {
        pack_into(bits, offset, self.register_size, self.num_registers, dest);
    }

    /// Copies counter `k` from `self` into counter `k` of `dst`, which must
    /// have an identical shape.
    pub fn transfer(&self, k: usize, dst: &mut Self) -> Result<()> {
        self.transfer_at(k, dst, k)
    }

    /// Copies counter `src_k` from `self` into counter `dst_k` of `dst`,
    /// which must have an identical shape. Unlike [`Self::transfer`], the
    /// source and destination indices need not match, which is what lets a
    /// length-1 scratch array recomputed at index `0` be written back into
    /// an arbitrary vertex's slot.
    pub fn transfer_at(&self, src_k: usize, dst: &mut Self, dst_k: usize) -> Result<()> {
        self.require_same_shape(dst)?;
        let mut buf = Vec::new();
        self.get_counter(src_k, &mut buf);
        dst.set_counter(&buf, dst_k);
        Ok(())
    }

    fn require_same_shape(&self, other: &Self) -> Result<()> {
        if !self.same_shape(other) {
            return Err(EngineError::IncompatibleShape(format!(
                "log2m/register_size/seed mismatch: ({}, {}, {}) vs ({}, {}, {})",
                self.log_2_num_registers,
                self.register_size,
                self.seed,
                other.log_2_num_registers,
                other.register_size,
                other.seed
            )));
        }
        Ok(())
    }

    /// Register-wise max of counter `k_self` (in `self`) with counter
    /// `k_other` (in `other`), written back into `k_self`.
    ///
    /// Implements the Boldi–Vigna broadword "max" over packed registers
    /// described in `spec.md` §4.A. Falls back to a plain register-by-
    /// register loop when the two counters are not `u64`-aligned to the
    /// same boundary, which is always correct and only costs performance.
    pub fn union_counters(&mut self, k_self: usize, other: &Self, k_other: usize) -> Result<()> {
        self.require_same_shape(other)?;
        let (chunk_a, offset_a) = self.locate(k_self);
        let (chunk_b, offset_b) = other.locate(k_other);
        let a_bits = &mut self.chunks[chunk_a];
        let b_bits = &other.chunks[chunk_b];

        if offset_a % 64 == 0 && offset_b % 64 == 0 {
            let mut x = vec![0u64; self.counter_longwords];
            let mut y = vec![0u64; self.counter_longwords];
            pack_into(a_bits, offset_a, self.register_size, self.num_registers, &mut x);
            pack_into(b_bits, offset_b, self.register_size, self.num_registers, &mut y);
            broadword_max(
                &mut x,
                &y,
                &self.msb_mask,
                &self.lsb_mask,
                self.register_size,
                self.residual_mask,
            );
            unpack_from(a_bits, offset_a, self.register_size, self.num_registers, &x);
        } else {
            for i in 0..self.num_registers {
                let a = a_bits.index_value(offset_a + i);
                let b = b_bits.index_value(offset_b + i);
                if b > a {
                    a_bits.set_value(offset_a + i, b);
                }
            }
        }
        Ok(())
    }

    /// Register-wise max across two whole arrays of identical shape:
    /// `self[k] <- max(self[k], other[k])` for every `k`.
    pub fn union(&mut self, other: &Self) -> Result<()> {
        self.require_same_shape(other)?;
        if self.num_counters != other.num_counters {
            return Err(EngineError::IncompatibleShape(format!(
                "counter count mismatch: {} vs {}",
                self.num_counters, other.num_counters
            )));
        }
        for k in 0..self.num_counters {
            self.union_counters(k, other, k)?;
        }
        Ok(())
    }

    /// Grows the array so it can hold `self.len() + n` counters, using the
    /// 1.1x compounding growth policy. New counters read as zero.
    pub fn add_counters(&mut self, n: usize) -> Result<()> {
        let n = match i64::try_from(n) {
            Ok(v) if v >= 0 => n,
            _ => {
                return Err(EngineError::InvalidArgument(format!(
                    "addCounters argument must be non-negative, got {n}"
                )))
            }
        };
        let old_capacity = self.chunks.len() * self.counters_per_chunk;
        let new_size = self.num_counters + n;
        if new_size <= old_capacity {
            self.num_counters = new_size;
            return Ok(());
        }
        let mut capacity = old_capacity.max(1) as f64;
        while (capacity as usize) < new_size {
            capacity *= GROWTH_FACTOR;
        }
        let new_capacity = capacity as usize;
        let needed_chunks = (new_capacity + self.counters_per_chunk - 1) / self.counters_per_chunk;
        while self.chunks.len() < needed_chunks {
            self.chunks.push(BitFieldVec::new(
                self.register_size,
                self.counters_per_chunk * self.num_registers,
            ));
        }
        self.num_counters = new_size;
        Ok(())
    }

    /// Builds a fresh array of length `indices.len()` populated from
    /// `self` at the given indices, sharing this array's seed so it can
    /// later be unioned back.
    pub fn extract(&self, indices: &[usize]) -> Result<Self> {
        let mut extracted = PackedCounterArrayBuilder::new()
            .log_2_num_registers(self.log_2_num_registers)
            .seed(self.seed)
            .build(indices.len())?;
        // `build` derives register_size from an element upper bound; force
        // it to match `self` exactly since we're copying raw registers.
        extracted.register_size = self.register_size;
        extracted.counter_longwords = self.counter_longwords;
        extracted.alpha_m_m = self.alpha_m_m;
        extracted.sentinel_mask = self.sentinel_mask;
        extracted.residual_mask = self.residual_mask;
        extracted.msb_mask = self.msb_mask.clone();
        extracted.lsb_mask = self.lsb_mask.clone();
        extracted.counters_per_chunk = self.counters_per_chunk;
        extracted.chunks.clear();
        let needed_chunks =
            (indices.len() + extracted.counters_per_chunk - 1) / extracted.counters_per_chunk.max(1);
        for _ in 0..needed_chunks.max(1) {
            extracted.chunks.push(BitFieldVec::new(
                self.register_size,
                extracted.counters_per_chunk * self.num_registers,
            ));
        }
        let mut buf = Vec::new();
        for (dst_k, &src_k) in indices.iter().enumerate() {
            self.get_counter(src_k, &mut buf);
            extracted.set_counter(&buf, dst_k);
        }
        Ok(extracted)
    }
}

impl Clone for PackedCounterArray {
    fn clone(&self) -> Self {
        let mut chunks = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            let mut cloned = BitFieldVec::new(self.register_size, chunk.len());
            for i in 0..chunk.len() {
                cloned.set_value(i, chunk.index_value(i));
            }
            chunks.push(cloned);
        }
        Self {
            log_2_num_registers: self.log_2_num_registers,
            num_registers: self.num_registers,
            num_registers_minus_1: self.num_registers_minus_1,
            register_size: self.register_size,
            alpha_m_m: self.alpha_m_m,
            sentinel_mask: self.sentinel_mask,
            seed: self.seed,
            counters_per_chunk: self.counters_per_chunk,
            counter_longwords: self.counter_longwords,
            msb_mask: self.msb_mask.clone(),
            lsb_mask: self.lsb_mask.clone(),
            residual_mask: self.residual_mask,
            chunks,
            num_counters: self.num_counters,
        }
    }
}

fn build_masks(num_registers: usize, register_size: usize, counter_longwords: usize) -> (Vec<u64>, Vec<u64>) {
    let mut msb = vec![0u64; counter_longwords];
    let mut lsb = vec![0u64; counter_longwords];
    for i in 0..num_registers {
        let msb_bit = i * register_size + register_size - 1;
        let lsb_bit = i * register_size;
        msb[msb_bit / 64] |= 1u64 << (msb_bit % 64);
        lsb[lsb_bit / 64] |= 1u64 << (lsb_bit % 64);
    }
    (msb, lsb)
}

fn pack_into(
    bits: &BitFieldVec<Vec<u64>>,
    offset: usize,
    register_size: usize,
    num_registers: usize,
    dest: &mut [u64],
) {
    for i in 0..num_registers {
        let bit_pos = i * register_size;
        let word = bit_pos / 64;
        let bit_off = bit_pos % 64;
        let value = bits.index_value(offset + i);
        dest[word] |= value << bit_off;
        if bit_off + register_size > 64 {
            dest[word + 1] |= value >> (64 - bit_off);
        }
    }
}

fn unpack_from(
    bits: &mut BitFieldVec<Vec<u64>>,
    offset: usize,
    register_size: usize,
    num_registers: usize,
    src: &[u64],
) {
    let mask = (1u64 << register_size) - 1;
    for i in 0..num_registers {
        let bit_pos = i * register_size;
        let word = bit_pos / 64;
        let bit_off = bit_pos % 64;
        let mut value = src[word] >> bit_off;
        if bit_off + register_size > 64 {
            value |= src[word + 1] << (64 - bit_off);
        }
        bits.set_value(offset + i, value & mask);
    }
}

/// In-place register-wise max of two packed counters, following the
/// Boldi–Vigna broadword comparison: for each register (of `register_size`
/// bits), computes whether `y`'s value is strictly greater than `x`'s using
/// only word-parallel operations, then selects `x` or `y` accordingly.
fn broadword_max(x: &mut [u64], y: &[u64], msb_mask: &[u64], lsb_mask: &[u64], register_size: usize, last_word_mask: u64) {
    let n = x.len();
    let mut acc = vec![0u64; n];
    let mut mask = vec![0u64; n];

    for i in 0..n {
        let last_mask = if i == n - 1 { last_word_mask } else { u64::MAX };
        let y_word = y[i] & last_mask;
        let x_word = x[i] & last_mask;
        acc[i] = y_word | msb_mask[i];
        mask[i] = x_word & !msb_mask[i];
    }
    // acc -= mask (i.e. acc -= x & !H_r), as a genuine multi-word subtraction:
    // a per-word wrapping_sub here would drop the borrow a register crossing a
    // word boundary needs from its neighbour.
    subtract_in_place(&mut acc, &mask);

    for i in 0..n {
        let last_mask = if i == n - 1 { last_word_mask } else { u64::MAX };
        let y_word = y[i] & last_mask;
        let x_word = x[i] & last_mask;
        acc[i] = ((acc[i] | (y_word ^ x_word)) ^ (y_word | !x_word)) & msb_mask[i];
    }

    let shift = register_size - 1;
    for i in 0..n {
        let shifted = acc[i] >> shift;
        let carry_in = if i + 1 < n {
            acc[i + 1] << (64 - shift)
        } else {
            0
        };
        mask[i] = (shifted | carry_in) | msb_mask[i];
    }

    subtract_in_place(&mut mask, lsb_mask);

    for i in 0..n {
        mask[i] = (mask[i] | msb_mask[i]) ^ acc[i];
    }

    for i in 0..n {
        let last_mask = if i == n - 1 { last_word_mask } else { u64::MAX };
        let new_x = x[i] ^ ((x[i] ^ y[i]) & mask[i]);
        x[i] = (x[i] & !last_mask) | (new_x & last_mask);
    }
}

/// Multi-precision subtraction `x -= y`, word by word with explicit borrow
/// propagation, leaving the result in `x`.
fn subtract_in_place(x: &mut [u64], y: &[u64]) {
    let mut borrow = false;
    for (xw, &yw) in x.iter_mut().zip(y.iter()) {
        let (a, b1) = xw.overflowing_sub(yw);
        let (a, b2) = if borrow { a.overflowing_sub(1) } else { (a, false) };
        *xw = a;
        borrow = b1 || b2;
    }
}
