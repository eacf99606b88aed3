// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-chunk structural indexing.
//!
//! A chunk is indexed in two phases. The staging phase copies the chunk into
//! a padded buffer, derives the per-block escape carries with a scalar
//! boundary walk, and runs the vector pass over every block in parallel,
//! producing *raw* bitmaps (each block chained as if it started outside a
//! string). The finalize phase chains the in-string state across blocks,
//! inverting the bitmaps of blocks that actually started inside a string,
//! and expands the masked structural bitmap into ascending byte positions.
//!
//! Splitting the work this way keeps the expensive pass embarrassingly
//! parallel while the strictly sequential part stays a cheap linear sweep.

use nj_core::error::{EngineError, IndexerError};
use rayon::prelude::*;

use crate::bits::{
    escaped_bytes, match_byte, prefix_xor, sign_extend, structural_bytes, VECTOR_BYTES,
};

/// Chunk and block geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    chunk_size: usize,
    block_size: usize,
}

impl ChunkConfig {
    /// Reference chunk size: 8 MiB.
    pub const DEFAULT_CHUNK_SIZE: usize = 8 * 1024 * 1024;
    /// Reference block size: 16 KiB.
    pub const DEFAULT_BLOCK_SIZE: usize = 16 * 1024;

    /// Validate a chunk/block geometry.
    ///
    /// # Errors
    ///
    /// Rejects sizes that are zero, not powers of two, not multiples of 64,
    /// or where the block does not divide the chunk.
    pub fn new(chunk_size: usize, block_size: usize) -> Result<Self, EngineError> {
        if chunk_size == 0 || !chunk_size.is_power_of_two() {
            return Err(EngineError::InvalidConfig("chunk size must be a power of two"));
        }
        if block_size == 0 || !block_size.is_power_of_two() {
            return Err(EngineError::InvalidConfig("block size must be a power of two"));
        }
        if chunk_size % VECTOR_BYTES != 0 || block_size % VECTOR_BYTES != 0 {
            return Err(EngineError::InvalidConfig("sizes must be multiples of 64"));
        }
        if block_size > chunk_size {
            return Err(EngineError::InvalidConfig("block size exceeds chunk size"));
        }
        Ok(Self {
            chunk_size,
            block_size,
        })
    }

    /// Bytes per chunk.
    #[must_use]
    pub const fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Bytes per block.
    #[must_use]
    pub const fn block_size(&self) -> usize {
        self.block_size
    }

    /// Blocks per chunk.
    #[must_use]
    pub const fn blocks(&self) -> usize {
        self.chunk_size / self.block_size
    }

    /// 64-byte vectors per chunk.
    #[must_use]
    pub const fn vectors(&self) -> usize {
        self.chunk_size / VECTOR_BYTES
    }

    /// 64-byte vectors per block.
    #[must_use]
    pub const fn vectors_per_block(&self) -> usize {
        self.block_size / VECTOR_BYTES
    }

    /// Number of chunks needed to cover `len` bytes.
    #[must_use]
    pub const fn chunk_count(&self, len: usize) -> usize {
        len.div_ceil(self.chunk_size)
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: Self::DEFAULT_CHUNK_SIZE,
            block_size: Self::DEFAULT_BLOCK_SIZE,
        }
    }
}

/// State bridged from one chunk to the next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Carries {
    /// The first byte of the next chunk is escaped.
    pub escape: bool,
    /// The next chunk starts inside a string literal.
    pub string: bool,
}

/// Structural indices for one chunk: escape carries, string bitmap, and the
/// ascending list of unquoted structural positions (absolute into the
/// document).
#[derive(Debug)]
pub struct ChunkIndex {
    escape_carries: Vec<bool>,
    string_bits: Vec<u64>,
    structurals: Vec<u32>,
}

impl ChunkIndex {
    /// Pre-allocate a record for the given geometry.
    #[must_use]
    pub fn with_config(config: &ChunkConfig) -> Self {
        Self {
            escape_carries: vec![false; config.blocks() + 1],
            string_bits: vec![0; config.vectors()],
            structurals: Vec::with_capacity(config.chunk_size()),
        }
    }

    /// The chunk's final byte lies inside a string literal.
    #[must_use]
    pub fn ends_in_string(&self) -> bool {
        self.string_bits
            .last()
            .is_some_and(|&last| sign_extend(last) != 0)
    }

    /// The byte after this chunk is escaped.
    #[must_use]
    pub fn ends_with_escape(&self) -> bool {
        *self.escape_carries.last().unwrap_or(&false)
    }

    /// Per-block escape carries (entry 0 is the chunk-in carry, the last
    /// entry the carry out).
    #[must_use]
    pub fn escape_carries(&self) -> &[bool] {
        &self.escape_carries
    }

    /// One bit per chunk byte: set iff the byte is quoted text.
    #[must_use]
    pub fn string_bits(&self) -> &[u64] {
        &self.string_bits
    }

    /// Ascending absolute positions of unquoted structural characters.
    #[must_use]
    pub fn structurals(&self) -> &[u32] {
        &self.structurals
    }
}

/// Reusable staging buffer for one in-flight chunk.
///
/// Two of these form the ping-pong pair in the pipelined indexer: while one
/// is being staged the other is being finalized.
#[derive(Debug)]
pub struct Staging {
    bytes: Vec<u8>,
    escape_carries: Vec<bool>,
    string_raw: Vec<u64>,
    structural_raw: Vec<u64>,
    base: usize,
}

impl Staging {
    /// Allocate a staging buffer for the given geometry.
    #[must_use]
    pub fn with_config(config: &ChunkConfig) -> Self {
        Self {
            bytes: vec![b' '; config.chunk_size()],
            escape_carries: Vec::with_capacity(config.blocks() + 1),
            string_raw: vec![0; config.vectors()],
            structural_raw: vec![0; config.vectors()],
            base: 0,
        }
    }

    /// Escape state carried out of the staged chunk.
    #[must_use]
    pub fn escape_out(&self) -> bool {
        *self.escape_carries.last().unwrap_or(&false)
    }
}

/// Stage one chunk: copy and pad the bytes, derive escape carries, and run
/// the block-parallel vector pass producing raw bitmaps.
pub fn stage_chunk(
    doc: &[u8],
    base: usize,
    escape_in: bool,
    config: &ChunkConfig,
    staging: &mut Staging,
) {
    let end = doc.len().min(base + config.chunk_size());
    let len = end - base;
    staging.base = base;
    staging.bytes[..len].copy_from_slice(&doc[base..end]);
    // Right-pad the final chunk with spaces.
    staging.bytes[len..].fill(b' ');

    compute_escape_carries(
        &staging.bytes,
        escape_in,
        config,
        &mut staging.escape_carries,
    );

    let vectors_per_block = config.vectors_per_block();
    let blocks = config.blocks();
    let carries = &staging.escape_carries[..blocks];
    staging
        .string_raw
        .par_chunks_mut(vectors_per_block)
        .zip(staging.structural_raw.par_chunks_mut(vectors_per_block))
        .zip(staging.bytes.par_chunks(config.block_size()))
        .zip(carries.par_iter())
        .for_each(|(((string_out, structural_out), block), &carry)| {
            index_block(block, carry, string_out, structural_out);
        });
}

/// Finalize a staged chunk into `index`: chain the in-string state across
/// blocks, invert blocks that started inside a string, mask and expand the
/// structural positions.
///
/// Returns the carries into the next chunk.
///
/// # Errors
///
/// Fails only on internal inconsistency (positions that do not fit the
/// 32-bit index, or more structurals than chunk bytes).
pub fn finalize_chunk(
    staging: &Staging,
    string_in: bool,
    config: &ChunkConfig,
    index: &mut ChunkIndex,
) -> Result<Carries, IndexerError> {
    index.escape_carries.clear();
    index.escape_carries.extend_from_slice(&staging.escape_carries);

    // Rectification: a block whose raw bitmaps were computed as if it
    // started outside a string flips wholesale when it actually started
    // inside one.
    let vectors_per_block = config.vectors_per_block();
    let mut in_string = string_in;
    for (block, raw) in staging.string_raw.chunks_exact(vectors_per_block).enumerate() {
        let invert = if in_string { !0u64 } else { 0 };
        let out = &mut index.string_bits[block * vectors_per_block..][..vectors_per_block];
        for (dst, &src) in out.iter_mut().zip(raw) {
            *dst = src ^ invert;
        }
        in_string = sign_extend(out[vectors_per_block - 1]) != 0;
    }

    index.structurals.clear();
    for (v, (&structural, &string)) in staging
        .structural_raw
        .iter()
        .zip(index.string_bits.iter())
        .enumerate()
    {
        let mut bits = structural & !string;
        while bits != 0 {
            let offset = v * VECTOR_BYTES + bits.trailing_zeros() as usize;
            let pos = staging.base + offset;
            let pos32 =
                u32::try_from(pos).map_err(|_| IndexerError::PositionOverflow(pos as u64))?;
            index.structurals.push(pos32);
            bits &= bits - 1;
        }
    }
    if index.structurals.len() > config.chunk_size() {
        return Err(IndexerError::CountOverflow {
            count: index.structurals.len(),
            capacity: config.chunk_size(),
        });
    }

    Ok(Carries {
        escape: staging.escape_out(),
        string: in_string,
    })
}

/// Index one chunk in a single call (stage + finalize). The pipelined path
/// splits the two phases across loop iterations instead.
///
/// # Errors
///
/// See [`finalize_chunk`].
pub fn index_chunk(
    doc: &[u8],
    base: usize,
    carries: Carries,
    config: &ChunkConfig,
    staging: &mut Staging,
    index: &mut ChunkIndex,
) -> Result<Carries, IndexerError> {
    stage_chunk(doc, base, carries.escape, config, staging);
    finalize_chunk(staging, carries.string, config, index)
}

fn index_block(block: &[u8], carry_in: bool, string_out: &mut [u64], structural_out: &mut [u64]) {
    let mut prev_escaped = u64::from(carry_in);
    let mut prev_in_string = 0u64;
    for (v, window) in block.chunks_exact(VECTOR_BYTES).enumerate() {
        let quotes = match_byte(window, b'"');
        let backslash = match_byte(window, b'\\');
        let escaped = escaped_bytes(backslash, &mut prev_escaped);
        let string = prefix_xor(quotes & !escaped) ^ prev_in_string;
        prev_in_string = sign_extend(string);
        string_out[v] = string;
        structural_out[v] = structural_bytes(window);
    }
}

/// Per-block escape carries from a scalar walk of the block boundaries.
///
/// Entry `k` is set iff the byte just before block `k` terminates an
/// odd-length run of backslashes, i.e. the first byte of block `k` is
/// escaped. Entry 0 is the chunk-in carry; the final entry is the carry out
/// of the chunk.
fn compute_escape_carries(bytes: &[u8], escape_in: bool, config: &ChunkConfig, out: &mut Vec<bool>) {
    out.clear();
    out.push(escape_in);
    for k in 1..=config.blocks() {
        let boundary = k * config.block_size();
        let mut run = 0;
        while run < boundary && bytes[boundary - 1 - run] == b'\\' {
            run += 1;
        }
        let odd = run % 2 == 1;
        // A run reaching the chunk start folds in the chunk-in carry: an
        // escaped leading backslash does not escape its successor.
        let carry = if run == boundary { odd != escape_in } else { odd };
        out.push(carry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn small_config() -> ChunkConfig {
        ChunkConfig::new(128, 64).unwrap()
    }

    /// Byte-at-a-time oracle for the whole indexer.
    fn scalar_index(doc: &[u8], mut carries: Carries) -> (Vec<bool>, Vec<u32>) {
        let mut string_bits = Vec::with_capacity(doc.len());
        let mut structurals = Vec::new();
        for (i, &b) in doc.iter().enumerate() {
            let escaped = carries.escape;
            carries.escape = !escaped && b == b'\\';
            if b == b'"' && !escaped {
                carries.string = !carries.string;
            }
            string_bits.push(carries.string);
            if !carries.string && matches!(b, b'{' | b'}' | b'[' | b']' | b':' | b',') {
                structurals.push(i as u32);
            }
        }
        (string_bits, structurals)
    }

    fn index_whole(doc: &[u8], config: &ChunkConfig) -> Vec<u32> {
        let mut staging = Staging::with_config(config);
        let mut index = ChunkIndex::with_config(config);
        let mut carries = Carries::default();
        let mut positions = Vec::new();
        for chunk in 0..config.chunk_count(doc.len()) {
            carries = index_chunk(
                doc,
                chunk * config.chunk_size(),
                carries,
                config,
                &mut staging,
                &mut index,
            )
            .unwrap();
            positions.extend_from_slice(index.structurals());
        }
        positions
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(ChunkConfig::new(100, 64).is_err());
        assert!(ChunkConfig::new(128, 0).is_err());
        assert!(ChunkConfig::new(64, 128).is_err());
        assert!(ChunkConfig::new(128, 64).is_ok());
    }

    #[test]
    fn finds_structural_characters() {
        let config = small_config();
        let doc = br#"{"asdf": 1234, "arrays": [[1], [2]]}"#;
        let positions = index_whole(doc, &config);
        assert_eq!(positions, [0, 7, 13, 23, 25, 26, 28, 29, 31, 33, 34, 35]);
    }

    #[test]
    fn masks_structurals_inside_strings() {
        let config = small_config();
        let doc = br#"{"s":"he said \"hi\" : , } ]","x":7}"#;
        let (_, expected) = scalar_index(doc, Carries::default());
        assert_eq!(index_whole(doc, &config), expected);
    }

    #[test]
    fn escape_runs_keep_parity() {
        let config = small_config();
        let doc = br#"{"a":"\\","b":"\"","c":9}"#;
        let (_, expected) = scalar_index(doc, Carries::default());
        assert_eq!(index_whole(doc, &config), expected);
    }

    #[test]
    fn sets_carry_when_block_ends_on_escape() {
        let config = ChunkConfig::new(256, 64).unwrap();
        let mut doc = vec![b' '; 256];
        // Backslash at the end of blocks 0 and 2.
        doc[63] = b'\\';
        doc[191] = b'\\';
        let mut staging = Staging::with_config(&config);
        let mut index = ChunkIndex::with_config(&config);
        index_chunk(&doc, 0, Carries::default(), &config, &mut staging, &mut index).unwrap();
        assert_eq!(index.escape_carries(), [false, true, false, true, false]);
    }

    #[test]
    fn carry_in_sets_first_entry() {
        let config = small_config();
        let doc = vec![b' '; 128];
        let mut staging = Staging::with_config(&config);
        let mut index = ChunkIndex::with_config(&config);
        let carries = Carries {
            escape: true,
            string: false,
        };
        index_chunk(&doc, 0, carries, &config, &mut staging, &mut index).unwrap();
        assert!(index.escape_carries()[0]);
    }

    #[test]
    fn carry_set_only_for_odd_runs() {
        let config = ChunkConfig::new(256, 64).unwrap();
        let mut doc = vec![b' '; 256];
        doc[61] = b'\\';
        doc[62] = b'\\';
        doc[63] = b'\\';
        doc[126] = b'\\';
        doc[127] = b'\\';
        let mut staging = Staging::with_config(&config);
        let mut index = ChunkIndex::with_config(&config);
        index_chunk(&doc, 0, Carries::default(), &config, &mut staging, &mut index).unwrap();
        assert!(index.escape_carries()[1]);
        assert!(!index.escape_carries()[2]);
    }

    #[test]
    fn chunk_ending_on_escape_sets_carry_out() {
        let config = small_config();
        let mut doc = vec![b' '; 128];
        doc[127] = b'\\';
        let mut staging = Staging::with_config(&config);
        let mut index = ChunkIndex::with_config(&config);
        index_chunk(&doc, 0, Carries::default(), &config, &mut staging, &mut index).unwrap();
        assert!(index.ends_with_escape());
    }

    #[test]
    fn string_open_across_chunk_boundary() {
        let config = ChunkConfig::new(64, 64).unwrap();
        // A string that opens in chunk 0 and closes in chunk 1 keeps the
        // bracket between the quotes masked.
        let mut doc = vec![b' '; 80];
        doc[0] = b'{';
        doc[60] = b'"';
        doc[70] = b'}';
        doc[72] = b'"';
        doc[75] = b']';
        let (_, expected) = scalar_index(&doc, Carries::default());
        assert_eq!(index_whole(&doc, &config), expected);
        assert_eq!(expected, vec![0, 75]);
    }

    #[test]
    fn escape_run_across_chunk_boundary() {
        let config = ChunkConfig::new(64, 64).unwrap();
        // `\` as the last byte of chunk 0 escapes the quote that opens
        // chunk 1, so the string never closes there.
        let mut doc = vec![b' '; 128];
        doc[0] = b'"';
        doc[63] = b'\\';
        doc[64] = b'"';
        doc[70] = b'}';
        doc[80] = b'"';
        doc[90] = b'}';
        let (_, expected) = scalar_index(&doc, Carries::default());
        assert_eq!(index_whole(&doc, &config), expected);
        assert_eq!(expected, vec![90]);
    }

    #[test]
    fn positions_are_strictly_increasing() {
        let config = small_config();
        let doc = br#"[[1,2],[3,4],{"a":[5]},"[,]",6]"#;
        let positions = index_whole(doc, &config);
        assert!(positions.windows(2).all(|w| w[0] < w[1]));
    }

    proptest! {
        #[test]
        fn matches_scalar_oracle(
            bytes in proptest::collection::vec(
                prop_oneof![
                    Just(b'\\'), Just(b'"'), Just(b'{'), Just(b'}'),
                    Just(b'['), Just(b']'), Just(b':'), Just(b','),
                    Just(b'a'), Just(b' '),
                ],
                0..512,
            ),
        ) {
            let config = small_config();
            let (_, expected) = scalar_index(&bytes, Carries::default());
            prop_assert_eq!(index_whole(&bytes, &config), expected);
        }

        #[test]
        fn chunked_equals_single_chunk(
            bytes in proptest::collection::vec(
                prop_oneof![
                    Just(b'\\'), Just(b'"'), Just(b'{'), Just(b'}'),
                    Just(b'['), Just(b']'), Just(b':'), Just(b','),
                    Just(b'a'), Just(b' '),
                ],
                1..400,
            ),
        ) {
            let small = ChunkConfig::new(64, 64).unwrap();
            let large = ChunkConfig::new(1024, 256).unwrap();
            prop_assert_eq!(index_whole(&bytes, &small), index_whole(&bytes, &large));
        }
    }
}
