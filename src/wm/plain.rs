//! Plaintext wavelet matrix and FM-index.
//!
//! These are the reference structures the secure protocols are fed from: the
//! rank-of-zeros tables become the shared database, and the plain queries
//! serve as the oracle in every protocol test.
//!
//! The matrix stores one rank0 row per bit level, indexed by bit number. A
//! level processed earlier partitions earlier: LSB-first processing performs
//! an LSD radix sort, which is the order backward search needs; MSB-first is
//! the classical layout for quantile and range queries.

use std::collections::{BinaryHeap, HashMap};

use anyhow::Result;

use crate::errors::ProtocolError;

/// Alphabet selection for text inputs.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CharType {
    /// `$ACGT`, 3 bit levels.
    Dna,
    /// `$` plus the 20 amino acids, 5 bit levels.
    Protein,
}

/// Which end of the character the first partition level consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BuildOrder {
    /// Classical wavelet-matrix order; required by quantile/range queries.
    MsbFirst,
    /// LSD radix order; required by the FM-index rank.
    LsbFirst,
}

/// Maps text characters onto dense ids; the sentinel `$` is id 0.
#[derive(Clone, Debug)]
pub struct CharMapper {
    char2id: HashMap<char, u64>,
    id2char: Vec<char>,
    sigma: u64,
    char_type: CharType,
}

impl CharMapper {
    /// Mapper for the given alphabet.
    pub fn new(char_type: CharType) -> Self {
        let chars: Vec<char> = match char_type {
            CharType::Dna => "$ACGT".chars().collect(),
            CharType::Protein => "$ACDEFGHIKLMNPQRSTVWY".chars().collect(),
        };
        let sigma = match char_type {
            CharType::Dna => 3,
            CharType::Protein => 5,
        };
        let char2id = chars
            .iter()
            .enumerate()
            .map(|(i, &c)| (c, i as u64))
            .collect();
        Self {
            char2id,
            id2char: chars,
            sigma,
            char_type,
        }
    }

    /// Bit levels needed for this alphabet.
    pub fn sigma(&self) -> u64 {
        self.sigma
    }

    /// The alphabet this mapper was built for.
    pub fn char_type(&self) -> CharType {
        self.char_type
    }

    /// True if `c` belongs to the alphabet.
    pub fn is_valid_char(&self, c: char) -> bool {
        self.char2id.contains_key(&c)
    }

    /// Id of one character.
    pub fn to_id(&self, c: char) -> Result<u64> {
        self.char2id.get(&c).copied().ok_or_else(|| {
            ProtocolError::Configuration(format!("character {:?} outside the alphabet", c)).into()
        })
    }

    /// Ids of a whole string.
    pub fn to_ids(&self, s: &str) -> Result<Vec<u64>> {
        s.chars().map(|c| self.to_id(c)).collect()
    }

    /// Characters of a whole id sequence.
    pub fn to_string(&self, ids: &[u64]) -> Result<String> {
        ids.iter()
            .map(|&id| {
                self.id2char.get(id as usize).copied().ok_or_else(|| {
                    ProtocolError::Configuration(format!("id {} outside the alphabet", id)).into()
                })
            })
            .collect()
    }
}

/// Plain wavelet matrix over a `sigma`-bit alphabet.
#[derive(Clone, Debug)]
pub struct WaveletMatrix {
    length: usize,
    sigma: u64,
    order: BuildOrder,
    data: Vec<u64>,
    rank0_tables: Vec<u64>,
}

impl WaveletMatrix {
    /// Build over an id sequence.
    pub fn new(data: &[u64], sigma: u64, order: BuildOrder) -> Result<Self> {
        if sigma == 0 || sigma > 63 {
            return Err(ProtocolError::Configuration(format!(
                "sigma must be in [1, 63], got {}",
                sigma
            ))
            .into());
        }
        if let Some(&bad) = data.iter().find(|&&v| v >= 1 << sigma) {
            return Err(ProtocolError::Configuration(format!(
                "value {} does not fit {} bit levels",
                bad, sigma
            ))
            .into());
        }

        let length = data.len();
        let mut rank0_tables = vec![0u64; sigma as usize * (length + 1)];
        let mut current = data.to_vec();

        let bits: Vec<u64> = match order {
            BuildOrder::LsbFirst => (0..sigma).collect(),
            BuildOrder::MsbFirst => (0..sigma).rev().collect(),
        };
        for bit in bits {
            let row = &mut rank0_tables[bit as usize * (length + 1)..][..length + 1];
            let mut zeros = 0u64;
            for (i, &v) in current.iter().enumerate() {
                row[i] = zeros;
                if (v >> bit) & 1 == 0 {
                    zeros += 1;
                }
            }
            row[length] = zeros;

            let mut next = Vec::with_capacity(length);
            next.extend(current.iter().filter(|&&v| (v >> bit) & 1 == 0));
            next.extend(current.iter().filter(|&&v| (v >> bit) & 1 == 1));
            current = next;
        }

        Ok(Self {
            length,
            sigma,
            order,
            data: data.to_vec(),
            rank0_tables,
        })
    }

    /// Build from text through a [CharMapper].
    pub fn from_text(text: &str, char_type: CharType, order: BuildOrder) -> Result<Self> {
        let mapper = CharMapper::new(char_type);
        let ids = mapper.to_ids(text)?;
        Self::new(&ids, mapper.sigma(), order)
    }

    /// Sequence length.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Number of bit levels.
    pub fn sigma(&self) -> u64 {
        self.sigma
    }

    /// Level processing order this matrix was built with.
    pub fn build_order(&self) -> BuildOrder {
        self.order
    }

    /// The original sequence.
    pub fn data(&self) -> &[u64] {
        &self.data
    }

    /// All rank0 rows, flat, `sigma` rows of `length + 1` entries indexed by
    /// bit number.
    pub fn rank0_tables(&self) -> &[u64] {
        &self.rank0_tables
    }

    /// Zeros among the first `pos` entries of the level for `bit`.
    pub fn rank0(&self, bit: u64, pos: usize) -> u64 {
        self.rank0_tables[bit as usize * (self.length + 1) + pos]
    }

    /// Total zeros at the level for `bit` (the row tail).
    pub fn total_zeros(&self, bit: u64) -> u64 {
        self.rank0(bit, self.length)
    }

    fn level_bits(&self) -> Vec<u64> {
        match self.order {
            BuildOrder::LsbFirst => (0..self.sigma).collect(),
            BuildOrder::MsbFirst => (0..self.sigma).rev().collect(),
        }
    }

    /// Reconstruct the value at position `i`.
    pub fn access(&self, i: usize) -> Result<u64> {
        if i >= self.length {
            return Err(ProtocolError::Configuration(format!(
                "position {} out of range (length {})",
                i, self.length
            ))
            .into());
        }
        let mut pos = i;
        let mut value = 0u64;
        for bit in self.level_bits() {
            let bit_is_zero = self.rank0(bit, pos + 1) > self.rank0(bit, pos);
            if bit_is_zero {
                pos = self.rank0(bit, pos) as usize;
            } else {
                value |= 1 << bit;
                pos = (self.total_zeros(bit) + pos as u64 - self.rank0(bit, pos)) as usize;
            }
        }
        Ok(value)
    }

    fn require_msb_first(&self) -> Result<()> {
        if self.order != BuildOrder::MsbFirst {
            return Err(ProtocolError::Configuration(
                "range queries need an MSB-first wavelet matrix".into(),
            )
            .into());
        }
        Ok(())
    }

    /// The k-th smallest value among positions `[l, r)`.
    pub fn quantile(&self, l: usize, r: usize, k: usize) -> Result<u64> {
        self.require_msb_first()?;
        if l >= r || r > self.length || k >= r - l {
            return Err(ProtocolError::Configuration(format!(
                "bad quantile query: l={} r={} k={} length={}",
                l, r, k, self.length
            ))
            .into());
        }
        let mut l = l as u64;
        let mut r = r as u64;
        let mut k = k as u64;
        let mut result = 0u64;
        for bit in (0..self.sigma).rev() {
            let zl = self.rank0(bit, l as usize);
            let zr = self.rank0(bit, r as usize);
            let zeros = zr - zl;
            if k < zeros {
                l = zl;
                r = zr;
            } else {
                k -= zeros;
                result |= 1 << bit;
                let tz = self.total_zeros(bit);
                l = tz + (l - zl);
                r = tz + (r - zr);
            }
        }
        Ok(result)
    }

    /// Smallest value in `[l, r)`.
    pub fn range_min(&self, l: usize, r: usize) -> Result<u64> {
        self.quantile(l, r, 0)
    }

    /// Largest value in `[l, r)`.
    pub fn range_max(&self, l: usize, r: usize) -> Result<u64> {
        self.quantile(l, r, r - l - 1)
    }

    /// Count of positions in `[l, r)` holding a value `< y`.
    fn count_lt(&self, l: usize, r: usize, y: u64) -> u64 {
        if y >= 1 << self.sigma {
            return (r - l) as u64;
        }
        let mut l = l as u64;
        let mut r = r as u64;
        let mut count = 0u64;
        for bit in (0..self.sigma).rev() {
            let zl = self.rank0(bit, l as usize);
            let zr = self.rank0(bit, r as usize);
            if (y >> bit) & 1 == 1 {
                count += zr - zl;
                let tz = self.total_zeros(bit);
                l = tz + (l - zl);
                r = tz + (r - zr);
            } else {
                l = zl;
                r = zr;
            }
        }
        count
    }

    /// Count of positions in `[l, r)` with value in `[x, y)`.
    pub fn range_freq(&self, l: usize, r: usize, x: u64, y: u64) -> Result<u64> {
        self.require_msb_first()?;
        if l > r || r > self.length || x > y {
            return Err(ProtocolError::Configuration(format!(
                "bad range_freq query: l={} r={} x={} y={}",
                l, r, x, y
            ))
            .into());
        }
        if l == r || x == y {
            return Ok(0);
        }
        Ok(self.count_lt(l, r, y) - self.count_lt(l, r, x))
    }

    /// All distinct values in `[x, y)` occurring in positions `[l, r)`, with
    /// their counts, in increasing value order.
    pub fn range_list(&self, l: usize, r: usize, x: u64, y: u64) -> Result<Vec<(u64, u64)>> {
        self.require_msb_first()?;
        if l > r || r > self.length {
            return Err(ProtocolError::Configuration(format!(
                "bad range_list query: l={} r={}",
                l, r
            ))
            .into());
        }
        let mut out = Vec::new();
        self.range_list_rec(self.sigma, l as u64, r as u64, 0, x, y, &mut out);
        Ok(out)
    }

    fn range_list_rec(
        &self,
        level: u64,
        l: u64,
        r: u64,
        prefix: u64,
        x: u64,
        y: u64,
        out: &mut Vec<(u64, u64)>,
    ) {
        if l == r {
            return;
        }
        if level == 0 {
            if prefix >= x && prefix < y {
                out.push((prefix, r - l));
            }
            return;
        }
        let bit = level - 1;
        // Values below this node span [prefix, prefix + 2^level).
        let span = 1u64 << level;
        if prefix + span <= x || prefix >= y {
            return;
        }
        let zl = self.rank0(bit, l as usize);
        let zr = self.rank0(bit, r as usize);
        let tz = self.total_zeros(bit);
        self.range_list_rec(bit, zl, zr, prefix, x, y, out);
        self.range_list_rec(bit, tz + (l - zl), tz + (r - zr), prefix | (1 << bit), x, y, out);
    }

    /// The `k` most frequent values in `[l, r)`, most frequent first.
    pub fn top_k(&self, l: usize, r: usize, k: usize) -> Result<Vec<(u64, u64)>> {
        self.require_msb_first()?;
        if l > r || r > self.length {
            return Err(ProtocolError::Configuration(format!(
                "bad top_k query: l={} r={}",
                l, r
            ))
            .into());
        }
        // Widest-range-first traversal: a leaf popped from the heap is
        // guaranteed to be more frequent than everything still queued.
        let mut heap: BinaryHeap<(u64, u64, u64, u64, u64)> = BinaryHeap::new();
        heap.push((r as u64 - l as u64, self.sigma, l as u64, r as u64, 0));
        let mut out = Vec::new();
        while let Some((width, level, l, r, prefix)) = heap.pop() {
            if width == 0 {
                continue;
            }
            if level == 0 {
                out.push((prefix, width));
                if out.len() == k {
                    break;
                }
                continue;
            }
            let bit = level - 1;
            let zl = self.rank0(bit, l as usize);
            let zr = self.rank0(bit, r as usize);
            let tz = self.total_zeros(bit);
            heap.push((zr - zl, bit, zl, zr, prefix));
            let ol = tz + (l - zl);
            let or = tz + (r - zr);
            heap.push((or - ol, bit, ol, or, prefix | (1 << bit)));
        }
        Ok(out)
    }

    /// FM-index rank in C-array form: the row index of `position` after
    /// extending the backward-search pattern by character `c`. Valid only on
    /// an LSB-first build.
    pub fn rank_cf(&self, c: u64, position: usize) -> Result<u64> {
        if self.order != BuildOrder::LsbFirst {
            return Err(ProtocolError::Configuration(
                "rank_cf needs an LSB-first wavelet matrix".into(),
            )
            .into());
        }
        let mut pos = position as u64;
        for bit in 0..self.sigma {
            let r0 = self.rank0(bit, pos as usize);
            pos = if (c >> bit) & 1 == 0 {
                r0
            } else {
                self.total_zeros(bit) + pos - r0
            };
        }
        Ok(pos)
    }
}

/// Plaintext FM-index: BWT over text plus sentinel, indexed by an LSB-first
/// wavelet matrix.
#[derive(Clone, Debug)]
pub struct FmIndex {
    bwt_ids: Vec<u64>,
    wm: WaveletMatrix,
    mapper: CharMapper,
}

impl FmIndex {
    /// Index `text` (sentinel-free) over the given alphabet.
    pub fn new(text: &str, char_type: CharType) -> Result<Self> {
        let mapper = CharMapper::new(char_type);
        if text.contains('$') {
            return Err(
                ProtocolError::Configuration("text must not contain the sentinel".into()).into(),
            );
        }
        let mut ids = mapper.to_ids(text)?;
        ids.push(0); // sentinel

        // Classical suffix-array construction; the unique smallest sentinel
        // makes suffix order and rotation order coincide.
        let mut sa: Vec<usize> = (0..ids.len()).collect();
        sa.sort_by(|&a, &b| ids[a..].cmp(&ids[b..]));

        let len = ids.len();
        let bwt_ids: Vec<u64> = sa.iter().map(|&i| ids[(i + len - 1) % len]).collect();

        let wm = WaveletMatrix::new(&bwt_ids, mapper.sigma(), BuildOrder::LsbFirst)?;
        Ok(Self {
            bwt_ids,
            wm,
            mapper,
        })
    }

    /// The wavelet matrix over the BWT.
    pub fn wavelet_matrix(&self) -> &WaveletMatrix {
        &self.wm
    }

    /// The rank0 tables backing the secure protocols.
    pub fn rank0_tables(&self) -> &[u64] {
        self.wm.rank0_tables()
    }

    /// The character mapper in use.
    pub fn mapper(&self) -> &CharMapper {
        &self.mapper
    }

    /// BWT length (text length plus sentinel).
    pub fn bwt_len(&self) -> usize {
        self.bwt_ids.len()
    }

    /// Flatten a query into its bit matrix: row `i` holds the bit
    /// decomposition of the `i`-th character, one column per bit level.
    pub fn convert_to_bit_matrix(&self, query: &str) -> Result<Vec<u64>> {
        let sigma = self.wm.sigma();
        let ids = self.mapper.to_ids(query)?;
        let mut out = Vec::with_capacity(ids.len() * sigma as usize);
        for id in ids {
            for bit in 0..sigma {
                out.push((id >> bit) & 1);
            }
        }
        Ok(out)
    }

    /// Longest-prefix-match length of `query`, via wavelet-matrix rank.
    pub fn compute_lpm_from_wm(&self, query: &str) -> Result<u64> {
        let ids = self.mapper.to_ids(query)?;
        let mut f = 0u64;
        let mut g = self.bwt_ids.len() as u64;
        for (i, &c) in ids.iter().enumerate() {
            f = self.wm.rank_cf(c, f as usize)?;
            g = self.wm.rank_cf(c, g as usize)?;
            if g == f {
                return Ok(i as u64);
            }
        }
        Ok(ids.len() as u64)
    }

    /// Longest-prefix-match length of `query`, via direct occurrence
    /// counting over the raw BWT. Independent oracle for the rank path.
    pub fn compute_lpm_from_bwt(&self, query: &str) -> Result<u64> {
        let ids = self.mapper.to_ids(query)?;

        let alphabet = 1u64 << self.wm.sigma();
        let mut c_array = vec![0u64; alphabet as usize + 1];
        for &v in &self.bwt_ids {
            c_array[v as usize + 1] += 1;
        }
        for i in 1..c_array.len() {
            c_array[i] += c_array[i - 1];
        }
        let occ = |c: u64, pos: u64| -> u64 {
            self.bwt_ids[..pos as usize]
                .iter()
                .filter(|&&v| v == c)
                .count() as u64
        };

        let mut f = 0u64;
        let mut g = self.bwt_ids.len() as u64;
        for (i, &c) in ids.iter().enumerate() {
            f = c_array[c as usize] + occ(c, f);
            g = c_array[c as usize] + occ(c, g);
            if g == f {
                return Ok(i as u64);
            }
        }
        Ok(ids.len() as u64)
    }
}

/// A uniformly random DNA string of the requested length.
pub fn random_dna_text(len: usize, rng: &mut impl rand::Rng) -> String {
    const BASES: [char; 4] = ['A', 'C', 'G', 'T'];
    (0..len).map(|_| BASES[rng.gen_range(0..4)]).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use scuttlebutt::AesRng;

    #[test]
    fn test_access_roundtrip_both_orders() {
        let data = [3u64, 1, 4, 1, 5, 2, 6, 5, 3, 5, 0, 7];
        for order in [BuildOrder::MsbFirst, BuildOrder::LsbFirst] {
            let wm = WaveletMatrix::new(&data, 3, order).unwrap();
            for (i, &v) in data.iter().enumerate() {
                assert_eq!(wm.access(i).unwrap(), v, "order {:?} pos {}", order, i);
            }
        }
    }

    #[test]
    fn test_rank_cf_matches_c_array_plus_occ() {
        let mut rng = AesRng::new();
        let data: Vec<u64> = (0..100).map(|_| rng.gen::<u64>() % 8).collect();
        let wm = WaveletMatrix::new(&data, 3, BuildOrder::LsbFirst).unwrap();

        for c in 0..8u64 {
            let c_offset = data.iter().filter(|&&v| v < c).count() as u64;
            for pos in 0..=data.len() {
                let occ = data[..pos].iter().filter(|&&v| v == c).count() as u64;
                assert_eq!(
                    wm.rank_cf(c, pos).unwrap(),
                    c_offset + occ,
                    "c={} pos={}",
                    c,
                    pos
                );
            }
        }
    }

    #[test]
    fn test_quantile_matches_sorted_slice() {
        let mut rng = AesRng::new();
        let data: Vec<u64> = (0..64).map(|_| rng.gen::<u64>() % 8).collect();
        let wm = WaveletMatrix::new(&data, 3, BuildOrder::MsbFirst).unwrap();

        for _ in 0..50 {
            let l = rng.gen::<u64>() as usize % (data.len() - 1);
            let r = l + 1 + rng.gen::<u64>() as usize % (data.len() - l);
            let k = rng.gen::<u64>() as usize % (r - l);
            let mut sorted = data[l..r].to_vec();
            sorted.sort_unstable();
            assert_eq!(
                wm.quantile(l, r, k).unwrap(),
                sorted[k],
                "l={} r={} k={}",
                l,
                r,
                k
            );
        }
        assert!(wm.quantile(5, 5, 0).is_err());
    }

    #[test]
    fn test_range_queries() {
        let data = [3u64, 1, 4, 1, 5, 2, 6, 5, 3, 5, 0, 7];
        let wm = WaveletMatrix::new(&data, 3, BuildOrder::MsbFirst).unwrap();

        assert_eq!(wm.range_min(2, 9).unwrap(), 1);
        assert_eq!(wm.range_max(2, 9).unwrap(), 6);

        for (l, r, x, y) in [(0, 12, 2, 6), (3, 10, 0, 8), (1, 5, 4, 5), (0, 12, 0, 1)] {
            let brute = data[l..r].iter().filter(|&&v| v >= x && v < y).count() as u64;
            assert_eq!(wm.range_freq(l, r, x, y).unwrap(), brute);

            let list = wm.range_list(l, r, x, y).unwrap();
            let mut brute_counts: Vec<(u64, u64)> = (x..y)
                .filter_map(|v| {
                    let c = data[l..r].iter().filter(|&&w| w == v).count() as u64;
                    (c > 0).then_some((v, c))
                })
                .collect();
            brute_counts.sort_unstable();
            assert_eq!(list, brute_counts, "l={} r={} x={} y={}", l, r, x, y);
        }
    }

    #[test]
    fn test_top_k() {
        let data = [5u64, 5, 5, 2, 2, 7, 1, 5, 2, 5];
        let wm = WaveletMatrix::new(&data, 3, BuildOrder::MsbFirst).unwrap();
        let top = wm.top_k(0, data.len(), 2).unwrap();
        assert_eq!(top, vec![(5, 5), (2, 3)]);
    }

    #[test]
    fn test_lpm_paths_agree() {
        let mut rng = AesRng::new();
        let text = random_dna_text(200, &mut rng);
        let fm = FmIndex::new(&text, CharType::Dna).unwrap();

        for _ in 0..30 {
            let query = random_dna_text(8, &mut rng);
            assert_eq!(
                fm.compute_lpm_from_wm(&query).unwrap(),
                fm.compute_lpm_from_bwt(&query).unwrap(),
                "query {}",
                query
            );
        }

        // Feeding the reversed text prefix keeps every backward-search
        // interval non-empty, so the whole query matches.
        let mut head: Vec<char> = text.chars().take(6).collect();
        head.reverse();
        let query: String = head.into_iter().collect();
        assert_eq!(fm.compute_lpm_from_wm(&query).unwrap(), 6);
    }

    #[test]
    fn test_lpm_against_substring_search() {
        let mut rng = AesRng::new();
        let text = random_dna_text(120, &mut rng);
        let fm = FmIndex::new(&text, CharType::Dna).unwrap();

        for _ in 0..30 {
            let query = random_dna_text(7, &mut rng);
            // Backward search extends to the left, so step i matches the
            // reversed prefix of the query against the text.
            let lpm = fm.compute_lpm_from_wm(&query).unwrap() as usize;
            let matches = |k: usize| -> bool {
                let mut chars: Vec<char> = query.chars().take(k).collect();
                chars.reverse();
                let pat: String = chars.into_iter().collect();
                text.contains(&pat)
            };
            if lpm > 0 {
                assert!(matches(lpm), "query {} lpm {}", query, lpm);
            }
            if lpm < query.len() {
                assert!(!matches(lpm + 1), "query {} lpm {}", query, lpm);
            }
        }
    }

    #[test]
    fn test_protein_mapper() {
        let mapper = CharMapper::new(CharType::Protein);
        assert_eq!(mapper.sigma(), 5);
        assert!(mapper.is_valid_char('W'));
        assert!(!mapper.is_valid_char('B'));
        let ids = mapper.to_ids("ACW").unwrap();
        assert_eq!(mapper.to_string(&ids).unwrap(), "ACW");
    }
}
