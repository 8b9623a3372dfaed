//! Distributed point functions in the tree-based style of Boyle, Gilboa and
//! Ishai, over an AES-based length-doubling PRG.
//!
//! A key pair encodes `f(alpha) = beta`, zero elsewhere. In the additive
//! encoding the two evaluations sum to `beta` exactly at `alpha`; in the mask
//! encoding they XOR to a one-hot bit. Keys are immutable: evaluation never
//! consumes them.

use anyhow::Result;
use rand::{Rng, SeedableRng};
use scuttlebutt::{AesRng, Block};

use crate::errors::ProtocolError;
use crate::fss::{DpfParameters, EvalType, OutputType};
use crate::ring_utils::{add2n, mod2n, neg2n, sub2n};

/// Per-level correction word.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CorrectionWord {
    /// Seed correction block.
    pub block: Block,
    /// Control-bit correction for the left child.
    pub t_l: bool,
    /// Control-bit correction for the right child.
    pub t_r: bool,
}

/// One party's DPF key.
///
/// The party bit is carried in the low bit of `init_block`; it selects the
/// sign of additive outputs and the initial control bit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DpfKey {
    /// Root seed; its low bit is the party bit.
    pub init_block: Block,
    /// Per-level correction words.
    pub cws: Vec<CorrectionWord>,
    /// Output correction for the additive encoding.
    pub cw_out: u64,
    /// Output correction leaf for the mask encoding.
    pub cw_leaf: Block,
    params: DpfParameters,
}

#[inline]
fn lsb(b: Block) -> bool {
    u128::from(b) & 1 == 1
}

#[inline]
fn convert(b: Block, element_bitsize: u64) -> u64 {
    mod2n(u128::from(b) as u64, element_bitsize)
}

/// PRG step: one seed to two child seeds plus two control bits.
#[inline]
fn expand(seed: Block) -> (Block, bool, Block, bool) {
    let mut rng = AesRng::from_seed(seed);
    let l: Block = rng.gen();
    let r: Block = rng.gen();
    (l, lsb(l), r, lsb(r))
}

#[inline]
fn xor_if(cond: bool, a: Block, b: Block) -> Block {
    if cond {
        a ^ b
    } else {
        a
    }
}

impl DpfKey {
    /// Parameters this key was generated for.
    pub fn params(&self) -> &DpfParameters {
        &self.params
    }

    /// Exact byte length of [serialize](Self::serialize)'s output.
    pub fn calculate_serialized_size(&self) -> usize {
        let final_len = match self.params.output_type() {
            OutputType::ShiftedAdditive => 8,
            OutputType::SingleBitMask => 16,
        };
        8 + 16 + 8 + self.cws.len() * 17 + final_len
    }

    /// Append the canonical byte layout: size prefix, initial block, level
    /// count, per-level correction block plus packed control bits, final
    /// output correction.
    pub fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        let expected = self.calculate_serialized_size();
        let start = buffer.len();

        buffer.extend_from_slice(&(expected as u64).to_le_bytes());
        buffer.extend_from_slice(&u128::from(self.init_block).to_le_bytes());
        buffer.extend_from_slice(&(self.cws.len() as u64).to_le_bytes());
        for cw in &self.cws {
            buffer.extend_from_slice(&u128::from(cw.block).to_le_bytes());
            buffer.push((cw.t_l as u8) | ((cw.t_r as u8) << 1));
        }
        match self.params.output_type() {
            OutputType::ShiftedAdditive => {
                buffer.extend_from_slice(&self.cw_out.to_le_bytes());
            }
            OutputType::SingleBitMask => {
                buffer.extend_from_slice(&u128::from(self.cw_leaf).to_le_bytes());
            }
        }

        if buffer.len() - start != expected {
            return Err(ProtocolError::Serialization(format!(
                "DPF key serialized {} bytes, expected {}",
                buffer.len() - start,
                expected
            ))
            .into());
        }
        Ok(())
    }

    /// Parse a key back; `bytes` must start at the size prefix. Returns the
    /// key and the number of bytes consumed.
    pub fn deserialize(params: &DpfParameters, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 32 {
            return Err(
                ProtocolError::Serialization("DPF key buffer too short".into()).into(),
            );
        }
        let total = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes")) as usize;
        if bytes.len() < total {
            return Err(ProtocolError::Serialization(format!(
                "DPF key buffer has {} bytes, header says {}",
                bytes.len(),
                total
            ))
            .into());
        }
        let mut offset = 8;
        let init_block = Block::from(u128::from_le_bytes(
            bytes[offset..offset + 16].try_into().expect("16 bytes"),
        ));
        offset += 16;
        let levels =
            u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8 bytes")) as usize;
        offset += 8;
        if levels != params.tree_depth() as usize {
            return Err(ProtocolError::Serialization(format!(
                "DPF key has {} levels, parameters require {}",
                levels,
                params.tree_depth()
            ))
            .into());
        }
        let mut cws = Vec::with_capacity(levels);
        for _ in 0..levels {
            let block = Block::from(u128::from_le_bytes(
                bytes[offset..offset + 16].try_into().expect("16 bytes"),
            ));
            let packed = bytes[offset + 16];
            cws.push(CorrectionWord {
                block,
                t_l: packed & 1 != 0,
                t_r: packed & 2 != 0,
            });
            offset += 17;
        }
        let mut key = DpfKey {
            init_block,
            cws,
            cw_out: 0,
            cw_leaf: Block::from(0u128),
            params: *params,
        };
        match params.output_type() {
            OutputType::ShiftedAdditive => {
                key.cw_out =
                    u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8 bytes"));
                offset += 8;
            }
            OutputType::SingleBitMask => {
                key.cw_leaf = Block::from(u128::from_le_bytes(
                    bytes[offset..offset + 16].try_into().expect("16 bytes"),
                ));
                offset += 16;
            }
        }
        if offset != total {
            return Err(ProtocolError::Serialization(format!(
                "DPF key consumed {} bytes, header says {}",
                offset, total
            ))
            .into());
        }
        Ok((key, offset))
    }
}

/// Generates matched key pairs for a point function.
pub struct DpfKeyGenerator {
    params: DpfParameters,
}

impl DpfKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &DpfParameters) -> Self {
        Self { params: *params }
    }

    /// Produce the two keys of `f(alpha) = beta`.
    ///
    /// `alpha` must lie in the input domain; in the mask encoding `beta` is
    /// ignored (the point value is the single mask bit).
    pub fn generate_keys(
        &self,
        rng: &mut AesRng,
        alpha: u64,
        beta: u64,
    ) -> Result<(DpfKey, DpfKey)> {
        if alpha >= self.params.domain_size() as u64 {
            return Err(ProtocolError::Configuration(format!(
                "alpha {} outside the domain of size {}",
                alpha,
                self.params.domain_size()
            ))
            .into());
        }

        let depth = self.params.tree_depth();

        // Party bit lives in the low bit of the root seed.
        let init0 = Block::from(u128::from(rng.gen::<Block>()) & !1u128);
        let init1 = Block::from(u128::from(rng.gen::<Block>()) | 1u128);

        let mut s = [init0, init1];
        let mut t = [false, true];
        let mut cws = Vec::with_capacity(depth as usize);

        // In the mask encoding the tree only resolves the high bits; the low
        // `terminate_bitsize` bits select a bit inside the leaf block.
        let path = match self.params.output_type() {
            OutputType::ShiftedAdditive => alpha,
            OutputType::SingleBitMask => alpha >> self.params.terminate_bitsize(),
        };

        for i in 0..depth {
            let bit = (path >> (depth - 1 - i)) & 1 == 1;

            let (l0, tl0, r0, tr0) = expand(s[0]);
            let (l1, tl1, r1, tr1) = expand(s[1]);

            let s_cw = if bit { l0 ^ l1 } else { r0 ^ r1 };
            let t_cw_l = tl0 ^ tl1 ^ bit ^ true;
            let t_cw_r = tr0 ^ tr1 ^ bit;
            cws.push(CorrectionWord {
                block: s_cw,
                t_l: t_cw_l,
                t_r: t_cw_r,
            });

            let keep = [(l0, tl0, r0, tr0), (l1, tl1, r1, tr1)];
            for b in 0..2 {
                let (l, tl, r, tr) = keep[b];
                let (s_keep, t_keep) = if bit { (r, tr) } else { (l, tl) };
                let t_cw_keep = if bit { t_cw_r } else { t_cw_l };
                s[b] = xor_if(t[b], s_keep, s_cw);
                t[b] = t_keep ^ (t[b] & t_cw_keep);
            }
        }

        let mut key0 = DpfKey {
            init_block: init0,
            cws: cws.clone(),
            cw_out: 0,
            cw_leaf: Block::from(0u128),
            params: self.params,
        };
        let mut key1 = DpfKey {
            init_block: init1,
            cws,
            cw_out: 0,
            cw_leaf: Block::from(0u128),
            params: self.params,
        };

        match self.params.output_type() {
            OutputType::ShiftedAdditive => {
                let n = self.params.element_bitsize();
                let conv0 = convert(s[0], n);
                let conv1 = convert(s[1], n);
                let val = add2n(sub2n(beta, conv0, n), conv1, n);
                let cw_out = if t[1] { neg2n(val, n) } else { val };
                key0.cw_out = cw_out;
                key1.cw_out = cw_out;
            }
            OutputType::SingleBitMask => {
                let slot = alpha & ((1u64 << self.params.terminate_bitsize()) - 1);
                let one_hot = Block::from(1u128 << slot);
                let cw_leaf = s[0] ^ s[1] ^ one_hot;
                key0.cw_leaf = cw_leaf;
                key1.cw_leaf = cw_leaf;
            }
        }

        Ok((key0, key1))
    }
}

/// Evaluates DPF keys at single points or over the full domain.
pub struct DpfEvaluator {
    params: DpfParameters,
}

impl DpfEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &DpfParameters) -> Self {
        Self { params: *params }
    }

    #[inline]
    fn walk_step(key: &DpfKey, level: usize, s: Block, t: bool, bit: bool) -> (Block, bool) {
        let (l, tl, r, tr) = expand(s);
        let cw = &key.cws[level];
        let (mut s_next, mut t_next) = if bit { (r, tr) } else { (l, tl) };
        if t {
            s_next = s_next ^ cw.block;
            t_next ^= if bit { cw.t_r } else { cw.t_l };
        }
        (s_next, t_next)
    }

    #[inline]
    fn leaf_value(&self, key: &DpfKey, party: bool, s: Block, t: bool) -> u64 {
        let n = self.params.element_bitsize();
        let mut y = convert(s, n);
        if t {
            y = add2n(y, key.cw_out, n);
        }
        if party {
            y = neg2n(y, n);
        }
        y
    }

    #[inline]
    fn leaf_block(key: &DpfKey, s: Block, t: bool) -> Block {
        xor_if(t, s, key.cw_leaf)
    }

    /// Evaluate an additive-output key at a single input.
    pub fn evaluate_at(&self, key: &DpfKey, x: u64) -> Result<u64> {
        if self.params.output_type() != OutputType::ShiftedAdditive {
            return Err(ProtocolError::Configuration(
                "single-point evaluation needs the additive output encoding".into(),
            )
            .into());
        }
        let depth = self.params.tree_depth();
        let party = lsb(key.init_block);
        let mut s = key.init_block;
        let mut t = party;
        for i in 0..depth {
            let bit = (x >> (depth - 1 - i)) & 1 == 1;
            let (s2, t2) = Self::walk_step(key, i as usize, s, t, bit);
            s = s2;
            t = t2;
        }
        Ok(self.leaf_value(key, party, s, t))
    }

    /// Materialise the full domain of an additive-output key into `out`
    /// (length exactly `2^input_bitsize`), using the configured strategy.
    pub fn evaluate_full_domain(&self, key: &DpfKey, out: &mut [u64]) -> Result<()> {
        if self.params.output_type() != OutputType::ShiftedAdditive {
            return Err(ProtocolError::Configuration(
                "full-domain ring expansion needs the additive output encoding".into(),
            )
            .into());
        }
        if out.len() < self.params.domain_size() {
            return Err(ProtocolError::Configuration(format!(
                "output buffer holds {} elements, domain needs {}",
                out.len(),
                self.params.domain_size()
            ))
            .into());
        }
        let out = &mut out[..self.params.domain_size()];

        match self.params.eval_type() {
            EvalType::Iterative => {
                for x in 0..self.params.domain_size() as u64 {
                    out[x as usize] = self.evaluate_at(key, x)?;
                }
            }
            EvalType::IterSingleBatch => {
                let leaves = self.expand_frontier(key, key.init_block, lsb(key.init_block), 0);
                let party = lsb(key.init_block);
                for (x, (s, t)) in leaves.into_iter().enumerate() {
                    out[x] = self.leaf_value(key, party, s, t);
                }
            }
            EvalType::IterDepthFirst => {
                let party = lsb(key.init_block);
                self.depth_first(
                    key,
                    key.init_block,
                    party,
                    0,
                    self.params.tree_depth() as usize,
                    &mut |x, s, t| out[x] = self.leaf_value(key, party, s, t),
                );
            }
            EvalType::HybridBatched => {
                let party = lsb(key.init_block);
                let depth = self.params.tree_depth() as usize;
                let switch = depth.saturating_sub(10);
                self.depth_first(key, key.init_block, party, 0, switch, &mut |base, s, t| {
                    let leaves = self.expand_frontier(key, s, t, switch);
                    let width = 1usize << (depth - switch);
                    for (off, (ls, lt)) in leaves.into_iter().enumerate() {
                        out[base * width + off] = self.leaf_value(key, party, ls, lt);
                    }
                });
            }
        }
        Ok(())
    }

    /// Materialise the full domain of a mask-output key into `out` (one block
    /// per `2^terminate_bitsize` inputs).
    pub fn evaluate_full_domain_blocks(&self, key: &DpfKey, out: &mut [Block]) -> Result<()> {
        if self.params.output_type() != OutputType::SingleBitMask {
            return Err(ProtocolError::Configuration(
                "full-domain block expansion needs the mask output encoding".into(),
            )
            .into());
        }
        let blocks = self.params.full_domain_blocks();
        if out.len() < blocks {
            return Err(ProtocolError::Configuration(format!(
                "output buffer holds {} blocks, domain needs {}",
                out.len(),
                blocks
            ))
            .into());
        }
        let out = &mut out[..blocks];

        match self.params.eval_type() {
            EvalType::Iterative | EvalType::IterSingleBatch => {
                let leaves = self.expand_frontier(key, key.init_block, lsb(key.init_block), 0);
                for (x, (s, t)) in leaves.into_iter().enumerate() {
                    out[x] = Self::leaf_block(key, s, t);
                }
            }
            EvalType::IterDepthFirst | EvalType::HybridBatched => {
                self.depth_first(
                    key,
                    key.init_block,
                    lsb(key.init_block),
                    0,
                    self.params.tree_depth() as usize,
                    &mut |x, s, t| out[x] = Self::leaf_block(key, s, t),
                );
            }
        }
        Ok(())
    }

    /// Expand every node below `(s, t)` at `from_level` into the dense
    /// frontier of leaf states.
    fn expand_frontier(
        &self,
        key: &DpfKey,
        s: Block,
        t: bool,
        from_level: usize,
    ) -> Vec<(Block, bool)> {
        let depth = self.params.tree_depth() as usize;
        let mut frontier = vec![(s, t)];
        for level in from_level..depth {
            let mut next = Vec::with_capacity(frontier.len() * 2);
            for (s, t) in frontier {
                next.push(Self::walk_step(key, level, s, t, false));
                next.push(Self::walk_step(key, level, s, t, true));
            }
            frontier = next;
        }
        frontier
    }

    /// Visit the subtree below `(s, t)` depth-first down to `to_level`,
    /// calling `emit(index_within_level, seed, control)` per node reached.
    fn depth_first(
        &self,
        key: &DpfKey,
        s: Block,
        t: bool,
        level: usize,
        to_level: usize,
        emit: &mut dyn FnMut(usize, Block, bool),
    ) {
        self.depth_first_rec(key, s, t, level, to_level, 0, emit);
    }

    fn depth_first_rec(
        &self,
        key: &DpfKey,
        s: Block,
        t: bool,
        level: usize,
        to_level: usize,
        index: usize,
        emit: &mut dyn FnMut(usize, Block, bool),
    ) {
        if level == to_level {
            emit(index, s, t);
            return;
        }
        let (s0, t0) = Self::walk_step(key, level, s, t, false);
        let (s1, t1) = Self::walk_step(key, level, s, t, true);
        self.depth_first_rec(key, s0, t0, level + 1, to_level, index * 2, emit);
        self.depth_first_rec(key, s1, t1, level + 1, to_level, index * 2 + 1, emit);
    }
}
