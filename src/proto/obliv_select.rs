//! Oblivious selection over XOR-shared block vectors.
//!
//! The third oblivious-access flavour: the payload is a 128-bit block, the
//! database and index are XOR-shared, and the DPF runs in its bit-mask
//! encoding, so the selector dot product degenerates to an XOR accumulation
//! over the set bits of the expansion.

use anyhow::Result;
use rand::Rng;
use scuttlebutt::{AbstractChannel, AesRng, Block};

use crate::channel_utils::{read_block, read_u64, write_block, write_u64, Channels};
use crate::errors::ProtocolError;
use crate::fss::{
    DpfEvaluator, DpfKey, DpfKeyGenerator, DpfParameters, EvalType, OutputType,
    OPTIMIZED_EVAL_TYPE,
};
use crate::proto::key_io::KeyCodec;
use crate::ring_utils::mask;
use crate::sharing::{BinarySharing2P, RepShare, RepShareBlock, RepShareVecBlock};

/// Parameters of one block-selection instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OblivSelectParameters {
    database_bitsize: u64,
    dpf_params: DpfParameters,
}

impl OblivSelectParameters {
    /// Selection over `2^database_bitsize` blocks with the default strategy.
    pub fn new(database_bitsize: u64) -> Result<Self> {
        Self::with_eval_type(database_bitsize, OPTIMIZED_EVAL_TYPE)
    }

    /// Selection with an explicit full-domain strategy.
    pub fn with_eval_type(database_bitsize: u64, eval_type: EvalType) -> Result<Self> {
        Ok(Self {
            database_bitsize,
            dpf_params: DpfParameters::new(
                database_bitsize,
                1,
                eval_type,
                OutputType::SingleBitMask,
            )?,
        })
    }

    /// Log2 of the database length.
    pub fn database_bitsize(&self) -> u64 {
        self.database_bitsize
    }

    /// Database length.
    pub fn database_size(&self) -> usize {
        1usize << self.database_bitsize
    }

    /// The underlying DPF parameters.
    pub fn dpf_params(&self) -> &DpfParameters {
        &self.dpf_params
    }
}

/// One party's selection key: two mask-mode DPF halves, XOR index blinds and
/// block output masks for its two edges.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OblivSelectKey {
    /// Owning party.
    pub party_id: u64,
    /// DPF half of the edge shared with the predecessor.
    pub key_from_prev: DpfKey,
    /// DPF half of the edge shared with the successor.
    pub key_from_next: DpfKey,
    /// XOR index blind of the predecessor edge.
    pub rsh_from_prev: u64,
    /// XOR index blind of the successor edge.
    pub rsh_from_next: u64,
    /// Block output mask of the predecessor edge.
    pub wsh_from_prev: Block,
    /// Block output mask of the successor edge.
    pub wsh_from_next: Block,
}

impl KeyCodec for OblivSelectKey {
    type Params = OblivSelectParameters;

    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.extend_from_slice(&self.party_id.to_le_bytes());
        self.key_from_prev.serialize(buffer)?;
        self.key_from_next.serialize(buffer)?;
        buffer.extend_from_slice(&self.rsh_from_prev.to_le_bytes());
        buffer.extend_from_slice(&self.rsh_from_next.to_le_bytes());
        buffer.extend_from_slice(&u128::from(self.wsh_from_prev).to_le_bytes());
        buffer.extend_from_slice(&u128::from(self.wsh_from_next).to_le_bytes());
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        8 + self.key_from_prev.calculate_serialized_size()
            + self.key_from_next.calculate_serialized_size()
            + 16
            + 32
    }

    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 8 {
            return Err(
                ProtocolError::Serialization("OblivSelect key buffer too short".into()).into(),
            );
        }
        let mut offset = 0;
        let party_id = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        offset += 8;
        let (key_from_prev, used) = DpfKey::deserialize(params.dpf_params(), &bytes[offset..])?;
        offset += used;
        let (key_from_next, used) = DpfKey::deserialize(params.dpf_params(), &bytes[offset..])?;
        offset += used;
        if bytes.len() < offset + 48 {
            return Err(
                ProtocolError::Serialization("OblivSelect key buffer too short".into()).into(),
            );
        }
        let rsh_from_prev =
            u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8 bytes"));
        offset += 8;
        let rsh_from_next =
            u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8 bytes"));
        offset += 8;
        let wsh_from_prev = Block::from(u128::from_le_bytes(
            bytes[offset..offset + 16].try_into().expect("16 bytes"),
        ));
        offset += 16;
        let wsh_from_next = Block::from(u128::from_le_bytes(
            bytes[offset..offset + 16].try_into().expect("16 bytes"),
        ));
        offset += 16;
        Ok((
            OblivSelectKey {
                party_id,
                key_from_prev,
                key_from_next,
                rsh_from_prev,
                rsh_from_next,
                wsh_from_prev,
                wsh_from_next,
            },
            offset,
        ))
    }
}

/// Dealer-side key generation for block selection.
pub struct OblivSelectKeyGenerator {
    params: OblivSelectParameters,
    dpf_gen: DpfKeyGenerator,
    rng: AesRng,
}

impl OblivSelectKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &OblivSelectParameters) -> Self {
        Self {
            params: *params,
            dpf_gen: DpfKeyGenerator::new(params.dpf_params()),
            rng: AesRng::new(),
        }
    }

    /// Produce the three per-party keys for one selection.
    pub fn generate_keys(&mut self, bss: &mut BinarySharing2P) -> Result<[OblivSelectKey; 3]> {
        let d = self.params.database_bitsize();

        let mut lower_keys = Vec::with_capacity(3);
        let mut upper_keys = Vec::with_capacity(3);
        let mut rsh_lower = [0u64; 3];
        let mut rsh_upper = [0u64; 3];
        let mut wsh = [Block::from(0u128); 3];

        for e in 0..3 {
            let alpha = self.rng.gen::<u64>() & mask(d);
            let (k_lower, k_upper) = self.dpf_gen.generate_keys(&mut self.rng, alpha, 1)?;
            lower_keys.push(k_lower);
            upper_keys.push(k_upper);

            let (blind, co_blind) = {
                let b = bss.generate_random_value() & mask(d);
                (b, alpha ^ b)
            };
            rsh_lower[e] = blind;
            rsh_upper[e] = co_blind;
            wsh[e] = self.rng.gen::<Block>();
        }

        let mut upper: Vec<DpfKey> = upper_keys;
        upper.rotate_left(2);
        let mut upper_it = upper.into_iter();
        let mut lower_it = lower_keys.into_iter();

        let mut out = Vec::with_capacity(3);
        for p in 0..3u64 {
            let prev_edge = ((p + 2) % 3) as usize;
            let next_edge = p as usize;
            out.push(OblivSelectKey {
                party_id: p,
                key_from_prev: upper_it.next().expect("three edges"),
                key_from_next: lower_it.next().expect("three edges"),
                rsh_from_prev: rsh_upper[prev_edge],
                rsh_from_next: rsh_lower[next_edge],
                wsh_from_prev: wsh[prev_edge],
                wsh_from_next: wsh[next_edge],
            });
        }

        let mut it = out.into_iter();
        Ok([
            it.next().expect("three parties"),
            it.next().expect("three parties"),
            it.next().expect("three parties"),
        ])
    }
}

/// Online evaluation of block-selection keys.
pub struct OblivSelectEvaluator {
    params: OblivSelectParameters,
    dpf_eval: DpfEvaluator,
}

impl OblivSelectEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &OblivSelectParameters) -> Self {
        Self {
            params: *params,
            dpf_eval: DpfEvaluator::new(params.dpf_params()),
        }
    }

    /// Parameters this evaluator runs with.
    pub fn params(&self) -> &OblivSelectParameters {
        &self.params
    }

    fn open_masked_indices<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        index: &RepShare,
        key: &OblivSelectKey,
    ) -> Result<(u64, u64)> {
        let m = mask(self.params.database_bitsize());
        let mine_next = (index.data[0] ^ index.data[1] ^ key.rsh_from_next) & m;
        let mine_prev = (index.data[0] ^ key.rsh_from_prev) & m;

        write_u64(&mut chls.next, mine_next)?;
        write_u64(&mut chls.prev, mine_prev)?;
        let theirs_prev = read_u64(&mut chls.prev)?;
        let theirs_next = read_u64(&mut chls.next)?;

        Ok(((mine_prev ^ theirs_prev) & m, (mine_next ^ theirs_next) & m))
    }

    /// XOR of all database blocks whose selector bit is set, with the
    /// selector read at the blinded position `j ^ m`.
    fn masked_xor_dot(&self, uv: &[Block], db: &[Block], m: u64) -> Block {
        let nu = self.params.dpf_params().terminate_bitsize();
        let slot_mask = (1u64 << nu) - 1;
        let mut acc = Block::from(0u128);
        for (j, &v) in db.iter().enumerate() {
            let pos = j as u64 ^ m;
            let bit = (u128::from(uv[(pos >> nu) as usize]) >> (pos & slot_mask)) & 1;
            if bit == 1 {
                acc = acc ^ v;
            }
        }
        acc
    }

    /// Read `database[index]` as a fresh XOR-replicated block share.
    ///
    /// `uv_prev` and `uv_next` must hold at least
    /// `2^(database_bitsize - terminate_bitsize)` blocks.
    pub fn evaluate<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        key: &OblivSelectKey,
        uv_prev: &mut [Block],
        uv_next: &mut [Block],
        database: &RepShareVecBlock,
        index: &RepShare,
    ) -> Result<RepShareBlock> {
        if database.len() != self.params.database_size() {
            return Err(ProtocolError::Configuration(format!(
                "database has {} blocks, the selection domain needs {}",
                database.len(),
                self.params.database_size()
            ))
            .into());
        }

        let (m_prev, m_next) = self.open_masked_indices(chls, index, key)?;

        self.dpf_eval
            .evaluate_full_domain_blocks(&key.key_from_prev, uv_prev)?;
        let t_prev = self.masked_xor_dot(uv_prev, &database.data[1], m_prev);
        self.dpf_eval
            .evaluate_full_domain_blocks(&key.key_from_next, uv_next)?;
        let t_next = self.masked_xor_dot(uv_next, &database.data[0], m_next);

        let s = t_prev ^ t_next ^ key.wsh_from_prev ^ key.wsh_from_next;
        write_block(&mut chls.next, s)?;
        let from_prev = read_block(&mut chls.prev)?;
        Ok(RepShareBlock {
            data: [s, from_prev],
        })
    }
}
