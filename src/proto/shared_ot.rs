//! Shared oblivious transfer: the plain DPF-selection flavour of oblivious
//! access, with a configurable full-domain strategy.
//!
//! Same edge construction and contract as [ring_oa](crate::proto::ring_oa),
//! but the value ring always matches the index domain and the caller picks
//! the expansion strategy, which makes this the variant of choice for small
//! databases and for strategy comparisons.

use anyhow::Result;
use rand::Rng;
use scuttlebutt::{AbstractChannel, AesRng};

use crate::channel_utils::Channels;
use crate::errors::ProtocolError;
use crate::fss::{
    DpfEvaluator, DpfKey, DpfKeyGenerator, DpfParameters, EvalType, OutputType,
    OPTIMIZED_EVAL_TYPE,
};
use crate::proto::access::{
    check_database_len, masked_contribution, open_masked_indices, open_masked_indices_pair,
    reshare_scalar, reshare_vec, rotated_dot,
};
use crate::proto::key_io::KeyCodec;
use crate::ring_utils::{mod2n, sub2n};
use crate::sharing::{AdditiveSharing2P, RepShare, RepShareVec, RepShareView};

/// Parameters of one shared-OT instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SharedOtParameters {
    database_bitsize: u64,
    dpf_params: DpfParameters,
}

impl SharedOtParameters {
    /// Access over `2^database_bitsize` elements with the default strategy.
    pub fn new(database_bitsize: u64) -> Result<Self> {
        Self::with_eval_type(database_bitsize, OPTIMIZED_EVAL_TYPE)
    }

    /// Access with an explicit full-domain strategy.
    pub fn with_eval_type(database_bitsize: u64, eval_type: EvalType) -> Result<Self> {
        Ok(Self {
            database_bitsize,
            dpf_params: DpfParameters::new(
                database_bitsize,
                database_bitsize,
                eval_type,
                OutputType::ShiftedAdditive,
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

/// One party's shared-OT key; same shape as the ring-access key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SharedOtKey {
    /// Owning party.
    pub party_id: u64,
    /// DPF half of the edge shared with the predecessor.
    pub key_from_prev: DpfKey,
    /// DPF half of the edge shared with the successor.
    pub key_from_next: DpfKey,
    /// Index blind share of the predecessor edge.
    pub rsh_from_prev: u64,
    /// Index blind share of the successor edge.
    pub rsh_from_next: u64,
    /// Output mask of the predecessor edge.
    pub wsh_from_prev: u64,
    /// Output mask of the successor edge.
    pub wsh_from_next: u64,
}

impl KeyCodec for SharedOtKey {
    type Params = SharedOtParameters;

    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.extend_from_slice(&self.party_id.to_le_bytes());
        self.key_from_prev.serialize(buffer)?;
        self.key_from_next.serialize(buffer)?;
        for x in [
            self.rsh_from_prev,
            self.rsh_from_next,
            self.wsh_from_prev,
            self.wsh_from_next,
        ] {
            buffer.extend_from_slice(&x.to_le_bytes());
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        8 + self.key_from_prev.calculate_serialized_size()
            + self.key_from_next.calculate_serialized_size()
            + 32
    }

    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 8 {
            return Err(
                ProtocolError::Serialization("SharedOt key buffer too short".into()).into(),
            );
        }
        let mut offset = 0;
        let party_id = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        offset += 8;
        let (key_from_prev, used) = DpfKey::deserialize(params.dpf_params(), &bytes[offset..])?;
        offset += used;
        let (key_from_next, used) = DpfKey::deserialize(params.dpf_params(), &bytes[offset..])?;
        offset += used;
        if bytes.len() < offset + 32 {
            return Err(
                ProtocolError::Serialization("SharedOt key buffer too short".into()).into(),
            );
        }
        let mut scalars = [0u64; 4];
        for s in scalars.iter_mut() {
            *s = u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8 bytes"));
            offset += 8;
        }
        Ok((
            SharedOtKey {
                party_id,
                key_from_prev,
                key_from_next,
                rsh_from_prev: scalars[0],
                rsh_from_next: scalars[1],
                wsh_from_prev: scalars[2],
                wsh_from_next: scalars[3],
            },
            offset,
        ))
    }
}

/// Dealer-side key generation for shared OT.
pub struct SharedOtKeyGenerator {
    params: SharedOtParameters,
    dpf_gen: DpfKeyGenerator,
    rng: AesRng,
}

impl SharedOtKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &SharedOtParameters) -> Self {
        Self {
            params: *params,
            dpf_gen: DpfKeyGenerator::new(params.dpf_params()),
            rng: AesRng::new(),
        }
    }

    /// Produce the three per-party keys for one lookup.
    pub fn generate_keys(&mut self, ass: &mut AdditiveSharing2P) -> Result<[SharedOtKey; 3]> {
        if ass.bitsize() != self.params.database_bitsize() {
            return Err(ProtocolError::Configuration(format!(
                "additive sharing runs on {} bits, shared OT needs {}",
                ass.bitsize(),
                self.params.database_bitsize()
            ))
            .into());
        }
        let d = self.params.database_bitsize();

        let mut lower_keys = Vec::with_capacity(3);
        let mut upper_keys = Vec::with_capacity(3);
        let mut rsh_lower = [0u64; 3];
        let mut rsh_upper = [0u64; 3];
        let mut wsh = [0u64; 3];

        for e in 0..3 {
            let alpha = mod2n(self.rng.gen::<u64>(), d);
            let (k_lower, k_upper) = self.dpf_gen.generate_keys(&mut self.rng, alpha, 1)?;
            lower_keys.push(k_lower);
            upper_keys.push(k_upper);

            let blind = mod2n(ass.generate_random_value(), d);
            rsh_lower[e] = blind;
            rsh_upper[e] = sub2n(alpha, blind, d);
            wsh[e] = ass.generate_random_value();
        }

        let mut upper: Vec<DpfKey> = upper_keys;
        upper.rotate_left(2);
        let mut upper_it = upper.into_iter();
        let mut lower_it = lower_keys.into_iter();

        let mut out = Vec::with_capacity(3);
        for p in 0..3u64 {
            let prev_edge = ((p + 2) % 3) as usize;
            let next_edge = p as usize;
            out.push(SharedOtKey {
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

/// Online evaluation of shared-OT keys.
pub struct SharedOtEvaluator {
    params: SharedOtParameters,
    dpf_eval: DpfEvaluator,
}

impl SharedOtEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &SharedOtParameters) -> Self {
        Self {
            params: *params,
            dpf_eval: DpfEvaluator::new(params.dpf_params()),
        }
    }

    /// Parameters this evaluator runs with.
    pub fn params(&self) -> &SharedOtParameters {
        &self.params
    }

    /// Read `database[index]` as a fresh replicated share.
    pub fn evaluate<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        key: &SharedOtKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        database: &RepShareView<'_>,
        index: &RepShare,
    ) -> Result<RepShare> {
        let d = self.params.database_bitsize();
        check_database_len(database, d)?;

        let (m_prev, m_next) =
            open_masked_indices(chls, d, index, key.rsh_from_prev, key.rsh_from_next)?;

        self.dpf_eval.evaluate_full_domain(&key.key_from_prev, uv_prev)?;
        self.dpf_eval.evaluate_full_domain(&key.key_from_next, uv_next)?;

        let t_prev = rotated_dot(uv_prev, database.data[1], m_prev, d, d);
        let t_next = rotated_dot(uv_next, database.data[0], m_next, d, d);

        let s = masked_contribution(t_prev, t_next, key.wsh_from_prev, key.wsh_from_next, d);
        reshare_scalar(chls, d, s)
    }

    /// Two independent lookups in one pass; see
    /// [RingOaEvaluator::evaluate_parallel](crate::proto::ring_oa::RingOaEvaluator::evaluate_parallel).
    pub fn evaluate_parallel<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        key1: &SharedOtKey,
        key2: &SharedOtKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        database: &RepShareView<'_>,
        index: &RepShareVec,
    ) -> Result<RepShareVec> {
        let d = self.params.database_bitsize();
        check_database_len(database, d)?;
        if index.len() != 2 {
            return Err(ProtocolError::Configuration(format!(
                "parallel access expects 2 indices, got {}",
                index.len()
            ))
            .into());
        }

        let masked = open_masked_indices_pair(
            chls,
            d,
            &index.at(0),
            (key1.rsh_from_prev, key1.rsh_from_next),
            &index.at(1),
            (key2.rsh_from_prev, key2.rsh_from_next),
        )?;

        let mut contributions = [0u64; 2];
        for (i, key) in [key1, key2].into_iter().enumerate() {
            self.dpf_eval.evaluate_full_domain(&key.key_from_prev, uv_prev)?;
            self.dpf_eval.evaluate_full_domain(&key.key_from_next, uv_next)?;
            let t_prev = rotated_dot(uv_prev, database.data[1], masked[i], d, d);
            let t_next = rotated_dot(uv_next, database.data[0], masked[2 + i], d, d);
            contributions[i] =
                masked_contribution(t_prev, t_next, key.wsh_from_prev, key.wsh_from_next, d);
        }

        reshare_vec(chls, d, &contributions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::unix_channel::create_three_party_channels;
    use crate::sharing::ReplicatedSharing3P;

    fn run_access(params: SharedOtParameters, database: Vec<u64>, index: u64) -> u64 {
        let d = params.database_bitsize();
        let mut gen = SharedOtKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(d).unwrap();
        let keys = gen.generate_keys(&mut ass).unwrap();

        let mut rss = ReplicatedSharing3P::new(d).unwrap();
        let db_sh = rss.share_local_vec(&database);
        let idx_sh = rss.share_local(index);

        let channels = create_three_party_channels().unwrap();
        let handles = keys
            .into_iter()
            .zip(channels)
            .enumerate()
            .map(|(p, (key, mut chls))| {
                let db = db_sh[p].clone();
                let idx = idx_sh[p];
                std::thread::spawn(move || {
                    let rss = ReplicatedSharing3P::new(d).unwrap();
                    let eval = SharedOtEvaluator::new(&params);
                    let mut uv_prev = vec![0u64; params.database_size()];
                    let mut uv_next = vec![0u64; params.database_size()];
                    let res = eval
                        .evaluate(
                            &mut chls,
                            &key,
                            &mut uv_prev,
                            &mut uv_next,
                            &RepShareView::of(&db),
                            &idx,
                        )
                        .unwrap();
                    rss.open(&mut chls, &res).unwrap()
                })
            })
            .collect::<Vec<_>>();

        let mut result = 0;
        for h in handles {
            result = h.join().unwrap();
        }
        result
    }

    #[test]
    fn test_access_under_every_strategy() {
        let d = 6;
        let mut rng = AesRng::new();
        let database: Vec<u64> = (0..1u64 << d).map(|_| rng.gen::<u64>() % (1 << d)).collect();
        let index = rng.gen::<u64>() % (1 << d);

        for eval_type in [
            EvalType::Iterative,
            EvalType::IterSingleBatch,
            EvalType::IterDepthFirst,
            EvalType::HybridBatched,
        ] {
            let params = SharedOtParameters::with_eval_type(d, eval_type).unwrap();
            assert_eq!(
                run_access(params, database.clone(), index),
                database[index as usize],
                "{:?}",
                eval_type
            );
        }
    }
}
