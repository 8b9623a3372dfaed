//! Ring-based oblivious access: read a replicated-shared index out of a
//! replicated-shared vector of ring elements.
//!
//! Offline, a dealer draws one DPF per neighbour edge whose hidden point
//! blinds the index on that edge, additively splits the blinds (`rsh`), and
//! hands out telescoping output masks (`wsh`). Online, each neighbour pair
//! opens its blinded index with one exchange, expands the selector over the
//! full domain, takes the rotated dot product against the database component
//! that pair holds in common, and the masked contributions travel once
//! around the ring to become a fresh replicated share of `database[index]`.

use anyhow::Result;
use log::debug;
use rand::Rng;
use scuttlebutt::{AbstractChannel, AesRng};

use crate::channel_utils::Channels;
use crate::errors::ProtocolError;
use crate::fss::{DpfEvaluator, DpfKey, DpfKeyGenerator, DpfParameters, OutputType, OPTIMIZED_EVAL_TYPE};
use crate::proto::access::{
    check_database_len, masked_contribution, open_masked_indices, open_masked_indices_pair,
    reshare_scalar, reshare_vec, rotated_dot,
};
use crate::proto::key_io::KeyCodec;
use crate::ring_utils::{mod2n, sub2n};
use crate::sharing::{AdditiveSharing2P, RepShare, RepShareVec, RepShareView};

/// Parameters of one ring-access instance.
///
/// `database_bitsize` fixes the index domain; `ring_bitsize` the value ring
/// (equal by default, one bit wider for the quantile stack).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RingOaParameters {
    database_bitsize: u64,
    ring_bitsize: u64,
    dpf_params: DpfParameters,
}

impl RingOaParameters {
    /// Access over `2^database_bitsize` elements of the same ring width.
    pub fn new(database_bitsize: u64) -> Result<Self> {
        Self::with_ring_bitsize(database_bitsize, database_bitsize)
    }

    /// Access over `2^database_bitsize` elements in `Z_{2^ring_bitsize}`.
    pub fn with_ring_bitsize(database_bitsize: u64, ring_bitsize: u64) -> Result<Self> {
        if ring_bitsize < database_bitsize {
            return Err(ProtocolError::Configuration(format!(
                "ring_bitsize {} narrower than database_bitsize {}",
                ring_bitsize, database_bitsize
            ))
            .into());
        }
        Ok(Self {
            database_bitsize,
            ring_bitsize,
            dpf_params: DpfParameters::new(
                database_bitsize,
                ring_bitsize,
                OPTIMIZED_EVAL_TYPE,
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

    /// Ring width of the stored values.
    pub fn ring_bitsize(&self) -> u64 {
        self.ring_bitsize
    }

    /// The underlying DPF parameters.
    pub fn dpf_params(&self) -> &DpfParameters {
        &self.dpf_params
    }
}

/// One party's access key: the two edge DPF halves plus the index blinds and
/// output masks of the two edges this party sits on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RingOaKey {
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

impl KeyCodec for RingOaKey {
    type Params = RingOaParameters;

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
            return Err(ProtocolError::Serialization("RingOa key buffer too short".into()).into());
        }
        let mut offset = 0;
        let party_id = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        offset += 8;
        let (key_from_prev, used) = DpfKey::deserialize(params.dpf_params(), &bytes[offset..])?;
        offset += used;
        let (key_from_next, used) = DpfKey::deserialize(params.dpf_params(), &bytes[offset..])?;
        offset += used;
        if bytes.len() < offset + 32 {
            return Err(ProtocolError::Serialization("RingOa key buffer too short".into()).into());
        }
        let mut scalars = [0u64; 4];
        for s in scalars.iter_mut() {
            *s = u64::from_le_bytes(bytes[offset..offset + 8].try_into().expect("8 bytes"));
            offset += 8;
        }
        Ok((
            RingOaKey {
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

/// Dealer-side key generation for ring access.
pub struct RingOaKeyGenerator {
    params: RingOaParameters,
    dpf_gen: DpfKeyGenerator,
    rng: AesRng,
}

impl RingOaKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &RingOaParameters) -> Self {
        Self {
            params: *params,
            dpf_gen: DpfKeyGenerator::new(params.dpf_params()),
            rng: AesRng::new(),
        }
    }

    /// Provision the two-party triple stores consumed by the comparison
    /// protocols layered above; one triple per planned selection.
    pub fn offline_setup(
        &self,
        ass: &mut AdditiveSharing2P,
        num_selection: u64,
        file_path: &str,
    ) -> Result<()> {
        ass.offline_setup(num_selection, file_path)
    }

    /// Produce the three per-party access keys for one lookup.
    pub fn generate_keys(&mut self, ass: &mut AdditiveSharing2P) -> Result<[RingOaKey; 3]> {
        if ass.bitsize() != self.params.ring_bitsize() {
            return Err(ProtocolError::Configuration(format!(
                "additive sharing runs on {} bits, access ring needs {}",
                ass.bitsize(),
                self.params.ring_bitsize()
            ))
            .into());
        }
        let d = self.params.database_bitsize();
        let n = self.params.ring_bitsize();

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
            wsh[e] = mod2n(ass.generate_random_value(), n);
        }

        debug!(
            "generated ring access keys: d={} n={}",
            self.params.database_bitsize(),
            self.params.ring_bitsize()
        );

        let mut upper_it = {
            // party p's prev edge is edge (p + 2) mod 3
            let mut v: Vec<DpfKey> = upper_keys.drain(..).collect();
            v.rotate_left(2);
            v.into_iter()
        };
        let mut lower_it = lower_keys.into_iter();

        let mut out = Vec::with_capacity(3);
        for p in 0..3u64 {
            let prev_edge = ((p + 2) % 3) as usize;
            let next_edge = p as usize;
            out.push(RingOaKey {
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

/// Online evaluation of ring-access keys.
pub struct RingOaEvaluator {
    params: RingOaParameters,
    dpf_eval: DpfEvaluator,
}

impl RingOaEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &RingOaParameters) -> Self {
        Self {
            params: *params,
            dpf_eval: DpfEvaluator::new(params.dpf_params()),
        }
    }

    /// Parameters this evaluator runs with.
    pub fn params(&self) -> &RingOaParameters {
        &self.params
    }

    /// Read `database[index]` as a fresh replicated share.
    ///
    /// `uv_prev` and `uv_next` are caller-owned scratch buffers of at least
    /// `2^database_bitsize` elements, reused across calls.
    pub fn evaluate<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        key: &RingOaKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        database: &RepShareView<'_>,
        index: &RepShare,
    ) -> Result<RepShare> {
        let d = self.params.database_bitsize();
        let n = self.params.ring_bitsize();
        check_database_len(database, d)?;

        let (m_prev, m_next) =
            open_masked_indices(chls, d, index, key.rsh_from_prev, key.rsh_from_next)?;

        self.dpf_eval.evaluate_full_domain(&key.key_from_prev, uv_prev)?;
        self.dpf_eval.evaluate_full_domain(&key.key_from_next, uv_next)?;

        let t_prev = rotated_dot(uv_prev, database.data[1], m_prev, d, n);
        let t_next = rotated_dot(uv_next, database.data[0], m_next, d, n);

        let s = masked_contribution(t_prev, t_next, key.wsh_from_prev, key.wsh_from_next, n);
        reshare_scalar(chls, n, s)
    }

    /// Two independent lookups against the same database view in one pass:
    /// the blinded indices are opened in a single exchange and the final
    /// re-share carries both results together.
    pub fn evaluate_parallel<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        key1: &RingOaKey,
        key2: &RingOaKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        database: &RepShareView<'_>,
        index: &RepShareVec,
    ) -> Result<RepShareVec> {
        let d = self.params.database_bitsize();
        let n = self.params.ring_bitsize();
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
            let t_prev = rotated_dot(uv_prev, database.data[1], masked[i], d, n);
            let t_next = rotated_dot(uv_next, database.data[0], masked[2 + i], d, n);
            contributions[i] =
                masked_contribution(t_prev, t_next, key.wsh_from_prev, key.wsh_from_next, n);
        }

        reshare_vec(chls, n, &contributions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::unix_channel::create_three_party_channels;
    use crate::proto::key_io::{load_key, save_key};
    use crate::sharing::ReplicatedSharing3P;

    fn run_access(d: u64, database: Vec<u64>, index: u64) -> (u64, Vec<u64>) {
        let params = RingOaParameters::new(d).unwrap();
        let mut gen = RingOaKeyGenerator::new(&params);
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
                    let params = RingOaParameters::new(d).unwrap();
                    let rss = ReplicatedSharing3P::new(d).unwrap();
                    let eval = RingOaEvaluator::new(&params);
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

                    let mut idx_vec = RepShareVec::new(2);
                    idx_vec.set(0, idx);
                    idx_vec.set(1, idx);
                    let res_vec = eval
                        .evaluate_parallel(
                            &mut chls,
                            &key,
                            &key,
                            &mut uv_prev,
                            &mut uv_next,
                            &RepShareView::of(&db),
                            &idx_vec,
                        )
                        .unwrap();

                    (
                        rss.open(&mut chls, &res).unwrap(),
                        rss.open_vec(&mut chls, &res_vec).unwrap(),
                    )
                })
            })
            .collect::<Vec<_>>();

        let mut scalar = 0;
        let mut vec_res = Vec::new();
        for h in handles {
            let (s, v) = h.join().unwrap();
            scalar = s;
            vec_res = v;
        }
        (scalar, vec_res)
    }

    #[test]
    fn test_identity_database_d10() {
        let d = 10;
        let database: Vec<u64> = (0..1u64 << d).collect();
        let mut ass = AdditiveSharing2P::new(d).unwrap();
        let index = ass.generate_random_value();

        let (scalar, vec_res) = run_access(d, database, index);
        assert_eq!(scalar, index);
        assert_eq!(vec_res, vec![index, index]);
    }

    #[test]
    fn test_every_index_small_domain() {
        let d = 4;
        let mut rng = AesRng::new();
        let database: Vec<u64> = (0..1u64 << d).map(|_| rng.gen::<u64>() % (1 << d)).collect();
        for index in 0..1u64 << d {
            let (scalar, vec_res) = run_access(d, database.clone(), index);
            assert_eq!(scalar, database[index as usize], "index {}", index);
            assert_eq!(vec_res[0], database[index as usize]);
            assert_eq!(vec_res[1], database[index as usize]);
        }
    }

    #[test]
    fn test_key_io_roundtrip() {
        let params = RingOaParameters::new(8).unwrap();
        let mut gen = RingOaKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(8).unwrap();
        let keys = gen.generate_keys(&mut ass).unwrap();

        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let path = format!("{}/ring_oa_key", dir.display());

        save_key(&path, &keys[1]).unwrap();
        let back: RingOaKey = load_key(&params, &path).unwrap();
        assert_eq!(back, keys[1]);
    }
}
