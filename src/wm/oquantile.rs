//! Oblivious quantile: the k-th smallest value in a shared interval of an
//! MSB-first wavelet matrix.
//!
//! Per bit level, two oblivious accesses read the zero-ranks of the interval
//! endpoints, a two-party comparison between the shared k and the zero count
//! decides the subtree, and replicated selects update the endpoints, k, and
//! the result accumulator. Shares live one bit wider than the table width so
//! the comparison can read the sign of a difference.

use anyhow::Result;
use scuttlebutt::AbstractChannel;

use crate::channel_utils::{read_u64, write_u64, Channels};
use crate::errors::ProtocolError;
use crate::proto::integer_comparison::{
    IntegerComparisonEvaluator, IntegerComparisonKey, IntegerComparisonKeyGenerator,
    IntegerComparisonParameters,
};
use crate::proto::key_io::KeyCodec;
use crate::proto::ring_oa::{RingOaEvaluator, RingOaKey, RingOaKeyGenerator, RingOaParameters};
use crate::ring_utils::{mod2n, mul2n};
use crate::sharing::{AdditiveSharing2P, RepShare, RepShareMat, ReplicatedSharing3P};
use crate::wm::plain::{BuildOrder, WaveletMatrix};

/// Parameters of the oblivious quantile.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OQuantileParameters {
    database_bitsize: u64,
    share_size: u64,
    sigma: u64,
    oa_params: RingOaParameters,
    ic_params: IntegerComparisonParameters,
}

impl OQuantileParameters {
    /// Quantile over rank0 rows of `2^database_bitsize` entries and `sigma`
    /// bit levels.
    pub fn new(database_bitsize: u64, sigma: u64) -> Result<Self> {
        let share_size = database_bitsize + 1;
        Ok(Self {
            database_bitsize,
            share_size,
            sigma,
            oa_params: RingOaParameters::with_ring_bitsize(database_bitsize, share_size)?,
            ic_params: IntegerComparisonParameters::new(share_size, share_size)?,
        })
    }

    /// Log2 of the row width.
    pub fn database_bitsize(&self) -> u64 {
        self.database_bitsize
    }

    /// Row width of the shared tables.
    pub fn database_size(&self) -> usize {
        1usize << self.database_bitsize
    }

    /// Ring width of the shares (one bit above the row width).
    pub fn share_size(&self) -> u64 {
        self.share_size
    }

    /// Number of bit levels.
    pub fn sigma(&self) -> u64 {
        self.sigma
    }

    /// The oblivious-access parameters per level.
    pub fn oa_params(&self) -> &RingOaParameters {
        &self.oa_params
    }

    /// The comparison parameters per level.
    pub fn ic_params(&self) -> &IntegerComparisonParameters {
        &self.ic_params
    }
}

/// One party's quantile key: two access keys per level plus (for the two
/// evaluating parties) one comparison key per level.
#[derive(Debug, PartialEq, Eq)]
pub struct OQuantileKey {
    /// Number of nested access keys (`2 * sigma`).
    pub num_oa_keys: u64,
    /// Number of nested comparison keys this party holds.
    pub num_ic_keys: u64,
    /// Access keys, two per bit level.
    pub oa_keys: Vec<RingOaKey>,
    /// Comparison keys, one per bit level; empty at the non-evaluating party.
    pub ic_keys: Vec<IntegerComparisonKey>,
}

impl KeyCodec for OQuantileKey {
    type Params = OQuantileParameters;

    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.extend_from_slice(&self.num_oa_keys.to_le_bytes());
        buffer.extend_from_slice(&self.num_ic_keys.to_le_bytes());
        for key in &self.oa_keys {
            key.serialize(buffer)?;
        }
        for key in &self.ic_keys {
            key.serialize(buffer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        16 + self
            .oa_keys
            .iter()
            .map(|k| k.serialized_size())
            .sum::<usize>()
            + self
                .ic_keys
                .iter()
                .map(|k| k.serialized_size())
                .sum::<usize>()
    }

    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 16 {
            return Err(
                ProtocolError::Serialization("OQuantile key buffer too short".into()).into(),
            );
        }
        let num_oa_keys = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let num_ic_keys = u64::from_le_bytes(bytes[8..16].try_into().expect("8 bytes"));
        let mut offset = 16;
        let mut oa_keys = Vec::with_capacity(num_oa_keys as usize);
        for _ in 0..num_oa_keys {
            let (key, used) = RingOaKey::deserialize(params.oa_params(), &bytes[offset..])?;
            oa_keys.push(key);
            offset += used;
        }
        let mut ic_keys = Vec::with_capacity(num_ic_keys as usize);
        for _ in 0..num_ic_keys {
            let (key, used) =
                IntegerComparisonKey::deserialize(params.ic_params(), &bytes[offset..])?;
            ic_keys.push(key);
            offset += used;
        }
        Ok((
            OQuantileKey {
                num_oa_keys,
                num_ic_keys,
                oa_keys,
                ic_keys,
            },
            offset,
        ))
    }
}

/// Dealer-side key and share generation for the quantile.
pub struct OQuantileKeyGenerator {
    params: OQuantileParameters,
    oa_gen: RingOaKeyGenerator,
    ic_gen: IntegerComparisonKeyGenerator,
}

impl OQuantileKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &OQuantileParameters) -> Self {
        Self {
            params: *params,
            oa_gen: RingOaKeyGenerator::new(params.oa_params()),
            ic_gen: IntegerComparisonKeyGenerator::new(params.ic_params()),
        }
    }

    /// Provision the triple stores for one quantile evaluation.
    pub fn offline_setup(&self, ass: &mut AdditiveSharing2P, file_path: &str) -> Result<()> {
        self.oa_gen
            .offline_setup(ass, self.params.sigma() * 2, file_path)
    }

    /// Share the rank0 tables of an MSB-first wavelet matrix.
    pub fn generate_database_share(
        &self,
        rss: &mut ReplicatedSharing3P,
        wm: &WaveletMatrix,
    ) -> Result<[RepShareMat; 3]> {
        if wm.build_order() != BuildOrder::MsbFirst {
            return Err(ProtocolError::Configuration(
                "quantile needs an MSB-first wavelet matrix".into(),
            )
            .into());
        }
        if wm.length() + 1 != self.params.database_size() {
            return Err(ProtocolError::Configuration(format!(
                "wavelet matrix of length {} does not match the database size {}",
                wm.length(),
                self.params.database_size()
            ))
            .into());
        }
        rss.share_local_mat(wm.rank0_tables(), wm.sigma() as usize, wm.length() + 1)
    }

    /// Produce the three per-party keys of one quantile evaluation.
    pub fn generate_keys(&mut self, ass: &mut AdditiveSharing2P) -> Result<[OQuantileKey; 3]> {
        let sigma = self.params.sigma();

        let mut per_party: [Vec<RingOaKey>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for _ in 0..2 * sigma {
            let oa_keys = self.oa_gen.generate_keys(ass)?;
            for (slot, key) in per_party.iter_mut().zip(oa_keys) {
                slot.push(key);
            }
        }

        let mut ic_first = Vec::with_capacity(sigma as usize);
        let mut ic_second = Vec::with_capacity(sigma as usize);
        for _ in 0..sigma {
            let (k1, k2) = self.ic_gen.generate_keys()?;
            ic_first.push(k1);
            ic_second.push(k2);
        }

        let [oa0, oa1, oa2] = per_party;
        Ok([
            OQuantileKey {
                num_oa_keys: 2 * sigma,
                num_ic_keys: 0,
                oa_keys: oa0,
                ic_keys: Vec::new(),
            },
            OQuantileKey {
                num_oa_keys: 2 * sigma,
                num_ic_keys: sigma,
                oa_keys: oa1,
                ic_keys: ic_first,
            },
            OQuantileKey {
                num_oa_keys: 2 * sigma,
                num_ic_keys: sigma,
                oa_keys: oa2,
                ic_keys: ic_second,
            },
        ])
    }
}

/// Online evaluation of the oblivious quantile.
pub struct OQuantileEvaluator {
    params: OQuantileParameters,
    oa_eval: RingOaEvaluator,
    ic_eval: IntegerComparisonEvaluator,
}

impl OQuantileEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &OQuantileParameters) -> Self {
        Self {
            params: *params,
            oa_eval: RingOaEvaluator::new(params.oa_params()),
            ic_eval: IntegerComparisonEvaluator::new(params.ic_params()),
        }
    }

    /// The k-th smallest value in the shared interval `[left, right)`.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_quantile<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        key: &OQuantileKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        left_sh: RepShare,
        right_sh: RepShare,
        k_sh: RepShare,
    ) -> Result<RepShare> {
        self.quantile_loop(
            chls, rss, key, uv_prev, uv_next, wm_tables, left_sh, right_sh, k_sh, false,
        )
    }

    /// As [evaluate_quantile](Self::evaluate_quantile), with the two
    /// per-level endpoint accesses paired into one expansion pass.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_quantile_parallel<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        key: &OQuantileKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        left_sh: RepShare,
        right_sh: RepShare,
        k_sh: RepShare,
    ) -> Result<RepShare> {
        self.quantile_loop(
            chls, rss, key, uv_prev, uv_next, wm_tables, left_sh, right_sh, k_sh, true,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn quantile_loop<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        key: &OQuantileKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        left_sh: RepShare,
        right_sh: RepShare,
        k_sh: RepShare,
        paired: bool,
    ) -> Result<RepShare> {
        let sigma = self.params.sigma();
        let n = self.params.share_size();
        let party_id = chls.party_id;
        if wm_tables.rows != sigma as usize || wm_tables.cols != self.params.database_size() {
            return Err(ProtocolError::Configuration(format!(
                "shared tables are {}x{}, expected {}x{}",
                wm_tables.rows,
                wm_tables.cols,
                sigma,
                self.params.database_size()
            ))
            .into());
        }

        let mut left = left_sh;
        let mut right = right_sh;
        let mut k = k_sh;
        let mut result = RepShare::default();

        let mut oa_key_idx = 0;
        for bit in (0..sigma).rev() {
            let row = wm_tables.row_view(bit as usize);
            let (zeroleft, zeroright) = if paired {
                let mut lr = crate::sharing::RepShareVec::new(2);
                lr.set(0, left);
                lr.set(1, right);
                let zeros = self.oa_eval.evaluate_parallel(
                    chls,
                    &key.oa_keys[oa_key_idx],
                    &key.oa_keys[oa_key_idx + 1],
                    uv_prev,
                    uv_next,
                    &row,
                    &lr,
                )?;
                (zeros.at(0), zeros.at(1))
            } else {
                let zeroleft = self.oa_eval.evaluate(
                    chls,
                    &key.oa_keys[oa_key_idx],
                    uv_prev,
                    uv_next,
                    &row,
                    &left,
                )?;
                let zeroright = self.oa_eval.evaluate(
                    chls,
                    &key.oa_keys[oa_key_idx + 1],
                    uv_prev,
                    uv_next,
                    &row,
                    &right,
                )?;
                (zeroleft, zeroright)
            };
            oa_key_idx += 2;

            let total_zeros = row.at(row.len() - 1);
            let zerocount = rss.evaluate_sub(&zeroright, &zeroleft);

            // Lift k and the zero count into a two-party sharing and compare.
            let r1 = rss.rand()?;
            let r2 = rss.rand()?;
            let ic_share = match party_id {
                1 => {
                    let k_0 = mod2n(
                        k.data[0].wrapping_add(k.data[1]).wrapping_add(r1.data[1]),
                        n,
                    );
                    let zerocount_0 = mod2n(
                        zerocount.data[0]
                            .wrapping_add(zerocount.data[1])
                            .wrapping_add(r2.data[1]),
                        n,
                    );
                    self.ic_eval.evaluate_shared_input(
                        0,
                        &mut chls.next,
                        &key.ic_keys[bit as usize],
                        k_0,
                        zerocount_0,
                    )?
                }
                2 => {
                    let k_1 = mod2n(k.data[0].wrapping_sub(r1.data[0]), n);
                    let zerocount_1 = mod2n(zerocount.data[0].wrapping_sub(r2.data[0]), n);
                    self.ic_eval.evaluate_shared_input(
                        1,
                        &mut chls.prev,
                        &key.ic_keys[bit as usize],
                        k_1,
                        zerocount_1,
                    )?
                }
                _ => 0,
            };

            // Re-share the comparison bit back into the replicated sharing.
            let r = rss.rand()?;
            let comp0 = mod2n(
                ic_share.wrapping_add(r.data[1]).wrapping_sub(r.data[0]),
                n,
            );
            write_u64(&mut chls.next, comp0)?;
            let comp1 = read_u64(&mut chls.prev)?;
            let comp = RepShare::new(comp0, comp1);

            // Going right consumes the zeros of the interval.
            let k_update = rss.evaluate_sub(&k, &zerocount);
            k = rss.evaluate_select(chls, &k, &k_update, &comp)?;

            let oneleft = rss.evaluate_sub(&rss.evaluate_add(&total_zeros, &left), &zeroleft);
            let oneright = rss.evaluate_sub(&rss.evaluate_add(&total_zeros, &right), &zeroright);
            left = rss.evaluate_select(chls, &zeroleft, &oneleft, &comp)?;
            right = rss.evaluate_select(chls, &zeroright, &oneright, &comp)?;

            let cond = RepShare::new(
                mul2n(comp.data[0], 1 << bit, n),
                mul2n(comp.data[1], 1 << bit, n),
            );
            result = rss.evaluate_add(&result, &cond);
        }

        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::unix_channel::create_three_party_channels;
    use rand::Rng;
    use scuttlebutt::AesRng;

    #[test]
    fn test_quantile_matches_plain() {
        let d = 5;
        let sigma = 3;
        let n = d + 1;
        let mut rng = AesRng::new();
        let data: Vec<u64> = (0..(1 << d) - 1).map(|_| rng.gen::<u64>() % 8).collect();
        let wm = WaveletMatrix::new(&data, sigma, BuildOrder::MsbFirst).unwrap();

        let params = OQuantileParameters::new(d, sigma).unwrap();
        let mut gen = OQuantileKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(n).unwrap();
        let mut rss = ReplicatedSharing3P::new(n).unwrap();

        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = format!("{}/oquantile_", dir.display());
        rss.offline_setup(&prefix).unwrap();

        let tables_sh = gen.generate_database_share(&mut rss, &wm).unwrap();

        for _ in 0..4 {
            let left = rng.gen::<u64>() as usize % (data.len() - 1);
            let right = left + 1 + rng.gen::<u64>() as usize % (data.len() - left);
            let k = rng.gen::<u64>() as usize % (right - left);
            let expected = wm.quantile(left, right, k).unwrap();

            let keys = gen.generate_keys(&mut ass).unwrap();
            let left_sh = rss.share_local(left as u64);
            let right_sh = rss.share_local(right as u64);
            let k_sh = rss.share_local(k as u64);

            let channels = create_three_party_channels().unwrap();
            let prefix_cl = prefix.clone();
            let handles = keys
                .into_iter()
                .zip(channels)
                .enumerate()
                .map(|(p, (key, mut chls))| {
                    let tables = tables_sh[p].clone();
                    let (l, r, kk) = (left_sh[p], right_sh[p], k_sh[p]);
                    let prefix = prefix_cl.clone();
                    std::thread::spawn(move || {
                        let params = OQuantileParameters::new(d, sigma).unwrap();
                        let mut rss = ReplicatedSharing3P::new(n).unwrap();
                        rss.online_setup(p as u64, &prefix).unwrap();
                        let eval = OQuantileEvaluator::new(&params);
                        let mut uv_prev = vec![0u64; params.database_size()];
                        let mut uv_next = vec![0u64; params.database_size()];
                        let res = eval
                            .evaluate_quantile(
                                &mut chls,
                                &mut rss,
                                &key,
                                &mut uv_prev,
                                &mut uv_next,
                                &tables,
                                l,
                                r,
                                kk,
                            )
                            .unwrap();
                        rss.open(&mut chls, &res).unwrap()
                    })
                })
                .collect::<Vec<_>>();

            for h in handles {
                assert_eq!(
                    h.join().unwrap(),
                    expected,
                    "left={} right={} k={}",
                    left,
                    right,
                    k
                );
            }
        }
    }

    #[test]
    fn test_quantile_parallel_matches_plain() {
        let d = 4;
        let sigma = 3;
        let n = d + 1;
        let mut rng = AesRng::new();
        let data: Vec<u64> = (0..(1 << d) - 1).map(|_| rng.gen::<u64>() % 8).collect();
        let wm = WaveletMatrix::new(&data, sigma, BuildOrder::MsbFirst).unwrap();

        let params = OQuantileParameters::new(d, sigma).unwrap();
        let mut gen = OQuantileKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(n).unwrap();
        let mut rss = ReplicatedSharing3P::new(n).unwrap();

        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = format!("{}/oquantile_par_", dir.display());
        rss.offline_setup(&prefix).unwrap();

        let tables_sh = gen.generate_database_share(&mut rss, &wm).unwrap();

        let (left, right, k) = (1usize, 13usize, 5usize);
        let expected = wm.quantile(left, right, k).unwrap();

        let keys = gen.generate_keys(&mut ass).unwrap();
        let left_sh = rss.share_local(left as u64);
        let right_sh = rss.share_local(right as u64);
        let k_sh = rss.share_local(k as u64);

        let channels = create_three_party_channels().unwrap();
        let handles = keys
            .into_iter()
            .zip(channels)
            .enumerate()
            .map(|(p, (key, mut chls))| {
                let tables = tables_sh[p].clone();
                let (l, r, kk) = (left_sh[p], right_sh[p], k_sh[p]);
                let prefix = prefix.clone();
                std::thread::spawn(move || {
                    let params = OQuantileParameters::new(d, sigma).unwrap();
                    let mut rss = ReplicatedSharing3P::new(n).unwrap();
                    rss.online_setup(p as u64, &prefix).unwrap();
                    let eval = OQuantileEvaluator::new(&params);
                    let mut uv_prev = vec![0u64; params.database_size()];
                    let mut uv_next = vec![0u64; params.database_size()];
                    let res = eval
                        .evaluate_quantile_parallel(
                            &mut chls,
                            &mut rss,
                            &key,
                            &mut uv_prev,
                            &mut uv_next,
                            &tables,
                            l,
                            r,
                            kk,
                        )
                        .unwrap();
                    rss.open(&mut chls, &res).unwrap()
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            assert_eq!(h.join().unwrap(), expected);
        }
    }

    #[test]
    fn test_key_serialization_roundtrip() {
        let params = OQuantileParameters::new(4, 3).unwrap();
        let mut gen = OQuantileKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(5).unwrap();
        let keys = gen.generate_keys(&mut ass).unwrap();

        for key in &keys {
            let mut buf = Vec::new();
            key.serialize(&mut buf).unwrap();
            assert_eq!(buf.len(), key.serialized_size());
            let (back, used) = OQuantileKey::deserialize(&params, &buf).unwrap();
            assert_eq!(used, buf.len());
            assert_eq!(&back, key);
        }
    }
}
