//! Secure wavelet-matrix rank over ring-based oblivious access.
//!
//! One `evaluate_rank_cf` call walks the sigma bit levels of the shared
//! rank0 tables: per level one oblivious access at the current shared
//! position, a local rank1 derivation from the row-tail zero total, and one
//! replicated select on the corresponding bit of the shared character. The
//! final position is the FM-index rank in C-array form.

use anyhow::Result;
use scuttlebutt::AbstractChannel;

use crate::channel_utils::Channels;
use crate::errors::ProtocolError;
use crate::proto::key_io::KeyCodec;
use crate::proto::ring_oa::{RingOaEvaluator, RingOaKey, RingOaKeyGenerator, RingOaParameters};
use crate::sharing::{AdditiveSharing2P, RepShare, RepShareMat, RepShareVec, RepShareView, ReplicatedSharing3P};
use crate::wm::plain::FmIndex;

/// Parameters of the secure rank protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecureWmParameters {
    database_bitsize: u64,
    sigma: u64,
    oa_params: RingOaParameters,
}

impl SecureWmParameters {
    /// Rank over rank0 rows of `2^database_bitsize` entries and `sigma` bit
    /// levels (3 for DNA).
    pub fn new(database_bitsize: u64, sigma: u64) -> Result<Self> {
        Ok(Self {
            database_bitsize,
            sigma,
            oa_params: RingOaParameters::new(database_bitsize)?,
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

    /// Number of bit levels.
    pub fn sigma(&self) -> u64 {
        self.sigma
    }

    /// The oblivious-access parameters per level.
    pub fn oa_params(&self) -> &RingOaParameters {
        &self.oa_params
    }
}

/// One party's rank key: one access key per bit level.
#[derive(Debug, PartialEq, Eq)]
pub struct SecureWmKey {
    /// Number of nested access keys.
    pub num_oa_keys: u64,
    /// Access keys, one per bit level.
    pub oa_keys: Vec<RingOaKey>,
}

impl KeyCodec for SecureWmKey {
    type Params = SecureWmParameters;

    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.extend_from_slice(&self.num_oa_keys.to_le_bytes());
        for key in &self.oa_keys {
            key.serialize(buffer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        8 + self
            .oa_keys
            .iter()
            .map(|k| k.serialized_size())
            .sum::<usize>()
    }

    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 8 {
            return Err(
                ProtocolError::Serialization("SecureWm key buffer too short".into()).into(),
            );
        }
        let num_oa_keys = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let mut offset = 8;
        let mut oa_keys = Vec::with_capacity(num_oa_keys as usize);
        for _ in 0..num_oa_keys {
            let (key, used) = RingOaKey::deserialize(params.oa_params(), &bytes[offset..])?;
            oa_keys.push(key);
            offset += used;
        }
        Ok((
            SecureWmKey {
                num_oa_keys,
                oa_keys,
            },
            offset,
        ))
    }
}

/// Dealer-side key and share generation for the secure rank.
pub struct SecureWmKeyGenerator {
    params: SecureWmParameters,
    oa_gen: RingOaKeyGenerator,
}

impl SecureWmKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &SecureWmParameters) -> Self {
        Self {
            params: *params,
            oa_gen: RingOaKeyGenerator::new(params.oa_params()),
        }
    }

    /// Provision the triple stores for `num_selection` planned accesses.
    pub fn offline_setup(
        &self,
        ass: &mut AdditiveSharing2P,
        num_selection: u64,
        file_path: &str,
    ) -> Result<()> {
        self.oa_gen.offline_setup(ass, num_selection, file_path)
    }

    /// Share the rank0 tables of a plaintext FM-index.
    pub fn generate_database_share(
        &self,
        rss: &mut ReplicatedSharing3P,
        fm: &FmIndex,
    ) -> Result<[RepShareMat; 3]> {
        let wm = fm.wavelet_matrix();
        if wm.length() + 1 != self.params.database_size() {
            return Err(ProtocolError::Configuration(format!(
                "wavelet matrix of length {} does not match the database size {}",
                wm.length(),
                self.params.database_size()
            ))
            .into());
        }
        rss.share_local_mat(
            fm.rank0_tables(),
            wm.sigma() as usize,
            wm.length() + 1,
        )
    }

    /// Produce the three per-party keys of one rank evaluation.
    pub fn generate_keys(&mut self, ass: &mut AdditiveSharing2P) -> Result<[SecureWmKey; 3]> {
        let sigma = self.params.sigma();
        let mut per_party: [Vec<RingOaKey>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for _ in 0..sigma {
            let oa_keys = self.oa_gen.generate_keys(ass)?;
            for (slot, key) in per_party.iter_mut().zip(oa_keys) {
                slot.push(key);
            }
        }
        Ok(per_party.map(|oa_keys| SecureWmKey {
            num_oa_keys: sigma,
            oa_keys,
        }))
    }
}

/// Online evaluation of the secure rank.
pub struct SecureWmEvaluator {
    params: SecureWmParameters,
    oa_eval: RingOaEvaluator,
}

impl SecureWmEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &SecureWmParameters) -> Self {
        Self {
            params: *params,
            oa_eval: RingOaEvaluator::new(params.oa_params()),
        }
    }

    /// Parameters this evaluator runs with.
    pub fn params(&self) -> &SecureWmParameters {
        &self.params
    }

    fn check_tables(&self, wm_tables: &RepShareMat) -> Result<()> {
        if wm_tables.rows != self.params.sigma() as usize
            || wm_tables.cols != self.params.database_size()
        {
            return Err(ProtocolError::Configuration(format!(
                "shared tables are {}x{}, expected {}x{}",
                wm_tables.rows,
                wm_tables.cols,
                self.params.sigma(),
                self.params.database_size()
            ))
            .into());
        }
        Ok(())
    }

    /// Rank of the shared character at the shared position.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_rank_cf<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        key: &SecureWmKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        char_sh: &RepShareView<'_>,
        position_sh: RepShare,
    ) -> Result<RepShare> {
        self.check_tables(wm_tables)?;
        if char_sh.len() != self.params.sigma() as usize {
            return Err(ProtocolError::Configuration(format!(
                "character row has {} bits, expected {}",
                char_sh.len(),
                self.params.sigma()
            ))
            .into());
        }

        let mut position = position_sh;
        for i in 0..self.params.sigma() as usize {
            let row = wm_tables.row_view(i);
            let rank0 =
                self.oa_eval
                    .evaluate(chls, &key.oa_keys[i], uv_prev, uv_next, &row, &position)?;

            let total_zeros = row.at(row.len() - 1);
            let p_sub_rank0 = rss.evaluate_sub(&position, &rank0);
            let rank1 = rss.evaluate_add(&p_sub_rank0, &total_zeros);
            position = rss.evaluate_select(chls, &rank0, &rank1, &char_sh.at(i))?;
        }
        Ok(position)
    }

    /// Rank of the shared character at two shared positions (the f- and
    /// g-endpoints of an FM-index interval) in one access pass per level.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_rank_cf_parallel<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        key1: &SecureWmKey,
        key2: &SecureWmKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        char_sh: &RepShareView<'_>,
        position_sh: RepShareVec,
    ) -> Result<RepShareVec> {
        self.check_tables(wm_tables)?;
        if position_sh.len() != 2 {
            return Err(ProtocolError::Configuration(format!(
                "parallel rank expects 2 positions, got {}",
                position_sh.len()
            ))
            .into());
        }

        let mut position = position_sh;
        for i in 0..self.params.sigma() as usize {
            let row = wm_tables.row_view(i);
            let rank0 = self.oa_eval.evaluate_parallel(
                chls,
                &key1.oa_keys[i],
                &key2.oa_keys[i],
                uv_prev,
                uv_next,
                &row,
                &position,
            )?;

            let tail = row.at(row.len() - 1);
            let mut total_zeros = RepShareVec::new(2);
            total_zeros.set(0, tail);
            total_zeros.set(1, tail);

            let p_sub_rank0 = rss.evaluate_sub_vec(&position, &rank0);
            let rank1 = rss.evaluate_add_vec(&p_sub_rank0, &total_zeros);
            position = rss.evaluate_select_vec(chls, &rank0, &rank1, &char_sh.at(i))?;
        }
        Ok(position)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::unix_channel::create_three_party_channels;
    use crate::wm::plain::{CharType, FmIndex};

    fn test_prefix(name: &str) -> String {
        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        format!("{}/{}_", dir.display(), name)
    }

    #[test]
    fn test_rank_cf_matches_plain() {
        let d = 5;
        let sigma = 3;
        let text = "CATTAGAGGCATTACATTAGAGGCATTAGT"; // 30 chars, BWT width 32
        let fm = FmIndex::new(text, CharType::Dna).unwrap();
        assert_eq!(fm.bwt_len() + 1, 1 << d);

        let params = SecureWmParameters::new(d, sigma).unwrap();
        let mut gen = SecureWmKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(d).unwrap();
        let mut rss = ReplicatedSharing3P::new(d).unwrap();
        let prefix = test_prefix("secure_wm");
        rss.offline_setup(&prefix).unwrap();

        let tables_sh = gen.generate_database_share(&mut rss, &fm).unwrap();

        for c in [0u64, 1, 2, 3, 4, 7] {
            for position in [0usize, 13, fm.bwt_len()] {
                let expected = fm.wavelet_matrix().rank_cf(c, position).unwrap();

                let keys = gen.generate_keys(&mut ass).unwrap();
                let char_bits: Vec<u64> = (0..sigma).map(|b| (c >> b) & 1).collect();
                let char_sh = rss.share_local_vec(&char_bits);
                let pos_sh = rss.share_local(position as u64);

                let channels = create_three_party_channels().unwrap();
                let prefix_cl = prefix.clone();
                let handles = keys
                    .into_iter()
                    .zip(channels)
                    .enumerate()
                    .map(|(p, (key, mut chls))| {
                        let tables = tables_sh[p].clone();
                        let chars = char_sh[p].clone();
                        let pos = pos_sh[p];
                        let prefix = prefix_cl.clone();
                        std::thread::spawn(move || {
                            let params = SecureWmParameters::new(d, sigma).unwrap();
                            let mut rss = ReplicatedSharing3P::new(d).unwrap();
                            rss.online_setup(p as u64, &prefix).unwrap();
                            let eval = SecureWmEvaluator::new(&params);
                            let mut uv_prev = vec![0u64; params.database_size()];
                            let mut uv_next = vec![0u64; params.database_size()];
                            let rank = eval
                                .evaluate_rank_cf(
                                    &mut chls,
                                    &mut rss,
                                    &key,
                                    &mut uv_prev,
                                    &mut uv_next,
                                    &tables,
                                    &RepShareView::of(&chars),
                                    pos,
                                )
                                .unwrap();
                            rss.open(&mut chls, &rank).unwrap()
                        })
                    })
                    .collect::<Vec<_>>();

                for h in handles {
                    assert_eq!(h.join().unwrap(), expected, "c={} pos={}", c, position);
                }
            }
        }
    }

    #[test]
    fn test_parallel_rank_matches_sequential() {
        let d = 5;
        let sigma = 3;
        let text = "CATTAGAGGCATTACATTAGAGGCATTAGT";
        let fm = FmIndex::new(text, CharType::Dna).unwrap();

        let params = SecureWmParameters::new(d, sigma).unwrap();
        let mut gen = SecureWmKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(d).unwrap();
        let mut rss = ReplicatedSharing3P::new(d).unwrap();
        let prefix = test_prefix("secure_wm_par");
        rss.offline_setup(&prefix).unwrap();

        let tables_sh = gen.generate_database_share(&mut rss, &fm).unwrap();

        let c = 3u64;
        let (f, g) = (2u64, 29u64);
        let expected_f = fm.wavelet_matrix().rank_cf(c, f as usize).unwrap();
        let expected_g = fm.wavelet_matrix().rank_cf(c, g as usize).unwrap();

        let keys1 = gen.generate_keys(&mut ass).unwrap();
        let keys2 = gen.generate_keys(&mut ass).unwrap();
        let char_bits: Vec<u64> = (0..sigma).map(|b| (c >> b) & 1).collect();
        let char_sh = rss.share_local_vec(&char_bits);
        let fg_sh = rss.share_local_vec(&[f, g]);

        let channels = create_three_party_channels().unwrap();
        let prefix_cl = prefix.clone();
        let handles = keys1
            .into_iter()
            .zip(keys2)
            .zip(channels)
            .enumerate()
            .map(|(p, ((key1, key2), mut chls))| {
                let tables = tables_sh[p].clone();
                let chars = char_sh[p].clone();
                let fg = fg_sh[p].clone();
                let prefix = prefix_cl.clone();
                std::thread::spawn(move || {
                    let params = SecureWmParameters::new(d, sigma).unwrap();
                    let mut rss = ReplicatedSharing3P::new(d).unwrap();
                    rss.online_setup(p as u64, &prefix).unwrap();
                    let eval = SecureWmEvaluator::new(&params);
                    let mut uv_prev = vec![0u64; params.database_size()];
                    let mut uv_next = vec![0u64; params.database_size()];
                    let rank = eval
                        .evaluate_rank_cf_parallel(
                            &mut chls,
                            &mut rss,
                            &key1,
                            &key2,
                            &mut uv_prev,
                            &mut uv_next,
                            &tables,
                            &RepShareView::of(&chars),
                            fg,
                        )
                        .unwrap();
                    rss.open_vec(&mut chls, &rank).unwrap()
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            assert_eq!(h.join().unwrap(), vec![expected_f, expected_g]);
        }
    }
}
