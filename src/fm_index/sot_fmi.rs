//! Longest-prefix-match over the shared-OT rank variant.
//!
//! Identical search loop and zero-test tail as
//! [secure_fmi](crate::fm_index::secure_fmi), composed over
//! [SotWm](crate::wm::sot_wm) so the whole pipeline runs on the
//! strategy-configurable access flavour.

use anyhow::Result;
use scuttlebutt::AbstractChannel;

use crate::channel_utils::{read_u64_vec, write_u64_vec, Channels};
use crate::errors::ProtocolError;
use crate::fss::EvalType;
use crate::proto::key_io::KeyCodec;
use crate::proto::zero_test::{
    ZeroTestEvaluator, ZeroTestKey, ZeroTestKeyGenerator, ZeroTestParameters,
};
use crate::ring_utils::mod2n;
use crate::sharing::{AdditiveSharing2P, RepShare, RepShareMat, RepShareVec, ReplicatedSharing3P};
use crate::wm::plain::FmIndex;
use crate::wm::sot_wm::{SotWmEvaluator, SotWmKey, SotWmKeyGenerator, SotWmParameters};

/// Parameters of the shared-OT longest-prefix-match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SotFmiParameters {
    query_size: u64,
    wm_params: SotWmParameters,
    zt_params: ZeroTestParameters,
}

impl SotFmiParameters {
    /// Match with the default expansion strategy.
    pub fn new(database_bitsize: u64, query_size: u64, sigma: u64) -> Result<Self> {
        Self::with_eval_type(database_bitsize, query_size, sigma, crate::fss::OPTIMIZED_EVAL_TYPE)
    }

    /// Match with an explicit expansion strategy.
    pub fn with_eval_type(
        database_bitsize: u64,
        query_size: u64,
        sigma: u64,
        eval_type: EvalType,
    ) -> Result<Self> {
        if query_size == 0 || query_size >= 1 << database_bitsize {
            return Err(ProtocolError::Configuration(format!(
                "query of {} characters cannot be matched against a {}-bit index",
                query_size, database_bitsize
            ))
            .into());
        }
        Ok(Self {
            query_size,
            wm_params: SotWmParameters::with_eval_type(database_bitsize, sigma, eval_type)?,
            zt_params: ZeroTestParameters::new(database_bitsize, database_bitsize)?,
        })
    }

    /// Log2 of the table width.
    pub fn database_bitsize(&self) -> u64 {
        self.wm_params.database_bitsize()
    }

    /// Table width.
    pub fn database_size(&self) -> usize {
        self.wm_params.database_size()
    }

    /// Number of query characters.
    pub fn query_size(&self) -> u64 {
        self.query_size
    }

    /// Number of bit levels.
    pub fn sigma(&self) -> u64 {
        self.wm_params.sigma()
    }

    /// The rank parameters per character.
    pub fn wm_params(&self) -> &SotWmParameters {
        &self.wm_params
    }

    /// The zero-test parameters per character.
    pub fn zt_params(&self) -> &ZeroTestParameters {
        &self.zt_params
    }
}

/// One party's shared-OT longest-prefix-match key.
#[derive(Debug, PartialEq, Eq)]
pub struct SotFmiKey {
    /// Number of rank keys per endpoint.
    pub num_wm_keys: u64,
    /// Number of zero-test keys this party holds.
    pub num_zt_keys: u64,
    /// Rank keys for the f-endpoint.
    pub wm_f_keys: Vec<SotWmKey>,
    /// Rank keys for the g-endpoint.
    pub wm_g_keys: Vec<SotWmKey>,
    /// Zero-test keys; empty at the non-evaluating party.
    pub zt_keys: Vec<ZeroTestKey>,
}

impl KeyCodec for SotFmiKey {
    type Params = SotFmiParameters;

    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.extend_from_slice(&self.num_wm_keys.to_le_bytes());
        buffer.extend_from_slice(&self.num_zt_keys.to_le_bytes());
        for key in self.wm_f_keys.iter().chain(&self.wm_g_keys) {
            key.serialize(buffer)?;
        }
        for key in &self.zt_keys {
            key.serialize(buffer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        16 + self
            .wm_f_keys
            .iter()
            .chain(&self.wm_g_keys)
            .map(|k| k.serialized_size())
            .sum::<usize>()
            + self
                .zt_keys
                .iter()
                .map(|k| k.serialized_size())
                .sum::<usize>()
    }

    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 16 {
            return Err(ProtocolError::Serialization("SotFmi key buffer too short".into()).into());
        }
        let num_wm_keys = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let num_zt_keys = u64::from_le_bytes(bytes[8..16].try_into().expect("8 bytes"));
        let mut offset = 16;

        let mut read_wm_keys = |offset: &mut usize| -> Result<Vec<SotWmKey>> {
            let mut keys = Vec::with_capacity(num_wm_keys as usize);
            for _ in 0..num_wm_keys {
                let (key, used) = SotWmKey::deserialize(params.wm_params(), &bytes[*offset..])?;
                keys.push(key);
                *offset += used;
            }
            Ok(keys)
        };
        let wm_f_keys = read_wm_keys(&mut offset)?;
        let wm_g_keys = read_wm_keys(&mut offset)?;

        let mut zt_keys = Vec::with_capacity(num_zt_keys as usize);
        for _ in 0..num_zt_keys {
            let (key, used) = ZeroTestKey::deserialize(params.zt_params(), &bytes[offset..])?;
            zt_keys.push(key);
            offset += used;
        }
        Ok((
            SotFmiKey {
                num_wm_keys,
                num_zt_keys,
                wm_f_keys,
                wm_g_keys,
                zt_keys,
            },
            offset,
        ))
    }
}

/// Dealer-side key and share generation.
pub struct SotFmiKeyGenerator {
    params: SotFmiParameters,
    wm_gen: SotWmKeyGenerator,
    zt_gen: ZeroTestKeyGenerator,
}

impl SotFmiKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &SotFmiParameters) -> Self {
        Self {
            params: *params,
            wm_gen: SotWmKeyGenerator::new(params.wm_params()),
            zt_gen: ZeroTestKeyGenerator::new(params.zt_params()),
        }
    }

    /// Share the rank0 tables of the plaintext FM-index.
    pub fn generate_database_share(
        &self,
        rss: &mut ReplicatedSharing3P,
        fm: &FmIndex,
    ) -> Result<[RepShareMat; 3]> {
        self.wm_gen.generate_database_share(rss, fm)
    }

    /// Share the query's bit matrix.
    pub fn generate_query_share(
        &self,
        rss: &mut ReplicatedSharing3P,
        fm: &FmIndex,
        query: &str,
    ) -> Result<[RepShareMat; 3]> {
        if query.chars().count() as u64 != self.params.query_size() {
            return Err(ProtocolError::Configuration(format!(
                "query has {} characters, parameters say {}",
                query.chars().count(),
                self.params.query_size()
            ))
            .into());
        }
        let bits = fm.convert_to_bit_matrix(query)?;
        rss.share_local_mat(
            &bits,
            self.params.query_size() as usize,
            self.params.sigma() as usize,
        )
    }

    /// Produce the three per-party keys of one query.
    pub fn generate_keys(&mut self, ass: &mut AdditiveSharing2P) -> Result<[SotFmiKey; 3]> {
        let qs = self.params.query_size();

        let mut f_keys: [Vec<SotWmKey>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        let mut g_keys: [Vec<SotWmKey>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for _ in 0..qs {
            for (slot, key) in f_keys.iter_mut().zip(self.wm_gen.generate_keys(ass)?) {
                slot.push(key);
            }
            for (slot, key) in g_keys.iter_mut().zip(self.wm_gen.generate_keys(ass)?) {
                slot.push(key);
            }
        }

        let mut zt_first = Vec::with_capacity(qs as usize);
        let mut zt_second = Vec::with_capacity(qs as usize);
        for _ in 0..qs {
            let (k1, k2) = self.zt_gen.generate_keys()?;
            zt_first.push(k1);
            zt_second.push(k2);
        }

        let [f0, f1, f2] = f_keys;
        let [g0, g1, g2] = g_keys;
        Ok([
            SotFmiKey {
                num_wm_keys: qs,
                num_zt_keys: 0,
                wm_f_keys: f0,
                wm_g_keys: g0,
                zt_keys: Vec::new(),
            },
            SotFmiKey {
                num_wm_keys: qs,
                num_zt_keys: qs,
                wm_f_keys: f1,
                wm_g_keys: g1,
                zt_keys: zt_first,
            },
            SotFmiKey {
                num_wm_keys: qs,
                num_zt_keys: qs,
                wm_f_keys: f2,
                wm_g_keys: g2,
                zt_keys: zt_second,
            },
        ])
    }
}

/// Online evaluation over the shared-OT rank.
pub struct SotFmiEvaluator {
    params: SotFmiParameters,
    wm_eval: SotWmEvaluator,
    zt_eval: ZeroTestEvaluator,
}

impl SotFmiEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &SotFmiParameters) -> Self {
        Self {
            params: *params,
            wm_eval: SotWmEvaluator::new(params.wm_params()),
            zt_eval: ZeroTestEvaluator::new(params.zt_params()),
        }
    }

    /// Shared indicator vector of the backward search; see
    /// [SecureFmiEvaluator::evaluate_lpm](crate::fm_index::secure_fmi::SecureFmiEvaluator::evaluate_lpm).
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_lpm<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        ass_prev: &AdditiveSharing2P,
        ass_next: &AdditiveSharing2P,
        key: &SotFmiKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        query: &RepShareMat,
    ) -> Result<RepShareVec> {
        let d = self.params.database_bitsize();
        let qs = self.params.query_size() as usize;
        let party_id = chls.party_id;

        let mut f = RepShare::default();
        let mut g = RepShare::default();
        let table_tail = (wm_tables.cols - 1) as u64;
        if party_id == 0 {
            g.data[0] = table_tail;
        } else if party_id == 1 {
            g.data[1] = table_tail;
        }

        let mut interval = RepShareVec::new(qs);
        for i in 0..qs {
            let row = query.row_view(i);
            f = self.wm_eval.evaluate_rank_cf(
                chls,
                rss,
                &key.wm_f_keys[i],
                uv_prev,
                uv_next,
                wm_tables,
                &row,
                f,
            )?;
            g = self.wm_eval.evaluate_rank_cf(
                chls,
                rss,
                &key.wm_g_keys[i],
                uv_prev,
                uv_next,
                wm_tables,
                &row,
                g,
            )?;
            interval.set(i, rss.evaluate_sub(&g, &f));
        }

        let r = rss.rand()?;
        let mut zt_shares = vec![0u64; qs];
        if party_id == 1 {
            let masked_mine: Vec<u64> = (0..qs)
                .map(|i| {
                    mod2n(
                        interval.data[0][i]
                            .wrapping_add(interval.data[1][i])
                            .wrapping_add(r.data[1])
                            .wrapping_add(key.zt_keys[i].shr_in),
                        d,
                    )
                })
                .collect();
            let masked = ass_next.reconst_vec(0, &mut chls.next, &masked_mine)?;
            for i in 0..qs {
                zt_shares[i] = self.zt_eval.evaluate_masked_input(&key.zt_keys[i], masked[i])?;
            }
        } else if party_id == 2 {
            let masked_mine: Vec<u64> = (0..qs)
                .map(|i| {
                    mod2n(
                        interval.data[0][i]
                            .wrapping_sub(r.data[0])
                            .wrapping_add(key.zt_keys[i].shr_in),
                        d,
                    )
                })
                .collect();
            let masked = ass_prev.reconst_vec(1, &mut chls.prev, &masked_mine)?;
            for i in 0..qs {
                zt_shares[i] = self.zt_eval.evaluate_masked_input(&key.zt_keys[i], masked[i])?;
            }
        }

        let mut result = RepShareVec::new(qs);
        for i in 0..qs {
            let ri = rss.rand()?;
            result.data[0][i] = mod2n(
                zt_shares[i]
                    .wrapping_add(ri.data[1])
                    .wrapping_sub(ri.data[0]),
                d,
            );
        }
        write_u64_vec(&mut chls.next, &result.data[0])?;
        result.data[1] = read_u64_vec(&mut chls.prev)?;
        if result.data[1].len() != qs {
            return Err(ProtocolError::Transport("indicator reshare shape mismatch".into()).into());
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::unix_channel::create_three_party_channels;
    use crate::fm_index::secure_fmi::lpm_from_indicators;
    use crate::wm::plain::{random_dna_text, CharType};
    use scuttlebutt::AesRng;

    #[test]
    fn test_lpm_matches_plain() {
        let d = 5;
        let mut rng = AesRng::new();
        let text = random_dna_text(30, &mut rng);
        let query = random_dna_text(6, &mut rng);
        let fm = FmIndex::new(&text, CharType::Dna).unwrap();
        let expected = fm.compute_lpm_from_wm(&query).unwrap();

        let params = SotFmiParameters::with_eval_type(d, 6, 3, EvalType::IterSingleBatch).unwrap();
        let mut gen = SotFmiKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(d).unwrap();
        let mut rss = ReplicatedSharing3P::new(d).unwrap();

        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = format!("{}/sot_fmi_", dir.display());
        rss.offline_setup(&prefix).unwrap();

        let tables_sh = gen.generate_database_share(&mut rss, &fm).unwrap();
        let query_sh = gen.generate_query_share(&mut rss, &fm, &query).unwrap();
        let keys = gen.generate_keys(&mut ass).unwrap();

        let channels = create_three_party_channels().unwrap();
        let handles = keys
            .into_iter()
            .zip(channels)
            .enumerate()
            .map(|(p, (key, mut chls))| {
                let tables = tables_sh[p].clone();
                let query_mat = query_sh[p].clone();
                let prefix = prefix.clone();
                std::thread::spawn(move || {
                    let params =
                        SotFmiParameters::with_eval_type(d, 6, 3, EvalType::IterSingleBatch)
                            .unwrap();
                    let mut rss = ReplicatedSharing3P::new(d).unwrap();
                    rss.online_setup(p as u64, &prefix).unwrap();
                    let ass_prev = AdditiveSharing2P::new(d).unwrap();
                    let ass_next = AdditiveSharing2P::new(d).unwrap();
                    let eval = SotFmiEvaluator::new(&params);
                    let mut uv_prev = vec![0u64; params.database_size()];
                    let mut uv_next = vec![0u64; params.database_size()];
                    let result = eval
                        .evaluate_lpm(
                            &mut chls,
                            &mut rss,
                            &ass_prev,
                            &ass_next,
                            &key,
                            &mut uv_prev,
                            &mut uv_next,
                            &tables,
                            &query_mat,
                        )
                        .unwrap();
                    rss.open_vec(&mut chls, &result).unwrap()
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            assert_eq!(lpm_from_indicators(&h.join().unwrap()), expected);
        }
    }
}
