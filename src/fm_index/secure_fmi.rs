//! Secure FM-index longest-prefix-match over ring-based oblivious access.
//!
//! The shared backward-search interval `[f, g)` starts at the full table and
//! is refined once per query character by two rank evaluations (one per
//! endpoint). The interval widths are then lifted into a two-party sharing
//! between the evaluating parties, zero-tested, and re-shared, producing a
//! replicated indicator vector: the opened count of leading zeros is the
//! longest-prefix-match length.

use anyhow::Result;
use log::debug;
use scuttlebutt::AbstractChannel;

use crate::channel_utils::{read_u64_vec, write_u64_vec, Channels};
use crate::errors::ProtocolError;
use crate::proto::key_io::KeyCodec;
use crate::proto::zero_test::{
    ZeroTestEvaluator, ZeroTestKey, ZeroTestKeyGenerator, ZeroTestParameters,
};
use crate::ring_utils::mod2n;
use crate::sharing::{AdditiveSharing2P, RepShare, RepShareMat, RepShareVec, ReplicatedSharing3P};
use crate::wm::plain::FmIndex;
use crate::wm::secure_wm::{
    SecureWmEvaluator, SecureWmKey, SecureWmKeyGenerator, SecureWmParameters,
};

/// Parameters of the secure longest-prefix-match.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SecureFmiParameters {
    query_size: u64,
    wm_params: SecureWmParameters,
    zt_params: ZeroTestParameters,
}

impl SecureFmiParameters {
    /// Match a query of `query_size` characters against a shared index of
    /// `2^database_bitsize` rows and `sigma` bit levels.
    pub fn new(database_bitsize: u64, query_size: u64, sigma: u64) -> Result<Self> {
        if query_size == 0 {
            return Err(ProtocolError::Configuration("query_size must be positive".into()).into());
        }
        if query_size >= 1 << database_bitsize {
            return Err(ProtocolError::Configuration(format!(
                "query of {} characters cannot exceed the indexed text length",
                query_size
            ))
            .into());
        }
        Ok(Self {
            query_size,
            wm_params: SecureWmParameters::new(database_bitsize, sigma)?,
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
    pub fn wm_params(&self) -> &SecureWmParameters {
        &self.wm_params
    }

    /// The zero-test parameters per character.
    pub fn zt_params(&self) -> &ZeroTestParameters {
        &self.zt_params
    }
}

/// One party's longest-prefix-match key.
#[derive(Debug, PartialEq, Eq)]
pub struct SecureFmiKey {
    /// Number of rank keys per endpoint.
    pub num_wm_keys: u64,
    /// Number of zero-test keys this party holds.
    pub num_zt_keys: u64,
    /// Rank keys for the f-endpoint, one per query character.
    pub wm_f_keys: Vec<SecureWmKey>,
    /// Rank keys for the g-endpoint, one per query character.
    pub wm_g_keys: Vec<SecureWmKey>,
    /// Zero-test keys, one per query character; empty at the non-evaluating
    /// party.
    pub zt_keys: Vec<ZeroTestKey>,
}

impl KeyCodec for SecureFmiKey {
    type Params = SecureFmiParameters;

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
            return Err(
                ProtocolError::Serialization("SecureFmi key buffer too short".into()).into(),
            );
        }
        let num_wm_keys = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let num_zt_keys = u64::from_le_bytes(bytes[8..16].try_into().expect("8 bytes"));
        let mut offset = 16;

        let mut read_wm_keys = |offset: &mut usize| -> Result<Vec<SecureWmKey>> {
            let mut keys = Vec::with_capacity(num_wm_keys as usize);
            for _ in 0..num_wm_keys {
                let (key, used) = SecureWmKey::deserialize(params.wm_params(), &bytes[*offset..])?;
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
            SecureFmiKey {
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

/// Dealer-side key and share generation for the longest-prefix-match.
pub struct SecureFmiKeyGenerator {
    params: SecureFmiParameters,
    wm_gen: SecureWmKeyGenerator,
    zt_gen: ZeroTestKeyGenerator,
}

impl SecureFmiKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &SecureFmiParameters) -> Self {
        Self {
            params: *params,
            wm_gen: SecureWmKeyGenerator::new(params.wm_params()),
            zt_gen: ZeroTestKeyGenerator::new(params.zt_params()),
        }
    }

    /// Provision the triple stores: one per oblivious access of one query.
    pub fn offline_setup(&self, ass: &mut AdditiveSharing2P, file_path: &str) -> Result<()> {
        let num_selection = self.params.sigma() * self.params.query_size() * 2;
        self.wm_gen.offline_setup(ass, num_selection, file_path)
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
    pub fn generate_keys(&mut self, ass: &mut AdditiveSharing2P) -> Result<[SecureFmiKey; 3]> {
        let qs = self.params.query_size();

        let mut f_keys: [Vec<SecureWmKey>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        let mut g_keys: [Vec<SecureWmKey>; 3] = [Vec::new(), Vec::new(), Vec::new()];
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

        debug!("generated FMI keys for query size {}", qs);

        let [f0, f1, f2] = f_keys;
        let [g0, g1, g2] = g_keys;
        Ok([
            SecureFmiKey {
                num_wm_keys: qs,
                num_zt_keys: 0,
                wm_f_keys: f0,
                wm_g_keys: g0,
                zt_keys: Vec::new(),
            },
            SecureFmiKey {
                num_wm_keys: qs,
                num_zt_keys: qs,
                wm_f_keys: f1,
                wm_g_keys: g1,
                zt_keys: zt_first,
            },
            SecureFmiKey {
                num_wm_keys: qs,
                num_zt_keys: qs,
                wm_f_keys: f2,
                wm_g_keys: g2,
                zt_keys: zt_second,
            },
        ])
    }
}

/// Online evaluation of the longest-prefix-match.
pub struct SecureFmiEvaluator {
    params: SecureFmiParameters,
    wm_eval: SecureWmEvaluator,
    zt_eval: ZeroTestEvaluator,
}

impl SecureFmiEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &SecureFmiParameters) -> Self {
        Self {
            params: *params,
            wm_eval: SecureWmEvaluator::new(params.wm_params()),
            zt_eval: ZeroTestEvaluator::new(params.zt_params()),
        }
    }

    /// Load the provisioned triple store of this party's evaluating edge.
    /// Party 0 sits outside the two-party sub-protocols and loads nothing.
    pub fn online_setup(
        &self,
        party_id: u64,
        ass_prev: &mut AdditiveSharing2P,
        ass_next: &mut AdditiveSharing2P,
        file_path: &str,
    ) -> Result<()> {
        match party_id {
            1 => ass_next.online_setup(0, file_path),
            2 => ass_prev.online_setup(1, file_path),
            _ => Ok(()),
        }
    }

    /// Shared indicator vector of the backward search: entry `i` opens to 1
    /// once the interval has emptied after `i + 1` characters. The leading
    /// zero count of the opened vector is the longest-prefix-match length.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_lpm<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        ass_prev: &AdditiveSharing2P,
        ass_next: &AdditiveSharing2P,
        key: &SecureFmiKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        query: &RepShareMat,
    ) -> Result<RepShareVec> {
        let d = self.params.database_bitsize();
        let qs = self.params.query_size() as usize;
        let party_id = chls.party_id;
        if query.rows != qs || query.cols != self.params.sigma() as usize {
            return Err(ProtocolError::Configuration(format!(
                "query shares are {}x{}, expected {}x{}",
                query.rows,
                query.cols,
                qs,
                self.params.sigma()
            ))
            .into());
        }

        // [f, g) starts as the whole table: g opens to the BWT length.
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

        self.zero_test_intervals(chls, rss, ass_prev, ass_next, key, &interval, d, qs)
    }

    /// As [evaluate_lpm](Self::evaluate_lpm), with both interval endpoints
    /// lifted into one vector so each level runs a single access pass.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_lpm_parallel<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        ass_prev: &AdditiveSharing2P,
        ass_next: &AdditiveSharing2P,
        key: &SecureFmiKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        query: &RepShareMat,
    ) -> Result<RepShareVec> {
        let d = self.params.database_bitsize();
        let qs = self.params.query_size() as usize;
        let party_id = chls.party_id;

        let mut fg = RepShareVec::new(2);
        let table_tail = (wm_tables.cols - 1) as u64;
        if party_id == 0 {
            fg.data[0][1] = table_tail;
        } else if party_id == 1 {
            fg.data[1][1] = table_tail;
        }

        let mut interval = RepShareVec::new(qs);
        for i in 0..qs {
            let row = query.row_view(i);
            fg = self.wm_eval.evaluate_rank_cf_parallel(
                chls,
                rss,
                &key.wm_f_keys[i],
                &key.wm_g_keys[i],
                uv_prev,
                uv_next,
                wm_tables,
                &row,
                fg,
            )?;
            interval.set(i, rss.evaluate_sub(&fg.at(1), &fg.at(0)));
        }

        self.zero_test_intervals(chls, rss, ass_prev, ass_next, key, &interval, d, qs)
    }

    /// The (2,2)-conversion tail shared by both variants: lift the interval
    /// widths to the evaluating pair, zero-test them, and re-share the
    /// indicators into the replicated sharing.
    #[allow(clippy::too_many_arguments)]
    fn zero_test_intervals<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        ass_prev: &AdditiveSharing2P,
        ass_next: &AdditiveSharing2P,
        key: &SecureFmiKey,
        interval: &RepShareVec,
        d: u64,
        qs: usize,
    ) -> Result<RepShareVec> {
        let party_id = chls.party_id;

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

/// Leading-zero count of an opened indicator vector.
pub fn lpm_from_indicators(indicators: &[u64]) -> u64 {
    indicators.iter().take_while(|&&x| x == 0).count() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::unix_channel::create_three_party_channels;
    use crate::wm::plain::{random_dna_text, CharType};
    use scuttlebutt::AesRng;

    fn run_lpm(text: &str, query: &str, d: u64, parallel: bool) -> Vec<u64> {
        let sigma = 3;
        let fm = FmIndex::new(text, CharType::Dna).unwrap();
        let qs = query.chars().count() as u64;
        let params = SecureFmiParameters::new(d, qs, sigma).unwrap();
        let mut gen = SecureFmiKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(d).unwrap();
        let mut rss = ReplicatedSharing3P::new(d).unwrap();

        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = format!(
            "{}/secure_fmi_{}_{}_",
            dir.display(),
            d,
            if parallel { "par" } else { "seq" }
        );
        rss.offline_setup(&prefix).unwrap();
        gen.offline_setup(&mut ass, &prefix).unwrap();

        let tables_sh = gen.generate_database_share(&mut rss, &fm).unwrap();
        let query_sh = gen.generate_query_share(&mut rss, &fm, query).unwrap();
        let keys = gen.generate_keys(&mut ass).unwrap();

        let channels = create_three_party_channels().unwrap();
        let prefix_cl = prefix.clone();
        let handles = keys
            .into_iter()
            .zip(channels)
            .enumerate()
            .map(|(p, (key, mut chls))| {
                let tables = tables_sh[p].clone();
                let query_mat = query_sh[p].clone();
                let prefix = prefix_cl.clone();
                std::thread::spawn(move || {
                    let params = SecureFmiParameters::new(d, qs, 3).unwrap();
                    let mut rss = ReplicatedSharing3P::new(d).unwrap();
                    rss.online_setup(p as u64, &prefix).unwrap();
                    let mut ass_prev = AdditiveSharing2P::new(d).unwrap();
                    let mut ass_next = AdditiveSharing2P::new(d).unwrap();
                    let eval = SecureFmiEvaluator::new(&params);
                    eval.online_setup(p as u64, &mut ass_prev, &mut ass_next, &prefix)
                        .unwrap();

                    let mut uv_prev = vec![0u64; params.database_size()];
                    let mut uv_next = vec![0u64; params.database_size()];
                    let result = if parallel {
                        eval.evaluate_lpm_parallel(
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
                        .unwrap()
                    } else {
                        eval.evaluate_lpm(
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
                        .unwrap()
                    };
                    rss.open_vec(&mut chls, &result).unwrap()
                })
            })
            .collect::<Vec<_>>();

        let mut opened = Vec::new();
        for h in handles {
            opened = h.join().unwrap();
        }
        opened
    }

    #[test]
    fn test_lpm_small_text() {
        let text = "CATTAGAGGCATTACATTAGAGGCATTAGT"; // 30 chars, width 32
        let fm = FmIndex::new(text, CharType::Dna).unwrap();
        for query in ["ATTAC", "TTTTT", "CATTA"] {
            let expected = fm.compute_lpm_from_wm(query).unwrap();
            let indicators = run_lpm(text, query, 5, false);
            assert_eq!(
                lpm_from_indicators(&indicators),
                expected,
                "query {}",
                query
            );
        }
    }

    #[test]
    fn test_lpm_random_text_d10() {
        let mut rng = AesRng::new();
        let text = random_dna_text((1 << 10) - 2, &mut rng);
        let query = random_dna_text(10, &mut rng);
        let fm = FmIndex::new(&text, CharType::Dna).unwrap();
        let expected = fm.compute_lpm_from_wm(&query).unwrap();
        assert_eq!(expected, fm.compute_lpm_from_bwt(&query).unwrap());

        let indicators = run_lpm(&text, &query, 10, false);
        assert_eq!(lpm_from_indicators(&indicators), expected);
    }

    #[test]
    fn test_lpm_parallel_matches_sequential() {
        let mut rng = AesRng::new();
        let text = random_dna_text(30, &mut rng);
        let query = random_dna_text(6, &mut rng);
        let fm = FmIndex::new(&text, CharType::Dna).unwrap();
        let expected = fm.compute_lpm_from_wm(&query).unwrap();

        let sequential = run_lpm(&text, &query, 5, false);
        let parallel = run_lpm(&text, &query, 5, true);
        assert_eq!(sequential, parallel);
        assert_eq!(lpm_from_indicators(&parallel), expected);
    }

    #[test]
    fn test_query_longer_than_text_is_rejected() {
        assert!(SecureFmiParameters::new(5, 40, 3).is_err());
    }
}
