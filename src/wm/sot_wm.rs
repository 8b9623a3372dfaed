//! Secure wavelet-matrix rank over shared OT.
//!
//! Same rank recurrence as [secure_wm](crate::wm::secure_wm), composed over
//! the shared-OT access flavour; the strategy knob makes this the variant
//! used for expansion-strategy comparisons on small tables.

use anyhow::Result;
use scuttlebutt::AbstractChannel;

use crate::channel_utils::Channels;
use crate::errors::ProtocolError;
use crate::fss::EvalType;
use crate::proto::key_io::KeyCodec;
use crate::proto::shared_ot::{
    SharedOtEvaluator, SharedOtKey, SharedOtKeyGenerator, SharedOtParameters,
};
use crate::sharing::{AdditiveSharing2P, RepShare, RepShareMat, RepShareVec, RepShareView, ReplicatedSharing3P};
use crate::wm::plain::FmIndex;

/// Parameters of the shared-OT rank protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SotWmParameters {
    database_bitsize: u64,
    sigma: u64,
    sot_params: SharedOtParameters,
}

impl SotWmParameters {
    /// Rank with the default expansion strategy.
    pub fn new(database_bitsize: u64, sigma: u64) -> Result<Self> {
        Ok(Self {
            database_bitsize,
            sigma,
            sot_params: SharedOtParameters::new(database_bitsize)?,
        })
    }

    /// Rank with an explicit expansion strategy.
    pub fn with_eval_type(database_bitsize: u64, sigma: u64, eval_type: EvalType) -> Result<Self> {
        Ok(Self {
            database_bitsize,
            sigma,
            sot_params: SharedOtParameters::with_eval_type(database_bitsize, eval_type)?,
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

    /// The shared-OT parameters per level.
    pub fn sot_params(&self) -> &SharedOtParameters {
        &self.sot_params
    }
}

/// One party's rank key: one shared-OT key per bit level.
#[derive(Debug, PartialEq, Eq)]
pub struct SotWmKey {
    /// Number of nested keys.
    pub num_sot_keys: u64,
    /// Shared-OT keys, one per bit level.
    pub sot_keys: Vec<SharedOtKey>,
}

impl KeyCodec for SotWmKey {
    type Params = SotWmParameters;

    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.extend_from_slice(&self.num_sot_keys.to_le_bytes());
        for key in &self.sot_keys {
            key.serialize(buffer)?;
        }
        Ok(())
    }

    fn serialized_size(&self) -> usize {
        8 + self
            .sot_keys
            .iter()
            .map(|k| k.serialized_size())
            .sum::<usize>()
    }

    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 8 {
            return Err(ProtocolError::Serialization("SotWm key buffer too short".into()).into());
        }
        let num_sot_keys = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let mut offset = 8;
        let mut sot_keys = Vec::with_capacity(num_sot_keys as usize);
        for _ in 0..num_sot_keys {
            let (key, used) = SharedOtKey::deserialize(params.sot_params(), &bytes[offset..])?;
            sot_keys.push(key);
            offset += used;
        }
        Ok((
            SotWmKey {
                num_sot_keys,
                sot_keys,
            },
            offset,
        ))
    }
}

/// Dealer-side key and share generation.
pub struct SotWmKeyGenerator {
    params: SotWmParameters,
    sot_gen: SharedOtKeyGenerator,
}

impl SotWmKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &SotWmParameters) -> Self {
        Self {
            params: *params,
            sot_gen: SharedOtKeyGenerator::new(params.sot_params()),
        }
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
        rss.share_local_mat(fm.rank0_tables(), wm.sigma() as usize, wm.length() + 1)
    }

    /// Produce the three per-party keys of one rank evaluation.
    pub fn generate_keys(&mut self, ass: &mut AdditiveSharing2P) -> Result<[SotWmKey; 3]> {
        let sigma = self.params.sigma();
        let mut per_party: [Vec<SharedOtKey>; 3] = [Vec::new(), Vec::new(), Vec::new()];
        for _ in 0..sigma {
            let keys = self.sot_gen.generate_keys(ass)?;
            for (slot, key) in per_party.iter_mut().zip(keys) {
                slot.push(key);
            }
        }
        Ok(per_party.map(|sot_keys| SotWmKey {
            num_sot_keys: sigma,
            sot_keys,
        }))
    }
}

/// Online evaluation of the shared-OT rank.
pub struct SotWmEvaluator {
    params: SotWmParameters,
    sot_eval: SharedOtEvaluator,
}

impl SotWmEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &SotWmParameters) -> Self {
        Self {
            params: *params,
            sot_eval: SharedOtEvaluator::new(params.sot_params()),
        }
    }

    /// Parameters this evaluator runs with.
    pub fn params(&self) -> &SotWmParameters {
        &self.params
    }

    /// Rank of the shared character at the shared position.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_rank_cf<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        key: &SotWmKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        char_sh: &RepShareView<'_>,
        position_sh: RepShare,
    ) -> Result<RepShare> {
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

        let mut position = position_sh;
        for i in 0..self.params.sigma() as usize {
            let row = wm_tables.row_view(i);
            let rank0 =
                self.sot_eval
                    .evaluate(chls, &key.sot_keys[i], uv_prev, uv_next, &row, &position)?;

            let total_zeros = row.at(row.len() - 1);
            let p_sub_rank0 = rss.evaluate_sub(&position, &rank0);
            let rank1 = rss.evaluate_add(&p_sub_rank0, &total_zeros);
            position = rss.evaluate_select(chls, &rank0, &rank1, &char_sh.at(i))?;
        }
        Ok(position)
    }

    /// Rank at two shared positions in one access pass per level.
    #[allow(clippy::too_many_arguments)]
    pub fn evaluate_rank_cf_parallel<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        rss: &mut ReplicatedSharing3P,
        key1: &SotWmKey,
        key2: &SotWmKey,
        uv_prev: &mut [u64],
        uv_next: &mut [u64],
        wm_tables: &RepShareMat,
        char_sh: &RepShareView<'_>,
        position_sh: RepShareVec,
    ) -> Result<RepShareVec> {
        let mut position = position_sh;
        for i in 0..self.params.sigma() as usize {
            let row = wm_tables.row_view(i);
            let rank0 = self.sot_eval.evaluate_parallel(
                chls,
                &key1.sot_keys[i],
                &key2.sot_keys[i],
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
    use crate::wm::plain::CharType;

    #[test]
    fn test_rank_cf_matches_plain() {
        let d = 5;
        let sigma = 3;
        let text = "GATTACAGATTACAGATTACAGATTACAGA"; // 30 chars, BWT width 32
        let fm = FmIndex::new(text, CharType::Dna).unwrap();

        let params = SotWmParameters::with_eval_type(d, sigma, EvalType::IterDepthFirst).unwrap();
        let mut gen = SotWmKeyGenerator::new(&params);
        let mut ass = AdditiveSharing2P::new(d).unwrap();
        let mut rss = ReplicatedSharing3P::new(d).unwrap();
        let dir = std::env::temp_dir().join("oblivious_fm_search_tests");
        std::fs::create_dir_all(&dir).unwrap();
        let prefix = format!("{}/sot_wm_", dir.display());
        rss.offline_setup(&prefix).unwrap();

        let tables_sh = gen.generate_database_share(&mut rss, &fm).unwrap();

        let c = 4u64; // 'T'
        let position = 17usize;
        let expected = fm.wavelet_matrix().rank_cf(c, position).unwrap();

        let keys = gen.generate_keys(&mut ass).unwrap();
        let char_bits: Vec<u64> = (0..sigma).map(|b| (c >> b) & 1).collect();
        let char_sh = rss.share_local_vec(&char_bits);
        let pos_sh = rss.share_local(position as u64);

        let channels = create_three_party_channels().unwrap();
        let handles = keys
            .into_iter()
            .zip(channels)
            .enumerate()
            .map(|(p, (key, mut chls))| {
                let tables = tables_sh[p].clone();
                let chars = char_sh[p].clone();
                let pos = pos_sh[p];
                let prefix = prefix.clone();
                std::thread::spawn(move || {
                    let params =
                        SotWmParameters::with_eval_type(d, sigma, EvalType::IterDepthFirst)
                            .unwrap();
                    let mut rss = ReplicatedSharing3P::new(d).unwrap();
                    rss.online_setup(p as u64, &prefix).unwrap();
                    let eval = SotWmEvaluator::new(&params);
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
            assert_eq!(h.join().unwrap(), expected);
        }
    }
}
