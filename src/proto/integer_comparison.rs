//! Two-party integer comparison `a >= b` on additively shared inputs.
//!
//! Operands live below `2^(n-1)` inside the `n`-bit ring, so the sign of
//! `a - b` is its top bit. The dealer hides a mask `r_in` behind a one-hot
//! DPF; online, the parties open the blinded difference once and each sums
//! its full-domain DPF shares over the window of non-negative differences.
//! The window sums are additive shares of the predicate.

use anyhow::Result;
use rand::Rng;
use scuttlebutt::{AbstractChannel, AesRng};

use crate::channel_utils::{read_u64, write_u64};
use crate::errors::ProtocolError;
use crate::fss::{DpfEvaluator, DpfKey, DpfKeyGenerator, DpfParameters, EvalType, OutputType};
use crate::proto::key_io::KeyCodec;
use crate::ring_utils::{add2n, mask, mod2n, sub2n};

/// Parameters of one comparison instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntegerComparisonParameters {
    input_bitsize: u64,
    ring_bitsize: u64,
    dpf_params: DpfParameters,
}

impl IntegerComparisonParameters {
    /// Comparison in the `input_bitsize`-bit ring; operands must stay below
    /// `2^(input_bitsize - 1)`.
    pub fn new(input_bitsize: u64, ring_bitsize: u64) -> Result<Self> {
        if input_bitsize < 2 {
            return Err(ProtocolError::Configuration(
                "comparison needs at least a 2-bit ring".into(),
            )
            .into());
        }
        Ok(Self {
            input_bitsize,
            ring_bitsize,
            dpf_params: DpfParameters::new(
                input_bitsize,
                ring_bitsize,
                EvalType::HybridBatched,
                OutputType::ShiftedAdditive,
            )?,
        })
    }

    /// Ring width of the compared shares.
    pub fn input_bitsize(&self) -> u64 {
        self.input_bitsize
    }

    /// Ring width of the predicate shares.
    pub fn ring_bitsize(&self) -> u64 {
        self.ring_bitsize
    }

    /// The underlying DPF parameters.
    pub fn dpf_params(&self) -> &DpfParameters {
        &self.dpf_params
    }
}

/// One party's comparison key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IntegerComparisonKey {
    /// This party's additive share of the hidden difference mask.
    pub shr_in: u64,
    /// This party's half of the one-hot DPF at the mask.
    pub dpf_key: DpfKey,
}

impl KeyCodec for IntegerComparisonKey {
    type Params = IntegerComparisonParameters;

    fn serialize(&self, buffer: &mut Vec<u8>) -> Result<()> {
        buffer.extend_from_slice(&self.shr_in.to_le_bytes());
        self.dpf_key.serialize(buffer)
    }

    fn serialized_size(&self) -> usize {
        8 + self.dpf_key.calculate_serialized_size()
    }

    fn deserialize(params: &Self::Params, bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < 8 {
            return Err(
                ProtocolError::Serialization("comparison key buffer too short".into()).into(),
            );
        }
        let shr_in = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let (dpf_key, used) = DpfKey::deserialize(params.dpf_params(), &bytes[8..])?;
        Ok((IntegerComparisonKey { shr_in, dpf_key }, 8 + used))
    }
}

/// Dealer-side key generation for the comparison.
pub struct IntegerComparisonKeyGenerator {
    params: IntegerComparisonParameters,
    dpf_gen: DpfKeyGenerator,
    rng: AesRng,
}

impl IntegerComparisonKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &IntegerComparisonParameters) -> Self {
        Self {
            params: *params,
            dpf_gen: DpfKeyGenerator::new(params.dpf_params()),
            rng: AesRng::new(),
        }
    }

    /// Produce the key pair of one comparison.
    pub fn generate_keys(&mut self) -> Result<(IntegerComparisonKey, IntegerComparisonKey)> {
        let n = self.params.input_bitsize();
        let r_in = mod2n(self.rng.gen::<u64>(), n);
        let shr0 = mod2n(self.rng.gen::<u64>(), n);
        let shr1 = sub2n(r_in, shr0, n);
        let (k0, k1) = self.dpf_gen.generate_keys(&mut self.rng, r_in, 1)?;
        Ok((
            IntegerComparisonKey {
                shr_in: shr0,
                dpf_key: k0,
            },
            IntegerComparisonKey {
                shr_in: shr1,
                dpf_key: k1,
            },
        ))
    }
}

/// Online evaluation of comparison keys.
pub struct IntegerComparisonEvaluator {
    params: IntegerComparisonParameters,
    dpf_eval: DpfEvaluator,
}

impl IntegerComparisonEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &IntegerComparisonParameters) -> Self {
        Self {
            params: *params,
            dpf_eval: DpfEvaluator::new(params.dpf_params()),
        }
    }

    /// Compare additively shared operands: returns this party's additive
    /// share of `[a >= b]`. One exchange over `chl` (role 0 sends first),
    /// then a local full-domain window sum.
    pub fn evaluate_shared_input<C: AbstractChannel>(
        &self,
        party_role: u64,
        chl: &mut C,
        key: &IntegerComparisonKey,
        a_share: u64,
        b_share: u64,
    ) -> Result<u64> {
        let n = self.params.input_bitsize();
        let mine = add2n(sub2n(a_share, b_share, n), key.shr_in, n);

        let theirs = if party_role == 0 {
            write_u64(chl, mine)?;
            read_u64(chl)?
        } else {
            let theirs = read_u64(chl)?;
            write_u64(chl, mine)?;
            theirs
        };
        let masked = add2n(mine, theirs, n);

        // The hidden point lands in the window [masked - 2^(n-1) + 1, masked]
        // exactly when a - b is non-negative.
        let domain = 1usize << n;
        let mut uv = vec![0u64; domain];
        self.dpf_eval.evaluate_full_domain(&key.dpf_key, &mut uv)?;

        let ring = self.params.ring_bitsize();
        let idx_mask = mask(n);
        let mut acc = 0u64;
        for t in 0..1u64 << (n - 1) {
            acc = acc.wrapping_add(uv[(masked.wrapping_sub(t) & idx_mask) as usize]);
        }
        Ok(mod2n(acc, ring))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comparison_predicate() {
        use scuttlebutt::SyncChannel;
        use std::io::{BufReader, BufWriter};
        use std::os::unix::net::UnixStream;

        let d = 6;
        let n = d + 1;
        let params = IntegerComparisonParameters::new(n, n).unwrap();
        let mut gen = IntegerComparisonKeyGenerator::new(&params);
        let mut rng = AesRng::new();

        let cases = [(5u64, 3u64), (3, 5), (7, 7), (0, 63), (63, 0), (0, 0)];
        let mut keys0 = Vec::new();
        let mut keys1 = Vec::new();
        let mut shares = Vec::new();
        for &(a, b) in &cases {
            let (k0, k1) = gen.generate_keys().unwrap();
            let a0 = mod2n(rng.gen::<u64>(), n);
            let a1 = sub2n(a, a0, n);
            let b0 = mod2n(rng.gen::<u64>(), n);
            let b1 = sub2n(b, b0, n);
            keys0.push(k0);
            keys1.push(k1);
            shares.push((a0, a1, b0, b1));
        }

        let (s, r) = UnixStream::pair().unwrap();
        let shares_cl = shares.clone();
        let handle = std::thread::spawn(move || {
            let mut chl =
                SyncChannel::new(BufReader::new(s.try_clone().unwrap()), BufWriter::new(s));
            let eval = IntegerComparisonEvaluator::new(&params);
            keys0
                .iter()
                .zip(shares_cl)
                .map(|(k, (a0, _, b0, _))| {
                    eval.evaluate_shared_input(0, &mut chl, k, a0, b0).unwrap()
                })
                .collect::<Vec<_>>()
        });

        let mut chl = SyncChannel::new(BufReader::new(r.try_clone().unwrap()), BufWriter::new(r));
        let eval = IntegerComparisonEvaluator::new(&params);
        let res1 = keys1
            .iter()
            .zip(shares)
            .map(|(k, (_, a1, _, b1))| eval.evaluate_shared_input(1, &mut chl, k, a1, b1).unwrap())
            .collect::<Vec<_>>();

        let res0 = handle.join().unwrap();
        for (i, &(a, b)) in cases.iter().enumerate() {
            let predicate = add2n(res0[i], res1[i], n);
            assert_eq!(predicate, u64::from(a >= b), "a={} b={}", a, b);
        }
    }
}
