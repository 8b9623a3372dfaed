//! Two-party zero test on a masked shared input.
//!
//! The dealer hides a uniform mask `r_in` behind a one-hot DPF and splits it
//! additively into the two keys. Online, the parties add their mask shares
//! to their value shares, open the blinded sum once, and each reads its DPF
//! share at the opened point: the shares sum to 1 exactly when the hidden
//! value was zero.

use anyhow::Result;
use rand::Rng;
use scuttlebutt::AesRng;

use crate::errors::ProtocolError;
use crate::fss::{DpfEvaluator, DpfKey, DpfKeyGenerator, DpfParameters, EvalType, OutputType};
use crate::proto::key_io::KeyCodec;
use crate::ring_utils::{mod2n, sub2n};

/// Parameters of one zero-test instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZeroTestParameters {
    input_bitsize: u64,
    ring_bitsize: u64,
    dpf_params: DpfParameters,
}

impl ZeroTestParameters {
    /// Test over `input_bitsize`-bit values with `ring_bitsize`-bit output
    /// shares.
    pub fn new(input_bitsize: u64, ring_bitsize: u64) -> Result<Self> {
        Ok(Self {
            input_bitsize,
            ring_bitsize,
            dpf_params: DpfParameters::new(
                input_bitsize,
                ring_bitsize,
                EvalType::Iterative,
                OutputType::ShiftedAdditive,
            )?,
        })
    }

    /// Bit width of the tested values.
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

/// One party's zero-test key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ZeroTestKey {
    /// This party's additive share of the hidden input mask.
    pub shr_in: u64,
    /// This party's half of the one-hot DPF at the mask.
    pub dpf_key: DpfKey,
}

impl KeyCodec for ZeroTestKey {
    type Params = ZeroTestParameters;

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
                ProtocolError::Serialization("ZeroTest key buffer too short".into()).into(),
            );
        }
        let shr_in = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes"));
        let (dpf_key, used) = DpfKey::deserialize(params.dpf_params(), &bytes[8..])?;
        Ok((ZeroTestKey { shr_in, dpf_key }, 8 + used))
    }
}

/// Dealer-side key generation for the zero test.
pub struct ZeroTestKeyGenerator {
    params: ZeroTestParameters,
    dpf_gen: DpfKeyGenerator,
    rng: AesRng,
}

impl ZeroTestKeyGenerator {
    /// Generator for `params`.
    pub fn new(params: &ZeroTestParameters) -> Self {
        Self {
            params: *params,
            dpf_gen: DpfKeyGenerator::new(params.dpf_params()),
            rng: AesRng::new(),
        }
    }

    /// Produce the key pair of one zero test.
    pub fn generate_keys(&mut self) -> Result<(ZeroTestKey, ZeroTestKey)> {
        let n = self.params.input_bitsize();
        let r_in = mod2n(self.rng.gen::<u64>(), n);
        let shr0 = mod2n(self.rng.gen::<u64>(), n);
        let shr1 = sub2n(r_in, shr0, n);
        let (k0, k1) = self.dpf_gen.generate_keys(&mut self.rng, r_in, 1)?;
        Ok((
            ZeroTestKey {
                shr_in: shr0,
                dpf_key: k0,
            },
            ZeroTestKey {
                shr_in: shr1,
                dpf_key: k1,
            },
        ))
    }
}

/// Online evaluation of zero-test keys.
pub struct ZeroTestEvaluator {
    params: ZeroTestParameters,
    dpf_eval: DpfEvaluator,
}

impl ZeroTestEvaluator {
    /// Evaluator for `params`.
    pub fn new(params: &ZeroTestParameters) -> Self {
        Self {
            params: *params,
            dpf_eval: DpfEvaluator::new(params.dpf_params()),
        }
    }

    /// Local step after the single open of the blinded input: this party's
    /// additive share of `[hidden value == 0]`.
    pub fn evaluate_masked_input(&self, key: &ZeroTestKey, masked: u64) -> Result<u64> {
        self.dpf_eval
            .evaluate_at(&key.dpf_key, mod2n(masked, self.params.input_bitsize()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ring_utils::add2n;

    #[test]
    fn test_zero_test_predicate() {
        let n = 10;
        let params = ZeroTestParameters::new(n, n).unwrap();
        let mut gen = ZeroTestKeyGenerator::new(&params);
        let eval = ZeroTestEvaluator::new(&params);
        let mut rng = AesRng::new();

        for value in [0u64, 1, 2, 511, 1023] {
            let (k0, k1) = gen.generate_keys().unwrap();
            // Two-party additive shares of the value.
            let v0 = mod2n(rng.gen::<u64>(), n);
            let v1 = sub2n(value, v0, n);

            // Each party blinds its share, the blinded sum is public.
            let masked = add2n(add2n(v0, k0.shr_in, n), add2n(v1, k1.shr_in, n), n);

            let zt0 = eval.evaluate_masked_input(&k0, masked).unwrap();
            let zt1 = eval.evaluate_masked_input(&k1, masked).unwrap();
            let predicate = add2n(zt0, zt1, n);
            assert_eq!(predicate, u64::from(value == 0), "value {}", value);
        }
    }

    #[test]
    fn test_key_roundtrip() {
        let params = ZeroTestParameters::new(8, 8).unwrap();
        let mut gen = ZeroTestKeyGenerator::new(&params);
        let (k0, _) = gen.generate_keys().unwrap();
        let mut buf = Vec::new();
        k0.serialize(&mut buf).unwrap();
        assert_eq!(buf.len(), k0.serialized_size());
        let (back, used) = ZeroTestKey::deserialize(&params, &buf).unwrap();
        assert_eq!(used, buf.len());
        assert_eq!(back, k0);
    }
}
