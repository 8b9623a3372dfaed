//! 2-out-of-2 additive sharing over `Z_{2^n}` with Beaver-triple
//! multiplication.
//!
//! The triple store is provisioned offline by a dealer and consumed online
//! with a monotonic index; running dry mid-protocol is a fatal error, so the
//! offline step must provision at least as many triples as the online phase
//! will use.

use anyhow::{Context, Result};
use rand::Rng;
use scuttlebutt::{AbstractChannel, AesRng};

use crate::channel_utils::{read_u64_vec, write_u64_vec};
use crate::errors::ProtocolError;
use crate::ring_utils::{add2n, mod2n, mul2n, sub2n};

/// A store of multiplication triples `(a, b, c)` with `c = a * b`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BeaverTriples {
    /// First factors.
    pub a: Vec<u64>,
    /// Second factors.
    pub b: Vec<u64>,
    /// Products.
    pub c: Vec<u64>,
}

impl BeaverTriples {
    /// Number of triples in the store.
    pub fn len(&self) -> usize {
        self.a.len()
    }

    /// True if the store holds no triples.
    pub fn is_empty(&self) -> bool {
        self.a.is_empty()
    }
}

/// The additive-sharing engine of one party of a two-party pair (or of the
/// dealer provisioning that pair).
pub struct AdditiveSharing2P {
    bitsize: u64,
    rng: AesRng,
    triples: BeaverTriples,
    triple_index: usize,
}

impl AdditiveSharing2P {
    /// Create an engine for shares in `Z_{2^bitsize}`.
    pub fn new(bitsize: u64) -> Result<Self> {
        if bitsize == 0 || bitsize > 64 {
            return Err(ProtocolError::Configuration(format!(
                "bitsize must be in [1, 64], got {}",
                bitsize
            ))
            .into());
        }
        Ok(Self {
            bitsize,
            rng: AesRng::new(),
            triples: BeaverTriples::default(),
            triple_index: 0,
        })
    }

    /// Ring bit size of this engine.
    pub fn bitsize(&self) -> u64 {
        self.bitsize
    }

    /// A fresh uniform ring element.
    pub fn generate_random_value(&mut self) -> u64 {
        mod2n(self.rng.gen::<u64>(), self.bitsize)
    }

    // --- Sharing ---

    /// Split `x` into two additive shares.
    pub fn share(&mut self, x: u64) -> (u64, u64) {
        let x0 = self.generate_random_value();
        (x0, sub2n(x, x0, self.bitsize))
    }

    /// Share a vector element-wise.
    pub fn share_vec(&mut self, xs: &[u64]) -> (Vec<u64>, Vec<u64>) {
        let mut s0 = Vec::with_capacity(xs.len());
        let mut s1 = Vec::with_capacity(xs.len());
        for &x in xs {
            let (a, b) = self.share(x);
            s0.push(a);
            s1.push(b);
        }
        (s0, s1)
    }

    /// Reconstruct from both shares without interaction.
    pub fn reconst_local(&self, x0: u64, x1: u64) -> u64 {
        add2n(x0, x1, self.bitsize)
    }

    /// One-round opening: both parties exchange their shares over `chl` and
    /// return the reconstructed value. `party_id` (0 or 1) fixes who sends
    /// first.
    pub fn reconst<C: AbstractChannel>(
        &self,
        party_id: u64,
        chl: &mut C,
        x_mine: u64,
    ) -> Result<u64> {
        Ok(self.reconst_vec(party_id, chl, &[x_mine])?[0])
    }

    /// Vector variant of [reconst](Self::reconst).
    pub fn reconst_vec<C: AbstractChannel>(
        &self,
        party_id: u64,
        chl: &mut C,
        xs_mine: &[u64],
    ) -> Result<Vec<u64>> {
        let theirs = if party_id == 0 {
            write_u64_vec(chl, xs_mine).with_context(|| format!("@{}:{}", file!(), line!()))?;
            read_u64_vec(chl).with_context(|| format!("@{}:{}", file!(), line!()))?
        } else {
            let theirs = read_u64_vec(chl).with_context(|| format!("@{}:{}", file!(), line!()))?;
            write_u64_vec(chl, xs_mine).with_context(|| format!("@{}:{}", file!(), line!()))?;
            theirs
        };
        if theirs.len() != xs_mine.len() {
            return Err(ProtocolError::Transport(format!(
                "reconst length mismatch: sent {}, received {}",
                xs_mine.len(),
                theirs.len()
            ))
            .into());
        }
        Ok(xs_mine
            .iter()
            .zip(theirs.iter())
            .map(|(m, t)| self.reconst_local(*m, *t))
            .collect())
    }

    // --- Linear operations (local) ---

    /// `x + y`.
    pub fn evaluate_add(&self, x: u64, y: u64) -> u64 {
        add2n(x, y, self.bitsize)
    }

    /// `x - y`.
    pub fn evaluate_sub(&self, x: u64, y: u64) -> u64 {
        sub2n(x, y, self.bitsize)
    }

    // --- Beaver multiplication ---

    fn next_triple(&mut self) -> Result<(u64, u64, u64)> {
        if self.triple_index >= self.triples.len() {
            return Err(ProtocolError::ResourceExhaustion(format!(
                "Beaver triple store exhausted at index {}",
                self.triple_index
            ))
            .into());
        }
        let i = self.triple_index;
        self.triple_index += 1;
        Ok((self.triples.a[i], self.triples.b[i], self.triples.c[i]))
    }

    /// Secure multiplication of shared `x` and `y`; consumes one triple and
    /// one round of communication.
    pub fn evaluate_mult<C: AbstractChannel>(
        &mut self,
        party_id: u64,
        chl: &mut C,
        x: u64,
        y: u64,
    ) -> Result<u64> {
        let (a, b, c) = self.next_triple()?;
        let d_mine = sub2n(x, a, self.bitsize);
        let e_mine = sub2n(y, b, self.bitsize);
        let opened = self.reconst_vec(party_id, chl, &[d_mine, e_mine])?;
        let (d, e) = (opened[0], opened[1]);

        let mut z = add2n(
            mul2n(d, b, self.bitsize),
            mul2n(e, a, self.bitsize),
            self.bitsize,
        );
        z = add2n(z, c, self.bitsize);
        if party_id == 0 {
            z = add2n(z, mul2n(d, e, self.bitsize), self.bitsize);
        }
        Ok(z)
    }

    /// `if c == 0 { x } else { y }` on shares, via `x + c * (y - x)`.
    pub fn evaluate_select<C: AbstractChannel>(
        &mut self,
        party_id: u64,
        chl: &mut C,
        x: u64,
        y: u64,
        c: u64,
    ) -> Result<u64> {
        let diff = self.evaluate_sub(y, x);
        let m = self.evaluate_mult(party_id, chl, c, diff)?;
        Ok(self.evaluate_add(x, m))
    }

    // --- Triple store management ---

    /// Dealer step: generate `num_triples` triples, share them, and persist
    /// the two stores as `<prefix>.ass.0` and `<prefix>.ass.1`.
    pub fn offline_setup(&mut self, num_triples: u64, prefix: &str) -> Result<()> {
        let mut store0 = BeaverTriples::default();
        let mut store1 = BeaverTriples::default();
        for _ in 0..num_triples {
            let a = self.generate_random_value();
            let b = self.generate_random_value();
            let c = mul2n(a, b, self.bitsize);
            let (a0, a1) = self.share(a);
            let (b0, b1) = self.share(b);
            let (c0, c1) = self.share(c);
            store0.a.push(a0);
            store0.b.push(b0);
            store0.c.push(c0);
            store1.a.push(a1);
            store1.b.push(b1);
            store1.c.push(c1);
        }
        for (p, store) in [(0u64, &store0), (1u64, &store1)] {
            let mut bytes = Vec::with_capacity(8 + store.len() * 24);
            bytes.extend_from_slice(&(store.len() as u64).to_le_bytes());
            for v in [&store.a, &store.b, &store.c] {
                for x in v {
                    bytes.extend_from_slice(&x.to_le_bytes());
                }
            }
            let path = format!("{}.ass.{}", prefix, p);
            std::fs::write(&path, &bytes)
                .with_context(|| format!("writing {} @{}:{}", path, file!(), line!()))?;
        }
        Ok(())
    }

    /// Party step: load this party's triple store and reset the index.
    pub fn online_setup(&mut self, party_id: u64, prefix: &str) -> Result<()> {
        let path = format!("{}.ass.{}", prefix, party_id);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("reading {} @{}:{}", path, file!(), line!()))?;
        if bytes.len() < 8 {
            return Err(ProtocolError::Serialization(format!(
                "triple store {} is truncated",
                path
            ))
            .into());
        }
        let count = u64::from_le_bytes(bytes[..8].try_into().expect("8 bytes")) as usize;
        if bytes.len() != 8 + count * 24 {
            return Err(ProtocolError::Serialization(format!(
                "triple store {} has {} bytes, expected {}",
                path,
                bytes.len(),
                8 + count * 24
            ))
            .into());
        }
        let mut words = bytes[8..]
            .chunks_exact(8)
            .map(|c| u64::from_le_bytes(c.try_into().expect("8 bytes")));
        let mut store = BeaverTriples::default();
        store.a = words.by_ref().take(count).collect();
        store.b = words.by_ref().take(count).collect();
        store.c = words.by_ref().take(count).collect();
        self.triples = store;
        self.triple_index = 0;
        Ok(())
    }

    /// Index of the next triple to be consumed.
    pub fn current_triple_index(&self) -> u64 {
        self.triple_index as u64
    }

    /// Total number of provisioned triples.
    pub fn num_triples(&self) -> u64 {
        self.triples.len() as u64
    }

    /// Triples still available.
    pub fn remaining_triples(&self) -> u64 {
        (self.triples.len() - self.triple_index) as u64
    }

    /// Rewind the consumption index, e.g. between independent queries.
    pub fn reset_triple_index(&mut self) {
        self.triple_index = 0;
    }
}
