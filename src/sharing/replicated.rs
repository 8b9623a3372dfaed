//! 2-out-of-3 replicated secret sharing over `Z_{2^n}`.
//!
//! Party `i` stores `[x_i, x_{i-1}]` for every shared element. Linear
//! operations are local; multiplication is one ring round in the style of
//! Araki et al., re-randomised with the correlated zero sharing drawn from
//! the pairwise PRF streams.
//!
//! The PRF streams are set up once per session: the dealer writes one seed
//! pair per party (`<prefix>prf.<party>`), where the seed shared by parties
//! `i` and `i+1` shows up as `i`'s "next" seed and `i+1`'s "prev" seed. All
//! parties must draw from the streams in lockstep; every operation below
//! advances the draw index identically at each party.

use anyhow::{Context, Result};
use rand::{Rng, SeedableRng};
use scuttlebutt::{AbstractChannel, AesRng, Block};

use crate::channel_utils::{read_u64, read_u64_vec, write_u64, write_u64_vec, Channels};
use crate::errors::ProtocolError;
use crate::ring_utils::{add2n, mod2n, mul2n, sub2n};
use crate::sharing::{RepShare, RepShareMat, RepShareVec};

const PRF_BUFFER_BLOCKS: usize = 256;

/// The replicated-sharing engine of one party (or of the dealer).
///
/// Owns the local randomness and the two correlated PRF streams; not safe to
/// share across threads, each party keeps its own instance.
pub struct ReplicatedSharing3P {
    bitsize: u64,
    rng: AesRng,
    prf: Option<[AesRng; 2]>,
    prf_buff: [Vec<Block>; 2],
    prf_buff_idx: usize,
    prf_idx: u64,
}

impl ReplicatedSharing3P {
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
            prf: None,
            prf_buff: [Vec::new(), Vec::new()],
            prf_buff_idx: 0,
            prf_idx: 0,
        })
    }

    /// Ring bit size of this engine.
    pub fn bitsize(&self) -> u64 {
        self.bitsize
    }

    /// Number of correlated PRF draws made so far.
    pub fn prf_index(&self) -> u64 {
        self.prf_idx
    }

    /// A fresh uniform ring element from the local (uncorrelated) generator.
    pub fn generate_random_value(&mut self) -> u64 {
        mod2n(self.rng.gen::<u64>(), self.bitsize)
    }

    // --- Setup ---

    /// Dealer step: sample the three pairwise seeds and persist one seed pair
    /// per party as `<prefix>prf.<party>`.
    pub fn offline_setup(&mut self, prefix: &str) -> Result<()> {
        let seeds: [u128; 3] = [self.rng.gen(), self.rng.gen(), self.rng.gen()];
        for p in 0..3usize {
            // seed shared with prev first, then the one shared with next.
            let mut bytes = Vec::with_capacity(32);
            bytes.extend_from_slice(&seeds[(p + 2) % 3].to_le_bytes());
            bytes.extend_from_slice(&seeds[p].to_le_bytes());
            let path = format!("{}prf.{}", prefix, p);
            std::fs::write(&path, &bytes)
                .with_context(|| format!("writing {} @{}:{}", path, file!(), line!()))?;
        }
        Ok(())
    }

    /// Party step: load this party's seed pair and key the PRF streams.
    pub fn online_setup(&mut self, party_id: u64, prefix: &str) -> Result<()> {
        let path = format!("{}prf.{}", prefix, party_id);
        let bytes = std::fs::read(&path)
            .with_context(|| format!("reading {} @{}:{}", path, file!(), line!()))?;
        if bytes.len() != 32 {
            return Err(ProtocolError::Serialization(format!(
                "PRF seed file {} has {} bytes, expected 32",
                path,
                bytes.len()
            ))
            .into());
        }
        let seed_prev = u128::from_le_bytes(bytes[..16].try_into().expect("16 bytes"));
        let seed_next = u128::from_le_bytes(bytes[16..].try_into().expect("16 bytes"));
        self.prf = Some([
            AesRng::from_seed(Block::from(seed_prev)),
            AesRng::from_seed(Block::from(seed_next)),
        ]);
        self.prf_buff = [Vec::new(), Vec::new()];
        self.prf_buff_idx = 0;
        self.prf_idx = 0;
        Ok(())
    }

    fn refill_buffer(&mut self) -> Result<()> {
        let prf = self.prf.as_mut().ok_or_else(|| {
            ProtocolError::Configuration("PRF streams not set up; call online_setup first".into())
        })?;
        for side in 0..2 {
            self.prf_buff[side].clear();
            for _ in 0..PRF_BUFFER_BLOCKS {
                self.prf_buff[side].push(prf[side].gen::<Block>());
            }
        }
        self.prf_buff_idx = 0;
        Ok(())
    }

    fn next_correlated(&mut self) -> Result<(u64, u64)> {
        if self.prf_buff_idx == self.prf_buff[0].len() {
            self.refill_buffer()?;
        }
        let a = u128::from(self.prf_buff[0][self.prf_buff_idx]) as u64;
        let b = u128::from(self.prf_buff[1][self.prf_buff_idx]) as u64;
        self.prf_buff_idx += 1;
        self.prf_idx += 1;
        Ok((mod2n(a, self.bitsize), mod2n(b, self.bitsize)))
    }

    // --- Sharing ---

    /// Split `x` into the three replicated pairs.
    pub fn share_local(&mut self, x: u64) -> [RepShare; 3] {
        let x0 = self.generate_random_value();
        let x1 = self.generate_random_value();
        let x2 = sub2n(sub2n(x, x0, self.bitsize), x1, self.bitsize);
        [
            RepShare::new(x0, x2),
            RepShare::new(x1, x0),
            RepShare::new(x2, x1),
        ]
    }

    /// Share a vector element-wise.
    pub fn share_local_vec(&mut self, xs: &[u64]) -> [RepShareVec; 3] {
        let mut out = [
            RepShareVec::new(xs.len()),
            RepShareVec::new(xs.len()),
            RepShareVec::new(xs.len()),
        ];
        for (i, &x) in xs.iter().enumerate() {
            let sh = self.share_local(x);
            for p in 0..3 {
                out[p].set(i, sh[p]);
            }
        }
        out
    }

    /// Share a row-major matrix given flat, `rows x cols`.
    pub fn share_local_mat(&mut self, flat: &[u64], rows: usize, cols: usize) -> Result<[RepShareMat; 3]> {
        if flat.len() != rows * cols {
            return Err(ProtocolError::Configuration(format!(
                "flat matrix has {} entries, expected {}x{}",
                flat.len(),
                rows,
                cols
            ))
            .into());
        }
        let vecs = self.share_local_vec(flat);
        let mut out = [
            RepShareMat::new(rows, cols),
            RepShareMat::new(rows, cols),
            RepShareMat::new(rows, cols),
        ];
        for p in 0..3 {
            out[p].data = vecs[p].data.clone();
        }
        Ok(out)
    }

    // --- Opening ---

    /// Open a scalar share towards every party.
    pub fn open<C: AbstractChannel>(&self, chls: &mut Channels<C>, sh: &RepShare) -> Result<u64> {
        write_u64(&mut chls.next, sh.data[1])?;
        let third = read_u64(&mut chls.prev)?;
        Ok(mod2n(
            sh.data[0]
                .wrapping_add(sh.data[1])
                .wrapping_add(third),
            self.bitsize,
        ))
    }

    /// Open a vector share towards every party.
    pub fn open_vec<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        sh: &RepShareVec,
    ) -> Result<Vec<u64>> {
        write_u64_vec(&mut chls.next, &sh.data[1])?;
        let third = read_u64_vec(&mut chls.prev)?;
        if third.len() != sh.len() {
            return Err(ProtocolError::Transport(format!(
                "open_vec length mismatch: sent {}, received {}",
                sh.len(),
                third.len()
            ))
            .into());
        }
        Ok(sh
            .data[0]
            .iter()
            .zip(sh.data[1].iter())
            .zip(third.iter())
            .map(|((a, b), c)| mod2n(a.wrapping_add(*b).wrapping_add(*c), self.bitsize))
            .collect())
    }

    /// Open a matrix share; returns the flat row-major contents.
    pub fn open_mat<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        sh: &RepShareMat,
    ) -> Result<Vec<u64>> {
        let as_vec = RepShareVec {
            data: sh.data.clone(),
        };
        self.open_vec(chls, &as_vec)
    }

    // --- Correlated randomness ---

    /// Draw one correlated share whose `data[1] - data[0]` components sum to
    /// zero around the ring.
    pub fn rand(&mut self) -> Result<RepShare> {
        let (a, b) = self.next_correlated()?;
        Ok(RepShare::new(a, b))
    }

    /// Draw `len` correlated shares.
    pub fn rand_vec(&mut self, len: usize) -> Result<RepShareVec> {
        let mut out = RepShareVec::new(len);
        for i in 0..len {
            let sh = self.rand()?;
            out.set(i, sh);
        }
        Ok(out)
    }

    // --- Linear operations (local) ---

    /// `x + y`, component-wise.
    pub fn evaluate_add(&self, x: &RepShare, y: &RepShare) -> RepShare {
        RepShare::new(
            add2n(x.data[0], y.data[0], self.bitsize),
            add2n(x.data[1], y.data[1], self.bitsize),
        )
    }

    /// `x - y`, component-wise.
    pub fn evaluate_sub(&self, x: &RepShare, y: &RepShare) -> RepShare {
        RepShare::new(
            sub2n(x.data[0], y.data[0], self.bitsize),
            sub2n(x.data[1], y.data[1], self.bitsize),
        )
    }

    /// Vector `x + y`.
    pub fn evaluate_add_vec(&self, x: &RepShareVec, y: &RepShareVec) -> RepShareVec {
        let mut out = RepShareVec::new(x.len());
        for i in 0..x.len() {
            out.set(i, self.evaluate_add(&x.at(i), &y.at(i)));
        }
        out
    }

    /// Vector `x - y`.
    pub fn evaluate_sub_vec(&self, x: &RepShareVec, y: &RepShareVec) -> RepShareVec {
        let mut out = RepShareVec::new(x.len());
        for i in 0..x.len() {
            out.set(i, self.evaluate_sub(&x.at(i), &y.at(i)));
        }
        out
    }

    // --- Multiplicative operations (one ring round) ---

    fn local_mult_term(&self, x: &RepShare, y: &RepShare) -> u64 {
        let a = mul2n(x.data[0], y.data[0], self.bitsize);
        let b = mul2n(x.data[0], y.data[1], self.bitsize);
        let c = mul2n(x.data[1], y.data[0], self.bitsize);
        add2n(add2n(a, b, self.bitsize), c, self.bitsize)
    }

    /// Secure multiplication; consumes one correlated PRF draw.
    pub fn evaluate_mult<C: AbstractChannel>(
        &mut self,
        chls: &mut Channels<C>,
        x: &RepShare,
        y: &RepShare,
    ) -> Result<RepShare> {
        let r = self.rand()?;
        let z0 = add2n(
            self.local_mult_term(x, y),
            sub2n(r.data[1], r.data[0], self.bitsize),
            self.bitsize,
        );
        write_u64(&mut chls.next, z0)?;
        let z1 = read_u64(&mut chls.prev)?;
        Ok(RepShare::new(z0, z1))
    }

    /// Element-wise vector multiplication in a single round.
    pub fn evaluate_mult_vec<C: AbstractChannel>(
        &mut self,
        chls: &mut Channels<C>,
        x: &RepShareVec,
        y: &RepShareVec,
    ) -> Result<RepShareVec> {
        if x.len() != y.len() {
            return Err(ProtocolError::Configuration(format!(
                "vector length mismatch: {} vs {}",
                x.len(),
                y.len()
            ))
            .into());
        }
        let mut out = RepShareVec::new(x.len());
        for i in 0..x.len() {
            let r = self.rand()?;
            out.data[0][i] = add2n(
                self.local_mult_term(&x.at(i), &y.at(i)),
                sub2n(r.data[1], r.data[0], self.bitsize),
                self.bitsize,
            );
        }
        write_u64_vec(&mut chls.next, &out.data[0])?;
        out.data[1] = read_u64_vec(&mut chls.prev)?;
        if out.data[1].len() != x.len() {
            return Err(ProtocolError::Transport("mult_vec length mismatch".into()).into());
        }
        Ok(out)
    }

    /// `if c == 0 { x } else { y }`, via `x + c * (y - x)`.
    pub fn evaluate_select<C: AbstractChannel>(
        &mut self,
        chls: &mut Channels<C>,
        x: &RepShare,
        y: &RepShare,
        c: &RepShare,
    ) -> Result<RepShare> {
        let diff = self.evaluate_sub(y, x);
        let m = self.evaluate_mult(chls, c, &diff)?;
        Ok(self.evaluate_add(x, &m))
    }

    /// Vector select with a shared scalar condition.
    pub fn evaluate_select_vec<C: AbstractChannel>(
        &mut self,
        chls: &mut Channels<C>,
        x: &RepShareVec,
        y: &RepShareVec,
        c: &RepShare,
    ) -> Result<RepShareVec> {
        let diff = self.evaluate_sub_vec(y, x);
        let c_vec = RepShareVec {
            data: [
                vec![c.data[0]; x.len()],
                vec![c.data[1]; x.len()],
            ],
        };
        let m = self.evaluate_mult_vec(chls, &c_vec, &diff)?;
        Ok(self.evaluate_add_vec(x, &m))
    }

    /// Inner product `<x, y>` with one round of communication total.
    pub fn evaluate_inner_product<C: AbstractChannel>(
        &mut self,
        chls: &mut Channels<C>,
        x: &RepShareVec,
        y: &RepShareVec,
    ) -> Result<RepShare> {
        if x.len() != y.len() {
            return Err(ProtocolError::Configuration(format!(
                "vector length mismatch: {} vs {}",
                x.len(),
                y.len()
            ))
            .into());
        }
        let r = self.rand()?;
        let mut acc = sub2n(r.data[1], r.data[0], self.bitsize);
        for i in 0..x.len() {
            acc = add2n(acc, self.local_mult_term(&x.at(i), &y.at(i)), self.bitsize);
        }
        write_u64(&mut chls.next, acc)?;
        let other = read_u64(&mut chls.prev)?;
        Ok(RepShare::new(acc, other))
    }
}
