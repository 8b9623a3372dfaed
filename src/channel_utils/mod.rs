//! Channel utilities. Channels are used to communicate between parties.
//!
//! The three parties form a ring: each party owns one channel to its
//! predecessor (`prev`) and one to its successor (`next`). Every protocol
//! round follows the same pattern (send on `next`, then receive from `prev`,
//! or one symmetric exchange per neighbour pair), which is what makes the
//! stack deadlock-free over blocking transports.
//!
//! All values cross the wire little-endian: scalars raw, vectors preceded by
//! an 8-byte length. Both endpoints know the shape of every round statically,
//! so no type tags are sent.

use anyhow::{Context, Result};
use scuttlebutt::{AbstractChannel, Block};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod tcp_channel;
pub mod unix_channel;

/// A channel wrapper that counts the bytes moved in each direction.
///
/// The counters are shared across clones so that a channel handed to a
/// sub-protocol still reports into the same totals.
pub struct TallyChannel<C: AbstractChannel> {
    inner: C,
    sent: Arc<AtomicU64>,
    received: Arc<AtomicU64>,
}

impl<C: AbstractChannel> TallyChannel<C> {
    /// Wrap a channel with fresh counters.
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            sent: Arc::new(AtomicU64::new(0)),
            received: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total bytes written so far.
    pub fn bytes_sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    /// Total bytes read so far.
    pub fn bytes_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    /// Reset both counters to zero.
    pub fn reset_stats(&self) {
        self.sent.store(0, Ordering::Relaxed);
        self.received.store(0, Ordering::Relaxed);
    }
}

impl<C: AbstractChannel> AbstractChannel for TallyChannel<C> {
    #[inline(always)]
    fn write_bytes(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.sent.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.inner.write_bytes(bytes)
    }

    #[inline(always)]
    fn read_bytes(&mut self, bytes: &mut [u8]) -> std::io::Result<()> {
        self.received.fetch_add(bytes.len() as u64, Ordering::Relaxed);
        self.inner.read_bytes(bytes)
    }

    #[inline(always)]
    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }

    #[inline(always)]
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
            sent: Arc::clone(&self.sent),
            received: Arc::clone(&self.received),
        }
    }
}

/// The two ring channels of one party.
pub struct Channels<C: AbstractChannel> {
    /// This party's id in {0, 1, 2}.
    pub party_id: u64,
    /// Channel to party `(party_id + 2) mod 3`.
    pub prev: C,
    /// Channel to party `(party_id + 1) mod 3`.
    pub next: C,
}

impl<C: AbstractChannel> Channels<C> {
    /// Bundle the two neighbour channels of `party_id`.
    pub fn new(party_id: u64, prev: C, next: C) -> Self {
        Self {
            party_id,
            prev,
            next,
        }
    }
}

impl<C: AbstractChannel> Channels<TallyChannel<C>> {
    /// Bytes this party has sent on both ring channels together.
    pub fn total_bytes_sent(&self) -> u64 {
        self.prev.bytes_sent() + self.next.bytes_sent()
    }

    /// Reset the byte counters of both ring channels.
    pub fn reset_stats(&self) {
        self.prev.reset_stats();
        self.next.reset_stats();
    }
}

/// Write a `u64` scalar to a channel.
pub fn write_u64<C: AbstractChannel>(channel: &mut C, x: u64) -> Result<()> {
    channel
        .write_bytes(&x.to_le_bytes())
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    channel
        .flush()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok(())
}

/// Read a `u64` scalar from a channel.
pub fn read_u64<C: AbstractChannel>(channel: &mut C) -> Result<u64> {
    let mut buf = [0u8; 8];
    channel
        .read_bytes(&mut buf)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok(u64::from_le_bytes(buf))
}

/// Write a length-prefixed vector of `u64` to a channel.
pub fn write_u64_vec<C: AbstractChannel>(channel: &mut C, v: &[u64]) -> Result<usize> {
    let mut bytes = Vec::with_capacity(8 + v.len() * 8);
    bytes.extend_from_slice(&(v.len() as u64).to_le_bytes());
    for x in v {
        bytes.extend_from_slice(&x.to_le_bytes());
    }

    let len = bytes.len();

    channel
        .write_bytes(&bytes)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    channel
        .flush()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

    Ok(len)
}

/// Read a length-prefixed vector of `u64` from a channel.
pub fn read_u64_vec<C: AbstractChannel>(channel: &mut C) -> Result<Vec<u64>> {
    let mut len_buf = [0u8; 8];
    channel
        .read_bytes(&mut len_buf)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    let len = u64::from_le_bytes(len_buf) as usize;

    let mut bytes = vec![0u8; len * 8];
    channel
        .read_bytes(&mut bytes)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

    let res = bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().expect("chunk of 8")))
        .collect();

    Ok(res)
}

/// Write one 128-bit block to a channel.
pub fn write_block<C: AbstractChannel>(channel: &mut C, b: Block) -> Result<()> {
    channel
        .write_bytes(&u128::from(b).to_le_bytes())
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    channel
        .flush()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok(())
}

/// Read one 128-bit block from a channel.
pub fn read_block<C: AbstractChannel>(channel: &mut C) -> Result<Block> {
    let mut buf = [0u8; 16];
    channel
        .read_bytes(&mut buf)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok(Block::from(u128::from_le_bytes(buf)))
}

/// Write a length-prefixed vector of blocks to a channel.
pub fn write_block_vec<C: AbstractChannel>(channel: &mut C, v: &[Block]) -> Result<usize> {
    let mut bytes = Vec::with_capacity(8 + v.len() * 16);
    bytes.extend_from_slice(&(v.len() as u64).to_le_bytes());
    for b in v {
        bytes.extend_from_slice(&u128::from(*b).to_le_bytes());
    }

    let len = bytes.len();

    channel
        .write_bytes(&bytes)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    channel
        .flush()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

    Ok(len)
}

/// Read a length-prefixed vector of blocks from a channel.
pub fn read_block_vec<C: AbstractChannel>(channel: &mut C) -> Result<Vec<Block>> {
    let mut len_buf = [0u8; 8];
    channel
        .read_bytes(&mut len_buf)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    let len = u64::from_le_bytes(len_buf) as usize;

    let mut bytes = vec![0u8; len * 16];
    channel
        .read_bytes(&mut bytes)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

    let res = bytes
        .chunks_exact(16)
        .map(|c| Block::from(u128::from_le_bytes(c.try_into().expect("chunk of 16"))))
        .collect();

    Ok(res)
}
