//! Secret-sharing layers: share containers, the three-party replicated
//! sharing over `Z_{2^n}`, the two-party additive sharing with Beaver
//! triples, and the XOR-domain counterparts used for block payloads.
//!
//! A replicated share of `x` is a triple `(x_0, x_1, x_2)` with
//! `x_0 + x_1 + x_2 = x (mod 2^n)`; party `i` stores the pair
//! `[x_i, x_{i-1}]`. Any two parties reconstruct `x`; one party alone sees
//! uniform noise. Vectors and matrices extend this component-wise.

use anyhow::Result;
use scuttlebutt::Block;

use crate::errors::ProtocolError;

pub mod additive;
pub mod binary;
pub mod replicated;
pub mod share_io;

pub use additive::{AdditiveSharing2P, BeaverTriples};
pub use binary::{BinaryReplicatedSharing3P, BinarySharing2P};
pub use replicated::ReplicatedSharing3P;

/// Number of parties in the replicated sharing.
pub const THREE_PARTIES: usize = 3;

/// Replicated share of one ring element: `data = [x_i, x_{i-1}]`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RepShare {
    /// The two components held by this party.
    pub data: [u64; 2],
}

impl RepShare {
    /// Build a share from its two components.
    pub fn new(d0: u64, d1: u64) -> Self {
        Self { data: [d0, d1] }
    }
}

/// Replicated share of a vector of ring elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepShareVec {
    /// Component vectors; `data[1][i] = data[0][i]` of the previous party.
    pub data: [Vec<u64>; 2],
}

impl RepShareVec {
    /// An all-zero share vector of length `len`.
    pub fn new(len: usize) -> Self {
        Self {
            data: [vec![0; len], vec![0; len]],
        }
    }

    /// Number of shared elements.
    pub fn len(&self) -> usize {
        self.data[0].len()
    }

    /// True if the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.data[0].is_empty()
    }

    /// The scalar share at position `i`.
    pub fn at(&self, i: usize) -> RepShare {
        RepShare::new(self.data[0][i], self.data[1][i])
    }

    /// Overwrite the scalar share at position `i`.
    pub fn set(&mut self, i: usize, sh: RepShare) {
        self.data[0][i] = sh.data[0];
        self.data[1][i] = sh.data[1];
    }
}

/// Replicated share of a row-major matrix of ring elements.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepShareMat {
    /// Number of rows.
    pub rows: usize,
    /// Number of columns.
    pub cols: usize,
    /// Flat component matrices.
    pub data: [Vec<u64>; 2],
}

impl RepShareMat {
    /// An all-zero shared matrix.
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: [vec![0; rows * cols], vec![0; rows * cols]],
        }
    }

    /// Borrow row `r` as a view.
    pub fn row_view(&self, r: usize) -> RepShareView<'_> {
        let lo = r * self.cols;
        let hi = lo + self.cols;
        RepShareView {
            data: [&self.data[0][lo..hi], &self.data[1][lo..hi]],
        }
    }
}

/// Borrowed view over a contiguous run of shared ring elements.
#[derive(Clone, Copy, Debug)]
pub struct RepShareView<'a> {
    /// Borrowed component slices.
    pub data: [&'a [u64]; 2],
}

impl<'a> RepShareView<'a> {
    /// View over a full shared vector.
    pub fn of(vec: &'a RepShareVec) -> Self {
        Self {
            data: [&vec.data[0], &vec.data[1]],
        }
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        self.data[0].len()
    }

    /// True if the view is empty.
    pub fn is_empty(&self) -> bool {
        self.data[0].is_empty()
    }

    /// The scalar share at position `i`.
    pub fn at(&self, i: usize) -> RepShare {
        RepShare::new(self.data[0][i], self.data[1][i])
    }
}

/// XOR-replicated share of one block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RepShareBlock {
    /// The two block components held by this party.
    pub data: [Block; 2],
}

impl Default for RepShareBlock {
    fn default() -> Self {
        Self {
            data: [Block::from(0u128); 2],
        }
    }
}

/// XOR-replicated share of a vector of blocks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RepShareVecBlock {
    /// Component vectors.
    pub data: [Vec<Block>; 2],
}

impl RepShareVecBlock {
    /// An all-zero shared block vector of length `len`.
    pub fn new(len: usize) -> Self {
        Self {
            data: [vec![Block::from(0u128); len], vec![Block::from(0u128); len]],
        }
    }

    /// Number of shared blocks.
    pub fn len(&self) -> usize {
        self.data[0].len()
    }

    /// True if the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.data[0].is_empty()
    }
}

/// Byte codec for share containers, used by [share_io].
///
/// Layout is little-endian and length-prefixed: scalars are 8 bytes, vectors
/// carry an 8-byte length, matrices carry rows then cols.
pub trait ShareCodec: Sized {
    /// Append the canonical byte encoding to `buffer`.
    fn encode(&self, buffer: &mut Vec<u8>);

    /// Parse a value back from `bytes`.
    fn decode(bytes: &[u8]) -> Result<Self>;
}

fn take8(bytes: &[u8], offset: &mut usize) -> Result<u64> {
    let lo = *offset;
    let hi = lo + 8;
    if bytes.len() < hi {
        return Err(ProtocolError::Serialization(format!(
            "buffer too short: need {} bytes, have {}",
            hi,
            bytes.len()
        ))
        .into());
    }
    *offset = hi;
    Ok(u64::from_le_bytes(bytes[lo..hi].try_into().expect("8 bytes")))
}

fn take16(bytes: &[u8], offset: &mut usize) -> Result<Block> {
    let lo = *offset;
    let hi = lo + 16;
    if bytes.len() < hi {
        return Err(ProtocolError::Serialization(format!(
            "buffer too short: need {} bytes, have {}",
            hi,
            bytes.len()
        ))
        .into());
    }
    *offset = hi;
    Ok(Block::from(u128::from_le_bytes(
        bytes[lo..hi].try_into().expect("16 bytes"),
    )))
}

impl ShareCodec for RepShare {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&self.data[0].to_le_bytes());
        buffer.extend_from_slice(&self.data[1].to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let d0 = take8(bytes, &mut offset)?;
        let d1 = take8(bytes, &mut offset)?;
        Ok(RepShare::new(d0, d1))
    }
}

impl ShareCodec for RepShareVec {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for side in &self.data {
            for x in side {
                buffer.extend_from_slice(&x.to_le_bytes());
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let len = take8(bytes, &mut offset)? as usize;
        let mut sh = RepShareVec::new(len);
        for side in 0..2 {
            for i in 0..len {
                sh.data[side][i] = take8(bytes, &mut offset)?;
            }
        }
        Ok(sh)
    }
}

impl ShareCodec for RepShareMat {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&(self.rows as u64).to_le_bytes());
        buffer.extend_from_slice(&(self.cols as u64).to_le_bytes());
        for side in &self.data {
            for x in side {
                buffer.extend_from_slice(&x.to_le_bytes());
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let rows = take8(bytes, &mut offset)? as usize;
        let cols = take8(bytes, &mut offset)? as usize;
        let mut sh = RepShareMat::new(rows, cols);
        for side in 0..2 {
            for i in 0..rows * cols {
                sh.data[side][i] = take8(bytes, &mut offset)?;
            }
        }
        Ok(sh)
    }
}

impl ShareCodec for RepShareBlock {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&u128::from(self.data[0]).to_le_bytes());
        buffer.extend_from_slice(&u128::from(self.data[1]).to_le_bytes());
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let d0 = take16(bytes, &mut offset)?;
        let d1 = take16(bytes, &mut offset)?;
        Ok(RepShareBlock { data: [d0, d1] })
    }
}

impl ShareCodec for RepShareVecBlock {
    fn encode(&self, buffer: &mut Vec<u8>) {
        buffer.extend_from_slice(&(self.len() as u64).to_le_bytes());
        for side in &self.data {
            for b in side {
                buffer.extend_from_slice(&u128::from(*b).to_le_bytes());
            }
        }
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let mut offset = 0;
        let len = take8(bytes, &mut offset)? as usize;
        let mut sh = RepShareVecBlock::new(len);
        for side in 0..2 {
            for i in 0..len {
                sh.data[side][i] = take16(bytes, &mut offset)?;
            }
        }
        Ok(sh)
    }
}
