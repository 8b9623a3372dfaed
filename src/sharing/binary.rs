//! XOR-domain sharing: the binary counterparts of the arithmetic engines,
//! used where the payload is a 128-bit block rather than a ring element.
//!
//! Structure mirrors the arithmetic engines with `^` in place of `+`; the
//! replicated convention is the same (`data = [x_i, x_{i-1}]`, opening sends
//! `data[1]` to `next`).

use anyhow::Result;
use rand::Rng;
use scuttlebutt::{AbstractChannel, AesRng, Block};

use crate::channel_utils::{read_block, read_block_vec, read_u64, write_block, write_block_vec, write_u64, Channels};
use crate::errors::ProtocolError;
use crate::ring_utils::mask;
use crate::sharing::{RepShare, RepShareBlock, RepShareVecBlock};

/// Two-party XOR sharing, used by key generators to split masks.
pub struct BinarySharing2P {
    bitsize: u64,
    rng: AesRng,
}

impl BinarySharing2P {
    /// Create an engine for `bitsize`-bit words.
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
        })
    }

    /// A fresh uniform word.
    pub fn generate_random_value(&mut self) -> u64 {
        self.rng.gen::<u64>() & mask(self.bitsize)
    }

    /// Split `x` into two XOR shares.
    pub fn share(&mut self, x: u64) -> (u64, u64) {
        let x0 = self.generate_random_value();
        (x0, x ^ x0)
    }

    /// One-round XOR opening over `chl`; `party_id` fixes who sends first.
    pub fn reconst<C: AbstractChannel>(
        &self,
        party_id: u64,
        chl: &mut C,
        x_mine: u64,
    ) -> Result<u64> {
        let theirs = if party_id == 0 {
            write_u64(chl, x_mine)?;
            read_u64(chl)?
        } else {
            let theirs = read_u64(chl)?;
            write_u64(chl, x_mine)?;
            theirs
        };
        Ok(x_mine ^ theirs)
    }
}

/// Three-party XOR-replicated sharing of words and blocks.
pub struct BinaryReplicatedSharing3P {
    bitsize: u64,
    rng: AesRng,
}

impl BinaryReplicatedSharing3P {
    /// Create an engine whose word shares live on `bitsize` bits.
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
        })
    }

    /// Word bit size of this engine.
    pub fn bitsize(&self) -> u64 {
        self.bitsize
    }

    /// Split a word into the three replicated XOR pairs.
    pub fn share_local(&mut self, x: u64) -> [RepShare; 3] {
        let m = mask(self.bitsize);
        let x0 = self.rng.gen::<u64>() & m;
        let x1 = self.rng.gen::<u64>() & m;
        let x2 = (x & m) ^ x0 ^ x1;
        [
            RepShare::new(x0, x2),
            RepShare::new(x1, x0),
            RepShare::new(x2, x1),
        ]
    }

    /// Split one block into the three replicated XOR pairs.
    pub fn share_local_block(&mut self, x: Block) -> [RepShareBlock; 3] {
        let x0 = self.rng.gen::<Block>();
        let x1 = self.rng.gen::<Block>();
        let x2 = x ^ x0 ^ x1;
        [
            RepShareBlock { data: [x0, x2] },
            RepShareBlock { data: [x1, x0] },
            RepShareBlock { data: [x2, x1] },
        ]
    }

    /// Share a block vector element-wise.
    pub fn share_local_block_vec(&mut self, xs: &[Block]) -> [RepShareVecBlock; 3] {
        let mut out = [
            RepShareVecBlock::new(xs.len()),
            RepShareVecBlock::new(xs.len()),
            RepShareVecBlock::new(xs.len()),
        ];
        for (i, &x) in xs.iter().enumerate() {
            let sh = self.share_local_block(x);
            for p in 0..3 {
                out[p].data[0][i] = sh[p].data[0];
                out[p].data[1][i] = sh[p].data[1];
            }
        }
        out
    }

    /// Open a word share towards every party.
    pub fn open<C: AbstractChannel>(&self, chls: &mut Channels<C>, sh: &RepShare) -> Result<u64> {
        write_u64(&mut chls.next, sh.data[1])?;
        let third = read_u64(&mut chls.prev)?;
        Ok((sh.data[0] ^ sh.data[1] ^ third) & mask(self.bitsize))
    }

    /// Open a block share towards every party.
    pub fn open_block<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        sh: &RepShareBlock,
    ) -> Result<Block> {
        write_block(&mut chls.next, sh.data[1])?;
        let third = read_block(&mut chls.prev)?;
        Ok(sh.data[0] ^ sh.data[1] ^ third)
    }

    /// Open a block-vector share towards every party.
    pub fn open_block_vec<C: AbstractChannel>(
        &self,
        chls: &mut Channels<C>,
        sh: &RepShareVecBlock,
    ) -> Result<Vec<Block>> {
        write_block_vec(&mut chls.next, &sh.data[1])?;
        let third = read_block_vec(&mut chls.prev)?;
        if third.len() != sh.len() {
            return Err(ProtocolError::Transport(format!(
                "open_block_vec length mismatch: sent {}, received {}",
                sh.len(),
                third.len()
            ))
            .into());
        }
        Ok((0..sh.len())
            .map(|i| sh.data[0][i] ^ sh.data[1][i] ^ third[i])
            .collect())
    }
}
