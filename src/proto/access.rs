//! Shared plumbing of the ring-element oblivious-access protocols.
//!
//! Both [ring_oa](crate::proto::ring_oa) and
//! [shared_ot](crate::proto::shared_ot) follow the same edge construction:
//! every neighbour pair holds the two halves of a DPF whose hidden point
//! blinds the queried index on that edge. The helpers here open the blinded
//! indices (one symmetric exchange per neighbour) and evaluate the rotated
//! selector dot products.

use anyhow::Result;
use scuttlebutt::AbstractChannel;

use crate::channel_utils::{read_u64, read_u64_vec, write_u64, write_u64_vec, Channels};
use crate::errors::ProtocolError;
use crate::ring_utils::{add2n, mask, mod2n, sub2n};
use crate::sharing::{RepShare, RepShareView};

/// Open the two blinded indices of one lookup.
///
/// On the edge towards `next` this party is the lower endpoint and
/// contributes both of its index components; towards `prev` it is the upper
/// endpoint and contributes only `data[0]`. Each neighbour pair exchanges its
/// two contributions and adds them, yielding `index - alpha_edge` on both
/// sides of the edge.
pub(crate) fn open_masked_indices<C: AbstractChannel>(
    chls: &mut Channels<C>,
    index_bits: u64,
    index: &RepShare,
    rsh_from_prev: u64,
    rsh_from_next: u64,
) -> Result<(u64, u64)> {
    let mine_next = mod2n(
        index.data[0]
            .wrapping_add(index.data[1])
            .wrapping_sub(rsh_from_next),
        index_bits,
    );
    let mine_prev = mod2n(index.data[0].wrapping_sub(rsh_from_prev), index_bits);

    write_u64(&mut chls.next, mine_next)?;
    write_u64(&mut chls.prev, mine_prev)?;
    let theirs_prev = read_u64(&mut chls.prev)?;
    let theirs_next = read_u64(&mut chls.next)?;

    Ok((
        add2n(mine_prev, theirs_prev, index_bits),
        add2n(mine_next, theirs_next, index_bits),
    ))
}

/// Open the blinded indices of two independent lookups in one exchange.
///
/// Returns `[m_prev_1, m_prev_2, m_next_1, m_next_2]`.
pub(crate) fn open_masked_indices_pair<C: AbstractChannel>(
    chls: &mut Channels<C>,
    index_bits: u64,
    index1: &RepShare,
    rsh1: (u64, u64),
    index2: &RepShare,
    rsh2: (u64, u64),
) -> Result<[u64; 4]> {
    let mine_next = [
        mod2n(
            index1.data[0]
                .wrapping_add(index1.data[1])
                .wrapping_sub(rsh1.1),
            index_bits,
        ),
        mod2n(
            index2.data[0]
                .wrapping_add(index2.data[1])
                .wrapping_sub(rsh2.1),
            index_bits,
        ),
    ];
    let mine_prev = [
        mod2n(index1.data[0].wrapping_sub(rsh1.0), index_bits),
        mod2n(index2.data[0].wrapping_sub(rsh2.0), index_bits),
    ];

    write_u64_vec(&mut chls.next, &mine_next)?;
    write_u64_vec(&mut chls.prev, &mine_prev)?;
    let theirs_prev = read_u64_vec(&mut chls.prev)?;
    let theirs_next = read_u64_vec(&mut chls.next)?;
    if theirs_prev.len() != 2 || theirs_next.len() != 2 {
        return Err(ProtocolError::Transport("masked index exchange shape mismatch".into()).into());
    }

    Ok([
        add2n(mine_prev[0], theirs_prev[0], index_bits),
        add2n(mine_prev[1], theirs_prev[1], index_bits),
        add2n(mine_next[0], theirs_next[0], index_bits),
        add2n(mine_next[1], theirs_next[1], index_bits),
    ])
}

/// Dot product of a database component against the selector expansion,
/// rotated by the opened masked index `m`: the selector weight of `db[j]` is
/// `uv[(j - m) mod 2^index_bits]`.
pub(crate) fn rotated_dot(uv: &[u64], db: &[u64], m: u64, index_bits: u64, ring_bits: u64) -> u64 {
    let idx_mask = mask(index_bits) as usize;
    let mut acc = 0u64;
    for (j, &v) in db.iter().enumerate() {
        let sel = uv[(j.wrapping_sub(m as usize)) & idx_mask];
        acc = acc.wrapping_add(sel.wrapping_mul(v));
    }
    mod2n(acc, ring_bits)
}

/// Check that a database view spans exactly the DPF domain.
pub(crate) fn check_database_len(db: &RepShareView<'_>, index_bits: u64) -> Result<()> {
    let expected = 1usize << index_bits;
    if db.len() != expected {
        return Err(ProtocolError::Configuration(format!(
            "database view has {} elements, the access domain needs {}",
            db.len(),
            expected
        ))
        .into());
    }
    Ok(())
}

/// The final ring round: re-randomised contributions travel once around the
/// ring and become a replicated share.
pub(crate) fn reshare_scalar<C: AbstractChannel>(
    chls: &mut Channels<C>,
    ring_bits: u64,
    contribution: u64,
) -> Result<RepShare> {
    let own = mod2n(contribution, ring_bits);
    write_u64(&mut chls.next, own)?;
    let from_prev = read_u64(&mut chls.prev)?;
    Ok(RepShare::new(own, from_prev))
}

/// Vector variant of [reshare_scalar].
pub(crate) fn reshare_vec<C: AbstractChannel>(
    chls: &mut Channels<C>,
    ring_bits: u64,
    contributions: &[u64],
) -> Result<crate::sharing::RepShareVec> {
    let own: Vec<u64> = contributions.iter().map(|c| mod2n(*c, ring_bits)).collect();
    write_u64_vec(&mut chls.next, &own)?;
    let from_prev = read_u64_vec(&mut chls.prev)?;
    if from_prev.len() != own.len() {
        return Err(ProtocolError::Transport("reshare shape mismatch".into()).into());
    }
    Ok(crate::sharing::RepShareVec {
        data: [own, from_prev],
    })
}

/// Combine the two edge dot products with the telescoping output masks.
pub(crate) fn masked_contribution(
    t_prev: u64,
    t_next: u64,
    wsh_from_prev: u64,
    wsh_from_next: u64,
    ring_bits: u64,
) -> u64 {
    let s = add2n(t_prev, t_next, ring_bits);
    sub2n(add2n(s, wsh_from_prev, ring_bits), wsh_from_next, ring_bits)
}
