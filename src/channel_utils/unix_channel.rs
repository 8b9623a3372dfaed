//! Module about unix domain socket channels. See [UnixStream].
//! This module wires the three-party ring out of in-process socket pairs,
//! which is what the tests and the single-host harness use.

use crate::channel_utils::{Channels, TallyChannel};
use anyhow::{Context, Result};
use itertools::Itertools;
use scuttlebutt::SyncChannel;
use std::io::{BufReader, BufWriter};
use std::os::unix::net::UnixStream;

/// One ring channel backed by a unix socket pair.
pub type UnixPartyChannel = TallyChannel<SyncChannel<BufReader<UnixStream>, BufWriter<UnixStream>>>;

fn make_channel(stream: UnixStream) -> Result<UnixPartyChannel> {
    let reader = stream
        .try_clone()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok(TallyChannel::new(SyncChannel::new(
        BufReader::new(reader),
        BufWriter::new(stream),
    )))
}

/// Create the full three-party ring in one process.
///
/// Returns one [Channels] bundle per party; edge `i` connects party `i` to
/// party `(i + 1) mod 3`.
pub fn create_three_party_channels() -> Result<[Channels<UnixPartyChannel>; 3]> {
    // edge i: (lower endpoint = party i, upper endpoint = party i + 1)
    let mut lowers = Vec::with_capacity(3);
    let mut uppers = Vec::with_capacity(3);
    for _ in 0..3 {
        let (s, r) = UnixStream::pair().with_context(|| format!("@{}:{}", file!(), line!()))?;
        lowers.push(Some(make_channel(s)?));
        uppers.push(Some(make_channel(r)?));
    }

    // next = edge p (this party is the lower endpoint),
    // prev = edge (p + 2) mod 3 (this party is the upper endpoint).
    let out = (0..3usize)
        .map(|p| {
            let next = lowers[p].take().expect("edge consumed once");
            let prev = uppers[(p + 2) % 3].take().expect("edge consumed once");
            Channels::new(p as u64, prev, next)
        })
        .collect_vec();

    let mut it = out.into_iter();
    Ok([
        it.next().expect("three parties"),
        it.next().expect("three parties"),
        it.next().expect("three parties"),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::{read_u64, write_u64};

    #[test]
    fn test_ring_wiring() {
        let channels = create_three_party_channels().unwrap();

        let handles = channels
            .into_iter()
            .map(|mut chls| {
                std::thread::spawn(move || {
                    // Everyone sends its id to `next` and must read the
                    // predecessor's id from `prev`.
                    write_u64(&mut chls.next, chls.party_id).unwrap();
                    let got = read_u64(&mut chls.prev).unwrap();
                    assert_eq!(got, (chls.party_id + 2) % 3);
                    assert_eq!(chls.total_bytes_sent(), 8);
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            h.join().unwrap();
        }
    }
}
