//! Module about tcp channels. See [TcpStream].
//! This module brings up the three-party ring across hosts (or processes):
//! each unordered party pair gets its own port derived from a base port, the
//! lower-id party listens, the higher-id party connects, and both sides check
//! the peer id after the handshake.

use crate::channel_utils::{Channels, TallyChannel};
use crate::errors::ProtocolError;
use anyhow::{Context, Result};
use scuttlebutt::SyncChannel;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::thread::sleep;
use std::time::Duration;

const TIMEOUT: Duration = Duration::from_secs(10);

/// One ring channel backed by a tcp stream.
pub type TcpPartyChannel = TallyChannel<SyncChannel<BufReader<TcpStream>, BufWriter<TcpStream>>>;

/// Port offset of the channel between `a` and `b` (unordered, a != b).
fn pair_port_offset(a: u64, b: u64) -> u64 {
    let (lo, hi) = if a < b { (a, b) } else { (b, a) };
    match (lo, hi) {
        (0, 1) => 0,
        (1, 2) => 1,
        (0, 2) => 2,
        _ => unreachable!("party ids are in {{0, 1, 2}}"),
    }
}

fn handshake(stream: &mut TcpStream, me: u64, expected_peer: u64) -> Result<()> {
    stream
        .write_all(&me.to_be_bytes())
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    stream
        .flush()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;

    let mut buf = [0u8; 8];
    stream
        .read_exact(&mut buf)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    let peer = u64::from_be_bytes(buf);

    if peer != expected_peer {
        return Err(ProtocolError::Transport(format!(
            "handshake id mismatch: expected {} but got {} (me = {})",
            expected_peer, peer, me
        ))
        .into());
    }

    Ok(())
}

fn connect_pair(me: u64, peer: u64, ip: &str, base_port: u64) -> Result<TcpStream> {
    let port = base_port + pair_port_offset(me, peer);
    let ip_addr = ip
        .parse::<std::net::IpAddr>()
        .with_context(|| format!("bad ip {} @{}:{}", ip, file!(), line!()))?;
    let addr = SocketAddr::from((ip_addr, port as u16));

    let mut stream = if me < peer {
        // Lower id is the server endpoint.
        let listener = TcpListener::bind(addr)
            .with_context(|| format!("me={} addr={} @{}:{}", me, addr, file!(), line!()))?;
        let (stream, _) = listener
            .accept()
            .with_context(|| format!("@{}:{}", file!(), line!()))?;
        stream
    } else {
        // Higher id connects; the listener may not be bound yet, so retry
        // until the timeout elapses.
        sleep(Duration::from_millis(100 * me));
        let deadline = std::time::Instant::now() + TIMEOUT;
        loop {
            match TcpStream::connect_timeout(&addr, TIMEOUT) {
                Ok(stream) => break stream,
                Err(e) if std::time::Instant::now() < deadline => {
                    log::debug!("connect to {} failed ({}), retrying", addr, e);
                    sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("me={} addr={} @{}:{}", me, addr, file!(), line!())
                    })
                }
            }
        }
    };

    stream
        .set_nodelay(true)
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    handshake(&mut stream, me, peer)?;

    Ok(stream)
}

fn make_channel(stream: TcpStream) -> Result<TcpPartyChannel> {
    let reader = stream
        .try_clone()
        .with_context(|| format!("@{}:{}", file!(), line!()))?;
    Ok(TallyChannel::new(SyncChannel::new(
        BufReader::new(reader),
        BufWriter::new(stream),
    )))
}

/// Bring up the two ring channels of `party_id` over tcp.
///
/// All three parties must call this with the same `ip` and `base_port`. The
/// pairing convention is fixed: for each unordered pair the lower-id party
/// listens and the higher-id party connects, on `base_port` plus a distinct
/// per-pair offset.
pub fn create_tcp_party_channels(
    party_id: u64,
    ip: &str,
    base_port: u64,
) -> Result<Channels<TcpPartyChannel>> {
    if party_id > 2 {
        return Err(ProtocolError::Configuration(format!(
            "party_id must be in {{0, 1, 2}}, got {}",
            party_id
        ))
        .into());
    }

    let prev_id = (party_id + 2) % 3;
    let next_id = (party_id + 1) % 3;

    // Party 0 brings up its predecessor pair first, the others their
    // successor pair; this matches the order in which the connecting sides
    // dial, so no pairing waits on a listener that is not up yet.
    let (prev, next) = if party_id < prev_id {
        let prev = connect_pair(party_id, prev_id, ip, base_port)?;
        let next = connect_pair(party_id, next_id, ip, base_port)?;
        (prev, next)
    } else {
        let next = connect_pair(party_id, next_id, ip, base_port)?;
        let prev = connect_pair(party_id, prev_id, ip, base_port)?;
        (prev, next)
    };

    Ok(Channels::new(
        party_id,
        make_channel(prev)?,
        make_channel(next)?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel_utils::{read_u64, write_u64};

    fn ring_test(base_port: u64) {
        let handles = (0..3u64)
            .map(|me| {
                std::thread::spawn(move || {
                    let mut chls = create_tcp_party_channels(me, "127.0.0.1", base_port).unwrap();
                    write_u64(&mut chls.next, me).unwrap();
                    let got = read_u64(&mut chls.prev).unwrap();
                    assert_eq!(got, (me + 2) % 3);
                })
            })
            .collect::<Vec<_>>();

        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_three_party_tcp_ring() {
        ring_test(23500);
    }
}
