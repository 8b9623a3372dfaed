//! FM-index layer: secure longest-prefix-match protocols and the
//! offline/online harness behind the `fmi_lpm` binary.

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;
use scuttlebutt::{AbstractChannel, AesRng};

use crate::channel_utils::{tcp_channel, unix_channel, Channels};
use crate::cli_utils::{ChannelType, LpmArgs};
use crate::errors::ProtocolError;
use crate::proto::key_io::{load_key, save_key};
use crate::sharing::share_io::{load_share, save_share};
use crate::sharing::{AdditiveSharing2P, RepShareMat, ReplicatedSharing3P};
use crate::wm::plain::{random_dna_text, CharType, FmIndex};

pub mod secure_fmi;
pub mod sot_fmi;

pub use secure_fmi::{
    lpm_from_indicators, SecureFmiEvaluator, SecureFmiKey, SecureFmiKeyGenerator,
    SecureFmiParameters,
};
pub use sot_fmi::{SotFmiEvaluator, SotFmiKey, SotFmiKeyGenerator, SotFmiParameters};

const SIGMA_DNA: u64 = 3;

fn offline_prefix(data_dir: &str) -> String {
    format!("{}/offline_", data_dir)
}

/// Offline phase of the harness: build a random index and query, generate
/// all correlated randomness, keys and shares, and persist them per party
/// under `data_dir`.
pub fn run_offline(args: &LpmArgs) -> Result<()> {
    std::fs::create_dir_all(&args.data_dir)
        .with_context(|| format!("creating {} @{}:{}", args.data_dir, file!(), line!()))?;
    let prefix = offline_prefix(&args.data_dir);

    let d = args.database_bitsize;
    let mut rng = AesRng::new();
    let text = random_dna_text((1usize << d) - 2, &mut rng);
    let query = match &args.query {
        Some(q) => {
            if q.chars().count() as u64 != args.query_size {
                return Err(ProtocolError::Configuration(format!(
                    "query has {} characters but --query-size says {}",
                    q.chars().count(),
                    args.query_size
                ))
                .into());
            }
            q.clone()
        }
        None => random_dna_text(args.query_size as usize, &mut rng),
    };
    let fm = FmIndex::new(&text, CharType::Dna)?;

    let params = SecureFmiParameters::new(d, query.chars().count() as u64, SIGMA_DNA)?;
    let mut gen = SecureFmiKeyGenerator::new(&params);
    let mut ass = AdditiveSharing2P::new(d)?;
    let mut rss = ReplicatedSharing3P::new(d)?;

    rss.offline_setup(&prefix)?;
    gen.offline_setup(&mut ass, &prefix)?;

    let tables_sh = gen.generate_database_share(&mut rss, &fm)?;
    let query_sh = gen.generate_query_share(&mut rss, &fm, &query)?;
    let keys = gen.generate_keys(&mut ass)?;

    for p in 0..3 {
        save_key(&format!("{}fmikey_{}", prefix, p), &keys[p])?;
        save_share(&format!("{}fmidb_{}", prefix, p), &tables_sh[p])?;
        save_share(&format!("{}fmiquery_{}", prefix, p), &query_sh[p])?;
    }

    let expected = fm.compute_lpm_from_wm(&query)?;
    info!(
        "offline done: d={} query={} expected LPM={}",
        d, query, expected
    );
    if args.verbose {
        println!("query: {}", query);
        println!("plaintext LPM: {}", expected);
    }
    Ok(())
}

/// Online phase of one party: load its artifacts and run the search.
pub fn run_party<C: AbstractChannel>(args: &LpmArgs, chls: &mut Channels<C>) -> Result<u64> {
    let prefix = offline_prefix(&args.data_dir);
    let d = args.database_bitsize;
    let party_id = chls.party_id;

    let params = SecureFmiParameters::new(d, args.query_size, SIGMA_DNA)?;
    let mut rss = ReplicatedSharing3P::new(d)?;
    rss.online_setup(party_id, &prefix)?;
    let mut ass_prev = AdditiveSharing2P::new(d)?;
    let mut ass_next = AdditiveSharing2P::new(d)?;

    let eval = SecureFmiEvaluator::new(&params);
    eval.online_setup(party_id, &mut ass_prev, &mut ass_next, &prefix)?;

    let key: SecureFmiKey = load_key(&params, &format!("{}fmikey_{}", prefix, party_id))?;
    let tables: RepShareMat = load_share(&format!("{}fmidb_{}", prefix, party_id))?;
    let query: RepShareMat = load_share(&format!("{}fmiquery_{}", prefix, party_id))?;

    let mut uv_prev = vec![0u64; params.database_size()];
    let mut uv_next = vec![0u64; params.database_size()];

    let indicators = eval.evaluate_lpm(
        chls,
        &mut rss,
        &ass_prev,
        &ass_next,
        &key,
        &mut uv_prev,
        &mut uv_next,
        &tables,
        &query,
    )?;
    let opened = rss.open_vec(chls, &indicators)?;
    let lpm = lpm_from_indicators(&opened);
    info!("party {}: opened LPM = {}", party_id, lpm);
    Ok(lpm)
}

/// Entry point of the `fmi_lpm` binary.
///
/// With `party = -1` the whole protocol runs in-process: the offline phase
/// followed by three online threads over a unix-socket ring. With an
/// explicit party id only the online phase of that party runs, over tcp,
/// against artifacts produced by a previous `--offline` invocation.
pub fn run(args: LpmArgs) -> Result<()> {
    if args.offline {
        return run_offline(&args);
    }

    if args.party < 0 {
        run_offline(&args)?;
        let channels = unix_channel::create_three_party_channels()?;
        let handles = channels
            .into_iter()
            .map(|mut chls| {
                let args = args.clone();
                std::thread::spawn(move || -> Result<(u64, u64)> {
                    let lpm = run_party(&args, &mut chls)?;
                    Ok((lpm, chls.total_bytes_sent()))
                })
            })
            .collect_vec();

        for (p, h) in handles.into_iter().enumerate() {
            let (lpm, bytes) = h
                .join()
                .map_err(|_| ProtocolError::Assertion(format!("party {} panicked", p)))??;
            println!("party {}: LPM = {}, bytes sent = {}", p, lpm, bytes);
        }
        return Ok(());
    }

    let party_id = args.party as u64;
    match args.channel_type {
        ChannelType::Tcp => {
            let mut chls = tcp_channel::create_tcp_party_channels(party_id, &args.ip, args.base_port)?;
            let lpm = run_party(&args, &mut chls)?;
            println!(
                "party {}: LPM = {}, bytes sent = {}",
                party_id,
                lpm,
                chls.total_bytes_sent()
            );
        }
        ChannelType::Unix => {
            return Err(ProtocolError::Configuration(
                "separate-process parties need the tcp channel type".into(),
            )
            .into());
        }
    }
    Ok(())
}
