//! # Oblivious FM-index search
//!
//! A three-party secure computation engine for private string search and
//! order statistics: three non-colluding parties jointly hold a
//! secret-shared FM-index (as wavelet-matrix rank tables) and a
//! secret-shared query, and cooperate to compute longest-prefix-match
//! lengths or k-th smallest elements without learning the text, the query,
//! or any intermediate value beyond the opened result.
//!
//! The stack is layered strictly bottom-up:
//!
//! * [sharing]: replicated sharing over `Z_{2^n}` for three parties and
//!   additive sharing with Beaver triples for two.
//! * [fss]: distributed point functions with pluggable full-domain
//!   evaluation strategies.
//! * [proto]: oblivious access ([proto::ring_oa], [proto::shared_ot],
//!   [proto::obliv_select]) and two-party predicates ([proto::zero_test],
//!   [proto::integer_comparison]).
//! * [wm]: the plaintext wavelet matrix plus the secure rank and quantile
//!   protocols.
//! * [fm_index]: the backward-search loop producing longest-prefix-match
//!   lengths.
//!
//! Every protocol follows the same three-stage contract: parameters, offline
//! key generation by a dealer, online evaluation over the point-to-point
//! ring of [channel_utils::Channels].
#![warn(missing_docs)]

pub mod channel_utils;
pub mod cli_utils;
pub mod errors;
pub mod fm_index;
pub mod fss;
pub mod proto;
pub mod ring_utils;
pub mod sharing;
pub mod wm;
