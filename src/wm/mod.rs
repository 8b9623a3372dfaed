//! Wavelet-matrix layer: the plaintext structure the shares are carved from,
//! and the secure rank / quantile protocols on top of the oblivious-access
//! primitives.

pub mod oquantile;
pub mod plain;
pub mod secure_wm;
pub mod sot_wm;

pub use oquantile::{OQuantileEvaluator, OQuantileKey, OQuantileKeyGenerator, OQuantileParameters};
pub use plain::{BuildOrder, CharMapper, CharType, FmIndex, WaveletMatrix};
pub use secure_wm::{SecureWmEvaluator, SecureWmKey, SecureWmKeyGenerator, SecureWmParameters};
pub use sot_wm::{SotWmEvaluator, SotWmKey, SotWmKeyGenerator, SotWmParameters};
