//! Oblivious access and comparison protocols.
//!
//! Three oblivious-access flavours share one contract: read a secret-shared
//! index out of a secret-shared array and hand every party a share of the
//! selected element. [ring_oa] and [shared_ot] work over ring elements,
//! [obliv_select] over XOR-shared blocks. [zero_test] and
//! [integer_comparison] are the two-party predicates layered on the same DPF
//! machinery.

pub(crate) mod access;
pub mod integer_comparison;
pub mod key_io;
pub mod obliv_select;
pub mod ring_oa;
pub mod shared_ot;
pub mod zero_test;

pub use integer_comparison::{
    IntegerComparisonEvaluator, IntegerComparisonKey, IntegerComparisonKeyGenerator,
    IntegerComparisonParameters,
};
pub use key_io::{load_key, save_key, KeyCodec};
pub use obliv_select::{
    OblivSelectEvaluator, OblivSelectKey, OblivSelectKeyGenerator, OblivSelectParameters,
};
pub use ring_oa::{RingOaEvaluator, RingOaKey, RingOaKeyGenerator, RingOaParameters};
pub use shared_ot::{SharedOtEvaluator, SharedOtKey, SharedOtKeyGenerator, SharedOtParameters};
pub use zero_test::{ZeroTestEvaluator, ZeroTestKey, ZeroTestKeyGenerator, ZeroTestParameters};
