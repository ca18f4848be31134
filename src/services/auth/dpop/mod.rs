pub mod core;
pub mod thumbprint;
pub mod types;

pub use self::core::{DpopVerifier, ProofTarget, compute_ath, expected_htu};
pub use thumbprint::{ThumbprintError, thumbprint};
pub use types::{DpopError, DpopPolicy, VerifiedDpop};
