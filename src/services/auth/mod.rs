pub mod access_jwt;
pub mod dpop;
pub mod factory;
pub mod replay;

pub use access_jwt::{AccessJwtError, AuthService, VerifiedAccessToken};
pub use factory::{build_auth_service, build_dpop_verifier};
