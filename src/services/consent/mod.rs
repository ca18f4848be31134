pub mod guard;
pub mod store;
pub mod types;

pub use guard::ConsentGuard;
pub use store::ConsentStore;
pub use types::{Consent, ConsentContext, ConsentDenial, Decision};
