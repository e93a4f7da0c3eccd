//! Authentication: credential cache and challenge mediation.
//!
//! ```text
//! network op --challenge(url)--> AuthChallengeCoordinator
//!                                   |-- suppression windows (ThrottleTimer)
//!                                   |-- CredentialCache (per-domain)
//!                                   '-- IdentityGateway (refresh | silent | prompt)
//! ```

mod cache;
mod coordinator;
mod error;
mod gateway;

pub use cache::{Credential, CredentialCache};
pub use coordinator::{AuthChallengeCoordinator, ChallengeOptions};
pub use error::AuthError;
pub use gateway::{IdentityGateway, SignInFlow, SignInOutcome};
