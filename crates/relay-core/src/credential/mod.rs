mod token;
pub use token::Credential;

mod manager;
pub use manager::{AuthPhase, AuthState, CredentialManager, Login};
