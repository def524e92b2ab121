/// Authentication module
///
/// Signing keys, password hashing, token issuance and validation, and the
/// gate that ties tokens to live sessions.

mod claims;
mod gate;
mod issuer;
mod keys;
mod password;
mod validator;

pub use claims::{Claims, TokenKind};
pub use gate::{AuthenticationGate, Principal};
pub use issuer::{generate_session_id, TokenIssuer, TokenPair};
pub use keys::{KeyManager, SIGNING_ALGORITHM};
pub use password::{PasswordHasher, MAX_COST, MIN_COST};
pub use validator::{TokenValidator, ValidatedToken};
