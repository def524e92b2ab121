mod api;
mod auth;
mod health_check;

pub use api::{index, logout};
pub use auth::{login, public_key, refresh, signup};
pub use health_check::health_check;
