//! Users, sectors, permission bundles, credentials and session tokens.

pub mod auth;
pub mod models;
mod sqlite_user_store;
mod user_store;

pub use auth::{AuthToken, AuthTokenValue, CredentialHasher, PasswordCredentials};
pub use models::{GroupPermissions, Sector, User};
pub use sqlite_user_store::SqliteUserStore;
pub use user_store::{AuthTokenStore, UserCredentialsStore, UserStore};
