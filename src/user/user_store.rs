use super::auth::{AuthToken, AuthTokenValue, PasswordCredentials};
use super::models::User;
use anyhow::Result;

pub trait UserCredentialsStore: Send + Sync {
    /// Returns the user's password credentials given the user id.
    /// Returns Ok(None) if the user has no credentials.
    /// Returns Err if there is a database error.
    fn get_user_credentials(&self, user_id: &str) -> Result<Option<PasswordCredentials>>;

    /// Replaces the user's password credentials.
    fn update_user_credentials(&self, credentials: PasswordCredentials) -> Result<()>;
}

pub trait AuthTokenStore: Send + Sync {
    /// Returns an auth token given its value.
    /// Returns Ok(None) if the token does not exist.
    /// Returns Err if there is a database error.
    fn get_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Deletes an auth token given the token value.
    /// Returns Ok(None) if the token does not exist.
    fn delete_auth_token(&self, token: &AuthTokenValue) -> Result<Option<AuthToken>>;

    /// Updates an auth token with the latest timestamp.
    fn update_auth_token_last_used_timestamp(&self, token: &AuthTokenValue) -> Result<()>;

    /// Adds a new auth token.
    fn add_auth_token(&self, token: AuthToken) -> Result<()>;

    /// Returns all of a user's auth tokens.
    fn get_all_auth_tokens(&self, user_id: &str) -> Result<Vec<AuthToken>>;
}

pub trait UserStore: UserCredentialsStore + AuthTokenStore + Send + Sync {
    /// Inserts or replaces a user record.
    fn upsert_user(&self, user: &User) -> Result<()>;

    /// Returns a user given the user id.
    /// Returns Ok(None) if the user does not exist.
    /// Returns Err if there is a database error.
    fn get_user(&self, user_id: &str) -> Result<Option<User>>;

    /// Returns a user given the login email.
    /// Returns Ok(None) if no user has that email.
    fn get_user_by_email(&self, email: &str) -> Result<Option<User>>;

    /// Returns all users.
    fn fetch_all_users(&self) -> Result<Vec<User>>;

    /// Stamps the user's last access time with now.
    fn touch_last_access(&self, user_id: &str) -> Result<()>;
}
