//! Authentication primitives: password hashing and session tokens.

use anyhow::{bail, Result};

use rand::Rng;
use rand_distr::Alphanumeric;
use serde::{Deserialize, Serialize};

use std::str::FromStr;
use std::time::SystemTime;

#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Debug)]
pub struct AuthTokenValue(pub String);

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct AuthToken {
    pub user_id: String,
    pub created: SystemTime,
    pub last_used: Option<SystemTime>,
    pub value: AuthTokenValue,
}

impl AuthTokenValue {
    pub fn generate() -> AuthTokenValue {
        let rng = rand::rng();
        let random_string: String = rng
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        AuthTokenValue(random_string)
    }
}

mod argon2_hashing {
    use anyhow::{anyhow, Result};
    use argon2::{
        password_hash::{
            rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString,
        },
        Argon2,
    };

    pub fn generate_b64_salt() -> String {
        SaltString::generate(&mut OsRng).to_string()
    }

    pub fn hash<T: AsRef<str>>(plain: &[u8], b64_salt: T) -> Result<String> {
        let argon2 = Argon2::default();
        let salt = SaltString::from_b64(b64_salt.as_ref()).map_err(|err| anyhow!("{}", err))?;
        let hash_string = argon2
            .hash_password(plain, &salt)
            .map_err(|err| anyhow!("{}", err))?
            .to_string();
        Ok(hash_string)
    }

    pub fn verify<T: AsRef<str>>(plain_pw: &[u8], target_hash: T) -> Result<bool> {
        let argon2 = Argon2::default();
        let password_hash =
            PasswordHash::new(target_hash.as_ref()).map_err(|err| anyhow!("{}", err))?;
        Ok(argon2.verify_password(plain_pw, &password_hash).is_ok())
    }
}

// Fast, insecure hasher to keep test suites snappy. Never ships enabled.
#[cfg(feature = "test-fast-hasher")]
mod fast_hashing {
    pub fn hash(plain: &[u8], b64_salt: &str) -> String {
        format!("fast:{}:{}", b64_salt, String::from_utf8_lossy(plain))
    }

    pub fn verify(plain_pw: &[u8], target_hash: &str) -> bool {
        target_hash
            .rsplit(':')
            .next()
            .map(|stored| stored.as_bytes() == plain_pw)
            .unwrap_or(false)
    }
}

#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub enum CredentialHasher {
    Argon2,
    #[cfg(feature = "test-fast-hasher")]
    Fast,
}

impl CredentialHasher {
    pub fn default_hasher() -> Self {
        #[cfg(feature = "test-fast-hasher")]
        return CredentialHasher::Fast;
        #[cfg(not(feature = "test-fast-hasher"))]
        CredentialHasher::Argon2
    }

    pub fn generate_b64_salt(&self) -> String {
        argon2_hashing::generate_b64_salt()
    }

    pub fn hash<T: AsRef<str>>(&self, plain: &[u8], b64_salt: T) -> Result<String> {
        match self {
            CredentialHasher::Argon2 => argon2_hashing::hash(plain, b64_salt),
            #[cfg(feature = "test-fast-hasher")]
            CredentialHasher::Fast => Ok(fast_hashing::hash(plain, b64_salt.as_ref())),
        }
    }

    pub fn verify<T: AsRef<str>>(&self, plain_pw: T, target_hash: T) -> Result<bool> {
        match self {
            CredentialHasher::Argon2 => {
                argon2_hashing::verify(plain_pw.as_ref().as_bytes(), target_hash)
            }
            #[cfg(feature = "test-fast-hasher")]
            CredentialHasher::Fast => Ok(fast_hashing::verify(
                plain_pw.as_ref().as_bytes(),
                target_hash.as_ref(),
            )),
        }
    }
}

impl FromStr for CredentialHasher {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "argon2" => Ok(CredentialHasher::Argon2),
            #[cfg(feature = "test-fast-hasher")]
            "fast" => Ok(CredentialHasher::Fast),
            _ => bail!("Unknown hasher {}", s),
        }
    }
}

impl std::fmt::Display for CredentialHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CredentialHasher::Argon2 => write!(f, "argon2"),
            #[cfg(feature = "test-fast-hasher")]
            CredentialHasher::Fast => write!(f, "fast"),
        }
    }
}

/// Stored password credentials for one user.
#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct PasswordCredentials {
    pub user_id: String,
    pub salt: String,
    pub hash: String,
    pub hasher: CredentialHasher,

    pub created: SystemTime,
    pub last_tried: Option<SystemTime>,
    pub last_used: Option<SystemTime>,
}

impl PasswordCredentials {
    pub fn from_plain_password(user_id: &str, password: &str) -> Result<Self> {
        let hasher = CredentialHasher::default_hasher();
        let salt = hasher.generate_b64_salt();
        let hash = hasher.hash(password.as_bytes(), &salt)?;
        Ok(PasswordCredentials {
            user_id: user_id.to_string(),
            salt,
            hash,
            hasher,
            created: SystemTime::now(),
            last_tried: None,
            last_used: None,
        })
    }

    pub fn verify(&self, password: &str) -> bool {
        self.hasher
            .verify(password, self.hash.as_str())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn argon2_hash_and_verify() {
        let pw = "industrial-password-123";
        let b64_salt = CredentialHasher::Argon2.generate_b64_salt();

        let hash1 = CredentialHasher::Argon2
            .hash(pw.as_bytes(), &b64_salt)
            .unwrap();
        let hash2 = CredentialHasher::Argon2
            .hash(pw.as_bytes(), &b64_salt)
            .unwrap();
        assert_eq!(hash1, hash2);

        assert!(CredentialHasher::Argon2.verify(pw, hash1.as_str()).unwrap());
        assert!(!CredentialHasher::Argon2
            .verify("not the pw", hash1.as_str())
            .unwrap());
    }

    #[test]
    fn credentials_roundtrip() {
        let credentials = PasswordCredentials::from_plain_password("u-1", "s3cret").unwrap();
        assert!(credentials.verify("s3cret"));
        assert!(!credentials.verify("S3cret"));
        assert_eq!(credentials.user_id, "u-1");
    }

    #[test]
    fn token_values_are_long_and_unique() {
        let a = AuthTokenValue::generate();
        let b = AuthTokenValue::generate();
        assert_eq!(a.0.len(), 64);
        assert_ne!(a, b);
    }

    #[test]
    fn hasher_name_roundtrip() {
        let parsed: CredentialHasher = "argon2".parse().unwrap();
        assert_eq!(parsed, CredentialHasher::Argon2);
        assert_eq!(CredentialHasher::Argon2.to_string(), "argon2");
        assert!("md5".parse::<CredentialHasher>().is_err());
    }
}
