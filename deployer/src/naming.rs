//! Provider-safe environment identifiers.
//!
//! The platform caps environment names, and environment names must be unique
//! across applications sharing an account. An id is therefore the human-chosen
//! name followed by a short digest of the owning application and that name:
//!
//! ```text
//! env_id = env_name + "-" + hex(sha1(app_id + "-" + env_name))[..7]
//! ```

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;
use thiserror::Error;

/// Longest environment name the provider accepts before the digest suffix.
pub const MAX_ENV_NAME_LEN: usize = 15;

const DIGEST_LEN: usize = 7;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Environment name '{name}' is too long ({length} chars), it must be at most 15 characters")]
pub struct NameTooLong {
    pub name: String,
    pub length: usize,
}

/// Identifier of an environment as known to the provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentId(String);

impl EnvironmentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EnvironmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for EnvironmentId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Derive the provider id for `env_name` within `app_id`.
pub fn derive_id(app_id: &str, env_name: &str) -> Result<EnvironmentId, NameTooLong> {
    let length = env_name.chars().count();
    if length > MAX_ENV_NAME_LEN {
        return Err(NameTooLong {
            name: env_name.to_string(),
            length,
        });
    }

    let mut hasher = Sha1::new();
    hasher.update(app_id.as_bytes());
    hasher.update(b"-");
    hasher.update(env_name.as_bytes());
    let digest = hex::encode(hasher.finalize());

    Ok(EnvironmentId(format!(
        "{}-{}",
        env_name,
        &digest[..DIGEST_LEN]
    )))
}
