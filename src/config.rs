// sftpfs is a pooled, backpressured SFTP virtual file-system adapter
// Copyright (C) 2025  Javier Lancha Vázquez <javier.lancha@gmail.com>
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! `ConnectionParameters` and layered configuration resolution.

use std::path::PathBuf;
use std::time::Duration;

use crate::defaults;
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

/// Credential selection. Authentication tries, in order, only the method
/// explicitly configured here; providing a password never falls through to
/// a key or agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Credential {
    Password(String),
    KeyFile {
        private_key: PathBuf,
        passphrase: Option<String>,
    },
    Agent,
    /// No credential explicitly configured: probe the SSH agent if
    /// `SSH_AUTH_SOCK` is present, trying identities in the order the agent
    /// returns them.
    NoneWithProbeOrder,
}

/// Per-Transport connection parameters.
#[derive(Debug, Clone)]
pub struct ConnectionParameters {
    pub endpoint: Endpoint,
    pub credential: Credential,
    pub handshake_timeout: Duration,
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub keepalive_interval: u32,
    pub chunk_size: u64,
    pub max_concurrent_uploads: usize,
    pub strict_crypto: bool,
    pub pool_capacity: usize,
}

/// Builder-style overrides a caller may supply before the rest is filled in
/// from the environment and documented defaults. Every field
/// parses independently so one malformed environment variable never blocks
/// an otherwise fully-explicit caller.
///
/// Deserializable so a host embedder can load a base set of overrides from a
/// config file before layering its own explicit, per-call values on top (see
/// [`ConnectionParametersOverrides::from_json_file`]).
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ConnectionParametersOverrides {
    pub handshake_timeout_seconds: Option<u64>,
    pub max_retries: Option<u32>,
    pub initial_retry_delay_ms: Option<u64>,
    pub keepalive_interval: Option<u32>,
    pub chunk_size: Option<u64>,
    pub max_concurrent_uploads: Option<usize>,
    pub strict_crypto: Option<bool>,
    pub pool_capacity: Option<usize>,
}

impl ConnectionParametersOverrides {
    /// Loads overrides from a JSON file, e.g. a host application's own
    /// config file delegating its SFTP section to this crate. Missing
    /// fields default to `None`, leaving the environment/default layers in
    /// `resolve` to fill them in.
    pub fn from_json_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| {
            Error::configuration(format!(
                "failed to read overrides file '{}': {source}",
                path.display()
            ))
        })?;
        serde_json::from_str(&contents).map_err(|source| {
            Error::configuration(format!(
                "failed to parse overrides file '{}': {source}",
                path.display()
            ))
        })
    }

    /// Merges `other`'s explicitly-set fields over `self`, keeping `self`'s
    /// values where `other` left a field at `None`. Used to layer a
    /// per-call override on top of a file-loaded base.
    pub fn merged_over(self, other: Self) -> Self {
        Self {
            handshake_timeout_seconds: other
                .handshake_timeout_seconds
                .or(self.handshake_timeout_seconds),
            max_retries: other.max_retries.or(self.max_retries),
            initial_retry_delay_ms: other.initial_retry_delay_ms.or(self.initial_retry_delay_ms),
            keepalive_interval: other.keepalive_interval.or(self.keepalive_interval),
            chunk_size: other.chunk_size.or(self.chunk_size),
            max_concurrent_uploads: other
                .max_concurrent_uploads
                .or(self.max_concurrent_uploads),
            strict_crypto: other.strict_crypto.or(self.strict_crypto),
            pool_capacity: other.pool_capacity.or(self.pool_capacity),
        }
    }
}

impl ConnectionParameters {
    /// Resolves full parameters from an endpoint, credential, explicit
    /// overrides, `SFTPFS_*` environment variables, and documented defaults,
    /// in that priority order.
    pub fn resolve(
        endpoint: Endpoint,
        credential: Credential,
        overrides: ConnectionParametersOverrides,
    ) -> Result<Self> {
        let handshake_timeout_seconds = overrides
            .handshake_timeout_seconds
            .or_else(|| env_u64("SFTPFS_TIMEOUT_SECONDS"))
            .unwrap_or(defaults::DEFAULT_TIMEOUT_SECONDS);

        let max_retries = overrides
            .max_retries
            .or_else(|| env_u32("SFTPFS_MAX_RETRIES"))
            .unwrap_or(defaults::DEFAULT_MAX_RETRIES);

        let initial_retry_delay_ms = overrides
            .initial_retry_delay_ms
            .or_else(|| env_u64("SFTPFS_INITIAL_RETRY_DELAY_MS"))
            .unwrap_or(defaults::DEFAULT_INITIAL_RETRY_DELAY_MS);

        let keepalive_interval = overrides
            .keepalive_interval
            .or_else(|| env_u32("SFTPFS_KEEPALIVE_INTERVAL"))
            .unwrap_or(defaults::DEFAULT_KEEPALIVE_INTERVAL);

        let chunk_size = overrides
            .chunk_size
            .or_else(|| env_u64("SFTPFS_CHUNK_SIZE"))
            .unwrap_or(defaults::DEFAULT_CHUNK_SIZE);
        if chunk_size == 0 {
            return Err(Error::configuration("chunk_size must be greater than zero"));
        }

        let max_concurrent_uploads = overrides
            .max_concurrent_uploads
            .or_else(|| env_usize("SFTPFS_MAX_CONCURRENT_UPLOADS"))
            .unwrap_or(defaults::DEFAULT_MAX_CONCURRENT_UPLOADS);
        if max_concurrent_uploads == 0 {
            return Err(Error::configuration(
                "max_concurrent_uploads must be at least 1",
            ));
        }

        let strict_crypto = overrides
            .strict_crypto
            .or_else(|| env_bool("SFTPFS_STRICT_CRYPTO"))
            .unwrap_or(defaults::DEFAULT_STRICT_CRYPTO);

        let pool_capacity = overrides
            .pool_capacity
            .or_else(|| env_usize("SFTPFS_POOL_CAPACITY"))
            .unwrap_or(defaults::DEFAULT_POOL_CAPACITY);
        if pool_capacity == 0 {
            return Err(Error::configuration("pool_capacity must be at least 1"));
        }

        if let Credential::NoneWithProbeOrder = credential {
            if std::env::var_os("SSH_AUTH_SOCK").is_none() {
                return Err(Error::configuration(
                    "no credential configured and SSH_AUTH_SOCK is not set",
                ));
            }
        }

        Ok(Self {
            endpoint,
            credential,
            handshake_timeout: Duration::from_secs(handshake_timeout_seconds),
            max_retries,
            initial_backoff: Duration::from_millis(initial_retry_delay_ms),
            keepalive_interval,
            chunk_size,
            max_concurrent_uploads,
            strict_crypto,
            pool_capacity,
        })
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_u32(name: &str) -> Option<u32> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_usize(name: &str) -> Option<usize> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

fn env_bool(name: &str) -> Option<bool> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_with_no_overrides() {
        let endpoint = Endpoint::new("alice", "example.com", 22);
        let params = ConnectionParameters::resolve(
            endpoint,
            Credential::Password("secret".into()),
            ConnectionParametersOverrides::default(),
        )
        .unwrap();

        assert_eq!(
            params.handshake_timeout,
            Duration::from_secs(defaults::DEFAULT_TIMEOUT_SECONDS)
        );
        assert_eq!(params.max_retries, defaults::DEFAULT_MAX_RETRIES);
        assert_eq!(
            params.initial_backoff,
            Duration::from_millis(defaults::DEFAULT_INITIAL_RETRY_DELAY_MS)
        );
        assert_eq!(params.chunk_size, defaults::DEFAULT_CHUNK_SIZE);
        assert_eq!(
            params.max_concurrent_uploads,
            defaults::DEFAULT_MAX_CONCURRENT_UPLOADS
        );
        assert_eq!(params.strict_crypto, defaults::DEFAULT_STRICT_CRYPTO);
        assert_eq!(params.pool_capacity, defaults::DEFAULT_POOL_CAPACITY);
    }

    #[test]
    fn explicit_overrides_win() {
        let endpoint = Endpoint::new("alice", "example.com", 22);
        let overrides = ConnectionParametersOverrides {
            chunk_size: Some(4 * crate::util::size::MiB),
            max_concurrent_uploads: Some(4),
            ..Default::default()
        };
        let params = ConnectionParameters::resolve(
            endpoint,
            Credential::Agent,
            overrides,
        )
        .unwrap();
        assert_eq!(params.chunk_size, 4 * crate::util::size::MiB);
        assert_eq!(params.max_concurrent_uploads, 4);
    }

    #[test]
    fn rejects_zero_chunk_size() {
        let endpoint = Endpoint::new("alice", "example.com", 22);
        let overrides = ConnectionParametersOverrides {
            chunk_size: Some(0),
            ..Default::default()
        };
        let err = ConnectionParameters::resolve(endpoint, Credential::Agent, overrides)
            .unwrap_err();
        assert!(matches!(err, Error::Configuration { .. }));
    }

    #[test]
    fn loads_overrides_from_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overrides.json");
        std::fs::write(&path, r#"{"chunk_size": 1048576, "pool_capacity": 3}"#).unwrap();

        let overrides = ConnectionParametersOverrides::from_json_file(&path).unwrap();
        assert_eq!(overrides.chunk_size, Some(1_048_576));
        assert_eq!(overrides.pool_capacity, Some(3));
        assert_eq!(overrides.max_retries, None);
    }

    #[test]
    fn per_call_overrides_win_over_file_base() {
        let base = ConnectionParametersOverrides {
            chunk_size: Some(1_048_576),
            pool_capacity: Some(3),
            ..Default::default()
        };
        let per_call = ConnectionParametersOverrides {
            chunk_size: Some(2_097_152),
            ..Default::default()
        };
        let merged = base.merged_over(per_call);
        assert_eq!(merged.chunk_size, Some(2_097_152));
        assert_eq!(merged.pool_capacity, Some(3));
    }
}
