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

//! Typed error taxonomy for the adapter.
//!
//! Every variant carries enough context (endpoint, remote path, underlying
//! status) for a caller to decide whether to retry above this crate and to
//! render an actionable message.

use std::io;
use std::sync::Arc;

use crate::endpoint::Endpoint;

/// The crate-wide result alias.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("malformed address '{address}': {reason}")]
    AddressFormat { address: String, reason: String },

    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    #[error("could not resolve host '{host}': {source}")]
    Dns { host: String, source: io::Error },

    #[error("network error connecting to {endpoint}: {source}")]
    Network {
        endpoint: Endpoint,
        source: io::Error,
    },

    #[error("SSH handshake with {endpoint} failed: {source} (review peer algorithm offer)")]
    Handshake {
        endpoint: Endpoint,
        source: ssh2::Error,
    },

    #[error("authentication to {endpoint} failed: {reason}")]
    Authentication { endpoint: Endpoint, reason: String },

    #[error("resource exhausted on {endpoint}: {reason}")]
    ResourceExhaustion { endpoint: Endpoint, reason: String },

    #[error("remote I/O error on {endpoint} at '{path}': {source}")]
    RemoteIo {
        endpoint: Endpoint,
        path: String,
        source: ssh2::Error,
    },

    #[error("command execution on {endpoint} failed (exit status {exit_status}): {command}")]
    CommandExecution {
        endpoint: Endpoint,
        command: String,
        exit_status: i32,
    },

    #[error("stalled write to '{path}' on {endpoint}: zero bytes accepted")]
    StalledWrite { endpoint: Endpoint, path: String },

    #[error("upload of '{path}' failed at part {part_index}: {source}")]
    UploadAggregated {
        path: String,
        part_index: u64,
        #[source]
        source: Arc<Error>,
    },

    #[error("transport for {endpoint} is not connected")]
    NotConnected { endpoint: Endpoint },
}

impl Error {
    pub fn address_format(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::AddressFormat {
            address: address.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Error::Configuration {
            reason: reason.into(),
        }
    }

    /// Whether a connect-time failure of this kind is worth retrying.
    ///
    /// Used only by the internal connect-retry loop; it is not part of the
    /// public contract and callers should not match on it to decide their
    /// own retry policy. Authentication and configuration failures are
    /// never retried since another attempt cannot change their outcome.
    pub(crate) fn is_retryable_connect_failure(&self) -> bool {
        matches!(
            self,
            Error::Dns { .. } | Error::Network { .. } | Error::Handshake { .. }
        )
    }
}
