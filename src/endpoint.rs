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

//! `Endpoint` is the pooling identity for a [`crate::transport::Transport`].

use std::fmt;

/// A `(hostname, port, principal)` triple. Immutable once a Transport is built from it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub principal: String,
    pub hostname: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(principal: impl Into<String>, hostname: impl Into<String>, port: u16) -> Self {
        Self {
            principal: principal.into(),
            hostname: hostname.into(),
            port,
        }
    }

    /// Registry key: `"{principal}@{hostname}:{port}"`.
    pub fn key(&self) -> String {
        format!("{}@{}:{}", self.principal, self.hostname, self.port)
    }

    /// Crude heuristic for hosts known to reject arbitrary command execution
    /// (e.g. constrained storage-box products). Hostname-based pre-disabling
    /// is an optional optimisation, never load-bearing — detection-driven
    /// disabling always takes precedence once observed.
    pub fn looks_like_constrained_storage_box(&self) -> bool {
        const MARKERS: [&str; 2] = [".storagebox.", ".your-storagebox."];
        let host = self.hostname.to_ascii_lowercase();
        MARKERS.iter().any(|m| host.contains(m))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.principal, self.hostname, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_format() {
        let e = Endpoint::new("alice", "example.com", 22);
        assert_eq!(e.key(), "alice@example.com:22");
        assert_eq!(e.to_string(), "alice@example.com:22");
    }

    #[test]
    fn storage_box_heuristic() {
        let e = Endpoint::new("u1", "u123.your-storagebox.de", 23);
        assert!(e.looks_like_constrained_storage_box());

        let e = Endpoint::new("alice", "example.com", 22);
        assert!(!e.looks_like_constrained_storage_box());
    }
}
