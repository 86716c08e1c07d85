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

//! Parses the adapter's own address grammar:
//!
//! `scheme://[principal@]host[:port]path-separator path`
//!
//! Grounded on the teacher's hand-rolled `utils::url::Url` parser: this crate
//! only ever needs to understand its own three schemes, so a small dedicated
//! parser is kept rather than pulling in a general-purpose URL crate.

use crate::defaults::DEFAULT_PORT;
use crate::error::{Error, Result};

/// The three schemes this crate recognises. Parsing does not distinguish
/// between them beyond accepting all three; callers that care can match on
/// the variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    /// `ssh://` — the canonical ssh-like identifier.
    Ssh,
    /// `sftpfs://` — this crate's own filesystem-aliased identifier.
    Sftpfs,
    /// `sftp://` — the plain SFTP-protocol identifier.
    Sftp,
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Scheme::Ssh => "ssh",
            Scheme::Sftpfs => "sftpfs",
            Scheme::Sftp => "sftp",
        };
        write!(f, "{s}")
    }
}

impl Scheme {
    fn parse(s: &str) -> Option<Self> {
        match s {
            "ssh" => Some(Scheme::Ssh),
            "sftpfs" => Some(Scheme::Sftpfs),
            "sftp" => Some(Scheme::Sftp),
            _ => None,
        }
    }
}

/// A parsed address: everything needed to build an [`crate::endpoint::Endpoint`]
/// plus the residual remote path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    pub scheme: Scheme,
    pub principal: Option<String>,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl Address {
    /// Parses an address string. Returns `Error::AddressFormat` on anything
    /// that doesn't match the grammar.
    pub fn parse(s: &str) -> Result<Self> {
        let input = s.trim();

        let (scheme_str, rest) = input.split_once("://").ok_or_else(|| {
            Error::address_format(s, "missing 'scheme://' prefix")
        })?;

        let scheme = Scheme::parse(scheme_str).ok_or_else(|| {
            Error::address_format(
                s,
                format!(
                    "unrecognised scheme '{scheme_str}', expected one of ssh, sftpfs, sftp"
                ),
            )
        })?;

        if rest.is_empty() {
            return Err(Error::address_format(s, "missing host after scheme"));
        }

        // ':' is overloaded: it introduces a port ("host:22/path") and is
        // also one of the two path separators ("host:path"). Disambiguate
        // by checking whether the characters right after the first ':'
        // (before the next '/' or ':') form a non-empty run of digits — if
        // so, that colon is a port marker, not the path separator.
        let idx_slash = rest.find('/');
        let idx_colon = rest.find(':');

        let (authority, port, path) = match (idx_colon, idx_slash) {
            (Some(ci), slash) if slash.is_none_or(|si| ci < si) => {
                let after_colon = &rest[ci + 1..];
                let digit_len = after_colon
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .count();
                if digit_len > 0 {
                    let port_str = &after_colon[..digit_len];
                    let port: u16 = port_str.parse().map_err(|_| {
                        Error::address_format(s, format!("invalid port '{port_str}'"))
                    })?;
                    let after_port = &after_colon[digit_len..];
                    let path = match after_port.chars().next() {
                        None => String::new(),
                        Some('/') | Some(':') => after_port[1..].to_string(),
                        Some(other) => {
                            return Err(Error::address_format(
                                s,
                                format!("unexpected character '{other}' after port"),
                            ));
                        }
                    };
                    (&rest[..ci], Some(port), path)
                } else {
                    (&rest[..ci], None, rest[ci + 1..].to_string())
                }
            }
            (_, Some(si)) => (&rest[..si], None, rest[si + 1..].to_string()),
            (_, None) => (rest, None, String::new()),
        };

        if authority.is_empty() {
            return Err(Error::address_format(s, "missing host"));
        }

        let (principal, host) = match authority.split_once('@') {
            Some((principal, host)) => {
                if principal.is_empty() {
                    return Err(Error::address_format(s, "empty principal before '@'"));
                }
                (Some(principal.to_string()), host.to_string())
            }
            None => (None, authority.to_string()),
        };

        if host.is_empty() {
            return Err(Error::address_format(s, "empty host"));
        }

        let port = port.unwrap_or(DEFAULT_PORT);

        Ok(Address {
            scheme,
            principal,
            host,
            port,
            path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sftp_with_slash_path() {
        let a = Address::parse("sftp://alice@example.com:2222/data/file.parquet").unwrap();
        assert_eq!(a.scheme, Scheme::Sftp);
        assert_eq!(a.principal.as_deref(), Some("alice"));
        assert_eq!(a.host, "example.com");
        assert_eq!(a.port, 2222);
        assert_eq!(a.path, "data/file.parquet");
    }

    #[test]
    fn parses_ssh_with_colon_path() {
        let a = Address::parse("ssh://bob@host:dir/file.csv").unwrap();
        assert_eq!(a.scheme, Scheme::Ssh);
        assert_eq!(a.host, "host");
        assert_eq!(a.port, DEFAULT_PORT);
        assert_eq!(a.path, "dir/file.csv");
    }

    #[test]
    fn parses_sftpfs_scheme() {
        let a = Address::parse("sftpfs://user@host/abs/path").unwrap();
        assert_eq!(a.scheme, Scheme::Sftpfs);
        assert_eq!(a.path, "abs/path");
    }

    #[test]
    fn missing_principal_is_allowed_by_the_parser() {
        let a = Address::parse("sftp://host:22/path").unwrap();
        assert_eq!(a.principal, None);
        assert_eq!(a.port, 22);
        assert_eq!(a.path, "path");
    }

    #[test]
    fn port_colon_and_slash_path_disambiguated_from_colon_path() {
        // Digits right after ':' make it a port marker, not the colon-path
        // separator, even though both share the same character.
        let a = Address::parse("sftp://user@host:2222/data").unwrap();
        assert_eq!(a.port, 2222);
        assert_eq!(a.path, "data");

        // No digits after ':' -> it's the colon-path separator itself, and
        // the port stays at its default.
        let a = Address::parse("sftp://user@host:notaport/tail").unwrap();
        assert_eq!(a.port, DEFAULT_PORT);
        assert_eq!(a.path, "notaport/tail");
    }

    #[test]
    fn default_port_when_absent() {
        let a = Address::parse("sftp://user@host/path").unwrap();
        assert_eq!(a.port, DEFAULT_PORT);
    }

    #[test]
    fn rejects_unknown_scheme() {
        let err = Address::parse("ftp://user@host/path").unwrap_err();
        assert!(matches!(err, Error::AddressFormat { .. }));
    }

    #[test]
    fn rejects_missing_scheme_separator() {
        let err = Address::parse("not-a-url").unwrap_err();
        assert!(matches!(err, Error::AddressFormat { .. }));
    }

    #[test]
    fn rejects_invalid_port() {
        let err = Address::parse("sftp://user@host:22x/path").unwrap_err();
        assert!(matches!(err, Error::AddressFormat { .. }));
    }

    #[test]
    fn rejects_empty_host() {
        let err = Address::parse("sftp://user@:22/path").unwrap_err();
        assert!(matches!(err, Error::AddressFormat { .. }));
    }

    #[test]
    fn no_path_defaults_to_empty() {
        let a = Address::parse("sftp://user@host").unwrap();
        assert_eq!(a.path, "");
    }
}
