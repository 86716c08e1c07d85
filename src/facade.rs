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

//! File-system facade: maps the embedding engine's file operations onto
//! address parsing, the Transport registry, and the read/write paths.

use std::path::Path;
use std::sync::Arc;

use ssh2::{FileStat, RenameFlags};

use crate::address::Address;
use crate::config::{ConnectionParameters, ConnectionParametersOverrides, Credential};
use crate::endpoint::Endpoint;
use crate::error::{Error, Result};
use crate::read::ReadHandle;
use crate::registry::TransportRegistry;
use crate::transport::Transport;
use crate::write::WriteHandle;

/// Entry point the embedding engine talks to. Stateless beyond the
/// credential and configuration overrides every address resolves against;
/// all actual connection state lives in the process-wide
/// [`TransportRegistry`].
pub struct SftpFileSystem {
    credential: Credential,
    overrides: ConnectionParametersOverrides,
}

impl SftpFileSystem {
    pub fn new(credential: Credential, overrides: ConnectionParametersOverrides) -> Self {
        Self {
            credential,
            overrides,
        }
    }

    fn transport_for(&self, address: &Address) -> Result<Arc<Transport>> {
        let principal = address.principal.clone().ok_or_else(|| {
            Error::configuration(format!(
                "address '{}' has no principal and none was configured",
                address.host
            ))
        })?;
        let endpoint = Endpoint::new(principal, address.host.clone(), address.port);
        let params = ConnectionParameters::resolve(
            endpoint,
            self.credential.clone(),
            self.overrides.clone(),
        )?;
        TransportRegistry::global().get_or_create(params)
    }

    fn stat(&self, address: &str) -> Result<FileStat> {
        let addr = Address::parse(address)?;
        let transport = self.transport_for(&addr)?;
        transport.with_read_lock(|| {
            let guard = transport.borrow_sftp()?;
            guard
                .sftp()
                .stat(Path::new(&addr.path))
                .map_err(|source| Error::RemoteIo {
                    endpoint: transport.endpoint().clone(),
                    path: addr.path.clone(),
                    source,
                })
        })
    }

    /// Opens `address` for streaming/positional reads.
    pub fn open_read(&self, address: &str) -> Result<ReadHandle> {
        let addr = Address::parse(address)?;
        let transport = self.transport_for(&addr)?;
        Ok(ReadHandle::open(transport, addr.path))
    }

    /// Opens `address` for streaming/positional writes.
    pub fn open_write(&self, address: &str) -> Result<Arc<WriteHandle>> {
        let addr = Address::parse(address)?;
        let transport = self.transport_for(&addr)?;
        Ok(WriteHandle::open(transport, addr.path))
    }

    /// True iff a stat succeeds; any error classifies as "does not exist"
    /// at this layer.
    pub fn file_exists(&self, address: &str) -> bool {
        self.stat(address).is_ok()
    }

    /// Additionally verifies the permission bits indicate a directory.
    pub fn directory_exists(&self, address: &str) -> bool {
        matches!(self.stat(address), Ok(stat) if stat.is_dir())
    }

    pub fn file_size(&self, address: &str) -> Result<u64> {
        self.stat(address).map(|stat| stat.size.unwrap_or(0))
    }

    pub fn last_modified(&self, address: &str) -> Result<chrono::DateTime<chrono::Utc>> {
        let stat = self.stat(address)?;
        let mtime = stat.mtime.unwrap_or(0);
        chrono::DateTime::from_timestamp(mtime as i64, 0).ok_or_else(|| {
            Error::configuration(format!("implausible mtime {mtime} for '{address}'"))
        })
    }

    /// Always uses SFTP primitives, never command execution, to eliminate
    /// remote-command injection surface.
    pub fn create_directory(&self, address: &str) -> Result<()> {
        let addr = Address::parse(address)?;
        let transport = self.transport_for(&addr)?;
        transport.with_read_lock(|| {
            let guard = transport.borrow_sftp()?;
            match guard.sftp().mkdir(Path::new(&addr.path), 0o755) {
                Ok(()) => Ok(()),
                Err(_) if guard.sftp().stat(Path::new(&addr.path)).is_ok() => Ok(()),
                Err(source) => Err(Error::RemoteIo {
                    endpoint: transport.endpoint().clone(),
                    path: addr.path.clone(),
                    source,
                }),
            }
        })
    }

    pub fn remove_directory(&self, address: &str) -> Result<()> {
        let addr = Address::parse(address)?;
        let transport = self.transport_for(&addr)?;
        transport.with_read_lock(|| {
            let guard = transport.borrow_sftp()?;
            guard
                .sftp()
                .rmdir(Path::new(&addr.path))
                .map_err(|source| Error::RemoteIo {
                    endpoint: transport.endpoint().clone(),
                    path: addr.path.clone(),
                    source,
                })
        })
    }

    pub fn remove(&self, address: &str) -> Result<()> {
        let addr = Address::parse(address)?;
        let transport = self.transport_for(&addr)?;
        transport.with_read_lock(|| {
            let guard = transport.borrow_sftp()?;
            guard
                .sftp()
                .unlink(Path::new(&addr.path))
                .map_err(|source| Error::RemoteIo {
                    endpoint: transport.endpoint().clone(),
                    path: addr.path.clone(),
                    source,
                })
        })
    }

    /// Uses atomic-overwrite semantics where supported.
    pub fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from_addr = Address::parse(from)?;
        let to_addr = Address::parse(to)?;
        let transport = self.transport_for(&from_addr)?;
        transport.with_read_lock(|| {
            let guard = transport.borrow_sftp()?;
            guard
                .sftp()
                .rename(
                    Path::new(&from_addr.path),
                    Path::new(&to_addr.path),
                    Some(RenameFlags::all()),
                )
                .map_err(|source| Error::RemoteIo {
                    endpoint: transport.endpoint().clone(),
                    path: from_addr.path.clone(),
                    source,
                })
        })
    }

    /// Uses the SFTP `setstat` primitive, not command execution.
    pub fn truncate(&self, address: &str, size: u64) -> Result<()> {
        let addr = Address::parse(address)?;
        let transport = self.transport_for(&addr)?;
        transport.with_read_lock(|| {
            let guard = transport.borrow_sftp()?;
            let stat = FileStat {
                size: Some(size),
                uid: None,
                gid: None,
                perm: None,
                atime: None,
                mtime: None,
            };
            guard
                .sftp()
                .setstat(Path::new(&addr.path), stat)
                .map_err(|source| Error::RemoteIo {
                    endpoint: transport.endpoint().clone(),
                    path: addr.path.clone(),
                    source,
                })
        })
    }

    /// Trivial glob: only literal-match lookups are supported, since this
    /// crate does not implement full glob-pattern matching.
    pub fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        if self.file_exists(pattern) {
            Ok(vec![pattern.to_string()])
        } else {
            Ok(Vec::new())
        }
    }

    /// Always false: nothing is cached locally.
    pub fn on_disk(&self) -> bool {
        false
    }

    /// Always true: both paths support positional access.
    pub fn can_seek(&self) -> bool {
        true
    }
}
