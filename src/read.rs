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

//! Byte-range read path: a position cursor over an SFTP pool session, with
//! an optional server-side command fast path.

use std::io::{Read as _, Seek as _, SeekFrom};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ssh2::OpenFlags;
use tracing::{debug, warn};

use crate::defaults::READ_INNER_CHUNK_SIZE;
use crate::error::{Error, Result};
use crate::transport::Transport;

/// A read-opened remote file handle.
pub struct ReadHandle {
    transport: Arc<Transport>,
    path: String,
    cursor: AtomicU64,
}

impl ReadHandle {
    pub fn open(transport: Arc<Transport>, path: impl Into<String>) -> Self {
        Self {
            transport,
            path: path.into(),
            cursor: AtomicU64::new(0),
        }
    }

    /// Moves the cursor to an absolute byte offset. The facade's
    /// positional read first seeks the cursor here before reading.
    pub fn seek(&self, offset: u64) {
        self.cursor.store(offset, Ordering::Release);
    }

    pub fn position(&self) -> u64 {
        self.cursor.load(Ordering::Acquire)
    }

    /// Reads up to `buf.len()` bytes at the current cursor, advancing it by
    /// the number of bytes actually read. Returns `0` only at EOF; loops
    /// internally until `buf` is full or EOF.
    pub fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let start = self.cursor.load(Ordering::Acquire);
        let n = buf.len();
        if n == 0 {
            return Ok(0);
        }

        let read = if self.transport.supports_commands() && !self.transport.commands_disabled() {
            match self.read_fast_path(start, buf) {
                Ok(read) => read,
                Err(_) => {
                    warn!(path = %self.path, "command fast path failed, disabling for transport");
                    self.transport.disable_commands();
                    self.read_sftp_path(start, buf)?
                }
            }
        } else {
            self.read_sftp_path(start, buf)?
        };

        self.cursor.fetch_add(read as u64, Ordering::AcqRel);
        Ok(read)
    }

    /// Borrows a pooled SFTP session, opens the file read-only, seeks to
    /// `offset`, and reads in 32 KiB inner chunks until `buf` is full or EOF.
    fn read_sftp_path(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        self.transport.with_read_lock(|| {
            let guard = self.transport.borrow_sftp()?;
            let mut file = guard
                .sftp()
                .open_mode(
                    std::path::Path::new(&self.path),
                    OpenFlags::READ,
                    0,
                    ssh2::OpenType::File,
                )
                .map_err(|source| Error::RemoteIo {
                    endpoint: self.transport.endpoint().clone(),
                    path: self.path.clone(),
                    source,
                })?;

            file.seek(SeekFrom::Start(offset))
                .map_err(|source| Error::Network {
                    endpoint: self.transport.endpoint().clone(),
                    source,
                })?;

            let mut total = 0usize;
            while total < buf.len() {
                let want = (buf.len() - total).min(READ_INNER_CHUNK_SIZE);
                let got = file
                    .read(&mut buf[total..total + want])
                    .map_err(|source| Error::Network {
                        endpoint: self.transport.endpoint().clone(),
                        source,
                    })?;
                if got == 0 {
                    break;
                }
                total += got;
            }
            Ok(total)
        })
    }

    /// Executes a server-side byte-extraction command and returns its
    /// stdout, which must be no longer than `buf.len()` bytes.
    fn read_fast_path(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let cmd = format!(
            "dd if={} iflag=skip_bytes,count_bytes skip={} count={} status=none 2>/dev/null",
            shell_quote(&self.path),
            offset,
            buf.len()
        );
        let out = self.transport.execute_command(&cmd)?;
        let n = out.len().min(buf.len());
        buf[..n].copy_from_slice(&out[..n]);
        debug!(path = %self.path, offset, bytes = n, "fast-path read");
        Ok(n)
    }
}

fn shell_quote(path: &str) -> String {
    format!("'{}'", path.replace('\'', r"'\''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_quote_escapes_single_quotes() {
        assert_eq!(shell_quote("a'b"), "'a'\\''b'");
        assert_eq!(shell_quote("plain/path.txt"), "'plain/path.txt'");
    }
}
