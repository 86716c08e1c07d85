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

//! Default values for [`crate::config::ConnectionParameters`].
//!
//! Grounded on the teacher's `global::defaults` module: a flat list of named
//! constants consumed by the config layer rather than scattered literals.

use crate::util::size;

pub const DEFAULT_TIMEOUT_SECONDS: u64 = 300;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
pub const DEFAULT_INITIAL_RETRY_DELAY_MS: u64 = 1000;
pub const DEFAULT_KEEPALIVE_INTERVAL: u32 = 60;
pub const DEFAULT_CHUNK_SIZE: u64 = 50 * size::MiB;
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: usize = 2;
pub const DEFAULT_STRICT_CRYPTO: bool = false;
pub const DEFAULT_POOL_CAPACITY: usize = 1;

/// Inner-loop read chunk size for the SFTP read path.
pub const READ_INNER_CHUNK_SIZE: usize = 32 * size::KiB as usize;

pub const DEFAULT_PORT: u16 = 22;
