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

//! A pooled, backpressured SFTP virtual file-system adapter for embedding in
//! a host query engine: it presents remote SSH/SFTP files as a streamable
//! byte store behind connection pooling, chunked uploads, and a byte-range
//! read path.
//!
//! This crate never installs a global `tracing` subscriber and never owns
//! stdout/stderr — logging backend and credential resolution belong to the
//! embedding host.

pub mod address;
pub mod config;
pub mod defaults;
pub mod endpoint;
pub mod error;
pub mod facade;
pub mod pool;
pub mod read;
pub mod registry;
pub mod transport;
pub mod util;
pub mod write;

pub use address::{Address, Scheme};
pub use config::{ConnectionParameters, ConnectionParametersOverrides, Credential};
pub use endpoint::Endpoint;
pub use error::{Error, Result};
pub use facade::SftpFileSystem;
pub use read::ReadHandle;
pub use registry::TransportRegistry;
pub use transport::Transport;
pub use write::WriteHandle;
