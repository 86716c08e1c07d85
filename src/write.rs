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

//! Streaming write pipeline: chunked accumulation, bounded concurrent
//! dispatch, and in-place sequential-append assembly on the server.
//!
//! Grounded on the teacher's `repository::pack_saver::PackSaver`: a
//! `crossbeam_channel` feeding `rayon::spawn` workers. Generalised from one
//! fixed worker to *W* long-lived workers draining a rendezvous
//! (zero-capacity) channel — with zero buffering, `Sender::send` itself
//! blocks until one of the *W* workers is free to receive, which is exactly
//! the "at most *W* uploads in flight" backpressure contract without a
//! separate counter and condition variable.

use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};

use crossbeam_channel::Sender;
use ssh2::{OpenFlags, OpenType, Sftp};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::transport::Transport;

struct OrderingState {
    next_expected: u64,
}

/// State shared between the handle and its *W* worker threads.
struct Shared {
    transport: Arc<Transport>,
    path: String,
    ordering: (Mutex<OrderingState>, Condvar),
    pending: (Mutex<u64>, Condvar),
    bytes_uploaded: AtomicU64,
    first_error: Mutex<Option<(u64, Arc<Error>)>>,
    has_error: AtomicBool,
}

/// A write-opened remote file handle.
pub struct WriteHandle {
    shared: Arc<Shared>,
    chunk_size: u64,
    buffer: Mutex<Vec<u8>>,
    next_part_index: AtomicU64,
    parts_dispatched: AtomicU64,
    tx: Sender<(u64, Vec<u8>)>,
}

impl WriteHandle {
    pub fn open(transport: Arc<Transport>, path: impl Into<String>) -> Arc<Self> {
        let chunk_size = transport.params().chunk_size;
        let max_concurrent_uploads = transport.params().max_concurrent_uploads;

        let shared = Arc::new(Shared {
            transport,
            path: path.into(),
            ordering: (Mutex::new(OrderingState { next_expected: 0 }), Condvar::new()),
            pending: (Mutex::new(0), Condvar::new()),
            bytes_uploaded: AtomicU64::new(0),
            first_error: Mutex::new(None),
            has_error: AtomicBool::new(false),
        });

        let (tx, rx) = crossbeam_channel::bounded::<(u64, Vec<u8>)>(0);
        for _ in 0..max_concurrent_uploads {
            let rx = rx.clone();
            let shared = Arc::clone(&shared);
            rayon::spawn(move || {
                while let Ok((part_index, data)) = rx.recv() {
                    run_upload(&shared, part_index, &data);
                }
            });
        }

        Arc::new(Self {
            shared,
            chunk_size,
            buffer: Mutex::new(Vec::with_capacity(chunk_size as usize)),
            next_part_index: AtomicU64::new(0),
            parts_dispatched: AtomicU64::new(0),
            tx,
        })
    }

    /// Appends `bytes` into the accumulating buffer, sealing and dispatching
    /// it whenever it reaches `chunk_size`.
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.check_error()?;

        let mut buffer = self.buffer.lock().unwrap();
        buffer.extend_from_slice(bytes);
        while buffer.len() as u64 >= self.chunk_size {
            let sealed: Vec<u8> = buffer.drain(..self.chunk_size as usize).collect();
            self.dispatch(sealed);
        }
        drop(buffer);

        self.check_error()
    }

    /// Dispatches the accumulating buffer even if short of `chunk_size`.
    pub fn flush(&self) -> Result<()> {
        self.check_error()?;
        let mut buffer = self.buffer.lock().unwrap();
        if !buffer.is_empty() {
            let sealed = std::mem::take(&mut *buffer);
            drop(buffer);
            self.dispatch(sealed);
        }
        self.check_error()
    }

    /// Flushes, waits for every dispatched uploader to finish, then raises
    /// any captured first error. Guarantees a (possibly empty) file exists
    /// even if nothing was ever written.
    pub fn close(&self) -> Result<()> {
        if self.parts_dispatched.load(Ordering::Acquire) == 0 {
            let mut buffer = self.buffer.lock().unwrap();
            let sealed = std::mem::take(&mut *buffer);
            drop(buffer);
            self.dispatch(sealed);
        } else {
            self.flush()?;
        }

        let (lock, cvar) = &self.shared.pending;
        let mut count = lock.lock().unwrap();
        while *count > 0 {
            count = cvar.wait(count).unwrap();
        }
        drop(count);

        self.check_error()
    }

    /// `bytes_uploaded + |current accumulating buffer|`.
    pub fn progress(&self) -> u64 {
        let pending = self.buffer.lock().unwrap().len() as u64;
        self.shared.bytes_uploaded.load(Ordering::Acquire) + pending
    }

    fn check_error(&self) -> Result<()> {
        if self.shared.has_error.load(Ordering::Acquire) {
            let guard = self.shared.first_error.lock().unwrap();
            if let Some((part_index, source)) = guard.as_ref() {
                return Err(Error::UploadAggregated {
                    path: self.shared.path.clone(),
                    part_index: *part_index,
                    source: Arc::clone(source),
                });
            }
        }
        Ok(())
    }

    fn dispatch(&self, data: Vec<u8>) {
        let part_index = self.next_part_index.fetch_add(1, Ordering::AcqRel);
        self.parts_dispatched.fetch_add(1, Ordering::AcqRel);

        {
            let (lock, _cvar) = &self.shared.pending;
            *lock.lock().unwrap() += 1;
        }

        // A zero-capacity channel: this blocks until one of the W workers
        // is free to receive, which is the backpressure mechanism itself.
        if self.tx.send((part_index, data)).is_err() {
            let mut guard = self.shared.first_error.lock().unwrap();
            if guard.is_none() {
                *guard = Some((
                    part_index,
                    Arc::new(Error::NotConnected {
                        endpoint: self.shared.transport.endpoint().clone(),
                    }),
                ));
            }
            self.shared.has_error.store(true, Ordering::Release);
            let (lock, cvar) = &self.shared.pending;
            *lock.lock().unwrap() -= 1;
            cvar.notify_all();
        }
    }
}

fn run_upload(shared: &Shared, part_index: u64, data: &[u8]) {
    wait_for_turn(&shared.ordering, part_index);

    let result = shared
        .transport
        .with_upload_lock(|| upload_chunk(&shared.transport, &shared.path, part_index, data));

    advance_turn(&shared.ordering, part_index);

    match result {
        Ok(()) => {
            shared
                .bytes_uploaded
                .fetch_add(data.len() as u64, Ordering::AcqRel);
            debug!(part_index, bytes = data.len(), "chunk uploaded");
        }
        Err(err) => {
            warn!(part_index, error = %err, "chunk upload failed");
            let mut guard = shared.first_error.lock().unwrap();
            if guard.is_none() {
                error!(part_index, error = %err, "write pipeline recorded first error");
                *guard = Some((part_index, Arc::new(err)));
            }
            shared.has_error.store(true, Ordering::Release);
        }
    }

    let (lock, cvar) = &shared.pending;
    let mut count = lock.lock().unwrap();
    *count -= 1;
    drop(count);
    cvar.notify_all();
}

fn wait_for_turn(ordering: &(Mutex<OrderingState>, Condvar), part_index: u64) {
    let (lock, cvar) = ordering;
    let mut state = lock.lock().unwrap();
    while state.next_expected != part_index {
        state = cvar.wait(state).unwrap();
    }
}

fn advance_turn(ordering: &(Mutex<OrderingState>, Condvar), part_index: u64) {
    let (lock, cvar) = ordering;
    let mut state = lock.lock().unwrap();
    state.next_expected = part_index + 1;
    drop(state);
    cvar.notify_all();
}

fn upload_chunk(transport: &Transport, path: &str, part_index: u64, data: &[u8]) -> Result<()> {
    let guard = transport.borrow_sftp()?;
    let sftp = guard.sftp();

    ensure_parent_dirs(sftp, transport.endpoint(), path)?;

    let flags = if part_index == 0 {
        OpenFlags::WRITE | OpenFlags::CREATE | OpenFlags::TRUNCATE
    } else {
        OpenFlags::WRITE | OpenFlags::APPEND | OpenFlags::CREATE
    };

    let mut file = sftp
        .open_mode(Path::new(path), flags, 0o644, OpenType::File)
        .map_err(|source| Error::RemoteIo {
            endpoint: transport.endpoint().clone(),
            path: path.to_string(),
            source,
        })?;

    use std::io::Write;
    if !data.is_empty() {
        let written = file.write(data).map_err(|source| Error::Network {
            endpoint: transport.endpoint().clone(),
            source,
        })?;
        if written == 0 {
            return Err(Error::StalledWrite {
                endpoint: transport.endpoint().clone(),
                path: path.to_string(),
            });
        }
        if written < data.len() {
            file.write_all(&data[written..])
                .map_err(|source| Error::Network {
                    endpoint: transport.endpoint().clone(),
                    source,
                })?;
        }
    }

    Ok(())
}

/// Creates every missing parent directory of `path`, ignoring "already
/// exists" and propagating anything else.
fn ensure_parent_dirs(sftp: &Sftp, endpoint: &crate::endpoint::Endpoint, path: &str) -> Result<()> {
    let parent = match Path::new(path).parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => return Ok(()),
    };

    let mut accumulated = std::path::PathBuf::new();
    for component in parent.components() {
        accumulated.push(component);
        match sftp.mkdir(&accumulated, 0o755) {
            Ok(()) => {}
            Err(_) if sftp.stat(&accumulated).is_ok() => {}
            Err(source) => {
                return Err(Error::RemoteIo {
                    endpoint: endpoint.clone(),
                    path: accumulated.display().to_string(),
                    source,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_state_starts_at_zero() {
        let ordering = (Mutex::new(OrderingState { next_expected: 0 }), Condvar::new());
        assert_eq!(ordering.0.lock().unwrap().next_expected, 0);
    }
}
