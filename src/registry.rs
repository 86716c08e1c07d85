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

//! Process-wide Transport registry, keyed by endpoint.
//!
//! Grounded on the teacher's `global::GLOBAL_OPTS` pattern (a lazily
//! initialised, `parking_lot`-guarded process-wide singleton) generalised
//! from a single `Option<T>` slot to a keyed map of shared Transports.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::config::ConnectionParameters;
use crate::error::Result;
use crate::transport::Transport;

static REGISTRY: LazyLock<TransportRegistry> = LazyLock::new(TransportRegistry::new);

/// A process-wide associative container of live Transports.
pub struct TransportRegistry {
    transports: Mutex<HashMap<String, Arc<Transport>>>,
}

impl TransportRegistry {
    fn new() -> Self {
        Self {
            transports: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide singleton registry.
    pub fn global() -> &'static TransportRegistry {
        &REGISTRY
    }

    /// Looks up a live Transport for `params.endpoint`, validating it first;
    /// constructs and inserts a new one if absent or dead.
    ///
    /// Callers holding a reference past this call are unaffected by a later
    /// eviction — the `Arc` keeps the Transport alive as long as any
    /// reference survives.
    pub fn get_or_create(&self, params: ConnectionParameters) -> Result<Arc<Transport>> {
        let key = params.endpoint.key();

        {
            let transports = self.transports.lock();
            if let Some(transport) = transports.get(&key) {
                if transport.validate() {
                    debug!(%key, "reusing live transport");
                    return Ok(Arc::clone(transport));
                }
            }
        }

        // Connect without holding the registry lock: handshake/auth can take
        // up to `handshake_timeout`, and we don't want to block unrelated
        // endpoints' lookups for that long.
        info!(%key, "establishing new transport");
        let transport = Arc::new(Transport::connect(params)?);

        let mut transports = self.transports.lock();
        transports.insert(key, Arc::clone(&transport));
        Ok(transport)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.transports.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        // The process-wide registry may carry state from other tests in the
        // same binary; this only asserts the type is usable, not isolation.
        let _ = TransportRegistry::global().len();
    }
}
