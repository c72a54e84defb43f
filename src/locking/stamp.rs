// Copyright 2025 dentsusoken
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Owner stamp written by the filesystem backends.
//!
//! The stamp is a small JSON document. The link backend stores it in the
//! file that becomes `<path>.lock`; the directory backend stores it inside
//! the `<path>.lock/` directory.

use crate::identity::Identity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OwnerStamp {
    pub host: String,
    pub pid: u32,
    pub thread: Option<u64>,
    pub acquired_at: DateTime<Utc>,
}

impl OwnerStamp {
    pub fn new(owner: &Identity) -> Self {
        Self {
            host: owner.host().to_string(),
            pid: owner.process_id(),
            thread: owner.thread_id(),
            acquired_at: Utc::now(),
        }
    }

    pub fn identity(&self) -> Identity {
        Identity::new(self.host.clone(), self.pid, self.thread)
    }

    pub fn encode(&self) -> io::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self).map_err(|err| io::Error::other(err.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> io::Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err.to_string()))
    }
}

/// Creates `path` exclusively and writes the stamp for `owner` into it.
pub(crate) fn write_new(path: &Path, owner: &Identity) -> io::Result<()> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    write_into(&mut file, owner)
}

fn write_into(file: &mut File, owner: &Identity) -> io::Result<()> {
    let payload = OwnerStamp::new(owner).encode()?;
    file.write_all(&payload)?;
    file.sync_all()?;
    Ok(())
}

/// Reads the stamp at `path`. `Ok(None)` when the file does not exist.
pub(crate) fn read(path: &Path) -> io::Result<Option<OwnerStamp>> {
    match fs::read(path) {
        Ok(bytes) => OwnerStamp::decode(&bytes).map(Some),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}
