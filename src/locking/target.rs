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

use crate::error::{LockError, Result};
use std::fmt;
use std::path::{Path, PathBuf};

/// Suffix appended to the protected path to name the lock artifact.
pub const LOCK_SUFFIX: &str = ".lock";

/// The resource protected by a lock: an absolute path plus the derived
/// `<path>.lock` artifact the filesystem backends operate on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockTarget {
    path: PathBuf,
    lock_path: PathBuf,
}

impl LockTarget {
    /// Builds a target for `path`, made absolute against the current directory.
    /// The protected path itself does not need to exist.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if path.as_os_str().is_empty() || path.file_name().is_none() {
            return Err(LockError::failed(
                path.display(),
                "lock target must name a file or directory",
            ));
        }

        let path = std::path::absolute(path)
            .map_err(|err| LockError::failed(path.display(), err))?;
        let lock_path = append_suffix(&path, LOCK_SUFFIX);
        Ok(Self { path, lock_path })
    }

    /// The protected path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The `<path>.lock` artifact.
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Key used by stores that index locks by path.
    pub fn key(&self) -> String {
        self.path.to_string_lossy().into_owned()
    }

    /// Human-readable label used for logging and error reporting.
    pub fn label(&self) -> String {
        self.path.display().to_string()
    }
}

impl fmt::Display for LockTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

pub(crate) fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut file_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    file_name.push(suffix);
    path.with_file_name(file_name)
}
