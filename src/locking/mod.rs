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

pub mod acquisition;
pub mod backend;
pub mod handle;
pub mod scoped_guard;
pub mod stamp;
pub mod target;
pub mod timeout;
pub mod wait_observer;

pub use acquisition::{LockAcquisitionRequest, LockTimeoutBudget, PollingBackoff};
pub use backend::{
    BackendKind, Claim, DirectoryBackend, LinkBackend, LockBackend, RecordStoreBackend,
    open_backend,
};
pub use handle::LockHandle;
pub use scoped_guard::LockGuard;
pub use stamp::OwnerStamp;
pub use target::LockTarget;
pub use timeout::{
    LockTimeoutResolution, LockTimeoutResolver, LockTimeoutSource, LockTimeoutValue,
    parse_timeout_override,
};
pub use wait_observer::{LockWaitObserver, LoggingWaitObserver, NoopLockWaitObserver};
