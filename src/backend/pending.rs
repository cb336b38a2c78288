// Copyright 2026 Daniel Pelikan
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

//! Fire-and-forget request/continuation bookkeeping.
//!
//! Every asynchronous IPC call the backend makes is dispatched here as a
//! future resolving to a tagged outcome. The backend polls the set from its
//! event loop; each outcome is delivered exactly once and its entry removed,
//! whether the reply was success or error. Entries still in flight when the
//! set is cleared or dropped are force-released: their continuation never
//! runs.

use futures::future::BoxFuture;
use futures::stream::FuturesUnordered;
use futures::{FutureExt, StreamExt};
use std::future::Future;

/// An owned set of in-flight requests, each resolving to a `T`.
pub struct Pending<T> {
    inflight: FuturesUnordered<BoxFuture<'static, T>>,
}

impl<T> Pending<T> {
    pub fn new() -> Self {
        Self {
            inflight: FuturesUnordered::new(),
        }
    }

    /// Record a request. The future runs only while the set is polled.
    pub fn dispatch<F>(&mut self, request: F)
    where
        F: Future<Output = T> + Send + 'static,
    {
        self.inflight.push(request.boxed());
    }

    /// Wait for the next completion. Returns `None` when nothing is in
    /// flight; callers guard with [`Pending::is_empty`] in `select!` arms.
    pub async fn next(&mut self) -> Option<T> {
        self.inflight.next().await
    }

    /// Force-release everything still in flight without invoking any
    /// continuation. Shutdown path only.
    pub fn clear(&mut self) {
        self.inflight = FuturesUnordered::new();
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }
}

impl<T> Default for Pending<T> {
    fn default() -> Self {
        Self::new()
    }
}
