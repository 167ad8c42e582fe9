// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Bounded retry of the driver's begin frame call.
//!
//! Drivers report [`DriverStatus::E_PENDING`] from begin frame while the
//! hardware is still busy with other work (often the display). The call is
//! retried a bounded number of times, releasing the context lock while
//! sleeping so other users of the context can make progress.

use std::thread;
use std::time::Duration;

use crate::backend::ContextGuard;
use crate::backend::ContextLock;
use crate::backend::DriverResult;
use crate::backend::DriverStatus;
use crate::decoder::DriverOp;
use crate::decoder::SubmitError;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 50;
pub const DEFAULT_BACKOFF: Duration = Duration::from_millis(2);

/// Where a begin frame sequence stands. The sequence starts in `Beginning`
/// with attempt 1, once the context lock has been taken.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BeginState {
    /// About to call begin frame for the `attempt`-th time, lock held.
    Beginning { attempt: u32 },
    /// The `attempt`-th call reported busy.
    Busy { attempt: u32 },
    /// Begin frame succeeded, lock held.
    Began { attempts: u32 },
    /// Begin frame failed with `status`, or kept reporting busy.
    Failed { attempts: u32, status: DriverStatus },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BeginFrameRetry {
    max_attempts: u32,
    backoff: Duration,
}

impl Default for BeginFrameRetry {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl BeginFrameRetry {
    /// `max_attempts` counts every call to begin frame, the first included.
    /// It is at least 1.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff,
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }

    /// The state following a call to begin frame that returned `result`.
    pub fn next_state(&self, attempt: u32, result: DriverResult<()>) -> BeginState {
        match result {
            Ok(()) => BeginState::Began { attempts: attempt },
            Err(status) if status.is_pending() && attempt < self.max_attempts => {
                BeginState::Busy { attempt }
            }
            Err(status) => BeginState::Failed {
                attempts: attempt,
                status,
            },
        }
    }

    /// Takes `lock` and calls `begin` until it succeeds. On success the lock
    /// is still held through the returned guard. On failure it has been
    /// released.
    pub fn run<'a, F>(
        &self,
        lock: &'a ContextLock,
        begin: F,
    ) -> Result<ContextGuard<'a>, SubmitError>
    where
        F: FnMut() -> DriverResult<()>,
    {
        self.run_with(lock, begin, thread::sleep)
    }

    /// Same as [`BeginFrameRetry::run`], using `sleep` to wait between
    /// attempts.
    pub fn run_with<'a, F, S>(
        &self,
        lock: &'a ContextLock,
        mut begin: F,
        mut sleep: S,
    ) -> Result<ContextGuard<'a>, SubmitError>
    where
        F: FnMut() -> DriverResult<()>,
        S: FnMut(Duration),
    {
        let mut guard = lock.lock();
        let mut state = BeginState::Beginning { attempt: 1 };

        loop {
            state = match state {
                BeginState::Beginning { attempt } => self.next_state(attempt, begin()),
                BeginState::Busy { attempt } => {
                    log::trace!("Decoder busy on attempt {}, retrying", attempt);
                    drop(guard);
                    sleep(self.backoff);
                    guard = lock.lock();
                    BeginState::Beginning {
                        attempt: attempt + 1,
                    }
                }
                BeginState::Began { attempts } => {
                    if attempts > 1 {
                        log::debug!("Began frame after {} attempts", attempts);
                    }
                    return Ok(guard);
                }
                BeginState::Failed { attempts, status } => {
                    drop(guard);
                    log::error!("Failed to begin frame: {}", status);

                    return Err(if status.is_pending() {
                        SubmitError::BeginFrameTimeout { attempts }
                    } else {
                        SubmitError::Driver {
                            op: DriverOp::BeginFrame,
                            status,
                        }
                    });
                }
            };
        }
    }
}
