// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Driver-facing side of a decoder session.
//!
//! [`DecodeBackend`] is the set of primitives a session needs from the
//! driver. It has two implementations, one per driver API shape:
//! [`buffer_api_v1::BufferApiV1`] and [`buffer_api_v2::BufferApiV2`].

pub mod buffer_api_v1;
pub mod buffer_api_v2;
#[cfg(test)]
pub mod dummy;

use std::fmt;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;
use std::sync::TryLockError;

use enumn::N;

use crate::BackendKind;

/// A numeric status code returned by the driver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DriverStatus(pub i32);

impl DriverStatus {
    /// The operation cannot complete yet and should be retried shortly.
    pub const E_PENDING: DriverStatus = DriverStatus(0x8000_000a_u32 as i32);
    /// Generic failure.
    pub const E_FAIL: DriverStatus = DriverStatus(0x8000_4005_u32 as i32);
    /// One of the arguments is not valid.
    pub const E_INVALIDARG: DriverStatus = DriverStatus(0x8007_0057_u32 as i32);

    /// Whether this is the transient "busy" status.
    pub fn is_pending(&self) -> bool {
        *self == Self::E_PENDING
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0 as u32)
    }
}

impl std::error::Error for DriverStatus {}

pub type DriverResult<T> = Result<T, DriverStatus>;

/// The kinds of decode buffers a frame is built from. The discriminants are
/// the values both driver APIs use on the wire.
#[derive(N, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BufferType {
    PictureParameters = 0,
    InverseQuantizationMatrix = 4,
    SliceControl = 5,
    Bitstream = 6,
}

impl BufferType {
    pub fn raw(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for BufferType {
    type Error = DriverStatus;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        BufferType::n(value).ok_or(DriverStatus::E_INVALIDARG)
    }
}

/// Describes one committed decode buffer. A frame is executed as an ordered
/// batch of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub buffer_type: BufferType,
    /// Number of payload bytes written into the driver buffer.
    pub data_size: u32,
    pub num_mbs_in_buffer: u32,
}

/// Mutual exclusion over a driver context shared between threads.
///
/// Cloning shares the same underlying mutex. The lock returned by
/// [`ContextLock::none`] never blocks and is used for drivers that serialize
/// access internally.
#[derive(Clone, Debug)]
pub struct ContextLock(Option<Arc<Mutex<()>>>);

impl ContextLock {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new_mutex() -> Self {
        Self(Some(Arc::new(Mutex::new(()))))
    }

    pub fn is_none(&self) -> bool {
        self.0.is_none()
    }

    /// Blocks until the context is available. Not reentrant: locking twice
    /// from the same thread deadlocks.
    pub fn lock(&self) -> ContextGuard<'_> {
        ContextGuard {
            _guard: self
                .0
                .as_ref()
                .map(|mutex| mutex.lock().unwrap_or_else(PoisonError::into_inner)),
        }
    }

    /// Returns `None` if another holder currently has the context.
    pub fn try_lock(&self) -> Option<ContextGuard<'_>> {
        match &self.0 {
            None => Some(ContextGuard { _guard: None }),
            Some(mutex) => match mutex.try_lock() {
                Ok(guard) => Some(ContextGuard {
                    _guard: Some(guard),
                }),
                Err(TryLockError::Poisoned(poisoned)) => Some(ContextGuard {
                    _guard: Some(poisoned.into_inner()),
                }),
                Err(TryLockError::WouldBlock) => None,
            },
        }
    }
}

/// Holds the context until dropped.
pub struct ContextGuard<'a> {
    _guard: Option<MutexGuard<'a, ()>>,
}

/// Driver primitives used to submit one frame.
///
/// Every method is called with the session's [`ContextLock`] held, except
/// [`DecodeBackend::context_lock`], [`DecodeBackend::kind`] and
/// [`DecodeBackend::surface_index`].
pub trait DecodeBackend {
    /// Opaque driver handle to an output surface.
    type Surface;

    fn kind(&self) -> BackendKind;

    /// The lock guarding the driver context, or [`ContextLock::none`] if the
    /// driver does not need one.
    fn context_lock(&self) -> ContextLock;

    /// Position of `surface` in the session's surface set, or `None` if it
    /// does not belong to it.
    fn surface_index(&self, surface: &Self::Surface) -> Option<u32>;

    /// Maps the driver buffer for `buffer_type`. Its length is the capacity
    /// the driver granted for this frame.
    fn get_buffer(&mut self, buffer_type: BufferType) -> DriverResult<&mut [u8]>;

    /// Returns the buffer mapped by `get_buffer` to the driver.
    fn release_buffer(&mut self, buffer_type: BufferType) -> DriverResult<()>;

    /// Starts decoding into `surface`. May return [`DriverStatus::E_PENDING`]
    /// while the hardware is busy.
    fn begin_frame(&mut self, surface: &Self::Surface) -> DriverResult<()>;

    /// Executes the committed buffers as one batch.
    fn submit_buffers(&mut self, buffers: &[BufferDescriptor]) -> DriverResult<()>;

    fn end_frame(&mut self) -> DriverResult<()>;
}
