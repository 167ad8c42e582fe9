// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

pub mod retry;
pub mod session;

use std::fmt;

use thiserror::Error;

use crate::backend::BufferType;
use crate::backend::DriverStatus;
use crate::BackendKind;
use crate::PixelFormat;

/// The driver call that produced a [`SubmitError::Driver`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DriverOp {
    GetBuffer(BufferType),
    ReleaseBuffer(BufferType),
    BeginFrame,
    Execute,
    EndFrame,
}

impl fmt::Display for DriverOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverOp::GetBuffer(t) => write!(f, "getting a {:?} buffer", t),
            DriverOp::ReleaseBuffer(t) => write!(f, "releasing the {:?} buffer", t),
            DriverOp::BeginFrame => write!(f, "begin frame"),
            DriverOp::Execute => write!(f, "execute"),
            DriverOp::EndFrame => write!(f, "end frame"),
        }
    }
}

/// Why a frame submission failed. A failed submission never produces a
/// decoded frame.
#[derive(Debug, Error)]
pub enum SubmitError {
    #[error("decoder still busy after {attempts} begin frame attempts")]
    BeginFrameTimeout { attempts: u32 },
    #[error("{buffer_type:?} buffer too small: {size} bytes for a capacity of {capacity}")]
    BufferTooSmall {
        buffer_type: BufferType,
        size: usize,
        capacity: usize,
    },
    #[error("driver error while {op}: {status}")]
    Driver { op: DriverOp, status: DriverStatus },
    #[error("bitstream assembly failed: {0:#}")]
    Assembler(#[from] anyhow::Error),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no hardware backend handles pixel format {0:?}")]
    UnsupportedFormat(PixelFormat),
    #[error("pixel format {format:?} requires a {expected:?} backend, got {actual:?}")]
    BackendMismatch {
        format: PixelFormat,
        expected: BackendKind,
        actual: BackendKind,
    },
    #[error("surface does not belong to this session")]
    UnknownSurface,
}
