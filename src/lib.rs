// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Frame submission for hardware-accelerated decoder sessions.
//!
//! A codec implementation parses a coded frame into picture parameters, an
//! optional inverse quantization matrix and bitstream/slice-control data,
//! then hands them to a [`decoder::session::Session`]. The session drives the
//! driver through begin frame, buffer commits, execute and end frame, on top
//! of one of two driver API shapes (see [`backend::buffer_api_v1`] and
//! [`backend::buffer_api_v2`]).

pub mod backend;
pub mod decoder;

use decoder::SessionError;

/// Output pixel formats a decoder session can be created for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    /// Hardware surfaces allocated from a fixed, driver-enumerated table.
    BufferApiV1Vld,
    /// Hardware surfaces exposed as slices of a texture array.
    BufferApiV2Vld,
    /// Software NV12, no hardware backend.
    Nv12,
    /// Software P010, no hardware backend.
    P010,
}

/// The driver API shape backing a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    BufferApiV1,
    BufferApiV2,
}

impl BackendKind {
    /// Whether sessions of this kind must serialize access to the driver
    /// context themselves.
    pub fn uses_context_lock(&self) -> bool {
        matches!(self, BackendKind::BufferApiV2)
    }
}

/// Maps `format` to the backend that must serve it.
pub fn select_backend(format: PixelFormat) -> Result<BackendKind, SessionError> {
    match format {
        PixelFormat::BufferApiV1Vld => Ok(BackendKind::BufferApiV1),
        PixelFormat::BufferApiV2Vld => Ok(BackendKind::BufferApiV2),
        other => Err(SessionError::UnsupportedFormat(other)),
    }
}
