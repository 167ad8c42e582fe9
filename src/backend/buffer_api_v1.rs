// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Backend for drivers exposing a decoder device with a fixed surface table.
//!
//! These drivers serialize calls internally, so the session never takes a
//! context lock. Output surfaces are enumerated once when the decoder is
//! created and identified by their position in that table.

use crate::backend::BufferDescriptor;
use crate::backend::BufferType;
use crate::backend::ContextLock;
use crate::backend::DecodeBackend;
use crate::backend::DriverResult;
use crate::BackendKind;

/// Decode buffer descriptor in the layout this driver API expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecodeBufferDesc {
    pub compressed_buffer_type: u32,
    pub buffer_index: u32,
    pub data_offset: u32,
    pub data_size: u32,
    pub first_mb_address: u32,
    pub num_mbs_in_buffer: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub reserved_bits: u32,
}

impl From<&BufferDescriptor> for DecodeBufferDesc {
    fn from(desc: &BufferDescriptor) -> Self {
        Self {
            compressed_buffer_type: desc.buffer_type.raw(),
            data_size: desc.data_size,
            num_mbs_in_buffer: desc.num_mbs_in_buffer,
            ..Default::default()
        }
    }
}

/// Arguments of [`VideoDecoderDevice::execute`].
#[derive(Debug)]
pub struct ExecuteParams<'a> {
    pub compressed_buffers: &'a [DecodeBufferDesc],
}

/// The decoder device as exposed by the driver.
pub trait VideoDecoderDevice {
    type Surface: PartialEq;

    fn get_buffer(&mut self, buffer_type: u32) -> DriverResult<&mut [u8]>;
    fn release_buffer(&mut self, buffer_type: u32) -> DriverResult<()>;
    fn begin_frame(&mut self, render_target: &Self::Surface) -> DriverResult<()>;
    fn execute(&mut self, params: &ExecuteParams<'_>) -> DriverResult<()>;
    fn end_frame(&mut self) -> DriverResult<()>;
}

pub struct BufferApiV1<D: VideoDecoderDevice> {
    decoder: D,
    /// The surfaces the decoder was created with, in driver order.
    surfaces: Vec<D::Surface>,
}

impl<D: VideoDecoderDevice> BufferApiV1<D> {
    pub fn new(decoder: D, surfaces: Vec<D::Surface>) -> Self {
        Self { decoder, surfaces }
    }

    pub fn decoder(&self) -> &D {
        &self.decoder
    }

    pub fn surfaces(&self) -> &[D::Surface] {
        &self.surfaces
    }
}

impl<D: VideoDecoderDevice> DecodeBackend for BufferApiV1<D> {
    type Surface = D::Surface;

    fn kind(&self) -> BackendKind {
        BackendKind::BufferApiV1
    }

    fn context_lock(&self) -> ContextLock {
        ContextLock::none()
    }

    fn surface_index(&self, surface: &Self::Surface) -> Option<u32> {
        self.surfaces
            .iter()
            .position(|s| s == surface)
            .and_then(|i| u32::try_from(i).ok())
    }

    fn get_buffer(&mut self, buffer_type: BufferType) -> DriverResult<&mut [u8]> {
        self.decoder.get_buffer(buffer_type.raw())
    }

    fn release_buffer(&mut self, buffer_type: BufferType) -> DriverResult<()> {
        self.decoder.release_buffer(buffer_type.raw())
    }

    fn begin_frame(&mut self, surface: &Self::Surface) -> DriverResult<()> {
        self.decoder.begin_frame(surface)
    }

    fn submit_buffers(&mut self, buffers: &[BufferDescriptor]) -> DriverResult<()> {
        let compressed_buffers = buffers
            .iter()
            .map(DecodeBufferDesc::from)
            .collect::<Vec<_>>();

        self.decoder.execute(&ExecuteParams {
            compressed_buffers: &compressed_buffers,
        })
    }

    fn end_frame(&mut self) -> DriverResult<()> {
        self.decoder.end_frame()
    }
}
