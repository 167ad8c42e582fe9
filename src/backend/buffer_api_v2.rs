// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Backend for drivers exposing a video context that decodes into slices of
//! a texture array.
//!
//! The video context may be shared with other users (e.g. a renderer), in
//! which case the application supplies a mutex that every user takes around
//! its context calls.

use crate::backend::BufferDescriptor;
use crate::backend::BufferType;
use crate::backend::ContextLock;
use crate::backend::DecodeBackend;
use crate::backend::DriverResult;
use crate::BackendKind;

/// Decode buffer descriptor in the layout this driver API expects.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DecoderBufferDesc {
    pub buffer_type: u32,
    pub buffer_index: u32,
    pub data_offset: u32,
    pub data_size: u32,
    pub first_mb_address: u32,
    pub num_mbs_in_buffer: u32,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub reserved_bits: u32,
    pub iv_size: u32,
    pub partial_encryption: bool,
}

impl From<&BufferDescriptor> for DecoderBufferDesc {
    fn from(desc: &BufferDescriptor) -> Self {
        Self {
            buffer_type: desc.buffer_type.raw(),
            data_size: desc.data_size,
            num_mbs_in_buffer: desc.num_mbs_in_buffer,
            ..Default::default()
        }
    }
}

/// An output view onto one slice of the decoder's texture array.
pub trait OutputView {
    fn array_slice(&self) -> u32;
}

/// The video context as exposed by the driver.
pub trait VideoContext {
    type OutputView: OutputView;

    fn get_decoder_buffer(&mut self, buffer_type: u32) -> DriverResult<&mut [u8]>;
    fn release_decoder_buffer(&mut self, buffer_type: u32) -> DriverResult<()>;
    fn decoder_begin_frame(&mut self, view: &Self::OutputView) -> DriverResult<()>;
    fn submit_decoder_buffers(&mut self, buffers: &[DecoderBufferDesc]) -> DriverResult<()>;
    fn decoder_end_frame(&mut self) -> DriverResult<()>;
}

pub struct BufferApiV2<C: VideoContext> {
    context: C,
    context_lock: ContextLock,
}

impl<C: VideoContext> BufferApiV2<C> {
    /// `context_lock` is the mutex shared with the other users of `context`,
    /// or [`ContextLock::none`] if the application did not provide one.
    pub fn new(context: C, context_lock: ContextLock) -> Self {
        Self {
            context,
            context_lock,
        }
    }

    pub fn context(&self) -> &C {
        &self.context
    }
}

impl<C: VideoContext> DecodeBackend for BufferApiV2<C> {
    type Surface = C::OutputView;

    fn kind(&self) -> BackendKind {
        BackendKind::BufferApiV2
    }

    fn context_lock(&self) -> ContextLock {
        self.context_lock.clone()
    }

    fn surface_index(&self, surface: &Self::Surface) -> Option<u32> {
        Some(surface.array_slice())
    }

    fn get_buffer(&mut self, buffer_type: BufferType) -> DriverResult<&mut [u8]> {
        self.context.get_decoder_buffer(buffer_type.raw())
    }

    fn release_buffer(&mut self, buffer_type: BufferType) -> DriverResult<()> {
        self.context.release_decoder_buffer(buffer_type.raw())
    }

    fn begin_frame(&mut self, surface: &Self::Surface) -> DriverResult<()> {
        self.context.decoder_begin_frame(surface)
    }

    fn submit_buffers(&mut self, buffers: &[BufferDescriptor]) -> DriverResult<()> {
        let buffers = buffers
            .iter()
            .map(DecoderBufferDesc::from)
            .collect::<Vec<_>>();

        self.context.submit_decoder_buffers(&buffers)
    }

    fn end_frame(&mut self) -> DriverResult<()> {
        self.context.decoder_end_frame()
    }
}
