// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use crate::backend::BufferDescriptor;
use crate::backend::BufferType;
use crate::backend::ContextLock;
use crate::backend::DecodeBackend;
use crate::backend::DriverResult;
use crate::decoder::retry::BeginFrameRetry;
use crate::decoder::DriverOp;
use crate::decoder::SessionError;
use crate::decoder::SubmitError;
use crate::select_backend;
use crate::BackendKind;
use crate::PixelFormat;

/// Maximum number of buffers in one execute batch: picture parameters,
/// inverse quantization matrix, bitstream and slice control.
const MAX_BUFFERS: usize = 4;

/// Copies `payload` into the driver buffer for `buffer_type` and describes
/// the result.
///
/// The driver buffer is released whether or not the copy succeeded. A failed
/// release fails the commit even if the copy went through.
pub fn commit_buffer<B: DecodeBackend>(
    backend: &mut B,
    buffer_type: BufferType,
    payload: &[u8],
    num_mbs_in_buffer: u32,
) -> Result<BufferDescriptor, SubmitError> {
    let result = match backend.get_buffer(buffer_type) {
        Ok(buffer) => fill_buffer(buffer, buffer_type, payload, num_mbs_in_buffer),
        Err(status) => {
            log::error!("Failed to get a buffer for {:?}: {}", buffer_type, status);
            return Err(SubmitError::Driver {
                op: DriverOp::GetBuffer(buffer_type),
                status,
            });
        }
    };

    if let Err(status) = backend.release_buffer(buffer_type) {
        log::error!("Failed to release buffer type {:?}: {}", buffer_type, status);
        return Err(SubmitError::Driver {
            op: DriverOp::ReleaseBuffer(buffer_type),
            status,
        });
    }

    result
}

fn fill_buffer(
    buffer: &mut [u8],
    buffer_type: BufferType,
    payload: &[u8],
    num_mbs_in_buffer: u32,
) -> Result<BufferDescriptor, SubmitError> {
    let capacity = buffer.len();
    let data_size = match u32::try_from(payload.len()) {
        Ok(size) if payload.len() <= capacity => size,
        _ => {
            log::error!("Buffer for type {:?} was too small", buffer_type);
            return Err(SubmitError::BufferTooSmall {
                buffer_type,
                size: payload.len(),
                capacity,
            });
        }
    };

    buffer[..payload.len()].copy_from_slice(payload);
    log::trace!("Committed {} bytes of {:?}", data_size, buffer_type);

    Ok(BufferDescriptor {
        buffer_type,
        data_size,
        num_mbs_in_buffer,
    })
}

/// The buffers committed so far for the frame being submitted.
///
/// The bitstream assembler passed to [`Session::submit_frame`] uses it to
/// commit the bitstream and slice control buffers.
pub struct FrameBuffers<'a, B: DecodeBackend> {
    backend: &'a mut B,
    descriptors: Vec<BufferDescriptor>,
}

impl<'a, B: DecodeBackend> FrameBuffers<'a, B> {
    fn new(backend: &'a mut B) -> Self {
        Self {
            backend,
            descriptors: Vec::with_capacity(MAX_BUFFERS),
        }
    }

    /// Commits `payload` as the next buffer of the batch.
    pub fn commit(
        &mut self,
        buffer_type: BufferType,
        payload: &[u8],
        num_mbs_in_buffer: u32,
    ) -> Result<BufferDescriptor, SubmitError> {
        let descriptor =
            commit_buffer(&mut *self.backend, buffer_type, payload, num_mbs_in_buffer)?;
        self.descriptors.push(descriptor);
        Ok(descriptor)
    }

    pub fn descriptors(&self) -> &[BufferDescriptor] {
        &self.descriptors
    }

    /// Panics unless the batch holds `expected` buffers and ends with the
    /// bitstream and slice control buffers, in that order.
    fn check_batch(&self, expected: usize) {
        let types = self
            .descriptors
            .iter()
            .map(|d| d.buffer_type)
            .collect::<Vec<_>>();

        assert_eq!(
            types.len(),
            expected,
            "unexpected number of committed buffers: {:?}",
            types
        );
        assert!(
            types.ends_with(&[BufferType::Bitstream, BufferType::SliceControl]),
            "bitstream assembler must commit bitstream then slice control, got {:?}",
            types
        );
    }

    fn execute(self) -> Result<(), SubmitError> {
        self.backend
            .submit_buffers(&self.descriptors)
            .map_err(|status| {
                log::error!("Failed to execute: {}", status);
                SubmitError::Driver {
                    op: DriverOp::Execute,
                    status,
                }
            })
    }
}

/// Ends the frame on the driver when dropped, unless [`FrameScope::end`]
/// already did.
struct FrameScope<'a, B: DecodeBackend> {
    backend: &'a mut B,
    ended: bool,
}

impl<'a, B: DecodeBackend> FrameScope<'a, B> {
    fn new(backend: &'a mut B) -> Self {
        Self {
            backend,
            ended: false,
        }
    }

    fn end(mut self) -> DriverResult<()> {
        self.ended = true;
        self.backend.end_frame()
    }
}

impl<'a, B: DecodeBackend> Drop for FrameScope<'a, B> {
    fn drop(&mut self) {
        if !self.ended {
            if let Err(status) = self.backend.end_frame() {
                log::error!("Failed to end frame: {}", status);
            }
        }
    }
}

/// A decoding session on one hardware decoder.
///
/// The backend is fixed when the session is created and must be the one
/// [`select_backend`] picks for the session's pixel format.
pub struct Session<B: DecodeBackend> {
    backend: B,
    format: PixelFormat,
    context_lock: ContextLock,
    retry: BeginFrameRetry,
    frames_submitted: u64,
}

impl<B: DecodeBackend> Session<B> {
    pub fn new(format: PixelFormat, backend: B) -> Result<Self, SessionError> {
        let expected = select_backend(format)?;
        let actual = backend.kind();
        if expected != actual {
            return Err(SessionError::BackendMismatch {
                format,
                expected,
                actual,
            });
        }

        let context_lock = backend.context_lock();

        Ok(Self {
            backend,
            format,
            context_lock,
            retry: Default::default(),
            frames_submitted: 0,
        })
    }

    /// Replaces the default begin frame retry policy.
    pub fn with_retry(mut self, retry: BeginFrameRetry) -> Self {
        self.retry = retry;
        self
    }

    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Number of frames successfully submitted so far.
    pub fn frames_submitted(&self) -> u64 {
        self.frames_submitted
    }

    /// Index of `surface` within the session's output surfaces.
    pub fn surface_index(&self, surface: &B::Surface) -> Result<u32, SessionError> {
        self.backend
            .surface_index(surface)
            .ok_or(SessionError::UnknownSurface)
    }

    /// Decodes one frame into `surface`.
    ///
    /// `picture_params` and, if not empty, `quant_matrix` are committed by
    /// the session. `assemble` must then commit exactly two buffers: the
    /// bitstream followed by the slice control data. Committing anything
    /// else is a programming error and panics.
    ///
    /// Once begin frame succeeded, end frame is called whatever happens next,
    /// and the context lock is held until it returns.
    pub fn submit_frame<F>(
        &mut self,
        surface: &B::Surface,
        picture_params: &[u8],
        quant_matrix: &[u8],
        assemble: F,
    ) -> Result<(), SubmitError>
    where
        F: FnOnce(&mut FrameBuffers<'_, B>) -> Result<(), SubmitError>,
    {
        let backend = &mut self.backend;
        let guard = self
            .retry
            .run(&self.context_lock, || backend.begin_frame(surface))?;

        let mut frame = FrameScope::new(backend);
        let result = Self::execute_frame(
            &mut *frame.backend,
            picture_params,
            quant_matrix,
            assemble,
        );
        let end = frame.end();
        drop(guard);

        match (result, end) {
            (Ok(()), Ok(())) => {
                self.frames_submitted += 1;
                log::debug!("Submitted frame {}", self.frames_submitted);
                Ok(())
            }
            (Ok(()), Err(status)) => {
                log::error!("Failed to end frame: {}", status);
                Err(SubmitError::Driver {
                    op: DriverOp::EndFrame,
                    status,
                })
            }
            (Err(e), Ok(())) => Err(e),
            (Err(e), Err(status)) => {
                log::error!("Failed to end frame: {}", status);
                Err(e)
            }
        }
    }

    fn execute_frame<F>(
        backend: &mut B,
        picture_params: &[u8],
        quant_matrix: &[u8],
        assemble: F,
    ) -> Result<(), SubmitError>
    where
        F: FnOnce(&mut FrameBuffers<'_, B>) -> Result<(), SubmitError>,
    {
        let mut buffers = FrameBuffers::new(backend);

        buffers
            .commit(BufferType::PictureParameters, picture_params, 0)
            .inspect_err(|_| log::error!("Failed to add picture parameter buffer"))?;

        if !quant_matrix.is_empty() {
            buffers
                .commit(BufferType::InverseQuantizationMatrix, quant_matrix, 0)
                .inspect_err(|_| log::error!("Failed to add inverse quantization matrix buffer"))?;
        }

        assemble(&mut buffers)
            .inspect_err(|_| log::error!("Failed to add bitstream or slice control buffer"))?;

        buffers.check_batch(1 + usize::from(!quant_matrix.is_empty()) + 2);
        buffers.execute()
    }
}
