// Copyright 2023 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! This file contains a dummy driver whose only purpose is to let sessions
//! run so we can test them in isolation. It implements both driver API
//! shapes, can be scripted to fail at any step and records every call it
//! receives.

use std::collections::HashMap;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use bytes::BytesMut;

use crate::backend::buffer_api_v1::ExecuteParams;
use crate::backend::buffer_api_v1::VideoDecoderDevice;
use crate::backend::buffer_api_v2::DecoderBufferDesc;
use crate::backend::buffer_api_v2::OutputView;
use crate::backend::buffer_api_v2::VideoContext;
use crate::backend::BufferType;
use crate::backend::ContextLock;
use crate::backend::DriverResult;
use crate::backend::DriverStatus;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Surface(pub u32);

impl OutputView for Surface {
    fn array_slice(&self) -> u32 {
        self.0
    }
}

/// What the driver should answer.
#[derive(Clone, Debug)]
pub struct Script {
    /// Capacity granted for every buffer type not in `capacities`.
    pub capacity: usize,
    pub capacities: HashMap<BufferType, usize>,
    /// Number of `E_PENDING` answers before begin frame succeeds.
    pub busy_begins: u32,
    pub begin_status: Option<DriverStatus>,
    pub get_buffer_status: Option<(BufferType, DriverStatus)>,
    pub release_status: Option<(BufferType, DriverStatus)>,
    pub submit_status: Option<DriverStatus>,
    pub end_status: Option<DriverStatus>,
}

impl Default for Script {
    fn default() -> Self {
        Self {
            capacity: 1024,
            capacities: Default::default(),
            busy_begins: 0,
            begin_status: None,
            get_buffer_status: None,
            release_status: None,
            submit_status: None,
            end_status: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Call {
    GetBuffer(BufferType),
    ReleaseBuffer(BufferType),
    BeginFrame(u32),
    Submit(Vec<BufferType>),
    EndFrame,
}

#[derive(Clone, Debug)]
pub struct Event {
    pub call: Call,
    /// Whether the observed context lock was held when the call was made.
    pub locked: bool,
}

/// A buffer as seen by the driver at execute time.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmittedBuffer {
    pub buffer_type: BufferType,
    pub data_size: u32,
    pub num_mbs_in_buffer: u32,
    pub crc: u32,
}

#[derive(Default)]
pub struct Driver {
    pub script: Script,
    pub events: Vec<Event>,
    pub submitted: Vec<SubmittedBuffer>,
    buffers: HashMap<BufferType, BytesMut>,
    begin_calls: u32,
    observed_lock: Option<ContextLock>,
    /// Frames in flight across every driver sharing this counter.
    in_flight: Option<Arc<AtomicUsize>>,
    /// Set if begin frame ever found another frame in flight.
    pub overlapped: bool,
}

impl Driver {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            ..Default::default()
        }
    }

    /// Records in every event whether `lock` is held.
    pub fn observing(mut self, lock: ContextLock) -> Self {
        self.observed_lock = Some(lock);
        self
    }

    /// Tracks overlapping frames against other drivers sharing `counter`.
    pub fn sharing(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.in_flight = Some(counter);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.events.iter().map(|e| e.call.clone()).collect()
    }

    pub fn count(&self, call: &Call) -> usize {
        self.events.iter().filter(|e| e.call == *call).count()
    }

    pub fn begin_calls(&self) -> u32 {
        self.begin_calls
    }

    fn record(&mut self, call: Call) {
        let locked = self
            .observed_lock
            .as_ref()
            .map(|lock| lock.try_lock().is_none())
            .unwrap_or(false);
        self.events.push(Event { call, locked });
    }

    fn acquire(&mut self, raw: u32) -> DriverResult<&mut [u8]> {
        let buffer_type = BufferType::try_from(raw)?;
        self.record(Call::GetBuffer(buffer_type));

        if let Some((failing, status)) = self.script.get_buffer_status {
            if failing == buffer_type {
                return Err(status);
            }
        }

        let capacity = self
            .script
            .capacities
            .get(&buffer_type)
            .copied()
            .unwrap_or(self.script.capacity);

        let buffer = self
            .buffers
            .entry(buffer_type)
            .or_insert_with(|| BytesMut::zeroed(capacity));
        Ok(&mut buffer[..])
    }

    fn release(&mut self, raw: u32) -> DriverResult<()> {
        let buffer_type = BufferType::try_from(raw)?;
        self.record(Call::ReleaseBuffer(buffer_type));

        match self.script.release_status {
            Some((failing, status)) if failing == buffer_type => Err(status),
            _ => Ok(()),
        }
    }

    fn begin(&mut self, surface: &Surface) -> DriverResult<()> {
        self.record(Call::BeginFrame(surface.0));
        self.begin_calls += 1;

        if let Some(status) = self.script.begin_status {
            return Err(status);
        }
        if self.begin_calls <= self.script.busy_begins {
            return Err(DriverStatus::E_PENDING);
        }

        // Start of a new frame, buffers from the previous one are gone.
        self.buffers.clear();
        if let Some(in_flight) = &self.in_flight {
            if in_flight.fetch_add(1, Ordering::SeqCst) != 0 {
                self.overlapped = true;
            }
        }
        Ok(())
    }

    fn submit(&mut self, buffers: &[(u32, u32, u32)]) -> DriverResult<()> {
        let mut types = Vec::with_capacity(buffers.len());
        let mut submitted = Vec::with_capacity(buffers.len());
        for &(raw, data_size, num_mbs_in_buffer) in buffers {
            let buffer_type = BufferType::try_from(raw)?;
            let data = self
                .buffers
                .get(&buffer_type)
                .ok_or(DriverStatus::E_INVALIDARG)?;
            let crc = crc32fast::hash(&data[..data_size as usize]);

            types.push(buffer_type);
            submitted.push(SubmittedBuffer {
                buffer_type,
                data_size,
                num_mbs_in_buffer,
                crc,
            });
        }
        self.record(Call::Submit(types));

        if let Some(status) = self.script.submit_status {
            return Err(status);
        }
        self.submitted.extend(submitted);
        Ok(())
    }

    fn end(&mut self) -> DriverResult<()> {
        self.record(Call::EndFrame);
        if let Some(in_flight) = &self.in_flight {
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        match self.script.end_status {
            Some(status) => Err(status),
            None => Ok(()),
        }
    }
}

impl VideoDecoderDevice for Driver {
    type Surface = Surface;

    fn get_buffer(&mut self, buffer_type: u32) -> DriverResult<&mut [u8]> {
        self.acquire(buffer_type)
    }

    fn release_buffer(&mut self, buffer_type: u32) -> DriverResult<()> {
        self.release(buffer_type)
    }

    fn begin_frame(&mut self, render_target: &Surface) -> DriverResult<()> {
        self.begin(render_target)
    }

    fn execute(&mut self, params: &ExecuteParams<'_>) -> DriverResult<()> {
        let buffers = params
            .compressed_buffers
            .iter()
            .map(|b| (b.compressed_buffer_type, b.data_size, b.num_mbs_in_buffer))
            .collect::<Vec<_>>();
        self.submit(&buffers)
    }

    fn end_frame(&mut self) -> DriverResult<()> {
        self.end()
    }
}

impl VideoContext for Driver {
    type OutputView = Surface;

    fn get_decoder_buffer(&mut self, buffer_type: u32) -> DriverResult<&mut [u8]> {
        self.acquire(buffer_type)
    }

    fn release_decoder_buffer(&mut self, buffer_type: u32) -> DriverResult<()> {
        self.release(buffer_type)
    }

    fn decoder_begin_frame(&mut self, view: &Surface) -> DriverResult<()> {
        self.begin(view)
    }

    fn submit_decoder_buffers(&mut self, buffers: &[DecoderBufferDesc]) -> DriverResult<()> {
        let buffers = buffers
            .iter()
            .map(|b| (b.buffer_type, b.data_size, b.num_mbs_in_buffer))
            .collect::<Vec<_>>();
        self.submit(&buffers)
    }

    fn decoder_end_frame(&mut self) -> DriverResult<()> {
        self.end()
    }
}
