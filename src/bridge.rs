// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Interface between the decode sessions and the hardware command layer.
//!
//! When a picture ends, its context turns everything it collected into a [`SubmitRequest`] and
//! hands it to its [`CommandBridge`]. How the request is encoded into hardware commands, and how
//! completion is tracked, is up to the bridge.

pub mod null;

use bytes::Bytes;
use thiserror::Error;

use crate::buffer::processing::ProcessingParams;
use crate::buffer::slice::SliceControl;
use crate::buffer::BufferType;
use crate::codec::DecodeMode;
use crate::dpb::ResolvedReference;
use crate::Resolution;
use crate::Surface;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("not enough resources to proceed with the operation now")]
    OutOfResources,
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type returned by bridge methods.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Identifier of a submitted picture, unique per bridge.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubmissionId(pub u64);

/// Where the data of a command descriptor comes from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DescriptorSource {
    /// An attached buffer of the picture.
    Buffer,
    /// The region all slice groups were combined into.
    CombinedBitstream,
}

/// One memory region the hardware reads while decoding the picture.
#[derive(Clone, Debug)]
pub struct CommandDescriptor {
    /// Slot of the buffer among the attached buffers of the same type.
    pub buffer_index: usize,
    pub buffer_type: BufferType,
    /// Offset of `data` within its source.
    pub byte_offset: usize,
    pub byte_length: usize,
    pub source: DescriptorSource,
    pub data: Bytes,
}

/// Everything the hardware needs to decode one picture.
#[derive(Clone, Debug)]
pub struct SubmitRequest {
    pub mode: DecodeMode,
    /// Surface the picture is decoded into.
    pub target: Surface,
    /// Coded resolution of the picture.
    pub resolution: Resolution,
    pub descriptors: Vec<CommandDescriptor>,
    /// Slices of the picture, offsets relative to the start of its bitstream.
    pub slices: Vec<SliceControl>,
    pub references: Vec<ResolvedReference>,
    /// Scaling requested alongside the decode.
    pub processing: Option<ProcessingParams>,
}

impl SubmitRequest {
    /// Descriptors of the compressed bitstream, in bitstream order.
    pub fn bitstream(&self) -> impl Iterator<Item = &CommandDescriptor> {
        self.descriptors
            .iter()
            .filter(|d| d.buffer_type == BufferType::SliceData)
    }
}

/// Completion status of a submitted picture.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct StatusReport {
    /// Zero on success, hardware specific otherwise.
    pub completion_code: u32,
    /// Number of bitstream bytes the hardware consumed.
    pub consumed_stream_size: u32,
}

impl StatusReport {
    pub fn is_success(&self) -> bool {
        self.completion_code == 0
    }
}

/// Scaling performed outside of the decode pipeline.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ScalingRequest {
    /// The freshly decoded picture.
    pub source: Surface,
    pub params: ProcessingParams,
}

/// Submits decode work to the hardware and reports its completion.
pub trait CommandBridge: Send {
    /// Encodes `request` into hardware commands and queues them.
    ///
    /// [`BridgeError::OutOfResources`] means nothing was queued and the same request can be
    /// submitted again later.
    fn submit(&mut self, request: SubmitRequest) -> BridgeResult<SubmissionId>;

    /// Returns the completion status of submission `id`, or `None` if it is still in flight.
    fn status_report(&mut self, id: SubmissionId) -> BridgeResult<Option<StatusReport>>;

    /// Whether the hardware can scale the output of `mode` while decoding.
    fn supports_fixed_function_scaling(&self, _mode: DecodeMode) -> bool {
        true
    }

    /// Scales a decoded picture with a separate processing pass.
    fn scale_fallback(&mut self, request: ScalingRequest) -> BridgeResult<()>;
}
