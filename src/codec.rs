// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Per-codec decode components.
//!
//! The session state machine is the same for every codec. What differs is captured by the
//! [`DecodeCodec`] trait: which buffer types the codec consumes, which resolutions it can
//! decode, where its picture parameters keep the picture size and the reference list, and in
//! which order the hardware wants to read the buffers of a picture.
//!
//! Picture parameters are laid out as the corresponding host ABI structures in native byte
//! order, as they come from the application.

#[cfg(feature = "av1")]
pub mod av1;
#[cfg(feature = "h264")]
pub mod h264;
#[cfg(feature = "h265")]
pub mod h265;
#[cfg(feature = "jpeg")]
pub mod jpeg;
#[cfg(feature = "mpeg2")]
pub mod mpeg2;
#[cfg(feature = "vp8")]
pub mod vp8;
#[cfg(feature = "vp9")]
pub mod vp9;

use byteorder::ByteOrder;
use byteorder::NativeEndian;

use crate::bitstream::BitstreamSegment;
use crate::bitstream::SegmentSource;
use crate::bridge::CommandDescriptor;
use crate::bridge::DescriptorSource;
use crate::buffer::AttachedBuffer;
use crate::buffer::BufferType;
use crate::dpb::ReferenceTracker;
use crate::dpb::ResolvedReference;
use crate::DdiError;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;

/// Decode mode of the hardware, one per codec family.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum DecodeMode {
    Mpeg2,
    Avc,
    Jpeg,
    Hevc,
    Vp8,
    Vp9,
    Av1,
}

impl std::fmt::Display for DecodeMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DecodeMode::Mpeg2 => "MPEG-2",
            DecodeMode::Avc => "AVC",
            DecodeMode::Jpeg => "JPEG",
            DecodeMode::Hevc => "HEVC",
            DecodeMode::Vp8 => "VP8",
            DecodeMode::Vp9 => "VP9",
            DecodeMode::Av1 => "AV1",
        };
        f.write_str(name)
    }
}

/// Range of coded resolutions a codec can decode.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolutionLimits {
    pub min: Resolution,
    pub max: Resolution,
}

impl ResolutionLimits {
    pub const DEFAULT: ResolutionLimits = ResolutionLimits {
        min: Resolution {
            width: 16,
            height: 16,
        },
        max: Resolution {
            width: 4096,
            height: 4096,
        },
    };

    pub const fn up_to(width: u32, height: u32) -> Self {
        Self {
            min: Self::DEFAULT.min,
            max: Resolution { width, height },
        }
    }

    pub fn check(&self, resolution: Resolution) -> Result<()> {
        if self.max.can_contain(resolution) && resolution.can_contain(self.min) {
            Ok(())
        } else {
            Err(DdiError::ResolutionNotSupported(resolution))
        }
    }
}

/// Buffer order used by most codecs: parameters and tables first, then slice controls.
pub const DEFAULT_BUFFER_ORDER: &[BufferType] = &[
    BufferType::PictureParameter,
    BufferType::IqMatrix,
    BufferType::HuffmanTable,
    BufferType::Probability,
    BufferType::BitPlane,
    BufferType::SliceGroupMap,
    BufferType::SliceParameter,
];

/// Codec specific part of a decode context.
pub trait DecodeCodec: Send {
    fn mode(&self) -> DecodeMode;

    /// Whether buffers of `buffer_type` can be rendered into a picture of this codec.
    fn accepts(&self, buffer_type: BufferType) -> bool {
        matches!(
            buffer_type,
            BufferType::PictureParameter
                | BufferType::SliceParameter
                | BufferType::SliceData
                | BufferType::ProcPipelineParameter
        )
    }

    fn resolution_limits(&self) -> ResolutionLimits {
        ResolutionLimits::DEFAULT
    }

    /// Checks that pictures of `resolution` can be decoded.
    fn check_resolution(&self, resolution: Resolution) -> Result<()> {
        self.resolution_limits().check(resolution)
    }

    /// Smallest picture parameter buffer holding every field read by this component.
    fn picture_parameters_size(&self) -> usize;

    /// The coded size carried by the picture parameters, if the codec has one.
    fn picture_resolution(&self, _pic_params: &[u8]) -> Option<Resolution> {
        None
    }

    /// The reference list of the picture parameters. [`SurfaceId::INVALID`] marks unused
    /// slots.
    fn requested_references(&self, pic_params: &[u8]) -> Result<Vec<SurfaceId>>;

    /// Resolves the reference list of a picture decoded into `target` against the tracked
    /// references.
    fn build_reference_list(
        &self,
        pic_params: &[u8],
        tracker: &mut ReferenceTracker,
        target: SurfaceId,
    ) -> Result<Vec<ResolvedReference>> {
        let requested = self.requested_references(pic_params)?;
        Ok(tracker.resolve_list(&requested, Some(target)))
    }

    /// Order in which the hardware reads the non-bitstream buffers of a picture.
    fn buffer_order(&self) -> &'static [BufferType] {
        DEFAULT_BUFFER_ORDER
    }

    /// Lays out the command descriptors of a picture: attached buffers in
    /// [`DecodeCodec::buffer_order`], then the bitstream segments, then the processing
    /// request if any.
    fn emit_commands(
        &self,
        attached: &[AttachedBuffer],
        segments: &[BitstreamSegment],
    ) -> Vec<CommandDescriptor> {
        let order = self.buffer_order();
        let mut descriptors = Vec::with_capacity(attached.len() + segments.len());

        let push_type = |descriptors: &mut Vec<CommandDescriptor>, buffer_type: BufferType| {
            let mut buffers: Vec<&AttachedBuffer> = attached
                .iter()
                .filter(|b| b.buffer_type == buffer_type)
                .collect();
            buffers.sort_by_key(|b| b.slot);
            descriptors.extend(buffers.into_iter().map(buffer_descriptor));
        };

        for &buffer_type in order {
            push_type(&mut descriptors, buffer_type);
        }

        // Types the codec accepts but does not order go right before the bitstream.
        let mut remaining: Vec<BufferType> = attached
            .iter()
            .map(|b| b.buffer_type)
            .filter(|t| {
                !order.contains(t)
                    && *t != BufferType::SliceData
                    && *t != BufferType::ProcPipelineParameter
            })
            .collect();
        remaining.sort();
        remaining.dedup();
        for buffer_type in remaining {
            push_type(&mut descriptors, buffer_type);
        }

        descriptors.extend(segments.iter().map(|segment| {
            let (buffer_index, source) = match segment.source {
                SegmentSource::Buffer(slot) => (slot, DescriptorSource::Buffer),
                SegmentSource::Combined => (segment.group, DescriptorSource::CombinedBitstream),
            };
            CommandDescriptor {
                buffer_index,
                buffer_type: BufferType::SliceData,
                byte_offset: segment.offset,
                byte_length: segment.len(),
                source,
                data: segment.data.clone(),
            }
        }));

        push_type(&mut descriptors, BufferType::ProcPipelineParameter);

        descriptors
    }
}

fn buffer_descriptor(buffer: &AttachedBuffer) -> CommandDescriptor {
    CommandDescriptor {
        buffer_index: buffer.slot,
        buffer_type: buffer.buffer_type,
        byte_offset: 0,
        byte_length: buffer.data.len(),
        source: DescriptorSource::Buffer,
        data: buffer.data.clone(),
    }
}

/// Checks that `pic_params` holds at least `size` bytes.
pub(crate) fn check_picture_parameters(
    mode: DecodeMode,
    pic_params: &[u8],
    size: usize,
) -> Result<()> {
    if pic_params.len() < size {
        return Err(DdiError::InvalidParameter(format!(
            "{} picture parameters of {} bytes, at least {} expected",
            mode,
            pic_params.len(),
            size
        )));
    }

    Ok(())
}

/// Reads the surface identifier stored at `offset`.
pub(crate) fn read_surface(data: &[u8], offset: usize) -> SurfaceId {
    SurfaceId(NativeEndian::read_u32(&data[offset..offset + 4]))
}

/// Reads `count` consecutive surface identifiers starting at `offset`.
pub(crate) fn read_surfaces(data: &[u8], offset: usize, count: usize) -> Vec<SurfaceId> {
    (0..count)
        .map(|i| read_surface(data, offset + 4 * i))
        .collect()
}

/// Reads a `width, height` pair of `u16` stored at `offset`.
pub(crate) fn read_size_u16(data: &[u8], offset: usize) -> Resolution {
    Resolution {
        width: NativeEndian::read_u16(&data[offset..offset + 2]) as u32,
        height: NativeEndian::read_u16(&data[offset + 2..offset + 4]) as u32,
    }
}
