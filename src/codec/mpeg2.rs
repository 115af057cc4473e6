// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! MPEG-2 decode component.
//!
//! `VAPictureParameterBufferMPEG2` starts with `horizontal_size`, `vertical_size` (`u16`),
//! then the `forward_reference_picture` and `backward_reference_picture` surfaces.

use crate::buffer::BufferType;
use crate::codec::check_picture_parameters;
use crate::codec::read_size_u16;
use crate::codec::read_surfaces;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::codec::ResolutionLimits;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;

const FORWARD_REFERENCE_OFFSET: usize = 4;
pub const MAX_REFERENCES: usize = 2;
pub const PICTURE_PARAMETERS_SIZE: usize = FORWARD_REFERENCE_OFFSET + MAX_REFERENCES * 4;

#[derive(Debug, Default)]
pub struct Mpeg2Codec;

impl DecodeCodec for Mpeg2Codec {
    fn mode(&self) -> DecodeMode {
        DecodeMode::Mpeg2
    }

    fn accepts(&self, buffer_type: BufferType) -> bool {
        matches!(
            buffer_type,
            BufferType::PictureParameter
                | BufferType::IqMatrix
                | BufferType::SliceParameter
                | BufferType::SliceData
                | BufferType::ProcPipelineParameter
        )
    }

    fn resolution_limits(&self) -> ResolutionLimits {
        ResolutionLimits::up_to(2048, 2048)
    }

    fn picture_parameters_size(&self) -> usize {
        PICTURE_PARAMETERS_SIZE
    }

    fn picture_resolution(&self, pic_params: &[u8]) -> Option<Resolution> {
        (pic_params.len() >= 4).then(|| read_size_u16(pic_params, 0))
    }

    /// Forward then backward reference.
    fn requested_references(&self, pic_params: &[u8]) -> Result<Vec<SurfaceId>> {
        check_picture_parameters(self.mode(), pic_params, PICTURE_PARAMETERS_SIZE)?;
        Ok(read_surfaces(
            pic_params,
            FORWARD_REFERENCE_OFFSET,
            MAX_REFERENCES,
        ))
    }
}
