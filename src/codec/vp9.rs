// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! VP9 decode component.
//!
//! `VADecPictureParameterBufferVP9` starts with `frame_width` and `frame_height` (`u16`),
//! followed by the eight `reference_frames` surfaces.

use crate::codec::check_picture_parameters;
use crate::codec::read_size_u16;
use crate::codec::read_surfaces;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::codec::ResolutionLimits;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;

const REFERENCE_FRAMES_OFFSET: usize = 4;
pub const NUM_REF_FRAMES: usize = 8;
pub const PICTURE_PARAMETERS_SIZE: usize = REFERENCE_FRAMES_OFFSET + NUM_REF_FRAMES * 4;

#[derive(Debug, Default)]
pub struct Vp9Codec;

impl DecodeCodec for Vp9Codec {
    fn mode(&self) -> DecodeMode {
        DecodeMode::Vp9
    }

    fn resolution_limits(&self) -> ResolutionLimits {
        ResolutionLimits::up_to(16384, 16384)
    }

    fn picture_parameters_size(&self) -> usize {
        PICTURE_PARAMETERS_SIZE
    }

    fn picture_resolution(&self, pic_params: &[u8]) -> Option<Resolution> {
        (pic_params.len() >= 4).then(|| read_size_u16(pic_params, 0))
    }

    fn requested_references(&self, pic_params: &[u8]) -> Result<Vec<SurfaceId>> {
        check_picture_parameters(self.mode(), pic_params, PICTURE_PARAMETERS_SIZE)?;
        Ok(read_surfaces(
            pic_params,
            REFERENCE_FRAMES_OFFSET,
            NUM_REF_FRAMES,
        ))
    }
}
