// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! AV1 decode component.
//!
//! Fields read from `VADecPictureParameterBufferAV1` (64-bit layout):
//!
//! | offset | field                   |
//! |--------|-------------------------|
//! | 8      | `current_frame`         |
//! | 32     | `frame_width_minus1`    |
//! | 34     | `frame_height_minus1`   |
//! | 40     | `ref_frame_map[8]`      |

use byteorder::ByteOrder;
use byteorder::NativeEndian;

use crate::codec::check_picture_parameters;
use crate::codec::read_surfaces;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::codec::ResolutionLimits;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;

const FRAME_SIZE_OFFSET: usize = 32;
const REF_FRAME_MAP_OFFSET: usize = 40;
pub const NUM_REF_FRAMES: usize = 8;
pub const PICTURE_PARAMETERS_SIZE: usize = REF_FRAME_MAP_OFFSET + NUM_REF_FRAMES * 4;

#[derive(Debug, Default)]
pub struct Av1Codec;

impl DecodeCodec for Av1Codec {
    fn mode(&self) -> DecodeMode {
        DecodeMode::Av1
    }

    fn resolution_limits(&self) -> ResolutionLimits {
        ResolutionLimits::up_to(16384, 16384)
    }

    fn picture_parameters_size(&self) -> usize {
        PICTURE_PARAMETERS_SIZE
    }

    fn picture_resolution(&self, pic_params: &[u8]) -> Option<Resolution> {
        let data = pic_params.get(FRAME_SIZE_OFFSET..FRAME_SIZE_OFFSET + 4)?;
        Some(Resolution::from((
            NativeEndian::read_u16(&data[0..2]) as u32 + 1,
            NativeEndian::read_u16(&data[2..4]) as u32 + 1,
        )))
    }

    fn requested_references(&self, pic_params: &[u8]) -> Result<Vec<SurfaceId>> {
        check_picture_parameters(self.mode(), pic_params, PICTURE_PARAMETERS_SIZE)?;
        Ok(read_surfaces(
            pic_params,
            REF_FRAME_MAP_OFFSET,
            NUM_REF_FRAMES,
        ))
    }
}
