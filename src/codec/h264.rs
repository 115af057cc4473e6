// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! H.264 decode component.
//!
//! Fields read from `VAPictureParameterBufferH264`:
//!
//! | offset | field                              |
//! |--------|------------------------------------|
//! | 0      | `CurrPic`                          |
//! | 36     | `ReferenceFrames[16]`              |
//! | 612    | `picture_width_in_mbs_minus1`      |
//! | 614    | `picture_height_in_mbs_minus1`     |

use byteorder::ByteOrder;
use byteorder::NativeEndian;

use crate::buffer::BufferType;
use crate::codec::check_picture_parameters;
use crate::codec::read_surface;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;
use crate::MB_SIZE;

/// Size of `VAPictureH264`.
const PICTURE_SIZE: usize = 36;
const FLAGS_OFFSET: usize = 8;
/// `VA_PICTURE_H264_INVALID`.
const PICTURE_INVALID: u32 = 0x01;

const REFERENCE_FRAMES_OFFSET: usize = PICTURE_SIZE;
pub const MAX_REFERENCES: usize = 16;
const WIDTH_IN_MBS_OFFSET: usize = REFERENCE_FRAMES_OFFSET + MAX_REFERENCES * PICTURE_SIZE;
const HEIGHT_IN_MBS_OFFSET: usize = WIDTH_IN_MBS_OFFSET + 2;

pub const PICTURE_PARAMETERS_SIZE: usize = HEIGHT_IN_MBS_OFFSET + 2;

#[derive(Debug, Default)]
pub struct H264Codec;

impl DecodeCodec for H264Codec {
    fn mode(&self) -> DecodeMode {
        DecodeMode::Avc
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

    fn picture_parameters_size(&self) -> usize {
        PICTURE_PARAMETERS_SIZE
    }

    fn picture_resolution(&self, pic_params: &[u8]) -> Option<Resolution> {
        let data = pic_params.get(WIDTH_IN_MBS_OFFSET..PICTURE_PARAMETERS_SIZE)?;
        let width_in_mbs = NativeEndian::read_u16(&data[0..2]) as u32 + 1;
        let height_in_mbs = NativeEndian::read_u16(&data[2..4]) as u32 + 1;

        Some(Resolution::from((
            width_in_mbs * MB_SIZE,
            height_in_mbs * MB_SIZE,
        )))
    }

    fn requested_references(&self, pic_params: &[u8]) -> Result<Vec<SurfaceId>> {
        check_picture_parameters(self.mode(), pic_params, PICTURE_PARAMETERS_SIZE)?;

        Ok((0..MAX_REFERENCES)
            .map(|i| {
                let offset = REFERENCE_FRAMES_OFFSET + i * PICTURE_SIZE;
                let flags = NativeEndian::read_u32(
                    &pic_params[offset + FLAGS_OFFSET..offset + FLAGS_OFFSET + 4],
                );
                if flags & PICTURE_INVALID != 0 {
                    SurfaceId::INVALID
                } else {
                    read_surface(pic_params, offset)
                }
            })
            .collect())
    }
}
