// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! HEVC decode component, covering the range extension and screen content profiles.
//!
//! Fields read from `VAPictureParameterBufferHEVC`:
//!
//! | offset | field                          |
//! |--------|--------------------------------|
//! | 0      | `CurrPic`                      |
//! | 28     | `ReferenceFrames[15]`          |
//! | 448    | `pic_width_in_luma_samples`    |
//! | 450    | `pic_height_in_luma_samples`   |

use byteorder::ByteOrder;
use byteorder::NativeEndian;

use crate::buffer::BufferType;
use crate::codec::check_picture_parameters;
use crate::codec::read_size_u16;
use crate::codec::read_surface;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::codec::ResolutionLimits;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;

/// Size of `VAPictureHEVC`.
const PICTURE_SIZE: usize = 28;
const FLAGS_OFFSET: usize = 8;
/// `VA_PICTURE_HEVC_INVALID`.
const PICTURE_INVALID: u32 = 0x01;

const REFERENCE_FRAMES_OFFSET: usize = PICTURE_SIZE;
pub const MAX_REFERENCES: usize = 15;
const SIZE_OFFSET: usize = REFERENCE_FRAMES_OFFSET + MAX_REFERENCES * PICTURE_SIZE;

pub const PICTURE_PARAMETERS_SIZE: usize = SIZE_OFFSET + 4;

#[derive(Debug, Default)]
pub struct H265Codec;

impl DecodeCodec for H265Codec {
    fn mode(&self) -> DecodeMode {
        DecodeMode::Hevc
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
        ResolutionLimits::up_to(16384, 16384)
    }

    fn picture_parameters_size(&self) -> usize {
        PICTURE_PARAMETERS_SIZE
    }

    fn picture_resolution(&self, pic_params: &[u8]) -> Option<Resolution> {
        (pic_params.len() >= PICTURE_PARAMETERS_SIZE)
            .then(|| read_size_u16(pic_params, SIZE_OFFSET))
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
