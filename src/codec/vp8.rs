// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! VP8 decode component.
//!
//! `VAPictureParameterBufferVP8` starts with `frame_width`, `frame_height`, then the
//! `last_ref_frame`, `golden_ref_frame` and `alt_ref_frame` surfaces, all `u32`.

use byteorder::ByteOrder;
use byteorder::NativeEndian;

use crate::buffer::BufferType;
use crate::codec::check_picture_parameters;
use crate::codec::read_surfaces;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;

const LAST_REF_FRAME_OFFSET: usize = 8;
pub const MAX_REFERENCES: usize = 3;
pub const PICTURE_PARAMETERS_SIZE: usize = LAST_REF_FRAME_OFFSET + MAX_REFERENCES * 4;

#[derive(Debug, Default)]
pub struct Vp8Codec;

impl DecodeCodec for Vp8Codec {
    fn mode(&self) -> DecodeMode {
        DecodeMode::Vp8
    }

    fn accepts(&self, buffer_type: BufferType) -> bool {
        matches!(
            buffer_type,
            BufferType::PictureParameter
                | BufferType::IqMatrix
                | BufferType::Probability
                | BufferType::SliceParameter
                | BufferType::SliceData
                | BufferType::ProcPipelineParameter
        )
    }

    fn picture_parameters_size(&self) -> usize {
        PICTURE_PARAMETERS_SIZE
    }

    fn picture_resolution(&self, pic_params: &[u8]) -> Option<Resolution> {
        let data = pic_params.get(0..8)?;
        Some(Resolution::from((
            NativeEndian::read_u32(&data[0..4]),
            NativeEndian::read_u32(&data[4..8]),
        )))
    }

    /// Last, golden and alt-ref frames, in that order.
    fn requested_references(&self, pic_params: &[u8]) -> Result<Vec<SurfaceId>> {
        check_picture_parameters(self.mode(), pic_params, PICTURE_PARAMETERS_SIZE)?;
        Ok(read_surfaces(
            pic_params,
            LAST_REF_FRAME_OFFSET,
            MAX_REFERENCES,
        ))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn picture_parameters(
        resolution: Resolution,
        last: SurfaceId,
        golden: SurfaceId,
        alt: SurfaceId,
    ) -> Vec<u8> {
        let mut data = vec![0u8; PICTURE_PARAMETERS_SIZE];
        NativeEndian::write_u32(&mut data[0..4], resolution.width);
        NativeEndian::write_u32(&mut data[4..8], resolution.height);
        NativeEndian::write_u32(&mut data[8..12], last.0);
        NativeEndian::write_u32(&mut data[12..16], golden.0);
        NativeEndian::write_u32(&mut data[16..20], alt.0);
        data
    }

    #[test]
    fn parse_picture_parameters() {
        let pic_params = picture_parameters(
            Resolution::from((320, 240)),
            SurfaceId(1),
            SurfaceId(2),
            SurfaceId::INVALID,
        );

        assert_eq!(
            Vp8Codec.picture_resolution(&pic_params),
            Some(Resolution::from((320, 240)))
        );
        assert_eq!(
            Vp8Codec.requested_references(&pic_params).unwrap(),
            vec![SurfaceId(1), SurfaceId(2), SurfaceId::INVALID]
        );
        assert!(Vp8Codec.requested_references(&pic_params[..16]).is_err());
    }

    #[test]
    fn buffer_types() {
        assert!(Vp8Codec.accepts(BufferType::Probability));
        assert!(!Vp8Codec.accepts(BufferType::HuffmanTable));
    }
}
