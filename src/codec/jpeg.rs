// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Baseline JPEG decode component.
//!
//! JPEG pictures never reference other pictures. `VAPictureParameterBufferJPEGBaseline`
//! starts with `picture_width` and `picture_height` (`u16`).

use crate::buffer::BufferType;
use crate::codec::check_picture_parameters;
use crate::codec::read_size_u16;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::codec::ResolutionLimits;
use crate::Resolution;
use crate::Result;
use crate::SurfaceId;

pub const PICTURE_PARAMETERS_SIZE: usize = 4;

const BUFFER_ORDER: &[BufferType] = &[
    BufferType::PictureParameter,
    BufferType::HuffmanTable,
    BufferType::IqMatrix,
    BufferType::SliceParameter,
];

#[derive(Debug, Default)]
pub struct JpegCodec;

impl DecodeCodec for JpegCodec {
    fn mode(&self) -> DecodeMode {
        DecodeMode::Jpeg
    }

    fn accepts(&self, buffer_type: BufferType) -> bool {
        matches!(
            buffer_type,
            BufferType::PictureParameter
                | BufferType::IqMatrix
                | BufferType::HuffmanTable
                | BufferType::SliceParameter
                | BufferType::SliceData
                | BufferType::ProcPipelineParameter
        )
    }

    fn resolution_limits(&self) -> ResolutionLimits {
        ResolutionLimits {
            min: Resolution::from((1, 1)),
            max: Resolution::from((16384, 16384)),
        }
    }

    fn picture_parameters_size(&self) -> usize {
        PICTURE_PARAMETERS_SIZE
    }

    fn picture_resolution(&self, pic_params: &[u8]) -> Option<Resolution> {
        (pic_params.len() >= PICTURE_PARAMETERS_SIZE).then(|| read_size_u16(pic_params, 0))
    }

    fn requested_references(&self, pic_params: &[u8]) -> Result<Vec<SurfaceId>> {
        check_picture_parameters(self.mode(), pic_params, PICTURE_PARAMETERS_SIZE)?;
        Ok(vec![])
    }

    fn buffer_order(&self) -> &'static [BufferType] {
        BUFFER_ORDER
    }
}

#[cfg(test)]
mod tests {
    use byteorder::ByteOrder;
    use byteorder::NativeEndian;

    use super::*;

    #[test]
    fn tiny_pictures() {
        let mut pic_params = [0u8; PICTURE_PARAMETERS_SIZE];
        NativeEndian::write_u16(&mut pic_params[0..2], 1);
        NativeEndian::write_u16(&mut pic_params[2..4], 1);

        let resolution = JpegCodec.picture_resolution(&pic_params).unwrap();
        assert!(JpegCodec.check_resolution(resolution).is_ok());
        assert!(JpegCodec.requested_references(&pic_params).unwrap().is_empty());
    }

    #[test]
    fn huffman_tables_come_first() {
        assert!(JpegCodec.accepts(BufferType::HuffmanTable));
        assert_eq!(JpegCodec.buffer_order()[1], BufferType::HuffmanTable);
    }
}
