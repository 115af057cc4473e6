// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Decode processing requests.
//!
//! A processing buffer attached to a picture asks for the decoded picture to also be scaled
//! into a second surface. The host glue flattens the pipeline parameters it receives into the
//! fixed layout below:
//!
//! | offset | type  | field                |
//! |--------|-------|----------------------|
//! | 0      | `u32` | output surface       |
//! | 4      | `u16` | output region x      |
//! | 6      | `u16` | output region y      |
//! | 8      | `u16` | output region width  |
//! | 10     | `u16` | output region height |

use byteorder::ByteOrder;
use byteorder::NativeEndian;

use crate::DdiError;
use crate::Result;
use crate::SurfaceId;

pub const PROCESSING_PARAMS_SIZE: usize = 12;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

/// Scaling request carried by a processing buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ProcessingParams {
    pub output: SurfaceId,
    pub output_region: Rect,
}

impl ProcessingParams {
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < PROCESSING_PARAMS_SIZE {
            return Err(DdiError::InvalidParameter(format!(
                "processing buffer of {} bytes is too small",
                data.len()
            )));
        }

        let params = Self {
            output: SurfaceId(NativeEndian::read_u32(&data[0..4])),
            output_region: Rect {
                x: NativeEndian::read_u16(&data[4..6]),
                y: NativeEndian::read_u16(&data[6..8]),
                width: NativeEndian::read_u16(&data[8..10]),
                height: NativeEndian::read_u16(&data[10..12]),
            },
        };

        if params.output.is_reserved() {
            return Err(DdiError::InvalidSurface(params.output));
        }

        if params.output_region.width == 0 || params.output_region.height == 0 {
            return Err(DdiError::InvalidParameter("empty output region".into()));
        }

        Ok(params)
    }

    pub fn to_bytes(&self) -> [u8; PROCESSING_PARAMS_SIZE] {
        let mut data = [0u8; PROCESSING_PARAMS_SIZE];
        NativeEndian::write_u32(&mut data[0..4], self.output.0);
        NativeEndian::write_u16(&mut data[4..6], self.output_region.x);
        NativeEndian::write_u16(&mut data[6..8], self.output_region.y);
        NativeEndian::write_u16(&mut data[8..10], self.output_region.width);
        NativeEndian::write_u16(&mut data[10..12], self.output_region.height);
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_layout() {
        let params = ProcessingParams {
            output: SurfaceId(7),
            output_region: Rect {
                x: 0,
                y: 0,
                width: 640,
                height: 360,
            },
        };
        assert_eq!(ProcessingParams::parse(&params.to_bytes()).unwrap(), params);
    }

    #[test]
    fn parse_rejects_invalid() {
        assert!(ProcessingParams::parse(&[0; 4]).is_err());

        let mut params = ProcessingParams {
            output: SurfaceId::INVALID,
            output_region: Rect {
                x: 0,
                y: 0,
                width: 16,
                height: 16,
            },
        };
        assert!(matches!(
            ProcessingParams::parse(&params.to_bytes()),
            Err(DdiError::InvalidSurface(_))
        ));

        params.output = SurfaceId(1);
        params.output_region.height = 0;
        assert!(matches!(
            ProcessingParams::parse(&params.to_bytes()),
            Err(DdiError::InvalidParameter(_))
        ));
    }
}
