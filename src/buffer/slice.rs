// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Slice parameter parsing.
//!
//! All slice parameter structures of the host ABI start with the same three fields
//! (`VASliceParameterBufferBase`): the size of the slice data, its offset within the slice
//! data buffer it belongs to, and a flag telling whether the buffer holds the whole slice or
//! only part of it. This is all the core needs to know about slices; the codec-specific rest
//! of each element is passed through to the hardware untouched.

use byteorder::ByteOrder;
use byteorder::NativeEndian;
use enumn::N;

use crate::DdiError;
use crate::Result;

/// Size of the common header of slice parameter elements.
pub const SLICE_PARAMETER_BASE_SIZE: usize = 12;

/// Which part of a slice the slice data buffer holds (`VA_SLICE_DATA_FLAG_*`).
#[derive(N, Copy, Clone, Debug, Default, PartialEq, Eq)]
#[repr(u32)]
pub enum SliceDataFlag {
    #[default]
    All = 0x00,
    Begin = 0x01,
    Middle = 0x02,
    End = 0x04,
}

/// The common header of one slice parameter element.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SliceParameter {
    pub data_size: u32,
    /// Offset of the slice within its slice data buffer.
    pub data_offset: u32,
    pub flag: SliceDataFlag,
}

/// One slice as presented to the hardware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct SliceControl {
    /// Slice group the slice belongs to.
    pub group: usize,
    /// Index of the slice within its slice parameter buffer.
    pub element: usize,
    /// Offset of the slice from the start of the picture's bitstream.
    pub offset: u32,
    pub size: u32,
    pub flag: SliceDataFlag,
}

/// Parses the headers of the `num_elements` slice parameter elements contained in `data`.
pub fn parse_slice_parameters(
    data: &[u8],
    element_size: usize,
    num_elements: usize,
) -> Result<Vec<SliceParameter>> {
    if num_elements == 0 {
        return Err(DdiError::InvalidParameter(
            "slice parameter buffer without elements".into(),
        ));
    }

    if element_size < SLICE_PARAMETER_BASE_SIZE {
        return Err(DdiError::InvalidParameter(format!(
            "slice parameter elements of {} bytes are too small",
            element_size
        )));
    }

    if element_size.saturating_mul(num_elements) > data.len() {
        return Err(DdiError::InvalidParameter(format!(
            "{} slice parameter elements do not fit in {} bytes",
            num_elements,
            data.len()
        )));
    }

    data.chunks_exact(element_size)
        .take(num_elements)
        .map(|element| {
            let flag = NativeEndian::read_u32(&element[8..12]);
            Ok(SliceParameter {
                data_size: NativeEndian::read_u32(&element[0..4]),
                data_offset: NativeEndian::read_u32(&element[4..8]),
                flag: SliceDataFlag::n(flag).ok_or_else(|| {
                    DdiError::InvalidParameter(format!("invalid slice data flag {:#x}", flag))
                })?,
            })
        })
        .collect()
}

/// Builds the slice controls of slice group `group`, whose bitstream starts at `group_offset`
/// and is `group_len` bytes long.
pub fn slice_controls(
    group: usize,
    params: &[SliceParameter],
    group_offset: usize,
    group_len: usize,
) -> Result<Vec<SliceControl>> {
    params
        .iter()
        .enumerate()
        .map(|(element, param)| {
            (param.data_offset as usize)
                .checked_add(param.data_size as usize)
                .filter(|&end| end <= group_len)
                .ok_or_else(|| {
                    DdiError::InvalidParameter(format!(
                        "slice {} of group {} ({} bytes at {}) overflows the group ({} bytes)",
                        element, group, param.data_size, param.data_offset, group_len
                    ))
                })?;

            let offset = group_offset
                .checked_add(param.data_offset as usize)
                .and_then(|offset| u32::try_from(offset).ok())
                .ok_or_else(|| DdiError::InvalidParameter("slice offset overflow".into()))?;

            Ok(SliceControl {
                group,
                element,
                offset,
                size: param.data_size,
                flag: param.flag,
            })
        })
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Lays out slice parameter elements of `element_size` bytes, each holding the
    /// `(data_size, data_offset)` pair of one slice with the `All` flag.
    pub(crate) fn encode_slice_parameters(slices: &[(u32, u32)], element_size: usize) -> Vec<u8> {
        let mut data = vec![0u8; slices.len() * element_size];
        for (element, &(size, offset)) in data.chunks_exact_mut(element_size).zip(slices) {
            NativeEndian::write_u32(&mut element[0..4], size);
            NativeEndian::write_u32(&mut element[4..8], offset);
            NativeEndian::write_u32(&mut element[8..12], SliceDataFlag::All as u32);
        }
        data
    }

    #[test]
    fn parse_elements() {
        let data = encode_slice_parameters(&[(100, 0), (50, 100)], 24);
        let params = parse_slice_parameters(&data, 24, 2).unwrap();
        assert_eq!(
            params,
            vec![
                SliceParameter {
                    data_size: 100,
                    data_offset: 0,
                    flag: SliceDataFlag::All
                },
                SliceParameter {
                    data_size: 50,
                    data_offset: 100,
                    flag: SliceDataFlag::All
                },
            ]
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert!(parse_slice_parameters(&[], 12, 0).is_err());
        assert!(parse_slice_parameters(&[0; 8], 8, 1).is_err());

        let mut data = encode_slice_parameters(&[(4, 0)], 12);
        NativeEndian::write_u32(&mut data[8..12], 0x10);
        assert!(matches!(
            parse_slice_parameters(&data, 12, 1),
            Err(DdiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn controls_are_rebased_on_group_offset() {
        let data = encode_slice_parameters(&[(10, 0), (20, 10)], 12);
        let params = parse_slice_parameters(&data, 12, 2).unwrap();

        let controls = slice_controls(1, &params, 300, 30).unwrap();
        assert_eq!(controls[0].offset, 300);
        assert_eq!(controls[1].offset, 310);
        assert_eq!(controls[1].size, 20);
        assert_eq!(controls[1].group, 1);
        assert_eq!(controls[1].element, 1);

        assert!(matches!(
            slice_controls(1, &params, 300, 29),
            Err(DdiError::InvalidParameter(_))
        ));
    }

    #[test]
    fn controls_reject_wrapping_bounds() {
        let data = encode_slice_parameters(&[(u32::MAX, u32::MAX)], 12);
        let params = parse_slice_parameters(&data, 12, 1).unwrap();
        assert!(matches!(
            slice_controls(0, &params, 0, u32::MAX as usize),
            Err(DdiError::InvalidParameter(_))
        ));

        let data = encode_slice_parameters(&[(1, 1)], 12);
        let params = parse_slice_parameters(&data, 12, 1).unwrap();
        assert!(matches!(
            slice_controls(0, &params, usize::MAX, usize::MAX),
            Err(DdiError::InvalidParameter(_))
        ));
    }
}
