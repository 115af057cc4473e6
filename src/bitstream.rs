// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Layout of the compressed bitstream of a picture.
//!
//! Each slice data buffer rendered into a picture forms one slice group. The hardware sees the
//! groups as a single bitstream in which group `i` starts right after the last byte of group
//! `i - 1`. Normally every group is read from the buffer it was submitted in. When one of them
//! is larger than what the hardware accepts for a single slice buffer, all groups are copied
//! into one contiguous region instead, which the hardware then addresses with a single base
//! and per-slice offsets.

use bytes::Bytes;

use crate::DdiError;
use crate::Result;

/// Bitstream size limits of the hardware.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct BitstreamLimits {
    /// Largest slice data buffer that can be handed to the hardware as is.
    pub slice_size_limit: usize,
    /// Largest bitstream the hardware can address for one picture.
    pub max_bitstream_size: usize,
}

/// One slice data buffer of the current picture.
#[derive(Clone, Debug)]
pub struct SliceGroup {
    /// Slot of the slice data buffer the group comes from.
    pub slot: usize,
    pub data: Bytes,
}

impl SliceGroup {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

/// Where the hardware reads a bitstream segment from.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum SegmentSource {
    /// The slice data buffer at the given slot.
    Buffer(usize),
    /// The combined bitstream region.
    Combined,
}

/// The part of the bitstream holding one slice group, as addressed by the hardware.
#[derive(Clone, Debug)]
pub struct BitstreamSegment {
    pub group: usize,
    pub source: SegmentSource,
    /// Offset of the segment within its source.
    pub offset: usize,
    pub data: Bytes,
}

impl BitstreamSegment {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug)]
pub struct BitstreamAssembler {
    limits: BitstreamLimits,
    groups: Vec<SliceGroup>,
    /// All groups back to back, once combination took place.
    combined: Option<Bytes>,
}

impl BitstreamAssembler {
    pub fn new(limits: BitstreamLimits) -> Self {
        Self {
            limits,
            groups: Default::default(),
            combined: None,
        }
    }

    pub fn limits(&self) -> BitstreamLimits {
        self.limits
    }

    /// Forgets the groups of the current picture.
    pub fn reset(&mut self) {
        self.groups.clear();
        self.combined = None;
    }

    /// Adds the slice data buffer at `slot` as the next slice group. Returns the group index.
    pub fn push_group(&mut self, slot: usize, data: Bytes) -> usize {
        // A new group invalidates any previous combination.
        self.combined = None;
        self.groups.push(SliceGroup { slot, data });
        self.groups.len() - 1
    }

    pub fn groups(&self) -> &[SliceGroup] {
        &self.groups
    }

    pub fn num_groups(&self) -> usize {
        self.groups.len()
    }

    /// Total number of bitstream bytes of the current picture.
    pub fn total_size(&self) -> usize {
        self.groups.iter().map(SliceGroup::len).sum()
    }

    /// Returns the offset of slice group `group` from the start of the picture's bitstream.
    pub fn get_offset(&self, group: usize) -> Result<usize> {
        if group >= self.groups.len() {
            return Err(DdiError::InvalidParameter(format!(
                "slice group {} out of {}",
                group,
                self.groups.len()
            )));
        }

        Ok(self.groups[..group].iter().map(SliceGroup::len).sum())
    }

    /// Whether a slice group is too large to be handed to the hardware as is.
    pub fn needs_combination(&self) -> bool {
        self.groups
            .iter()
            .any(|g| g.len() > self.limits.slice_size_limit)
    }

    pub fn is_combined(&self) -> bool {
        self.combined.is_some()
    }

    /// The combined bitstream region, if combination took place.
    pub fn combined(&self) -> Option<&Bytes> {
        self.combined.as_ref()
    }

    /// Copies all slice groups into one contiguous region if one of them exceeds the slice
    /// size limit. Returns whether the groups are combined.
    pub fn combine_if_needed(&mut self) -> Result<bool> {
        let total = self.total_size();
        if total > self.limits.max_bitstream_size {
            return Err(DdiError::BitstreamTooLarge {
                size: total,
                limit: self.limits.max_bitstream_size,
            });
        }

        if self.combined.is_some() {
            return Ok(true);
        }

        if !self.needs_combination() {
            return Ok(false);
        }

        log::warn!(
            "slice exceeds {} bytes, combining {} groups into {} bytes",
            self.limits.slice_size_limit,
            self.groups.len(),
            total
        );

        let mut combined = Vec::new();
        combined
            .try_reserve_exact(total)
            .map_err(|e| DdiError::AllocationFailed(e.to_string()))?;
        for group in &self.groups {
            combined.extend_from_slice(&group.data);
        }

        self.combined = Some(Bytes::from(combined));

        Ok(true)
    }

    /// The segments the hardware reads the bitstream from, one per slice group.
    pub fn segments(&self) -> Vec<BitstreamSegment> {
        let mut offset = 0;
        self.groups
            .iter()
            .enumerate()
            .map(|(index, group)| {
                let segment = match &self.combined {
                    Some(combined) => BitstreamSegment {
                        group: index,
                        source: SegmentSource::Combined,
                        offset,
                        data: combined.slice(offset..offset + group.len()),
                    },
                    None => BitstreamSegment {
                        group: index,
                        source: SegmentSource::Buffer(group.slot),
                        offset: 0,
                        data: group.data.clone(),
                    },
                };
                offset += group.len();
                segment
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler(slice_size_limit: usize, max_bitstream_size: usize) -> BitstreamAssembler {
        BitstreamAssembler::new(BitstreamLimits {
            slice_size_limit,
            max_bitstream_size,
        })
    }

    #[test]
    fn offsets_are_prefix_sums() {
        let mut assembler = assembler(1024, 4096);
        let sizes = [100usize, 7, 0, 300];
        for (slot, &size) in sizes.iter().enumerate() {
            assert_eq!(assembler.push_group(slot, Bytes::from(vec![0u8; size])), slot);
        }

        for i in 0..sizes.len() {
            assert_eq!(
                assembler.get_offset(i).unwrap(),
                sizes[..i].iter().sum::<usize>()
            );
        }
        assert!(matches!(
            assembler.get_offset(4),
            Err(DdiError::InvalidParameter(_))
        ));
        assert_eq!(assembler.total_size(), 407);
    }

    #[test]
    fn small_groups_pass_through() {
        let mut assembler = assembler(1024, 4096);
        let first = Bytes::from(vec![1u8; 100]);
        assembler.push_group(0, first.clone());
        assembler.push_group(1, Bytes::from(vec![2u8; 50]));

        assert!(!assembler.combine_if_needed().unwrap());
        assert!(!assembler.is_combined());

        let segments = assembler.segments();
        assert_eq!(segments[0].source, SegmentSource::Buffer(0));
        assert_eq!(segments[1].source, SegmentSource::Buffer(1));
        assert_eq!(segments[1].offset, 0);
        // No copy took place.
        assert_eq!(segments[0].data.as_ptr(), first.as_ptr());
    }

    #[test]
    fn oversized_slice_is_combined() {
        let mut assembler = assembler(8000, 1 << 20);
        assembler.push_group(0, Bytes::from(vec![0xaa; 10_000]));

        assert!(assembler.needs_combination());
        assert!(assembler.combine_if_needed().unwrap());
        assert_eq!(assembler.get_offset(0).unwrap(), 0);

        let segments = assembler.segments();
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].source, SegmentSource::Combined);
        assert_eq!(segments[0].offset, 0);
        assert_eq!(segments[0].len(), 10_000);
    }

    #[test]
    fn combination_preserves_offsets() {
        let mut assembler = assembler(150, 1 << 20);
        assembler.push_group(0, Bytes::from(vec![1u8; 100]));
        assembler.push_group(1, Bytes::from(vec![2u8; 200]));
        assembler.push_group(2, Bytes::from(vec![3u8; 30]));

        let before: Vec<usize> = (0..3).map(|i| assembler.get_offset(i).unwrap()).collect();
        assert!(assembler.combine_if_needed().unwrap());
        let after: Vec<usize> = (0..3).map(|i| assembler.get_offset(i).unwrap()).collect();
        assert_eq!(before, after);

        let combined = assembler.combined().unwrap();
        assert_eq!(combined.len(), 330);
        for segment in assembler.segments() {
            assert_eq!(segment.offset, after[segment.group]);
            assert!(segment.data.iter().all(|&b| b == segment.group as u8 + 1));
        }
    }

    #[test]
    fn bitstream_too_large() {
        let mut assembler = assembler(100, 250);
        assembler.push_group(0, Bytes::from(vec![0u8; 200]));
        assembler.push_group(1, Bytes::from(vec![0u8; 100]));

        assert!(matches!(
            assembler.combine_if_needed(),
            Err(DdiError::BitstreamTooLarge {
                size: 300,
                limit: 250
            })
        ));
        assert!(!assembler.is_combined());
    }

    #[test]
    fn reset_forgets_groups() {
        let mut assembler = assembler(10, 1024);
        assembler.push_group(0, Bytes::from(vec![0u8; 20]));
        assembler.combine_if_needed().unwrap();

        assembler.reset();
        assert_eq!(assembler.num_groups(), 0);
        assert!(!assembler.is_combined());
        assert!(assembler.segments().is_empty());
    }
}
