// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Buffers handed over by the application.
//!
//! Buffers are created with [`BufferManager::create_buffer`] and live in the manager's pool
//! until released. When a picture is rendered, each buffer passed to `RenderPicture` is
//! *attached* to the picture: the manager takes a zero-copy snapshot of its contents and
//! assigns it a slot, dense and stable per buffer type, that indexes the per-buffer state
//! arrays of the hardware. Attachments are dropped when the picture ends.

pub mod processing;
pub mod slice;

use std::collections::BTreeMap;

use bytes::Bytes;
use bytes::BytesMut;
use enumn::N;

use crate::BufferId;
use crate::DdiError;
use crate::Result;

/// Buffer types of the host ABI (`VABufferType`) that decode contexts can consume.
#[derive(N, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u32)]
pub enum BufferType {
    PictureParameter = 0,
    IqMatrix = 1,
    BitPlane = 2,
    SliceGroupMap = 3,
    SliceParameter = 4,
    /// Compressed bitstream.
    SliceData = 5,
    HuffmanTable = 12,
    Probability = 13,
    /// Decode processing (scaling) request.
    ProcPipelineParameter = 41,
}

/// A buffer in the manager's pool.
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    id: BufferId,
    raw_type: u32,
    element_size: usize,
    num_elements: usize,
    data: Bytes,
}

impl BufferDescriptor {
    pub fn id(&self) -> BufferId {
        self.id
    }

    /// The type as passed by the host, which may not be a type we know about.
    pub fn raw_type(&self) -> u32 {
        self.raw_type
    }

    pub fn buffer_type(&self) -> Option<BufferType> {
        BufferType::n(self.raw_type)
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    /// Size of the backing storage in bytes.
    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// A buffer attached to the current picture.
#[derive(Debug, Clone)]
pub struct AttachedBuffer {
    pub id: BufferId,
    pub buffer_type: BufferType,
    /// Slot among the attached buffers of the same type.
    pub slot: usize,
    pub element_size: usize,
    pub num_elements: usize,
    /// Contents at the time the buffer was rendered.
    pub data: Bytes,
}

/// Result of attaching one buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attachment {
    pub buffer_type: BufferType,
    pub slot: usize,
    /// Whether this call attached the buffer, as opposed to it being attached already.
    pub new: bool,
}

/// Owns the buffers of a context and the attachments of its current picture.
#[derive(Debug)]
pub struct BufferManager {
    next_id: u32,
    /// Largest allocation we accept for a single buffer.
    max_buffer_size: usize,
    buffers: BTreeMap<BufferId, BufferDescriptor>,
    /// Buffers attached to the current picture, in attachment order.
    attached: Vec<AttachedBuffer>,
    /// Number of attached buffers per type, i.e. the next free slot.
    slots: BTreeMap<BufferType, usize>,
}

impl BufferManager {
    pub fn new(max_buffer_size: usize) -> Self {
        Self {
            next_id: 0,
            max_buffer_size,
            buffers: Default::default(),
            attached: Default::default(),
            slots: Default::default(),
        }
    }

    /// Creates a buffer of `num_elements` elements of `element_size` bytes each, optionally
    /// initialized with `data`. The buffer is zero-filled otherwise.
    pub fn create_buffer(
        &mut self,
        raw_type: u32,
        element_size: usize,
        num_elements: usize,
        data: Option<&[u8]>,
    ) -> Result<BufferId> {
        let size = element_size.checked_mul(num_elements).ok_or_else(|| {
            DdiError::AllocationFailed(format!(
                "{} elements of {} bytes overflow",
                num_elements, element_size
            ))
        })?;

        if size == 0 {
            return Err(DdiError::InvalidParameter("zero-sized buffer".into()));
        }

        if size > self.max_buffer_size {
            return Err(DdiError::AllocationFailed(format!(
                "{} bytes requested, at most {} allowed",
                size, self.max_buffer_size
            )));
        }

        if let Some(data) = data {
            if data.len() != size {
                return Err(DdiError::InvalidParameter(format!(
                    "initial data is {} bytes, buffer is {} bytes",
                    data.len(),
                    size
                )));
            }
        }

        let id = BufferId(self.next_id);
        self.next_id = self
            .next_id
            .checked_add(1)
            .ok_or_else(|| DdiError::AllocationFailed("buffer identifiers exhausted".into()))?;

        let mut storage = Vec::new();
        storage
            .try_reserve_exact(size)
            .map_err(|e| DdiError::AllocationFailed(e.to_string()))?;
        match data {
            Some(data) => storage.extend_from_slice(data),
            None => storage.resize(size, 0),
        }

        log::debug!(
            "created buffer {:?} of type {} ({} x {} bytes)",
            id,
            raw_type,
            num_elements,
            element_size
        );

        self.buffers.insert(
            id,
            BufferDescriptor {
                id,
                raw_type,
                element_size,
                num_elements,
                data: Bytes::from(storage),
            },
        );

        Ok(id)
    }

    pub fn get_buffer(&self, id: BufferId) -> Result<&BufferDescriptor> {
        self.buffers.get(&id).ok_or(DdiError::BufferNotFound(id))
    }

    /// Writes `data` at `offset` into buffer `id`.
    ///
    /// Pictures the buffer has already been rendered into keep seeing the previous contents.
    pub fn write_buffer(&mut self, id: BufferId, offset: usize, contents: &[u8]) -> Result<()> {
        let buffer = self
            .buffers
            .get_mut(&id)
            .ok_or(DdiError::BufferNotFound(id))?;

        let end = offset
            .checked_add(contents.len())
            .filter(|&end| end <= buffer.data.len())
            .ok_or_else(|| {
                DdiError::InvalidParameter(format!(
                    "write of {} bytes at {} overflows buffer of {} bytes",
                    contents.len(),
                    offset,
                    buffer.data.len()
                ))
            })?;

        let mut data = match std::mem::take(&mut buffer.data).try_into_mut() {
            Ok(data) => data,
            // Still shared with an attached snapshot.
            Err(shared) => BytesMut::from(shared.as_ref()),
        };
        data[offset..end].copy_from_slice(contents);
        buffer.data = data.freeze();

        Ok(())
    }

    /// Removes buffer `id` from the pool. Pictures it is attached to keep their snapshot.
    pub fn release_buffer(&mut self, id: BufferId) -> Result<()> {
        self.buffers
            .remove(&id)
            .map(|_| ())
            .ok_or(DdiError::BufferNotFound(id))
    }

    /// Number of buffers in the pool.
    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Attaches all of `ids` to the current picture, or none of them.
    ///
    /// Every buffer must exist and have a type for which `accepts` returns `true`. Buffers
    /// already attached keep their slot.
    pub fn attach_all<F>(&mut self, ids: &[BufferId], accepts: F) -> Result<Vec<Attachment>>
    where
        F: Fn(BufferType) -> bool,
    {
        let mut types = Vec::with_capacity(ids.len());
        for &id in ids {
            let buffer = self.get_buffer(id)?;
            match buffer.buffer_type() {
                Some(buffer_type) if accepts(buffer_type) => types.push(buffer_type),
                _ => return Err(DdiError::UnsupportedBufferType(buffer.raw_type())),
            }
        }

        Ok(ids
            .iter()
            .zip(types)
            .map(|(&id, buffer_type)| self.attach(id, buffer_type))
            .collect())
    }

    fn attach(&mut self, id: BufferId, buffer_type: BufferType) -> Attachment {
        if let Some(attached) = self.attached.iter().find(|a| a.id == id) {
            return Attachment {
                buffer_type: attached.buffer_type,
                slot: attached.slot,
                new: false,
            };
        }

        // Only called with identifiers validated by `attach_all`.
        let buffer = &self.buffers[&id];
        let next_slot = self.slots.entry(buffer_type).or_default();
        let slot = *next_slot;
        *next_slot += 1;

        log::debug!("attached buffer {:?} as {:?} slot {}", id, buffer_type, slot);

        self.attached.push(AttachedBuffer {
            id,
            buffer_type,
            slot,
            element_size: buffer.element_size,
            num_elements: buffer.num_elements,
            data: buffer.data.clone(),
        });

        Attachment {
            buffer_type,
            slot,
            new: true,
        }
    }

    /// Returns the slot of buffer `id` within the current picture.
    pub fn index_of(&self, id: BufferId) -> Result<usize> {
        self.attached
            .iter()
            .find(|a| a.id == id)
            .map(|a| a.slot)
            .ok_or(DdiError::BufferNotFound(id))
    }

    /// Buffers attached to the current picture, in attachment order.
    pub fn attached(&self) -> &[AttachedBuffer] {
        &self.attached
    }

    /// The attached buffer of type `buffer_type` at `slot`.
    pub fn attached_at(&self, buffer_type: BufferType, slot: usize) -> Option<&AttachedBuffer> {
        self.attached
            .iter()
            .find(|a| a.buffer_type == buffer_type && a.slot == slot)
    }

    /// Number of buffers of `buffer_type` attached to the current picture.
    pub fn num_attached(&self, buffer_type: BufferType) -> usize {
        self.slots.get(&buffer_type).copied().unwrap_or(0)
    }

    /// Drops all attachments. Called when a picture ends or is abandoned.
    pub fn reset_picture(&mut self) {
        self.attached.clear();
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1 << 20;

    fn manager_with(types: &[BufferType]) -> (BufferManager, Vec<BufferId>) {
        let mut manager = BufferManager::new(MAX);
        let ids = types
            .iter()
            .map(|&t| manager.create_buffer(t as u32, 4, 2, None).unwrap())
            .collect();
        (manager, ids)
    }

    #[test]
    fn ids_are_unique() {
        let mut manager = BufferManager::new(MAX);
        let a = manager.create_buffer(0, 16, 1, None).unwrap();
        manager.release_buffer(a).unwrap();
        let b = manager.create_buffer(0, 16, 1, None).unwrap();
        assert_ne!(a, b);
        assert!(matches!(
            manager.get_buffer(a),
            Err(DdiError::BufferNotFound(id)) if id == a
        ));
    }

    #[test]
    fn create_validates_sizes() {
        let mut manager = BufferManager::new(MAX);
        assert!(matches!(
            manager.create_buffer(5, MAX, 2, None),
            Err(DdiError::AllocationFailed(_))
        ));
        assert!(matches!(
            manager.create_buffer(5, usize::MAX, 2, None),
            Err(DdiError::AllocationFailed(_))
        ));
        assert!(matches!(
            manager.create_buffer(5, 0, 2, None),
            Err(DdiError::InvalidParameter(_))
        ));
        assert!(matches!(
            manager.create_buffer(5, 4, 1, Some([0u8; 3].as_slice())),
            Err(DdiError::InvalidParameter(_))
        ));

        let id = manager
            .create_buffer(5, 2, 2, Some([1u8, 2, 3, 4].as_slice()))
            .unwrap();
        let buffer = manager.get_buffer(id).unwrap();
        assert_eq!(buffer.size(), 4);
        assert_eq!(buffer.num_elements(), 2);
        assert_eq!(buffer.buffer_type(), Some(BufferType::SliceData));
        assert_eq!(&buffer.data()[..], &[1, 2, 3, 4]);
    }

    #[test]
    fn slots_are_dense_per_type() {
        let (mut manager, ids) = manager_with(&[
            BufferType::SliceParameter,
            BufferType::SliceData,
            BufferType::SliceParameter,
            BufferType::SliceData,
            BufferType::PictureParameter,
        ]);

        manager.attach_all(&ids, |_| true).unwrap();

        assert_eq!(manager.index_of(ids[0]).unwrap(), 0);
        assert_eq!(manager.index_of(ids[1]).unwrap(), 0);
        assert_eq!(manager.index_of(ids[2]).unwrap(), 1);
        assert_eq!(manager.index_of(ids[3]).unwrap(), 1);
        assert_eq!(manager.index_of(ids[4]).unwrap(), 0);
        assert_eq!(manager.num_attached(BufferType::SliceData), 2);
    }

    #[test]
    fn index_of_is_stable() {
        let (mut manager, ids) = manager_with(&[BufferType::SliceData, BufferType::SliceData]);

        manager.attach_all(&ids[1..], |_| true).unwrap();
        let first = manager.index_of(ids[1]).unwrap();

        let attachments = manager.attach_all(&ids, |_| true).unwrap();
        assert!(attachments[0].new);
        assert!(!attachments[1].new);

        for _ in 0..3 {
            assert_eq!(manager.index_of(ids[1]).unwrap(), first);
        }
        assert_eq!(manager.index_of(ids[0]).unwrap(), 1);
    }

    #[test]
    fn attach_is_all_or_nothing() {
        let (mut manager, mut ids) =
            manager_with(&[BufferType::PictureParameter, BufferType::SliceData]);
        let unknown = manager.create_buffer(99, 4, 1, None).unwrap();
        ids.push(unknown);

        assert!(matches!(
            manager.attach_all(&ids, |_| true),
            Err(DdiError::UnsupportedBufferType(99))
        ));
        assert!(manager.attached().is_empty());
        for id in ids {
            assert!(matches!(
                manager.index_of(id),
                Err(DdiError::BufferNotFound(_))
            ));
        }
    }

    #[test]
    fn attach_rejects_types_not_accepted() {
        let (mut manager, ids) = manager_with(&[BufferType::SliceData, BufferType::HuffmanTable]);

        assert!(matches!(
            manager.attach_all(&ids, |t| t != BufferType::HuffmanTable),
            Err(DdiError::UnsupportedBufferType(12))
        ));
        assert!(manager.attached().is_empty());
    }

    #[test]
    fn attach_missing_buffer() {
        let (mut manager, _) = manager_with(&[BufferType::SliceData]);
        assert!(matches!(
            manager.attach_all(&[BufferId(42)], |_| true),
            Err(DdiError::BufferNotFound(BufferId(42)))
        ));
    }

    #[test]
    fn attachments_are_snapshots() {
        let mut manager = BufferManager::new(MAX);
        let id = manager
            .create_buffer(
                BufferType::SliceData as u32,
                1,
                4,
                Some([1u8, 2, 3, 4].as_slice()),
            )
            .unwrap();
        manager.attach_all(&[id], |_| true).unwrap();

        manager.write_buffer(id, 2, &[9, 9]).unwrap();
        assert_eq!(&manager.get_buffer(id).unwrap().data()[..], &[1, 2, 9, 9]);
        assert_eq!(&manager.attached()[0].data[..], &[1, 2, 3, 4]);

        manager.release_buffer(id).unwrap();
        assert_eq!(manager.num_buffers(), 0);
        assert_eq!(&manager.attached()[0].data[..], &[1, 2, 3, 4]);

        manager.reset_picture();
        assert!(manager.attached().is_empty());
        assert_eq!(manager.num_attached(BufferType::SliceData), 0);
    }

    #[test]
    fn unshared_buffers_are_written_in_place() {
        let mut manager = BufferManager::new(MAX);
        let id = manager.create_buffer(0, 1, 64, None).unwrap();
        let storage = manager.get_buffer(id).unwrap().data().as_ptr();

        manager.write_buffer(id, 8, &[7; 8]).unwrap();
        let data = manager.get_buffer(id).unwrap().data();
        assert_eq!(data.as_ptr(), storage);
        assert_eq!(&data[8..16], &[7; 8]);
        assert_eq!(data.len(), 64);
    }

    #[test]
    fn write_out_of_bounds() {
        let mut manager = BufferManager::new(MAX);
        let id = manager.create_buffer(0, 1, 4, None).unwrap();
        assert!(matches!(
            manager.write_buffer(id, 3, &[0, 0]),
            Err(DdiError::InvalidParameter(_))
        ));
        assert!(matches!(
            manager.write_buffer(id, usize::MAX, &[0]),
            Err(DdiError::InvalidParameter(_))
        ));
    }
}
