// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Reference picture tracking.
//!
//! The [`ReferenceTracker`] knows which surfaces of a context hold decoded pictures that the
//! hardware may read from. References requested by a picture that are not tracked, or whose
//! content is known to be broken, are replaced by a dummy surface so that the command stream
//! never points at a surface that does not exist.

use std::collections::VecDeque;

use crate::Resolution;
use crate::Surface;
use crate::SurfaceId;

/// A decoded picture available as a reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ReferenceEntry {
    pub surface: Surface,
    /// Whether the surface content can be used for prediction.
    pub valid: bool,
}

/// A reference slot of the current picture after resolution.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ResolvedReference {
    /// Position of the reference in the codec's reference list.
    pub slot: usize,
    /// Surface named by the picture parameters.
    pub requested: SurfaceId,
    /// Surface the hardware will actually read from.
    pub surface: Surface,
}

impl ResolvedReference {
    /// Whether the requested surface was replaced by the dummy reference.
    pub fn is_concealed(&self) -> bool {
        self.surface.id != self.requested
    }
}

pub struct ReferenceTracker {
    /// Tracked references, least recently decoded first.
    entries: VecDeque<ReferenceEntry>,
    /// The maximum number of references that can be tracked.
    max_entries: usize,
    /// Resolution given to the dummy reference when it gets created.
    dummy_resolution: Resolution,
    dummy: Option<Surface>,
    num_concealed: u64,
}

impl ReferenceTracker {
    pub fn new(max_entries: usize, dummy_resolution: Resolution) -> Self {
        Self {
            entries: Default::default(),
            max_entries,
            dummy_resolution,
            dummy: None,
            num_concealed: 0,
        }
    }

    /// Records `surface` as holding a freshly decoded, valid picture.
    ///
    /// If the tracker is full, the least recently decoded reference is dropped.
    pub fn track(&mut self, surface: Surface) {
        self.entries.retain(|e| e.surface.id != surface.id);

        if self.max_entries == 0 {
            return;
        }

        while self.entries.len() >= self.max_entries {
            if let Some(evicted) = self.entries.pop_front() {
                log::debug!("evicting reference {}", evicted.surface.id);
            }
        }

        log::debug!("tracking reference {}", surface.id);
        self.entries.push_back(ReferenceEntry {
            surface,
            valid: true,
        });
    }

    /// Marks the content of `id` as unusable for prediction. Returns whether `id` was tracked.
    pub fn invalidate(&mut self, id: SurfaceId) -> bool {
        match self.entries.iter_mut().find(|e| e.surface.id == id) {
            Some(entry) => {
                entry.valid = false;
                true
            }
            None => false,
        }
    }

    /// Stops tracking `id`, e.g. because the surface has been destroyed.
    pub fn remove(&mut self, id: SurfaceId) -> Option<ReferenceEntry> {
        let position = self.entries.iter().position(|e| e.surface.id == id)?;
        self.entries.remove(position)
    }

    pub fn get(&self, id: SurfaceId) -> Option<&ReferenceEntry> {
        self.entries.iter().find(|e| e.surface.id == id)
    }

    pub fn entries(&self) -> impl Iterator<Item = &ReferenceEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Returns the dummy reference, creating it on first use.
    pub fn ensure_dummy_reference(&mut self) -> Surface {
        let resolution = self.dummy_resolution;
        *self.dummy.get_or_insert_with(|| {
            log::debug!("creating dummy reference ({})", resolution);
            Surface::new(SurfaceId::DUMMY, resolution)
        })
    }

    /// The dummy reference, if it has been created.
    pub fn dummy(&self) -> Option<Surface> {
        self.dummy
    }

    /// Returns the surface the hardware should read from when `requested` is asked for.
    pub fn resolve(&mut self, requested: SurfaceId) -> Surface {
        let reason = match self.get(requested) {
            Some(entry) if entry.valid => return entry.surface,
            Some(_) => "invalid",
            None => "missing",
        };

        log::warn!(
            "reference {} is {}, concealing with the dummy reference",
            requested,
            reason
        );
        self.ensure_dummy_reference()
    }

    /// Resolves a codec reference list. [`SurfaceId::INVALID`] entries mean "no reference" and
    /// are left out.
    ///
    /// `overwritten` is the surface the picture is decoded into. Its current content is left
    /// untouched in the tracker but is never handed out as a reference of that picture.
    pub fn resolve_list(
        &mut self,
        requested: &[SurfaceId],
        overwritten: Option<SurfaceId>,
    ) -> Vec<ResolvedReference> {
        requested
            .iter()
            .enumerate()
            .filter(|&(_, &id)| id != SurfaceId::INVALID)
            .map(|(slot, &id)| {
                let surface = if Some(id) == overwritten {
                    log::warn!("reference {} is the decode target, concealing", id);
                    self.ensure_dummy_reference()
                } else {
                    self.resolve(id)
                };

                ResolvedReference {
                    slot,
                    requested: id,
                    surface,
                }
            })
            .collect()
    }

    /// Accounts for the concealed entries of a reference list the hardware has accepted.
    pub fn record_concealed(&mut self, references: &[ResolvedReference]) {
        self.num_concealed += references.iter().filter(|r| r.is_concealed()).count() as u64;
    }

    /// Number of submitted references that were replaced by the dummy.
    pub fn num_concealed(&self) -> u64 {
        self.num_concealed
    }
}

impl std::fmt::Debug for ReferenceTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceTracker")
            .field("entries", &self.entries)
            .field("max_entries", &self.max_entries)
            .field("dummy", &self.dummy)
            .finish()
    }
}
