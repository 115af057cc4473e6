// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Picture submission core of a hardware video decode driver.
//!
//! A host media runtime drives each decode context through the `BeginPicture`,
//! `RenderPicture` and `EndPicture` entry points. This crate implements what happens between
//! those calls: the per-context session state machine ([`decoder::DecodeContext`]), the buffers
//! the application hands over ([`buffer::BufferManager`]), the slice data layout presented to
//! the hardware ([`bitstream::BitstreamAssembler`]) and the reference pictures the hardware
//! reads from ([`dpb::ReferenceTracker`]).
//!
//! Command encoding and completion tracking are left to a [`bridge::CommandBridge`]
//! implementation. [`bridge::null::NullHardware`] lets the whole pipeline run without silicon.

pub mod bitstream;
pub mod bridge;
pub mod buffer;
pub mod codec;
pub mod decoder;
pub mod dpb;
pub mod driver;
pub mod error;
pub mod registry;

pub use error::DdiError;
pub use error::Result;

/// Identifier of a decode context, as handed out to the host.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContextId(pub u32);

/// Identifier of a buffer created within a context.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BufferId(pub u32);

/// Identifier of a video surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SurfaceId(pub u32);

impl SurfaceId {
    /// Value used by the host ABI to say "no surface" (`VA_INVALID_SURFACE`).
    pub const INVALID: SurfaceId = SurfaceId(0xffff_ffff);
    /// Reserved identifier of the synthesized dummy reference. Never handed out to the host.
    pub const DUMMY: SurfaceId = SurfaceId(0xffff_fffe);

    /// Whether this identifier is reserved by the driver and cannot name a host surface.
    pub fn is_reserved(&self) -> bool {
        *self == Self::INVALID || *self == Self::DUMMY
    }
}

impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Width of a hardware macroblock, in pixels.
pub const MB_SIZE: u32 = 16;

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    /// Whether `self` can contain `other`.
    pub fn can_contain(&self, other: Self) -> bool {
        self.width >= other.width && self.height >= other.height
    }

    /// Width in macroblock units, rounded up.
    pub fn width_in_mbs(&self) -> u16 {
        self.width.div_ceil(MB_SIZE).min(u16::MAX as u32) as u16
    }

    /// Height in macroblock units, rounded up.
    pub fn height_in_mbs(&self) -> u16 {
        self.height.div_ceil(MB_SIZE).min(u16::MAX as u32) as u16
    }
}

impl From<(u32, u32)> for Resolution {
    fn from(value: (u32, u32)) -> Self {
        Self {
            width: value.0,
            height: value.1,
        }
    }
}

impl From<Resolution> for (u32, u32) {
    fn from(value: Resolution) -> Self {
        (value.width, value.height)
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// A video surface known to the driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Surface {
    pub id: SurfaceId,
    pub resolution: Resolution,
}

impl Surface {
    pub fn new(id: SurfaceId, resolution: Resolution) -> Self {
        Self { id, resolution }
    }
}
