// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Mapping from host profiles and entry points to decode components.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::OnceLock;

use enumn::N;

use crate::codec::DecodeCodec;
use crate::DdiError;
use crate::Result;

/// Profiles of the host ABI (`VAProfile`).
#[derive(N, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Profile {
    Mpeg2Simple = 0,
    Mpeg2Main = 1,
    H264Main = 6,
    H264High = 7,
    JpegBaseline = 12,
    H264ConstrainedBaseline = 13,
    Vp8Version0_3 = 14,
    HevcMain = 17,
    HevcMain10 = 18,
    Vp9Profile0 = 19,
    Vp9Profile1 = 20,
    Vp9Profile2 = 21,
    Vp9Profile3 = 22,
    HevcMain12 = 23,
    HevcMain422_10 = 24,
    HevcMain422_12 = 25,
    HevcMain444 = 26,
    HevcMain444_10 = 27,
    HevcMain444_12 = 28,
    HevcSccMain = 29,
    HevcSccMain10 = 30,
    HevcSccMain444 = 31,
    Av1Profile0 = 32,
    Av1Profile1 = 33,
    HevcSccMain444_10 = 34,
}

/// Entry points of the host ABI (`VAEntrypoint`).
#[derive(N, Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(i32)]
pub enum Entrypoint {
    Vld = 1,
    EncSlice = 6,
    EncPicture = 7,
    EncSliceLp = 8,
    VideoProc = 10,
}

/// Key under which components are registered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentInfo {
    pub profile: Profile,
    pub entrypoint: Entrypoint,
}

impl ComponentInfo {
    pub fn new(profile: Profile, entrypoint: Entrypoint) -> Self {
        Self {
            profile,
            entrypoint,
        }
    }

    /// Builds a key from raw host values.
    pub fn from_raw(profile: i32, entrypoint: i32) -> Option<Self> {
        Some(Self::new(Profile::n(profile)?, Entrypoint::n(entrypoint)?))
    }
}

/// Codec families to register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CodecSet {
    pub h264: bool,
    pub h265: bool,
    pub av1: bool,
    pub vp8: bool,
    pub vp9: bool,
    pub mpeg2: bool,
    pub jpeg: bool,
}

impl CodecSet {
    pub fn all() -> Self {
        Self {
            h264: true,
            h265: true,
            av1: true,
            vp8: true,
            vp9: true,
            mpeg2: true,
            jpeg: true,
        }
    }

    pub fn none() -> Self {
        Self {
            h264: false,
            h265: false,
            av1: false,
            vp8: false,
            vp9: false,
            mpeg2: false,
            jpeg: false,
        }
    }

    /// The codec families compiled into the crate.
    pub fn from_cargo_features() -> Self {
        Self {
            h264: cfg!(feature = "h264"),
            h265: cfg!(feature = "h265"),
            av1: cfg!(feature = "av1"),
            vp8: cfg!(feature = "vp8"),
            vp9: cfg!(feature = "vp9"),
            mpeg2: cfg!(feature = "mpeg2"),
            jpeg: cfg!(feature = "jpeg"),
        }
    }
}

impl Default for CodecSet {
    fn default() -> Self {
        Self::from_cargo_features()
    }
}

type CodecBuilder = fn() -> Box<dyn DecodeCodec>;

#[cfg_attr(
    not(any(
        feature = "h264",
        feature = "h265",
        feature = "av1",
        feature = "vp8",
        feature = "vp9",
        feature = "mpeg2",
        feature = "jpeg"
    )),
    allow(dead_code)
)]
fn build<C: DecodeCodec + Default + 'static>() -> Box<dyn DecodeCodec> {
    Box::new(C::default())
}

/// Known decode components.
pub struct Registry {
    components: BTreeMap<ComponentInfo, CodecBuilder>,
}

static GLOBAL_REGISTRY: OnceLock<Arc<Registry>> = OnceLock::new();

impl Registry {
    #[cfg_attr(
        not(any(
            feature = "h264",
            feature = "h265",
            feature = "av1",
            feature = "vp8",
            feature = "vp9",
            feature = "mpeg2",
            feature = "jpeg"
        )),
        allow(unused_mut, unused_variables)
    )]
    pub fn new(codecs: CodecSet) -> Self {
        let mut registry = Self {
            components: Default::default(),
        };

        #[cfg(feature = "h264")]
        if codecs.h264 {
            registry.register_all(
                &[
                    Profile::H264Main,
                    Profile::H264High,
                    Profile::H264ConstrainedBaseline,
                ],
                build::<crate::codec::h264::H264Codec>,
            );
        }

        #[cfg(feature = "h265")]
        if codecs.h265 {
            registry.register_all(
                &[
                    Profile::HevcMain,
                    Profile::HevcMain10,
                    Profile::HevcMain12,
                    Profile::HevcMain422_10,
                    Profile::HevcMain422_12,
                    Profile::HevcMain444,
                    Profile::HevcMain444_10,
                    Profile::HevcMain444_12,
                    Profile::HevcSccMain,
                    Profile::HevcSccMain10,
                    Profile::HevcSccMain444,
                    Profile::HevcSccMain444_10,
                ],
                build::<crate::codec::h265::H265Codec>,
            );
        }

        #[cfg(feature = "av1")]
        if codecs.av1 {
            registry.register_all(
                &[Profile::Av1Profile0],
                build::<crate::codec::av1::Av1Codec>,
            );
        }

        #[cfg(feature = "jpeg")]
        if codecs.jpeg {
            registry.register_all(
                &[Profile::JpegBaseline],
                build::<crate::codec::jpeg::JpegCodec>,
            );
        }

        #[cfg(feature = "mpeg2")]
        if codecs.mpeg2 {
            registry.register_all(
                &[Profile::Mpeg2Simple, Profile::Mpeg2Main],
                build::<crate::codec::mpeg2::Mpeg2Codec>,
            );
        }

        #[cfg(feature = "vp8")]
        if codecs.vp8 {
            registry.register_all(
                &[Profile::Vp8Version0_3],
                build::<crate::codec::vp8::Vp8Codec>,
            );
        }

        #[cfg(feature = "vp9")]
        if codecs.vp9 {
            registry.register_all(
                &[
                    Profile::Vp9Profile0,
                    Profile::Vp9Profile1,
                    Profile::Vp9Profile2,
                    Profile::Vp9Profile3,
                ],
                build::<crate::codec::vp9::Vp9Codec>,
            );
        }

        log::debug!("registered {} decode components", registry.components.len());

        registry
    }

    /// The registry of every codec compiled in, built on first use.
    pub fn global() -> Arc<Registry> {
        GLOBAL_REGISTRY
            .get_or_init(|| Arc::new(Registry::new(CodecSet::from_cargo_features())))
            .clone()
    }

    #[cfg_attr(
        not(any(
            feature = "h264",
            feature = "h265",
            feature = "av1",
            feature = "vp8",
            feature = "vp9",
            feature = "mpeg2",
            feature = "jpeg"
        )),
        allow(dead_code)
    )]
    fn register_all(&mut self, profiles: &[Profile], builder: CodecBuilder) {
        for &profile in profiles {
            self.components
                .insert(ComponentInfo::new(profile, Entrypoint::Vld), builder);
        }
    }

    /// Instantiates the component registered for `info`.
    pub fn create_decoder(&self, info: ComponentInfo) -> Result<Box<dyn DecodeCodec>> {
        self.components
            .get(&info)
            .map(|builder| builder())
            .ok_or(DdiError::UnsupportedProfile(info))
    }

    pub fn supports(&self, info: ComponentInfo) -> bool {
        self.components.contains_key(&info)
    }

    /// Registered keys, in key order.
    pub fn components(&self) -> impl Iterator<Item = ComponentInfo> + '_ {
        self.components.keys().copied()
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.components.keys()).finish()
    }
}
