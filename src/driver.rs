// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Driver front end.
//!
//! The [`Driver`] owns the surfaces and decode contexts handed out to the host, and routes the
//! host's entry points to the right context. Each context sits behind its own lock, so calls
//! on distinct contexts can run concurrently while calls on one context are serialized.

use std::collections::BTreeMap;
use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::sync::PoisonError;

use crate::bridge::CommandBridge;
use crate::bridge::StatusReport;
use crate::bridge::SubmissionId;
use crate::decoder::DecodeContext;
use crate::decoder::DecoderConfig;
use crate::registry::Registry;
use crate::BufferId;
use crate::ContextId;
use crate::DdiError;
use crate::Resolution;
use crate::Result;
use crate::Surface;
use crate::SurfaceId;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct Driver {
    registry: Arc<Registry>,
    next_surface: AtomicU32,
    next_context: AtomicU32,
    surfaces: Mutex<BTreeMap<SurfaceId, Surface>>,
    contexts: Mutex<BTreeMap<ContextId, Arc<Mutex<DecodeContext>>>>,
}

impl Default for Driver {
    fn default() -> Self {
        Self::new(Registry::global())
    }
}

impl Driver {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            next_surface: AtomicU32::new(0),
            next_context: AtomicU32::new(0),
            surfaces: Default::default(),
            contexts: Default::default(),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Creates a surface pictures of up to `resolution` can be decoded into.
    pub fn create_surface(&self, resolution: Resolution) -> Result<SurfaceId> {
        let id = SurfaceId(self.next_surface.fetch_add(1, Ordering::Relaxed));
        if id.is_reserved() {
            return Err(DdiError::AllocationFailed(
                "surface identifiers exhausted".into(),
            ));
        }

        lock(&self.surfaces).insert(id, Surface::new(id, resolution));
        log::debug!("created surface {} ({})", id, resolution);

        Ok(id)
    }

    /// Destroys surface `id` and removes it from every context.
    pub fn destroy_surface(&self, id: SurfaceId) -> Result<()> {
        lock(&self.surfaces)
            .remove(&id)
            .ok_or(DdiError::InvalidSurface(id))?;

        let contexts: Vec<_> = lock(&self.contexts).values().cloned().collect();
        for context in contexts {
            lock(&context).remove_render_target(id);
        }

        Ok(())
    }

    pub fn surface(&self, id: SurfaceId) -> Result<Surface> {
        lock(&self.surfaces)
            .get(&id)
            .copied()
            .ok_or(DdiError::InvalidSurface(id))
    }

    /// Creates a decode context rendering into `render_targets` and submitting through
    /// `bridge`.
    pub fn create_context(
        &self,
        config: DecoderConfig,
        render_targets: &[SurfaceId],
        bridge: Box<dyn CommandBridge>,
    ) -> Result<ContextId> {
        let mut context = DecodeContext::new(config, &self.registry, bridge)?;
        for &id in render_targets {
            context.add_render_target(self.surface(id)?)?;
        }

        let id = ContextId(self.next_context.fetch_add(1, Ordering::Relaxed));
        lock(&self.contexts).insert(id, Arc::new(Mutex::new(context)));
        log::debug!("created context {:?}", id);

        Ok(id)
    }

    /// Destroys context `id`. A picture in progress is dropped without being submitted.
    pub fn destroy_context(&self, id: ContextId) -> Result<()> {
        let context = lock(&self.contexts)
            .remove(&id)
            .ok_or(DdiError::InvalidContext(id))?;
        lock(&context).discard_picture();
        log::debug!("destroyed context {:?}", id);

        Ok(())
    }

    pub fn num_contexts(&self) -> usize {
        lock(&self.contexts).len()
    }

    /// Runs `f` on context `id` while holding its lock.
    pub fn with_context<T, F>(&self, id: ContextId, f: F) -> Result<T>
    where
        F: FnOnce(&mut DecodeContext) -> Result<T>,
    {
        let context = lock(&self.contexts)
            .get(&id)
            .cloned()
            .ok_or(DdiError::InvalidContext(id))?;
        let mut context = lock(&context);
        f(&mut *context)
    }

    pub fn create_buffer(
        &self,
        context: ContextId,
        raw_type: u32,
        element_size: usize,
        num_elements: usize,
        data: Option<&[u8]>,
    ) -> Result<BufferId> {
        self.with_context(context, |c| {
            c.create_buffer(raw_type, element_size, num_elements, data)
        })
    }

    /// Writes `data` at `offset` into a buffer, as a host mapping of the buffer would.
    pub fn write_buffer(
        &self,
        context: ContextId,
        buffer: BufferId,
        offset: usize,
        data: &[u8],
    ) -> Result<()> {
        self.with_context(context, |c| c.write_buffer(buffer, offset, data))
    }

    /// Returns a copy of the current contents of a buffer.
    pub fn read_buffer(&self, context: ContextId, buffer: BufferId) -> Result<Vec<u8>> {
        self.with_context(context, |c| Ok(c.get_buffer(buffer)?.data().to_vec()))
    }

    pub fn release_buffer(&self, context: ContextId, buffer: BufferId) -> Result<()> {
        self.with_context(context, |c| c.release_buffer(buffer))
    }

    pub fn begin_picture(&self, context: ContextId, target: SurfaceId) -> Result<()> {
        // Surfaces created after the context can be decoded into as well.
        let surface = self.surface(target)?;
        self.with_context(context, |c| {
            if !c.has_render_target(target) {
                c.add_render_target(surface)?;
            }
            c.begin_picture(target)
        })
    }

    pub fn render_picture(&self, context: ContextId, buffers: &[BufferId]) -> Result<()> {
        self.with_context(context, |c| c.render_picture(buffers))
    }

    pub fn end_picture(&self, context: ContextId) -> Result<Option<SubmissionId>> {
        // Scaling outputs may also be surfaces created after the context.
        let output = self
            .with_context(context, |c| Ok(c.processing_output()))?
            .and_then(|id| self.surface(id).ok());

        self.with_context(context, |c| {
            if let Some(surface) = output {
                if !c.has_render_target(surface.id) {
                    c.add_render_target(surface)?;
                }
            }
            c.end_picture()
        })
    }

    pub fn query_status(
        &self,
        context: ContextId,
        surface: SurfaceId,
    ) -> Result<Option<StatusReport>> {
        self.with_context(context, |c| c.query_status(surface))
    }
}

#[cfg(all(test, feature = "h264", feature = "vp8"))]
mod tests {
    use super::*;
    use crate::bridge::null::NullHardware;
    use crate::buffer::processing::ProcessingParams;
    use crate::buffer::processing::Rect;
    use crate::buffer::processing::PROCESSING_PARAMS_SIZE;
    use crate::buffer::slice::tests::encode_slice_parameters;
    use crate::buffer::BufferType;
    use crate::codec::h264;
    use crate::codec::vp8;
    use crate::decoder::SessionState;
    use crate::registry::CodecSet;
    use crate::registry::ComponentInfo;
    use crate::registry::Entrypoint;
    use crate::registry::Profile;

    const RES: Resolution = Resolution {
        width: 320,
        height: 240,
    };

    fn driver() -> Driver {
        Driver::new(Arc::new(Registry::new(CodecSet::all())))
    }

    fn config(profile: Profile) -> DecoderConfig {
        DecoderConfig {
            component: ComponentInfo::new(profile, Entrypoint::Vld),
            coded_resolution: RES,
            ..Default::default()
        }
    }

    /// Submits one picture of `profile` into `target`.
    fn decode(
        driver: &Driver,
        context: ContextId,
        profile: Profile,
        target: SurfaceId,
        reference: SurfaceId,
    ) -> Result<Option<SubmissionId>> {
        let pic_params = match profile {
            Profile::Vp8Version0_3 => {
                vp8::tests::picture_parameters(RES, reference, reference, SurfaceId::INVALID)
            }
            _ => h264::tests::picture_parameters(RES, &[reference]),
        };
        let slice_params = encode_slice_parameters(&[(128, 0)], 12);

        let ids = [
            driver.create_buffer(
                context,
                BufferType::PictureParameter as u32,
                pic_params.len(),
                1,
                Some(pic_params.as_slice()),
            )?,
            driver.create_buffer(
                context,
                BufferType::SliceParameter as u32,
                12,
                1,
                Some(slice_params.as_slice()),
            )?,
            driver.create_buffer(context, BufferType::SliceData as u32, 1, 128, None)?,
        ];

        driver.begin_picture(context, target)?;
        driver.render_picture(context, &ids)?;
        let id = driver.end_picture(context)?;

        for buffer in ids {
            driver.release_buffer(context, buffer)?;
        }

        Ok(id)
    }

    #[test]
    fn decode_through_driver() {
        let driver = driver();
        let hw = NullHardware::new();
        let surfaces: Vec<SurfaceId> = (0..2)
            .map(|_| driver.create_surface(RES).unwrap())
            .collect();
        let context = driver
            .create_context(config(Profile::H264Main), &surfaces, Box::new(hw.clone()))
            .unwrap();

        decode(&driver, context, Profile::H264Main, surfaces[0], SurfaceId::INVALID).unwrap();
        decode(&driver, context, Profile::H264Main, surfaces[1], surfaces[0]).unwrap();

        let submissions = hw.submissions();
        assert_eq!(submissions.len(), 2);
        assert_eq!(submissions[1].references[0].surface.id, surfaces[0]);

        let report = driver
            .query_status(context, surfaces[1])
            .unwrap()
            .unwrap();
        assert!(report.is_success());
        assert_eq!(
            report.consumed_stream_size,
            crate::bridge::null::NULL_HW_STREAM_SIZE
        );
    }

    #[test]
    fn surfaces_created_after_the_context() {
        let driver = driver();
        let context = driver
            .create_context(config(Profile::H264High), &[], Box::new(NullHardware::new()))
            .unwrap();

        assert!(matches!(
            driver.begin_picture(context, SurfaceId(5)),
            Err(DdiError::InvalidSurface(_))
        ));

        let surface = driver.create_surface(RES).unwrap();
        decode(&driver, context, Profile::H264High, surface, SurfaceId::INVALID)
            .unwrap()
            .unwrap();
    }

    #[test]
    fn scaling_into_surface_created_after_the_context() {
        let driver = driver();
        let hw = NullHardware::new();
        let a = driver.create_surface(RES).unwrap();
        let context = driver
            .create_context(config(Profile::H264Main), &[a], Box::new(hw.clone()))
            .unwrap();
        let b = driver.create_surface(Resolution::from((160, 120))).unwrap();

        let params = ProcessingParams {
            output: b,
            output_region: Rect {
                x: 0,
                y: 0,
                width: 160,
                height: 120,
            },
        };
        let processing = driver
            .create_buffer(
                context,
                BufferType::ProcPipelineParameter as u32,
                PROCESSING_PARAMS_SIZE,
                1,
                Some(params.to_bytes().as_slice()),
            )
            .unwrap();
        let pic_params = h264::tests::picture_parameters(RES, &[]);
        let slice_params = encode_slice_parameters(&[(32, 0)], 12);
        let ids = [
            driver
                .create_buffer(
                    context,
                    BufferType::PictureParameter as u32,
                    pic_params.len(),
                    1,
                    Some(pic_params.as_slice()),
                )
                .unwrap(),
            driver
                .create_buffer(
                    context,
                    BufferType::SliceParameter as u32,
                    12,
                    1,
                    Some(slice_params.as_slice()),
                )
                .unwrap(),
            driver
                .create_buffer(context, BufferType::SliceData as u32, 1, 32, None)
                .unwrap(),
            processing,
        ];

        driver.begin_picture(context, a).unwrap();
        driver.render_picture(context, &ids).unwrap();
        driver.end_picture(context).unwrap().unwrap();
        assert!(hw.submissions()[0].scaled);

        // Unknown outputs are still refused.
        let params = ProcessingParams {
            output: SurfaceId(77),
            ..params
        };
        let processing = driver
            .create_buffer(
                context,
                BufferType::ProcPipelineParameter as u32,
                PROCESSING_PARAMS_SIZE,
                1,
                Some(params.to_bytes().as_slice()),
            )
            .unwrap();
        driver.begin_picture(context, a).unwrap();
        driver
            .render_picture(context, &[ids[0], ids[1], ids[2], processing])
            .unwrap();
        assert!(matches!(
            driver.end_picture(context),
            Err(DdiError::InvalidSurface(SurfaceId(77)))
        ));
    }

    #[test]
    fn destroyed_surface_is_concealed() {
        let driver = driver();
        let hw = NullHardware::new();
        let a = driver.create_surface(RES).unwrap();
        let b = driver.create_surface(RES).unwrap();
        let context = driver
            .create_context(config(Profile::H264Main), &[a, b], Box::new(hw.clone()))
            .unwrap();

        decode(&driver, context, Profile::H264Main, a, SurfaceId::INVALID).unwrap();
        driver.destroy_surface(a).unwrap();
        assert!(driver.destroy_surface(a).is_err());

        decode(&driver, context, Profile::H264Main, b, a).unwrap();
        assert!(hw.submissions()[1].references[0].is_concealed());
    }

    #[test]
    fn unknown_context() {
        let driver = driver();
        assert!(matches!(
            driver.end_picture(ContextId(3)),
            Err(DdiError::InvalidContext(ContextId(3)))
        ));
        assert!(matches!(
            driver.create_context(
                config(Profile::H264Main),
                &[SurfaceId(0)],
                Box::new(NullHardware::new())
            ),
            Err(DdiError::InvalidSurface(_))
        ));
        assert_eq!(driver.num_contexts(), 0);
    }

    #[test]
    fn destroy_context_with_open_picture() {
        let driver = driver();
        let surface = driver.create_surface(RES).unwrap();
        let context = driver
            .create_context(
                config(Profile::H264Main),
                &[surface],
                Box::new(NullHardware::new()),
            )
            .unwrap();

        driver.begin_picture(context, surface).unwrap();
        assert_eq!(
            driver.with_context(context, |c| Ok(c.state())).unwrap(),
            SessionState::Begun
        );
        driver.destroy_context(context).unwrap();
        assert!(driver.destroy_context(context).is_err());
    }

    #[test]
    fn buffers_through_driver() {
        let driver = driver();
        let context = driver
            .create_context(config(Profile::H264Main), &[], Box::new(NullHardware::new()))
            .unwrap();

        let id = driver
            .create_buffer(context, BufferType::SliceData as u32, 1, 4, None)
            .unwrap();
        driver.write_buffer(context, id, 1, &[7, 7]).unwrap();
        assert_eq!(driver.read_buffer(context, id).unwrap(), vec![0, 7, 7, 0]);
        driver.release_buffer(context, id).unwrap();
        assert!(matches!(
            driver.read_buffer(context, id),
            Err(DdiError::BufferNotFound(_))
        ));
    }

    #[test]
    fn contexts_run_concurrently() {
        const PICTURES: usize = 16;

        let driver = driver();
        let setups: Vec<(Profile, NullHardware, ContextId, Vec<SurfaceId>)> =
            [Profile::H264Main, Profile::Vp8Version0_3]
                .into_iter()
                .map(|profile| {
                    let hw = NullHardware::new();
                    let surfaces: Vec<SurfaceId> = (0..4)
                        .map(|_| driver.create_surface(RES).unwrap())
                        .collect();
                    let context = driver
                        .create_context(config(profile), &surfaces, Box::new(hw.clone()))
                        .unwrap();
                    (profile, hw, context, surfaces)
                })
                .collect();

        std::thread::scope(|s| {
            for (profile, _, context, surfaces) in &setups {
                let driver = &driver;
                s.spawn(move || {
                    for i in 0..PICTURES {
                        let target = surfaces[i % surfaces.len()];
                        let reference = if i == 0 {
                            SurfaceId::INVALID
                        } else {
                            surfaces[(i - 1) % surfaces.len()]
                        };
                        decode(driver, *context, *profile, target, reference)
                            .unwrap()
                            .unwrap();
                    }
                });
            }
        });

        for (_, hw, _, _) in &setups {
            let submissions = hw.submissions();
            assert_eq!(submissions.len(), PICTURES);
            // Submissions of a context keep the order of the EndPicture calls.
            assert!(submissions.windows(2).all(|w| w[0].id < w[1].id));
            assert!(submissions[1..]
                .iter()
                .all(|s| s.references.iter().all(|r| !r.is_concealed())));
        }
        assert_eq!(setups[1].1.submissions()[0].mode, crate::codec::DecodeMode::Vp8);
    }
}
