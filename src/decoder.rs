// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Picture submission state machine of a decode context.
//!
//! Every picture goes through `BeginPicture`, any number of `RenderPicture` calls and
//! `EndPicture`:
//!
//! ```text
//! Idle --begin--> Begun --render--> Rendering --end--> Ended --> Idle
//!                   |                  ^    |
//!                   |                  +----+ render
//!                   +--end (no buffers)--> Idle
//! ```
//!
//! `EndPicture` assembles everything rendered into a [`SubmitRequest`], hands it to the
//! context's [`CommandBridge`] and returns without waiting for the hardware. Completion is
//! observed later with [`DecodeContext::query_status`].

use std::collections::BTreeMap;

use anyhow::anyhow;
use bytes::Bytes;

use crate::bitstream::BitstreamAssembler;
use crate::bitstream::BitstreamLimits;
use crate::bridge::CommandBridge;
use crate::bridge::ScalingRequest;
use crate::bridge::StatusReport;
use crate::bridge::SubmissionId;
use crate::bridge::SubmitRequest;
use crate::buffer::processing::ProcessingParams;
use crate::buffer::slice::parse_slice_parameters;
use crate::buffer::slice::slice_controls;
use crate::buffer::slice::SliceControl;
use crate::buffer::BufferDescriptor;
use crate::buffer::BufferManager;
use crate::buffer::BufferType;
use crate::codec::DecodeCodec;
use crate::codec::DecodeMode;
use crate::dpb::ReferenceTracker;
use crate::registry::ComponentInfo;
use crate::registry::Entrypoint;
use crate::registry::Profile;
use crate::registry::Registry;
use crate::BufferId;
use crate::DdiError;
use crate::Resolution;
use crate::Result;
use crate::Surface;
use crate::SurfaceId;

/// State of the picture session of a context.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No picture is open.
    #[default]
    Idle,
    /// A picture has been started but no buffer rendered into it yet.
    Begun,
    /// Buffers have been rendered into the current picture.
    Rendering,
    /// The picture is being submitted.
    Ended,
}

/// Parameters of a decode context.
#[derive(Clone, Debug)]
pub struct DecoderConfig {
    pub component: ComponentInfo,
    /// Coded resolution announced at context creation. Updated by picture parameters that
    /// carry a picture size.
    pub coded_resolution: Resolution,
    /// Largest slice data buffer the hardware can read in place.
    pub slice_size_limit: usize,
    /// Largest bitstream the hardware can address for one picture.
    pub max_bitstream_size: usize,
    /// Largest buffer the application can create.
    pub max_buffer_size: usize,
    /// Number of decoded pictures kept as references.
    pub max_references: usize,
    /// Whether processing buffers (decode-time scaling) are accepted.
    pub decode_processing: bool,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            component: ComponentInfo::new(Profile::H264Main, Entrypoint::Vld),
            coded_resolution: Resolution::from((1920, 1080)),
            slice_size_limit: 4 << 20,
            max_bitstream_size: 32 << 20,
            max_buffer_size: 64 << 20,
            max_references: 127,
            decode_processing: true,
        }
    }
}

/// A decode context: one picture session plus the buffers and references it works with.
pub struct DecodeContext {
    config: DecoderConfig,
    codec: Box<dyn DecodeCodec>,
    bridge: Box<dyn CommandBridge>,
    state: SessionState,

    /// Surfaces pictures can be decoded into.
    render_targets: BTreeMap<SurfaceId, Surface>,
    buffers: BufferManager,
    references: ReferenceTracker,
    bitstream: BitstreamAssembler,

    /// Surface the current picture is decoded into.
    target: Option<Surface>,
    resolution: Resolution,
    width_in_mbs: u16,
    height_in_mbs: u16,
    /// Number of slice parameter buffers rendered into the current picture. Slice parameter
    /// buffer `k` describes the slices of slice data buffer `k`.
    group_index: usize,
    picture_parameters: Option<Bytes>,
    processing: Option<Bytes>,

    /// Last submission targeting each surface.
    submissions: BTreeMap<SurfaceId, SubmissionId>,
}

impl DecodeContext {
    pub fn new(
        config: DecoderConfig,
        registry: &Registry,
        bridge: Box<dyn CommandBridge>,
    ) -> Result<Self> {
        let codec = registry.create_decoder(config.component)?;
        codec.check_resolution(config.coded_resolution)?;

        log::info!(
            "{:?}: {} decode mode, {}",
            config.component.profile,
            codec.mode(),
            config.coded_resolution
        );

        let resolution = config.coded_resolution;
        // Large enough to stand in for any picture the component accepts.
        let dummy_resolution = codec.resolution_limits().max;

        Ok(Self {
            codec,
            bridge,
            state: SessionState::Idle,
            render_targets: Default::default(),
            buffers: BufferManager::new(config.max_buffer_size),
            references: ReferenceTracker::new(config.max_references, dummy_resolution),
            bitstream: BitstreamAssembler::new(BitstreamLimits {
                slice_size_limit: config.slice_size_limit,
                max_bitstream_size: config.max_bitstream_size,
            }),
            target: None,
            resolution,
            width_in_mbs: resolution.width_in_mbs(),
            height_in_mbs: resolution.height_in_mbs(),
            group_index: 0,
            picture_parameters: None,
            processing: None,
            submissions: Default::default(),
            config,
        })
    }

    pub fn config(&self) -> &DecoderConfig {
        &self.config
    }

    pub fn mode(&self) -> DecodeMode {
        self.codec.mode()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Coded resolution of the last picture.
    pub fn resolution(&self) -> Resolution {
        self.resolution
    }

    pub fn width_in_mbs(&self) -> u16 {
        self.width_in_mbs
    }

    pub fn height_in_mbs(&self) -> u16 {
        self.height_in_mbs
    }

    /// Number of slice groups rendered into the current picture.
    pub fn group_index(&self) -> usize {
        self.group_index
    }

    pub fn references(&self) -> &ReferenceTracker {
        &self.references
    }

    /// Makes `surface` available as a target of this context.
    pub fn add_render_target(&mut self, surface: Surface) -> Result<()> {
        if surface.id.is_reserved() {
            return Err(DdiError::InvalidSurface(surface.id));
        }

        self.render_targets.insert(surface.id, surface);
        Ok(())
    }

    /// Forgets `id`, e.g. because the surface has been destroyed.
    pub fn remove_render_target(&mut self, id: SurfaceId) -> Option<Surface> {
        self.references.remove(id);
        self.submissions.remove(&id);
        self.render_targets.remove(&id)
    }

    pub fn has_render_target(&self, id: SurfaceId) -> bool {
        self.render_targets.contains_key(&id)
    }

    pub fn create_buffer(
        &mut self,
        raw_type: u32,
        element_size: usize,
        num_elements: usize,
        data: Option<&[u8]>,
    ) -> Result<BufferId> {
        self.buffers
            .create_buffer(raw_type, element_size, num_elements, data)
    }

    pub fn get_buffer(&self, id: BufferId) -> Result<&BufferDescriptor> {
        self.buffers.get_buffer(id)
    }

    pub fn write_buffer(&mut self, id: BufferId, offset: usize, data: &[u8]) -> Result<()> {
        self.buffers.write_buffer(id, offset, data)
    }

    pub fn release_buffer(&mut self, id: BufferId) -> Result<()> {
        self.buffers.release_buffer(id)
    }

    /// Slot of buffer `id` within the current picture.
    pub fn index_of(&self, id: BufferId) -> Result<usize> {
        self.buffers.index_of(id)
    }

    /// Output surface requested by the processing buffer of the current picture, if any.
    pub fn processing_output(&self) -> Option<SurfaceId> {
        self.processing
            .as_deref()
            .and_then(|data| ProcessingParams::parse(data).ok())
            .map(|params| params.output)
    }

    /// Offset of slice group `group` within the bitstream of the current picture.
    pub fn get_offset(&self, group: usize) -> Result<usize> {
        self.bitstream.get_offset(group)
    }

    /// Starts a new picture decoded into `target`.
    pub fn begin_picture(&mut self, target: SurfaceId) -> Result<()> {
        if self.state != SessionState::Idle {
            return Err(DdiError::InvalidState {
                operation: "begin picture",
                state: self.state,
            });
        }

        let surface = self
            .render_targets
            .get(&target)
            .copied()
            .ok_or(DdiError::InvalidSurface(target))?;

        self.reset_picture();
        self.target = Some(surface);
        self.state = SessionState::Begun;

        log::debug!("begin picture into {}", target);

        Ok(())
    }

    /// Adds `ids` to the current picture. Either all of them are added or none.
    pub fn render_picture(&mut self, ids: &[BufferId]) -> Result<()> {
        if !matches!(self.state, SessionState::Begun | SessionState::Rendering) {
            return Err(DdiError::InvalidState {
                operation: "render picture",
                state: self.state,
            });
        }

        let codec = &self.codec;
        let decode_processing = self.config.decode_processing;
        let attachments = self.buffers.attach_all(ids, |buffer_type| {
            codec.accepts(buffer_type)
                && (decode_processing || buffer_type != BufferType::ProcPipelineParameter)
        })?;

        for attachment in attachments.into_iter().filter(|a| a.new) {
            let data = match self
                .buffers
                .attached_at(attachment.buffer_type, attachment.slot)
            {
                Some(buffer) => buffer.data.clone(),
                None => continue,
            };

            match attachment.buffer_type {
                BufferType::PictureParameter => self.picture_parameters = Some(data),
                BufferType::SliceParameter => self.group_index += 1,
                BufferType::SliceData => {
                    self.bitstream.push_group(attachment.slot, data);
                }
                BufferType::ProcPipelineParameter => self.processing = Some(data),
                // Tables are only passed through to the hardware.
                _ => (),
            }
        }

        log::debug!(
            "rendered {} buffers, {} slice groups",
            ids.len(),
            self.bitstream.num_groups()
        );

        self.state = SessionState::Rendering;

        Ok(())
    }

    /// Submits the current picture. Returns `None` if no buffer was rendered into it.
    ///
    /// On [`DdiError::AllocationFailed`] the picture is kept and the call can be retried.
    /// Any other error drops the picture.
    pub fn end_picture(&mut self) -> Result<Option<SubmissionId>> {
        match self.state {
            SessionState::Rendering => (),
            SessionState::Begun => {
                log::debug!("ending empty picture");
                self.finish_picture();
                return Ok(None);
            }
            state => {
                return Err(DdiError::InvalidState {
                    operation: "end picture",
                    state,
                })
            }
        }

        self.state = SessionState::Ended;

        match self.submit_picture() {
            Ok(id) => {
                self.finish_picture();
                Ok(Some(id))
            }
            Err(e) if e.is_retryable() => {
                log::warn!("picture submission can be retried: {}", e);
                self.state = SessionState::Rendering;
                Err(e)
            }
            Err(e) => {
                log::warn!("dropping picture: {}", e);
                self.finish_picture();
                Err(e)
            }
        }
    }

    /// Abandons the current picture without submitting it.
    pub fn discard_picture(&mut self) {
        if self.state != SessionState::Idle {
            log::debug!("discarding picture");
        }
        self.finish_picture();
    }

    /// Polls the completion of the last picture decoded into `surface`.
    ///
    /// A picture that completed with an error can no longer be used as a reference.
    pub fn query_status(&mut self, surface: SurfaceId) -> Result<Option<StatusReport>> {
        let id = *self
            .submissions
            .get(&surface)
            .ok_or(DdiError::InvalidSurface(surface))?;

        let report = self.bridge.status_report(id)?;
        if let Some(report) = report.filter(|r| !r.is_success()) {
            log::warn!(
                "decode into {} failed with code {:#x}",
                surface,
                report.completion_code
            );
            self.references.invalidate(surface);
        }

        Ok(report)
    }

    fn set_resolution(&mut self, resolution: Resolution) {
        if resolution != self.resolution {
            log::debug!("picture size {} -> {}", self.resolution, resolution);
        }
        self.resolution = resolution;
        self.width_in_mbs = resolution.width_in_mbs();
        self.height_in_mbs = resolution.height_in_mbs();
    }

    fn slice_controls(&self) -> Result<Vec<SliceControl>> {
        let num_groups = self.bitstream.num_groups();
        if num_groups == 0 {
            return Err(DdiError::InvalidParameter(
                "picture without slice data".into(),
            ));
        }

        if self.group_index != num_groups {
            return Err(DdiError::InvalidParameter(format!(
                "{} slice parameter buffers for {} slice data buffers",
                self.group_index, num_groups
            )));
        }

        let mut controls = Vec::new();
        for (group, slice_group) in self.bitstream.groups().iter().enumerate() {
            let buffer = self
                .buffers
                .attached_at(BufferType::SliceParameter, group)
                .ok_or_else(|| {
                    DdiError::InvalidParameter(format!("no slice parameters for group {}", group))
                })?;
            let params =
                parse_slice_parameters(&buffer.data, buffer.element_size, buffer.num_elements)?;
            let offset = self.bitstream.get_offset(group)?;

            log::debug!(
                "slice group {}: {} slices at offset {}",
                group,
                params.len(),
                offset
            );

            controls.extend(slice_controls(group, &params, offset, slice_group.len())?);
        }

        Ok(controls)
    }

    fn submit_picture(&mut self) -> Result<SubmissionId> {
        let target = self.target.ok_or_else(|| {
            DdiError::InvalidParameter("picture has no target surface".into())
        })?;

        let pic_params = self.picture_parameters.clone().ok_or_else(|| {
            DdiError::InvalidParameter("picture rendered without picture parameters".into())
        })?;
        if pic_params.len() < self.codec.picture_parameters_size() {
            return Err(DdiError::InvalidParameter(format!(
                "picture parameters of {} bytes, {} expected",
                pic_params.len(),
                self.codec.picture_parameters_size()
            )));
        }

        if let Some(resolution) = self.codec.picture_resolution(&pic_params) {
            self.set_resolution(resolution);
        }
        self.codec.check_resolution(self.resolution)?;
        if target.resolution.width_in_mbs() < self.width_in_mbs
            || target.resolution.height_in_mbs() < self.height_in_mbs
        {
            log::warn!(
                "picture of {} does not fit target {} ({})",
                self.resolution,
                target.id,
                target.resolution
            );
            return Err(DdiError::ResolutionNotSupported(self.resolution));
        }

        let slices = self.slice_controls()?;

        let processing = self
            .processing
            .as_deref()
            .map(ProcessingParams::parse)
            .transpose()?;
        if let Some(params) = processing {
            if !self.render_targets.contains_key(&params.output) {
                return Err(DdiError::InvalidSurface(params.output));
            }
        }

        let references = self
            .codec
            .build_reference_list(&pic_params, &mut self.references, target.id)?;

        self.bitstream.combine_if_needed()?;
        let descriptors = self
            .codec
            .emit_commands(self.buffers.attached(), &self.bitstream.segments());

        let mode = self.codec.mode();
        let fixed_function_scaling =
            processing.is_some() && self.bridge.supports_fixed_function_scaling(mode);

        let request = SubmitRequest {
            mode,
            target,
            resolution: self.resolution,
            descriptors,
            slices,
            references: references.clone(),
            processing: processing.filter(|_| fixed_function_scaling),
        };

        let id = match self.bridge.submit(request) {
            Ok(id) => id,
            Err(e) => {
                let e = DdiError::from(e);
                // Only a rejected submission may have left the target half written.
                if !e.is_retryable() {
                    self.references.invalidate(target.id);
                }
                return Err(e);
            }
        };
        log::debug!("submitted picture into {} as {:?}", target.id, id);

        self.references.record_concealed(&references);
        self.references.track(target);
        self.submissions.insert(target.id, id);

        if let Some(params) = processing.filter(|_| !fixed_function_scaling) {
            log::debug!("{} output cannot be scaled while decoding", mode);
            self.bridge
                .scale_fallback(ScalingRequest {
                    source: target,
                    params,
                })
                .map_err(|e| {
                    DdiError::SubmissionFailed(anyhow!("scaling {} failed: {}", target.id, e))
                })?;
        }

        Ok(id)
    }

    fn reset_picture(&mut self) {
        self.buffers.reset_picture();
        self.bitstream.reset();
        self.target = None;
        self.group_index = 0;
        self.picture_parameters = None;
        self.processing = None;
    }

    fn finish_picture(&mut self) {
        self.reset_picture();
        self.state = SessionState::Idle;
    }
}
