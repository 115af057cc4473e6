// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! A command bridge that decodes nothing.
//!
//! Every submission completes immediately with a success status, which lets the whole picture
//! submission path run without hardware. Submissions are recorded so tests can check what would
//! have been sent to the hardware, and a few knobs allow injecting failures.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use anyhow::anyhow;

use crate::bridge::BridgeError;
use crate::bridge::BridgeResult;
use crate::bridge::CommandBridge;
use crate::bridge::DescriptorSource;
use crate::bridge::ScalingRequest;
use crate::bridge::StatusReport;
use crate::bridge::SubmissionId;
use crate::bridge::SubmitRequest;
use crate::buffer::slice::SliceControl;
use crate::buffer::BufferType;
use crate::codec::DecodeMode;
use crate::dpb::ResolvedReference;
use crate::Surface;

/// Number of consumed bitstream bytes reported for every submission.
pub const NULL_HW_STREAM_SIZE: u32 = 1024;

/// Summary of a command descriptor, without its data.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct DescriptorRecord {
    pub buffer_type: BufferType,
    pub buffer_index: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub source: DescriptorSource,
}

/// What the null hardware received for one picture.
#[derive(Clone, Debug)]
pub struct SubmissionRecord {
    pub id: SubmissionId,
    pub mode: DecodeMode,
    pub target: Surface,
    pub descriptors: Vec<DescriptorRecord>,
    pub slices: Vec<SliceControl>,
    pub references: Vec<ResolvedReference>,
    pub scaled: bool,
    /// CRC32 of the bitstream as the hardware would read it.
    pub bitstream_crc: u32,
}

#[derive(Debug)]
struct State {
    next_id: u64,
    submissions: Vec<SubmissionRecord>,
    reports: BTreeMap<SubmissionId, StatusReport>,
    scaling_requests: Vec<ScalingRequest>,
    fixed_function_scaling: bool,
    exhaust_next: bool,
    fail_next: bool,
    corrupt_next: bool,
}

/// Null hardware. Clones share the same state.
#[derive(Clone, Debug)]
pub struct NullHardware {
    state: Arc<Mutex<State>>,
}

impl Default for NullHardware {
    fn default() -> Self {
        Self::new()
    }
}

impl NullHardware {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_id: 0,
                submissions: Default::default(),
                reports: Default::default(),
                scaling_requests: Default::default(),
                fixed_function_scaling: true,
                exhaust_next: false,
                fail_next: false,
                corrupt_next: false,
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Pictures submitted so far.
    pub fn submissions(&self) -> Vec<SubmissionRecord> {
        self.state().submissions.clone()
    }

    /// Scaling passes requested so far.
    pub fn scaling_requests(&self) -> Vec<ScalingRequest> {
        self.state().scaling_requests.clone()
    }

    /// Makes the next submission fail with [`BridgeError::OutOfResources`].
    pub fn exhaust_next_submission(&self) {
        self.state().exhaust_next = true;
    }

    /// Makes the next submission fail for good.
    pub fn fail_next_submission(&self) {
        self.state().fail_next = true;
    }

    /// Makes the next submission complete with an error status.
    pub fn corrupt_next_submission(&self) {
        self.state().corrupt_next = true;
    }

    pub fn set_fixed_function_scaling(&self, supported: bool) {
        self.state().fixed_function_scaling = supported;
    }
}

impl CommandBridge for NullHardware {
    fn submit(&mut self, request: SubmitRequest) -> BridgeResult<SubmissionId> {
        let mut state = self.state();

        if std::mem::take(&mut state.exhaust_next) {
            return Err(BridgeError::OutOfResources);
        }

        if std::mem::take(&mut state.fail_next) {
            return Err(BridgeError::Other(anyhow!(
                "command submission for surface {} rejected",
                request.target.id
            )));
        }

        let id = SubmissionId(state.next_id);
        state.next_id += 1;

        let mut hasher = crc32fast::Hasher::new();
        for descriptor in request.bitstream() {
            hasher.update(&descriptor.data);
        }

        let record = SubmissionRecord {
            id,
            mode: request.mode,
            target: request.target,
            descriptors: request
                .descriptors
                .iter()
                .map(|d| DescriptorRecord {
                    buffer_type: d.buffer_type,
                    buffer_index: d.buffer_index,
                    byte_offset: d.byte_offset,
                    byte_length: d.byte_length,
                    source: d.source,
                })
                .collect(),
            slices: request.slices,
            references: request.references,
            scaled: request.processing.is_some(),
            bitstream_crc: hasher.finalize(),
        };

        log::debug!(
            "null hardware: {:?} decoding {:?} into {} ({} descriptors, {} slices)",
            id,
            record.mode,
            record.target.id,
            record.descriptors.len(),
            record.slices.len()
        );

        let completion_code = if std::mem::take(&mut state.corrupt_next) {
            1
        } else {
            0
        };

        state.reports.insert(
            id,
            StatusReport {
                completion_code,
                consumed_stream_size: NULL_HW_STREAM_SIZE,
            },
        );
        state.submissions.push(record);

        Ok(id)
    }

    fn status_report(&mut self, id: SubmissionId) -> BridgeResult<Option<StatusReport>> {
        match self.state().reports.get(&id) {
            Some(report) => Ok(Some(*report)),
            None => Err(BridgeError::Other(anyhow!("unknown submission {:?}", id))),
        }
    }

    fn supports_fixed_function_scaling(&self, _mode: DecodeMode) -> bool {
        self.state().fixed_function_scaling
    }

    fn scale_fallback(&mut self, request: ScalingRequest) -> BridgeResult<()> {
        log::debug!(
            "null hardware: scaling {} into {}",
            request.source.id,
            request.params.output
        );
        self.state().scaling_requests.push(request);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::bridge::CommandDescriptor;
    use crate::Resolution;
    use crate::SurfaceId;

    fn request(bitstream: &'static [u8]) -> SubmitRequest {
        let resolution = Resolution::from((64, 64));
        SubmitRequest {
            mode: DecodeMode::Avc,
            target: Surface::new(SurfaceId(1), resolution),
            resolution,
            descriptors: vec![CommandDescriptor {
                buffer_index: 0,
                buffer_type: BufferType::SliceData,
                byte_offset: 0,
                byte_length: bitstream.len(),
                source: DescriptorSource::Buffer,
                data: Bytes::from_static(bitstream),
            }],
            slices: vec![],
            references: vec![],
            processing: None,
        }
    }

    #[test]
    fn submissions_complete_immediately() {
        let mut hw = NullHardware::new();
        let id = hw.submit(request(b"abcd")).unwrap();

        let report = hw.status_report(id).unwrap().unwrap();
        assert!(report.is_success());
        assert_eq!(report.consumed_stream_size, NULL_HW_STREAM_SIZE);

        let submissions = hw.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].bitstream_crc, crc32fast::hash(b"abcd"));
        assert!(hw.status_report(SubmissionId(7)).is_err());
    }

    #[test]
    fn injected_failures() {
        let mut hw = NullHardware::new();
        let observer = hw.clone();

        observer.exhaust_next_submission();
        assert!(matches!(
            hw.submit(request(b"")),
            Err(BridgeError::OutOfResources)
        ));

        observer.fail_next_submission();
        assert!(matches!(hw.submit(request(b"")), Err(BridgeError::Other(_))));

        observer.corrupt_next_submission();
        let id = hw.submit(request(b"")).unwrap();
        assert!(!hw.status_report(id).unwrap().unwrap().is_success());

        let id = hw.submit(request(b"")).unwrap();
        assert!(hw.status_report(id).unwrap().unwrap().is_success());
        assert_eq!(observer.submissions().len(), 2);
    }
}
