// Copyright 2025 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

use enumn::N;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::decoder::SessionState;
use crate::registry::ComponentInfo;
use crate::BufferId;
use crate::ContextId;
use crate::Resolution;
use crate::SurfaceId;

pub type Result<T> = std::result::Result<T, DdiError>;

/// Status codes of the host ABI (`VA_STATUS_*`).
#[derive(N, Copy, Clone, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum VaStatus {
    Success = 0x00,
    OperationFailed = 0x01,
    AllocationFailed = 0x02,
    InvalidContext = 0x05,
    InvalidSurface = 0x06,
    InvalidBuffer = 0x07,
    UnsupportedProfile = 0x0c,
    UnsupportedBufferType = 0x0f,
    InvalidParameter = 0x12,
    ResolutionNotSupported = 0x13,
    DecodingError = 0x17,
    NotEnoughBuffer = 0x25,
}

/// Errors returned by the decode entry points.
#[derive(Error, Debug)]
pub enum DdiError {
    #[error("cannot {operation} while the session is {state:?}")]
    InvalidState {
        operation: &'static str,
        state: SessionState,
    },
    #[error("surface {0} does not resolve")]
    InvalidSurface(SurfaceId),
    #[error("buffer {0:?} not found")]
    BufferNotFound(BufferId),
    #[error("buffer type {0} is not supported")]
    UnsupportedBufferType(u32),
    #[error("resource allocation failed: {0}")]
    AllocationFailed(String),
    #[error("bitstream of {size} bytes exceeds the {limit} bytes the hardware can address")]
    BitstreamTooLarge { size: usize, limit: usize },
    #[error("resolution {0} is not supported")]
    ResolutionNotSupported(Resolution),
    #[error("submission failed: {0:#}")]
    SubmissionFailed(anyhow::Error),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("context {0:?} does not exist")]
    InvalidContext(ContextId),
    #[error("no component registered for {0:?}")]
    UnsupportedProfile(ComponentInfo),
}

impl DdiError {
    /// The host ABI status code for this error.
    pub fn va_status(&self) -> VaStatus {
        match self {
            DdiError::InvalidState { .. } => VaStatus::OperationFailed,
            DdiError::InvalidSurface(_) => VaStatus::InvalidSurface,
            DdiError::BufferNotFound(_) => VaStatus::InvalidBuffer,
            DdiError::UnsupportedBufferType(_) => VaStatus::UnsupportedBufferType,
            DdiError::AllocationFailed(_) => VaStatus::AllocationFailed,
            DdiError::BitstreamTooLarge { .. } => VaStatus::NotEnoughBuffer,
            DdiError::ResolutionNotSupported(_) => VaStatus::ResolutionNotSupported,
            DdiError::SubmissionFailed(_) => VaStatus::DecodingError,
            DdiError::InvalidParameter(_) => VaStatus::InvalidParameter,
            DdiError::InvalidContext(_) => VaStatus::InvalidContext,
            DdiError::UnsupportedProfile(_) => VaStatus::UnsupportedProfile,
        }
    }

    /// Whether the failed operation left the session untouched, so the same call can be
    /// retried once resources are available again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DdiError::AllocationFailed(_))
    }
}

impl From<BridgeError> for DdiError {
    fn from(value: BridgeError) -> Self {
        match value {
            BridgeError::OutOfResources => {
                DdiError::AllocationFailed("hardware command buffer unavailable".into())
            }
            BridgeError::Other(e) => DdiError::SubmissionFailed(e),
        }
    }
}
