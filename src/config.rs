//! Run configuration.
//!
//! [`HarnessConfig`] is built from the command line by the binary (or directly
//! by tests) and validated once before any session exists.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::codec::{CompressorConfig, DecompressorConfig, ProfileSet};
use crate::constants::{
    DEFAULT_IR_REFRESH_INTERVAL, DEFAULT_IR_REPETITIONS, DEFAULT_MAX_CONTEXTS,
    MAX_CONTEXTS_LIMIT, SMALL_CID_CONTEXTS,
};
use crate::error::HarnessError;
use crate::types::SessionId;

pub use crate::codec::CidType;

/// How the maximum number of contexts is split between the two sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ContextSizing {
    /// Both sessions get the configured maximum.
    #[default]
    Symmetric,
    /// Session A gets one context fewer (at least one), as historical reference
    /// captures were produced that way.
    HistoricalAsymmetric,
}

/// Whether compressed units can be expected to match a reference flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceMode {
    /// Compare every compressed unit against the reference flow.
    Compare,
    /// The build cannot reproduce historical references: the comparison is
    /// recorded as unmatched and a clean run is reported as skipped.
    Unmatchable,
}

impl Default for ReferenceMode {
    fn default() -> Self {
        if cfg!(feature = "rtp-bit-type") {
            ReferenceMode::Unmatchable
        } else {
            ReferenceMode::Compare
        }
    }
}

/// Configuration of a non-regression run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarnessConfig {
    pub cid_type: CidType,
    pub max_contexts: u32,
    pub context_sizing: ContextSizing,
    pub reference_mode: ReferenceMode,
    pub ir_refresh_interval: u32,
    pub ir_repetitions: u32,
    /// Profiles enabled identically on both compressors.
    pub profiles: ProfileSet,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            cid_type: CidType::Small,
            max_contexts: DEFAULT_MAX_CONTEXTS,
            context_sizing: ContextSizing::Symmetric,
            reference_mode: ReferenceMode::default(),
            ir_refresh_interval: DEFAULT_IR_REFRESH_INTERVAL,
            ir_repetitions: DEFAULT_IR_REPETITIONS,
            profiles: ProfileSet::all(),
        }
    }
}

impl HarnessConfig {
    /// Creates a configuration with defaults for everything but the CID type.
    pub fn new(cid_type: CidType) -> Self {
        Self {
            cid_type,
            ..Self::default()
        }
    }

    /// Checks the configuration before any session is built.
    ///
    /// # Errors
    /// - [`HarnessError::InvalidMaxContexts`] - Maximum outside 1..=16384
    pub fn validate(&self) -> Result<(), HarnessError> {
        if !(1..=MAX_CONTEXTS_LIMIT).contains(&self.max_contexts) {
            return Err(HarnessError::InvalidMaxContexts(self.max_contexts));
        }
        if self.cid_type == CidType::Small && self.max_contexts > SMALL_CID_CONTEXTS {
            warn!(
                max_contexts = self.max_contexts,
                "Small CIDs address at most {} contexts; extra contexts are unused",
                SMALL_CID_CONTEXTS
            );
        }
        Ok(())
    }

    /// Maximum number of contexts for `session`.
    pub fn max_contexts_for(&self, session: SessionId) -> u32 {
        match (self.context_sizing, session) {
            (ContextSizing::HistoricalAsymmetric, SessionId::A) => {
                self.max_contexts.saturating_sub(1).max(1)
            }
            _ => self.max_contexts,
        }
    }

    /// Compressor settings for `session`.
    pub fn compressor_config(&self, session: SessionId) -> CompressorConfig {
        CompressorConfig {
            cid_type: self.cid_type,
            max_contexts: self.max_contexts_for(session),
            profiles: self.profiles,
            ir_refresh_interval: self.ir_refresh_interval,
            ir_repetitions: self.ir_repetitions,
        }
    }

    /// Decompressor settings for `session`; it decodes that session's compressor.
    pub fn decompressor_config(&self, session: SessionId) -> DecompressorConfig {
        DecompressorConfig {
            cid_type: self.cid_type,
            max_contexts: self.max_contexts_for(session),
        }
    }
}
