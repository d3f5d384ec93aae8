//! The two cross-wired codec sessions of a run.
//!
//! Sessions live in a fixed two-slot arena indexed by [`SessionId`]. Each
//! decompressor's feedback is routed by the arena to the compressor of the
//! partner session, so no codec ever owns a pointer to another one.
//!
//! Construction order is compressor A, compressor B, decompressor A,
//! decompressor B. Release order is decompressor A, decompressor B,
//! compressor A, compressor B, and it is applied on every exit path,
//! including a construction that fails halfway.

use std::fmt;

use tracing::{debug, trace, warn};

use crate::codec::{CodecFactory, Compressor, Decompressor, FeedbackBatch, Statistic};
use crate::config::HarnessConfig;
use crate::error::{CodecError, HarnessError};
use crate::types::SessionId;

/// Which half of a session a codec is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecRole {
    Compressor,
    Decompressor,
}

impl CodecRole {
    pub const fn as_str(self) -> &'static str {
        match self {
            CodecRole::Compressor => "compressor",
            CodecRole::Decompressor => "decompressor",
        }
    }
}

impl fmt::Display for CodecRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One compressor/decompressor pair.
///
/// Either half is `None` before construction completes and after release.
#[derive(Debug)]
pub struct CodecSession {
    id: SessionId,
    max_contexts: u32,
    compressor: Option<Box<dyn Compressor>>,
    decompressor: Option<Box<dyn Decompressor>>,
}

impl CodecSession {
    fn empty(id: SessionId, max_contexts: u32) -> Self {
        Self {
            id,
            max_contexts,
            compressor: None,
            decompressor: None,
        }
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Session whose compressor receives this session's decompressor feedback.
    pub fn partner(&self) -> SessionId {
        self.id.partner()
    }

    pub fn max_contexts(&self) -> u32 {
        self.max_contexts
    }

    /// Whether both halves are alive.
    pub fn is_ready(&self) -> bool {
        self.compressor.is_some() && self.decompressor.is_some()
    }

    fn released(&self, role: CodecRole) -> CodecError {
        CodecError::Internal(format!("{role} {} already released", self.id))
    }

    /// Compresses `payload` into `out`.
    ///
    /// # Errors
    /// - Any [`CodecError`] returned by the compressor, or
    ///   [`CodecError::Internal`] once the compressor is released
    pub fn compress(&mut self, payload: &[u8], out: &mut [u8]) -> Result<usize, CodecError> {
        match self.compressor.as_mut() {
            Some(compressor) => compressor.compress(payload, out),
            None => Err(self.released(CodecRole::Compressor)),
        }
    }

    /// Decompresses `packet` into `out`, collecting feedback into `feedback`.
    ///
    /// # Errors
    /// - Any [`CodecError`] returned by the decompressor, or
    ///   [`CodecError::Internal`] once the decompressor is released
    pub fn decompress(
        &mut self,
        packet: &[u8],
        out: &mut [u8],
        feedback: &mut FeedbackBatch,
    ) -> Result<usize, CodecError> {
        match self.decompressor.as_mut() {
            Some(decompressor) => decompressor.decompress(packet, out, feedback),
            None => Err(self.released(CodecRole::Decompressor)),
        }
    }

    fn release(&mut self, role: CodecRole) -> bool {
        let released = match role {
            CodecRole::Compressor => self.compressor.take().map(drop).is_some(),
            CodecRole::Decompressor => self.decompressor.take().map(drop).is_some(),
        };
        if released {
            debug!(session = %self.id, %role, "Released");
        }
        released
    }
}

/// Statistics of one codec, captured before teardown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodecStatistics {
    pub session: SessionId,
    pub role: CodecRole,
    pub counters: Vec<Statistic>,
}

/// What happened to the feedback collected by one decompression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedbackRouting {
    /// Elements queued on the partner compressor for piggybacking.
    pub piggybacked: usize,
    /// Elements applied by the partner compressor.
    pub delivered: usize,
    /// Elements the partner compressor refused.
    pub rejected: usize,
}

impl FeedbackRouting {
    pub fn is_empty(&self) -> bool {
        self.piggybacked == 0 && self.delivered == 0 && self.rejected == 0
    }
}

/// Arena holding both sessions of a run.
#[derive(Debug)]
pub struct SessionArena {
    sessions: [CodecSession; 2],
}

impl SessionArena {
    /// Builds both sessions through `factory`.
    ///
    /// Halves built before a failure are released in teardown order before the
    /// error is returned.
    ///
    /// # Errors
    /// - [`HarnessError::SessionConstruction`] - The factory refused one of the codecs
    pub fn build(factory: &dyn CodecFactory, config: &HarnessConfig) -> Result<Self, HarnessError> {
        let mut arena = Self {
            sessions: SessionId::ALL
                .map(|id| CodecSession::empty(id, config.max_contexts_for(id))),
        };

        for id in SessionId::ALL {
            let compressor = factory
                .create_compressor(id, &config.compressor_config(id))
                .map_err(|e| construction_error(CodecRole::Compressor, id, e))?;
            debug!(session = %id, max_contexts = config.max_contexts_for(id), "Compressor created");
            arena.sessions[id.index()].compressor = Some(compressor);
        }

        for id in SessionId::ALL {
            let decompressor = factory
                .create_decompressor(id, &config.decompressor_config(id))
                .map_err(|e| construction_error(CodecRole::Decompressor, id, e))?;
            debug!(
                session = %id,
                feedback_to = %id.partner(),
                "Decompressor created"
            );
            arena.sessions[id.index()].decompressor = Some(decompressor);
        }

        Ok(arena)
    }

    pub fn session(&self, id: SessionId) -> &CodecSession {
        &self.sessions[id.index()]
    }

    pub fn session_mut(&mut self, id: SessionId) -> &mut CodecSession {
        &mut self.sessions[id.index()]
    }

    /// Routes the feedback collected by session `from`'s decompressor to the
    /// partner session's compressor, draining `batch`.
    ///
    /// Feedback generated by the decompressor is queued for piggybacking;
    /// feedback extracted from the unit is applied directly. A refused element
    /// is logged and counted, never fatal.
    pub fn route_feedback(&mut self, from: SessionId, batch: &mut FeedbackBatch) -> FeedbackRouting {
        let mut routing = FeedbackRouting::default();
        let to = from.partner();
        let Some(compressor) = self.sessions[to.index()].compressor.as_mut() else {
            if !batch.is_empty() {
                warn!(%from, %to, "Partner compressor released, feedback dropped");
            }
            batch.clear();
            return routing;
        };

        for element in batch.to_send.drain(..) {
            trace!(%from, %to, %element, "Feedback queued for piggybacking");
            compressor.piggyback_feedback(element);
            routing.piggybacked += 1;
        }
        for element in batch.received.drain(..) {
            match compressor.deliver_feedback(&element) {
                Ok(()) => {
                    trace!(%from, %to, %element, "Feedback delivered");
                    routing.delivered += 1;
                }
                Err(e) => {
                    warn!(%from, %to, %element, error = %e, "Feedback refused by compressor");
                    routing.rejected += 1;
                }
            }
        }
        routing
    }

    /// Counters of the four codecs, in report order.
    pub fn statistics(&self) -> Vec<CodecStatistics> {
        let mut stats = Vec::with_capacity(4);
        for session in &self.sessions {
            if let Some(compressor) = &session.compressor {
                stats.push(CodecStatistics {
                    session: session.id,
                    role: CodecRole::Compressor,
                    counters: compressor.statistics(),
                });
            }
            if let Some(decompressor) = &session.decompressor {
                stats.push(CodecStatistics {
                    session: session.id,
                    role: CodecRole::Decompressor,
                    counters: decompressor.statistics(),
                });
            }
        }
        stats
    }

    /// Releases every codec still alive: both decompressors, then both compressors.
    ///
    /// # Returns
    /// The codecs released by this call, in release order. Calling it again
    /// returns an empty list.
    pub fn shutdown(&mut self) -> Vec<(CodecRole, SessionId)> {
        let mut released = Vec::new();
        for role in [CodecRole::Decompressor, CodecRole::Compressor] {
            for session in &mut self.sessions {
                if session.release(role) {
                    released.push((role, session.id));
                }
            }
        }
        released
    }
}

impl Drop for SessionArena {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn construction_error(role: CodecRole, session: SessionId, error: CodecError) -> HarnessError {
    HarnessError::SessionConstruction {
        role: role.as_str(),
        session,
        reason: error.to_string(),
    }
}
