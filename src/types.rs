//! Core type definitions for the harness.
//!
//! Provides zero-cost newtypes to prevent field mixups at compile time.

use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};

/// Macro to generate newtype wrappers with common implementations
macro_rules! harness_newtype {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty) => $prefix:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
        #[derive(Serialize, Deserialize)]
        #[repr(transparent)]
        pub struct $name(pub $inner);

        impl $name {
            /// Creates a new instance
            #[inline]
            pub const fn new(value: $inner) -> Self {
                Self(value)
            }

            /// Raw value
            #[inline]
            pub const fn value(self) -> $inner {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }

        impl From<$inner> for $name {
            #[inline]
            fn from(value: $inner) -> Self {
                Self(value)
            }
        }

        impl From<$name> for $inner {
            #[inline]
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl PartialEq<$inner> for $name {
            #[inline]
            fn eq(&self, other: &$inner) -> bool {
                self.0 == *other
            }
        }

        impl AddAssign<$inner> for $name {
            #[inline]
            fn add_assign(&mut self, rhs: $inner) {
                self.0 = self.0.wrapping_add(rhs);
            }
        }
    };
}

harness_newtype!(
    /// Context identifier for ROHC compression/decompression state.
    ContextId(u16) => "CID"
);

harness_newtype!(
    /// 1-based ordinal of a frame in the input flow.
    FrameNumber(u32) => "#"
);

/// Identifies one of the two codec sessions of a run.
///
/// Sessions live in an arena; each refers to its partner through this id
/// instead of holding a pointer to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionId {
    /// First session (compressor 1 / decompressor 1).
    A,
    /// Second session (compressor 2 / decompressor 2).
    B,
}

impl SessionId {
    /// Both sessions, in processing order.
    pub const ALL: [SessionId; 2] = [SessionId::A, SessionId::B];

    /// Arena slot of the session.
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            SessionId::A => 0,
            SessionId::B => 1,
        }
    }

    /// The session whose compressor receives this session's decompressor feedback.
    #[inline]
    pub const fn partner(self) -> SessionId {
        match self {
            SessionId::A => SessionId::B,
            SessionId::B => SessionId::A,
        }
    }

    /// 1-based number used in reports and size records.
    #[inline]
    pub const fn number(self) -> u32 {
        self.index() as u32 + 1
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.number())
    }
}
