//! Trace, span and correlation identifiers.
//!
//! Trace and span ids use the W3C Trace Context wire form: 32 lower-hex
//! characters for a trace id, 16 for a span id. All-zero ids are invalid and
//! never generated.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;
use uuid::Uuid;

/// Longest correlation id accepted from a caller.
pub const MAX_CORRELATION_ID_LEN: usize = 128;

/// Errors parsing a hex identifier.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("expected {expected} hex characters, got {actual}")]
    Length { expected: usize, actual: usize },

    #[error("identifier contains a non lower-hex character")]
    InvalidHex,

    #[error("all-zero identifier is not allowed")]
    Zero,
}

fn check_hex(s: &str, expected: usize) -> Result<(), IdError> {
    if s.len() != expected {
        return Err(IdError::Length { expected, actual: s.len() });
    }
    if !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f')) {
        return Err(IdError::InvalidHex);
    }
    Ok(())
}

/// 128-bit trace identifier shared by every record of one logical request.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

impl TraceId {
    /// Generate a random, non-zero trace id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let value: u128 = rng.gen();
            if value != 0 {
                return Self(value);
            }
        }
    }

    pub fn from_u128(value: u128) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    /// Reuse the 128 bits of a UUID as a trace id.
    pub fn from_uuid(uuid: Uuid) -> Option<Self> {
        Self::from_u128(uuid.as_u128())
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl FromStr for TraceId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_hex(s, 32)?;
        let value = u128::from_str_radix(s, 16).map_err(|_| IdError::InvalidHex)?;
        Self::from_u128(value).ok_or(IdError::Zero)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032x}", self.0)
    }
}

impl fmt::Debug for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TraceId({})", self)
    }
}

/// 64-bit span identifier, unique within its trace.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl SpanId {
    /// Generate a random, non-zero span id.
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let value: u64 = rng.gen();
            if value != 0 {
                return Self(value);
            }
        }
    }

    pub fn from_u64(value: u64) -> Option<Self> {
        (value != 0).then_some(Self(value))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl FromStr for SpanId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        check_hex(s, 16)?;
        let value = u64::from_str_radix(s, 16).map_err(|_| IdError::InvalidHex)?;
        Self::from_u64(value).ok_or(IdError::Zero)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

impl fmt::Debug for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SpanId({})", self)
    }
}

// Both ids travel as their hex strings in JSON.
macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let raw = String::deserialize(deserializer)?;
                raw.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(TraceId);
hex_serde!(SpanId);

/// Opaque identifier joining every record of one logical request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh correlation id (UUID v4, hyphenated).
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Accept a caller-supplied id verbatim if it is syntactically valid.
    ///
    /// Valid ids are 1..=128 characters drawn from `[A-Za-z0-9._:-]`.
    pub fn parse(value: &str) -> Option<Self> {
        let valid = !value.is_empty()
            && value.len() <= MAX_CORRELATION_ID_LEN
            && value
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b':'));
        valid.then(|| Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The trace id this correlation id maps onto, when it carries 128 bits
    /// (a UUID or a 32-hex string).
    pub fn embedded_trace_id(&self) -> Option<TraceId> {
        if let Ok(uuid) = Uuid::parse_str(&self.0) {
            return TraceId::from_uuid(uuid);
        }
        self.0.to_ascii_lowercase().parse().ok()
    }
}

impl From<TraceId> for CorrelationId {
    fn from(trace_id: TraceId) -> Self {
        Self(trace_id.to_string())
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trace_id_hex_form() {
        let id: TraceId = "4bf92f3577b34da6a3ce929d0e0e4736".parse().unwrap();
        assert_eq!(id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(TraceId::from_u128(1).unwrap().to_string().len(), 32);
    }

    #[test]
    fn test_rejects_malformed_ids() {
        assert_eq!(
            "abc".parse::<TraceId>(),
            Err(IdError::Length { expected: 32, actual: 3 })
        );
        assert_eq!(
            "4BF92F3577B34DA6A3CE929D0E0E4736".parse::<TraceId>(),
            Err(IdError::InvalidHex)
        );
        assert_eq!("0000000000000000".parse::<SpanId>(), Err(IdError::Zero));
        assert_eq!("+0f067aa0ba902b7".parse::<SpanId>(), Err(IdError::InvalidHex));
    }

    #[test]
    fn test_generated_ids_are_non_zero_and_distinct() {
        let a = TraceId::generate();
        let b = TraceId::generate();
        assert_ne!(a.as_u128(), 0);
        assert_ne!(a, b);
        assert_ne!(SpanId::generate().as_u64(), 0);
    }

    #[test]
    fn test_correlation_id_validation() {
        assert!(CorrelationId::parse("order-42:web.1_a").is_some());
        assert!(CorrelationId::parse("").is_none());
        assert!(CorrelationId::parse("has space").is_none());
        assert!(CorrelationId::parse(&"a".repeat(129)).is_none());
        assert!(CorrelationId::parse(&"a".repeat(128)).is_some());
    }

    #[test]
    fn test_embedded_trace_id() {
        let uuid = Uuid::new_v4();
        let id = CorrelationId::parse(&uuid.to_string()).unwrap();
        assert_eq!(id.embedded_trace_id(), TraceId::from_uuid(uuid));

        let hex = CorrelationId::parse("4BF92F3577B34DA6A3CE929D0E0E4736").unwrap();
        assert_eq!(
            hex.embedded_trace_id().unwrap().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );

        assert!(CorrelationId::parse("req-1").unwrap().embedded_trace_id().is_none());
    }

    #[test]
    fn test_ids_serialize_as_hex_strings() {
        let span: SpanId = "00f067aa0ba902b7".parse().unwrap();
        let json = serde_json::to_string(&span).unwrap();
        assert_eq!(json, "\"00f067aa0ba902b7\"");
        let back: SpanId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, span);
        assert!(serde_json::from_str::<SpanId>("\"zz\"").is_err());
    }
}
