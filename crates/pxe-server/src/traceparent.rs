//! Trace context smuggled in TFTP filenames.
//!
//! TFTP has no header or metadata channel, so clients that want their boot
//! attempt correlated with an upstream trace append a W3C-style traceparent
//! to the filename they really want:
//!
//! ```text
//! <original-name>-<2hex flags>-<32hex trace id>-<16hex span id>-<2hex flags>
//! ```
//!
//! e.g. `ipxe.efi-00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01`.
//! The grammar (including the hyphen order) is a wire format shared with
//! other components and must stay backward compatible.

use crate::error::ParseError;
use opentelemetry::Context;
use opentelemetry::trace::{
    SpanContext, SpanId, TraceContextExt, TraceFlags, TraceId, TraceState,
};
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Captures the original filename, trace id, span id and trace flags.
/// Anchored at the start only: anything after the flags group is tolerated.
static TRACEPARENT_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*)-[[:xdigit:]]{2}-([[:xdigit:]]{32})-([[:xdigit:]]{16})-([[:xdigit:]]{2})")
        .expect("traceparent suffix pattern is valid")
});

/// A remote parent span propagated by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: u128,
    span_id: u64,
    sampled: bool,
}

impl TraceContext {
    pub fn trace_id(&self) -> u128 {
        self.trace_id
    }

    pub fn span_id(&self) -> u64 {
        self.span_id
    }

    pub fn sampled(&self) -> bool {
        self.sampled
    }

    /// Trace id as 32 lowercase hex digits.
    pub fn trace_id_hex(&self) -> String {
        format!("{:032x}", self.trace_id)
    }

    /// Span id as 16 lowercase hex digits.
    pub fn span_id_hex(&self) -> String {
        format!("{:016x}", self.span_id)
    }

    /// OpenTelemetry context whose remote span is the client's span, for use
    /// as a span parent.
    pub fn remote_context(&self) -> Context {
        let flags = if self.sampled {
            TraceFlags::SAMPLED
        } else {
            TraceFlags::default()
        };
        let span_context = SpanContext::new(
            TraceId::from_bytes(self.trace_id.to_be_bytes()),
            SpanId::from_bytes(self.span_id.to_be_bytes()),
            flags,
            true,
            TraceState::default(),
        );
        Context::new().with_remote_span_context(span_context)
    }
}

impl fmt::Display for TraceContext {
    /// Renders as a traceparent header value.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = if self.sampled { "01" } else { "00" };
        write!(f, "00-{:032x}-{:016x}-{flags}", self.trace_id, self.span_id)
    }
}

/// Splits a traceparent suffix off `filename`.
///
/// * No suffix: `Ok((filename, None))`.
/// * Valid suffix: `Ok((original_name, Some(context)))`.
/// * Suffix present but the ids do not decode: `Err`, and the caller keeps
///   `filename` unmodified.
///
/// The flags group is not decoded; a propagated context is always sampled.
pub fn split_traceparent(filename: &str) -> Result<(&str, Option<TraceContext>), ParseError> {
    let Some(caps) = TRACEPARENT_SUFFIX.captures(filename) else {
        return Ok((filename, None));
    };
    let (Some(name), Some(trace), Some(span)) = (caps.get(1), caps.get(2), caps.get(3)) else {
        return Ok((filename, None));
    };

    let trace = trace.as_str();
    let trace_id = is_lower_hex(trace)
        .then(|| u128::from_str_radix(trace, 16).ok())
        .flatten()
        .filter(|id| *id != 0)
        .ok_or_else(|| ParseError::TraceId(trace.to_string()))?;
    let span = span.as_str();
    let span_id = is_lower_hex(span)
        .then(|| u64::from_str_radix(span, 16).ok())
        .flatten()
        .filter(|id| *id != 0)
        .ok_or_else(|| ParseError::SpanId(span.to_string()))?;

    Ok((
        name.as_str(),
        Some(TraceContext {
            trace_id,
            span_id,
            sampled: true,
        }),
    ))
}

/// Ids are lowercase hex only.
fn is_lower_hex(hex: &str) -> bool {
    hex.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
