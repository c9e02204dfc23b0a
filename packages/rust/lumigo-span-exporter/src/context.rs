//! Per-invocation execution context.
//!
//! The exporter runs on whatever thread ends a span, inside or after the
//! handler, so it cannot see the invocation directly.
//! The tracer publishes the bound [`ExecutionContext`] into a shared
//! [`InvocationSlot`] for the duration of the invocation instead.

use std::sync::{PoisonError, RwLock};

/// Facts about the current invocation needed to build span records.
///
/// Values are immutable once built. [`ExecutionContext::bind`] returns a new
/// value carrying the process-wide container id and warm snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionContext {
    request_id: String,
    invoked_function_arn: String,
    deadline_ms: i64,
    trace_header: Option<String>,
    container_id: String,
    warm: bool,
}

impl ExecutionContext {
    pub fn new(request_id: impl Into<String>, invoked_function_arn: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            invoked_function_arn: invoked_function_arn.into(),
            ..Default::default()
        }
    }

    /// Sets the invocation deadline in milliseconds since the epoch.
    pub fn with_deadline(self, deadline_ms: i64) -> Self {
        Self {
            deadline_ms,
            ..self
        }
    }

    /// Sets the X-Ray trace header received with the invocation.
    pub fn with_trace_header(self, header: impl Into<String>) -> Self {
        Self {
            trace_header: Some(header.into()),
            ..self
        }
    }

    /// Binds the context to the process: the container id survives warm
    /// invocations, `warm` is the readiness snapshot taken at span open.
    pub fn bind(self, container_id: impl Into<String>, warm: bool) -> Self {
        Self {
            container_id: container_id.into(),
            warm,
            ..self
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn invoked_function_arn(&self) -> &str {
        &self.invoked_function_arn
    }

    pub fn deadline_ms(&self) -> i64 {
        self.deadline_ms
    }

    pub fn trace_header(&self) -> Option<&str> {
        self.trace_header.as_deref()
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// True when a previous invocation completed in this process.
    pub fn is_warm(&self) -> bool {
        self.warm
    }
}

/// Holder for the context of the invocation currently in flight.
#[derive(Debug, Default)]
pub struct InvocationSlot {
    current: RwLock<Option<ExecutionContext>>,
}

impl InvocationSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes the context of a new invocation, replacing any previous one.
    pub fn set(&self, ctx: ExecutionContext) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Some(ctx);
    }

    pub fn clear(&self) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Returns a copy of the current context, if an invocation is in flight.
    pub fn current(&self) -> Option<ExecutionContext> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
