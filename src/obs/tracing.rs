// self
use crate::{_prelude::*, obs::FlowKind};

/// Type alias that resolves to an instrumented future when tracing is enabled.
#[cfg(feature = "tracing")]
pub type InstrumentedFlow<F> = tracing::instrument::Instrumented<F>;
/// Passthrough future type when tracing is disabled.
#[cfg(not(feature = "tracing"))]
pub type InstrumentedFlow<F> = F;

/// A span builder used by session flows.
#[derive(Clone, Debug)]
pub struct FlowSpan {
	#[cfg(feature = "tracing")]
	span: tracing::Span,
}
impl FlowSpan {
	/// Creates a new span tagged with the provided flow kind + stage.
	pub fn new(kind: FlowKind, stage: &'static str) -> Self {
		#[cfg(feature = "tracing")]
		{
			let span = tracing::info_span!("session_broker.flow", flow = kind.as_str(), stage);

			Self { span }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = (kind, stage);

			Self {}
		}
	}

	/// Enters the span for synchronous sections.
	pub fn entered(self) -> FlowSpanGuard {
		#[cfg(feature = "tracing")]
		{
			FlowSpanGuard { _guard: self.span.entered() }
		}
		#[cfg(not(feature = "tracing"))]
		{
			let _ = self;

			FlowSpanGuard {}
		}
	}

	/// Instruments an async block without holding a guard across `.await` points.
	pub fn instrument<Fut>(&self, fut: Fut) -> InstrumentedFlow<Fut>
	where
		Fut: Future,
	{
		#[cfg(feature = "tracing")]
		{
			use tracing::Instrument;

			fut.instrument(self.span.clone())
		}
		#[cfg(not(feature = "tracing"))]
		{
			fut
		}
	}
}

/// RAII guard returned by [`FlowSpan::entered`].
pub struct FlowSpanGuard {
	#[cfg(feature = "tracing")]
	_guard: tracing::span::EnteredSpan,
}
impl Debug for FlowSpanGuard {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("FlowSpanGuard(..)")
	}
}

/// Logs a failed flow with its stable failure kind.
///
/// Dependency failures and refresh reuse are logged at `error`; every other rejection at
/// `warn`. Secrets never reach these events.
pub fn log_flow_failure(kind: FlowKind, err: &Error) {
	#[cfg(feature = "tracing")]
	{
		use crate::{error::ErrorClass, store::RefreshFailure};

		match err {
			Error::Refresh(RefreshFailure::ReusedAfterRotation) => tracing::error!(
				flow = kind.as_str(),
				kind = err.kind(),
				"Rotated refresh token was presented again."
			),
			_ if err.class() == ErrorClass::Dependency => tracing::error!(
				flow = kind.as_str(),
				kind = err.kind(),
				error = %err,
				"Session flow failed on a dependency."
			),
			_ => tracing::warn!(flow = kind.as_str(), kind = err.kind(), "Session flow rejected."),
		}
	}

	#[cfg(not(feature = "tracing"))]
	{
		let _ = (kind, err);
	}
}
