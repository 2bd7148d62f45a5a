use crate::entities::CollectedCall;

/// Trait for observing completed calls while a host is serving
///
/// Each call is reported once, after its last streamed item, so a collector
/// sees a streaming call as a single unit of work.
/// The `Output` type is the final result returned when the host shuts down.
pub trait Collector: Send + Sync {
    /// The type returned when the host shuts down
    type Output: Send;

    /// Called when a call completes, successfully or not
    fn collect(&self, call: CollectedCall);

    /// Consume the collector and return the final output
    fn into_output(self) -> Self::Output;
}
