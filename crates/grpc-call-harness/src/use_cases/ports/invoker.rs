use async_trait::async_trait;
use futures::stream::BoxStream;
use tonic::Status;

use crate::entities::{Message, Payload};
use crate::use_cases::Inspector;

/// Trait for clients able to invoke any method of one service by name
#[async_trait]
pub trait Invoker: Send + Sync + Clone + 'static {
    /// Describes the methods this invoker can reach
    fn inspector(&self) -> &Inspector;

    /// Invoke `method`, sending `requests` according to its cardinality.
    ///
    /// Unary-request methods consume only the first message.
    async fn invoke(
        &self,
        method: &str,
        requests: BoxStream<'static, Message>,
    ) -> Result<Payload, Status>;
}
