use std::time::Duration;

use tonic::Code;

use super::{Cardinality, InvocationMetadata};

/// One completed server-side call, recorded after its last streamed item
#[derive(Debug, Clone)]
pub struct CollectedCall {
    pub service: String,
    pub method: String,
    pub cardinality: Cardinality,
    pub metadata: InvocationMetadata,
    pub requests: usize,
    pub responses: usize,
    pub code: Code,
    pub elapsed: Duration,
}

impl CollectedCall {
    pub fn path(&self) -> String {
        format!("/{}/{}", self.service, self.method)
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collected_call_path() {
        let call = CollectedCall {
            service: "greeter".to_owned(),
            method: "say_hello".to_owned(),
            cardinality: Cardinality::UnaryUnary,
            metadata: InvocationMetadata::new(),
            requests: 1,
            responses: 1,
            code: Code::Ok,
            elapsed: Duration::from_millis(3),
        };
        assert_eq!(call.path(), "/greeter/say_hello");
        assert!(call.is_ok());
    }
}
