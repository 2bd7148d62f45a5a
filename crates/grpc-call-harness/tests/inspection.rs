//! Inspector lookups against the greeter definition

mod common;

use common::{Greeter, HelloReply, HelloRequest};
use grpc_call_harness::prelude::*;

#[test]
fn test_path_for_method() {
    let inspector = Inspector::of::<Greeter>();
    assert_eq!(inspector.path_for_method("say_hello").unwrap(), "/greeter/say_hello");
    assert_eq!(
        inspector.path_for_method("say_hello_goodbye").unwrap(),
        "/greeter/say_hello_goodbye"
    );
    assert_eq!(
        inspector.path_for_method("say_hello_to_many").unwrap(),
        "/greeter/say_hello_to_many"
    );
    assert_eq!(
        inspector.path_for_method("say_hello_to_many_at_once").unwrap(),
        "/greeter/say_hello_to_many_at_once"
    );
}

#[test]
fn test_input_type_for_method() {
    let inspector = Inspector::of::<Greeter>();
    assert_eq!(
        inspector.input_type_for_method("say_hello").unwrap(),
        &MessageType::of::<HelloRequest>()
    );
    assert_eq!(
        inspector.input_type_for_method("say_hello").unwrap().name(),
        "greeter.HelloRequest"
    );
}

#[test]
fn test_output_type_for_method() {
    let inspector = Inspector::of::<Greeter>();
    assert_eq!(
        inspector.output_type_for_method("say_hello").unwrap(),
        &MessageType::of::<HelloReply>()
    );
}

#[test]
fn test_cardinality_for_method() {
    let inspector = Inspector::of::<Greeter>();
    assert_eq!(
        inspector.cardinality_for_method("say_hello").unwrap(),
        Cardinality::UnaryUnary
    );
    assert_eq!(
        inspector.cardinality_for_method("say_hello_goodbye").unwrap(),
        Cardinality::UnaryStream
    );
    assert_eq!(
        inspector.cardinality_for_method("say_hello_to_many").unwrap(),
        Cardinality::StreamStream
    );
    assert_eq!(
        inspector.cardinality_for_method("say_hello_to_many_at_once").unwrap(),
        Cardinality::StreamUnary
    );
}

#[test]
fn test_unknown_method() {
    let inspector = Inspector::of::<Greeter>();
    match inspector.path_for_method("say_goodbye") {
        Err(HarnessError::UnknownMethod { service, method }) => {
            assert_eq!(service, "greeter");
            assert_eq!(method, "say_goodbye");
        }
        other => panic!("expected UnknownMethod, got {other:?}"),
    }
}

#[test]
fn test_runtime_descriptor_matches_generated() {
    let json = serde_json::to_string(&<Greeter as ServiceDefinition>::descriptor()).unwrap();
    let loaded = Inspector::new(&ServiceDescriptor::from_json(&json).unwrap());
    let generated = Inspector::of::<Greeter>();
    let loaded: Vec<_> = loaded.methods().cloned().collect();
    let generated: Vec<_> = generated.methods().cloned().collect();
    assert_eq!(loaded, generated);
}
