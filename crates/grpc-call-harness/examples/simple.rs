//! Simple example demonstrating basic usage of grpc-call-harness
//!
//! This example shows how to:
//! - Host one service whose four methods cover every cardinality
//! - Call each method by name through the untyped stub
//! - Drive a call through named pipes, as another process would
//! - Get the collected calls once the server shuts down

use futures::{stream, StreamExt, TryStreamExt};
use grpc_call_harness::prelude::*;
use std::net::SocketAddr;
use tonic::Status;

#[derive(Clone, PartialEq, prost::Message)]
struct Note {
    #[prost(string, tag = "1")]
    text: String,
}

impl prost::Name for Note {
    const NAME: &'static str = "Note";
    const PACKAGE: &'static str = "notes";
}

impl ArtificialDelay for Note {}

fn note(text: &str) -> Message {
    Message::from_prost(&Note {
        text: text.to_owned(),
    })
}

fn text(message: &Message) -> String {
    message.decode::<Note>().map(|n| n.text).unwrap_or_default()
}

fn descriptor() -> ServiceDescriptor {
    ServiceDescriptor::new("notes")
        .with_method(MethodDefinition::typed::<Note, Note>("shout", false, false))
        .with_method(MethodDefinition::typed::<Note, Note>("spell", false, true))
        .with_method(MethodDefinition::typed::<Note, Note>("join", true, false))
        .with_method(MethodDefinition::typed::<Note, Note>("echo", true, true))
}

fn service() -> Service {
    Service::new(descriptor())
        .with_method(Method::new(
            "shout",
            Handler::unary_unary(|_ctx, note: Note| async move {
                Ok::<_, Status>(Note {
                    text: note.text.to_uppercase(),
                })
            }),
        ))
        .with_method(Method::new(
            "spell",
            Handler::unary_stream(|_ctx, note: Note| {
                let letters: Vec<_> = note.text.chars().map(|c| c.to_string()).collect();
                stream::iter(letters).map(|text| Ok::<_, Status>(Note { text }))
            }),
        ))
        .with_method(Method::new(
            "join",
            Handler::stream_unary(|_ctx, notes: RequestStream<Note>| async move {
                let texts: Vec<String> = notes.map_ok(|n| n.text).try_collect().await?;
                Ok::<_, Status>(Note {
                    text: texts.join(" "),
                })
            }),
        ))
        .with_method(Method::new(
            "echo",
            Handler::stream_stream(|_ctx, notes: RequestStream<Note>| notes),
        ))
}

#[tokio::main]
async fn main() -> Result<(), HarnessError> {
    println!("Starting gRPC host...");

    let (ready_tx, ready_rx) = tokio::sync::oneshot::channel::<SocketAddr>();
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();

    let server = tokio::spawn(
        HostBuilder::new()
            .server(Hyper::default())
            .collector(DefaultCollector::new())
            .service(service())
            .build()
            .serve(
                Some(move |addr| {
                    let _ = ready_tx.send(addr);
                }),
                async move {
                    let _ = stop_rx.await;
                },
            ),
    );

    let addr = ready_rx
        .await
        .map_err(|_| HarnessError::ServerError("host stopped before it was ready".into()))?;
    println!("Host is ready at http://{addr}\n");

    let stub = GrpcStub::connect(format!("http://{addr}"), &descriptor()).await?;

    let shouted = stub.unary("shout", note("hello")).await.map_err(CallError::from)?;
    println!("shout: {}", text(&shouted));

    let letters: Vec<Message> = stub
        .server_streaming("spell", note("abc"))
        .await
        .map_err(CallError::from)?
        .try_collect()
        .await
        .map_err(CallError::from)?;
    println!("spell: {:?}", letters.iter().map(text).collect::<Vec<_>>());

    let joined = stub
        .client_streaming("join", stream::iter([note("one"), note("two")]))
        .await
        .map_err(CallError::from)?;
    println!("join: {}", text(&joined));

    // Drive one call the way an external process would: command pipe in,
    // a request pipe and a response pipe per call.
    let dir = tempfile::tempdir()?;
    let mut commands = FifoPipe::create(dir.path().join("commands"))?;
    let mut requests = FifoPipe::create(dir.path().join("requests"))?;
    let mut responses = FifoPipe::create(dir.path().join("responses"))?;

    let driver = CallDriver::new(stub);
    let command_path = commands.path().to_path_buf();
    let driving = tokio::spawn(async move { driver.run(FifoPipe::wrap(command_path)).await });

    commands
        .send(&Command::Call(CallConfig::new(
            "echo",
            requests.path(),
            responses.path(),
        )))
        .await?;
    for word in ["over", "pipes"] {
        requests.send(&note(word)).await?;
    }
    requests.close();
    while let Some(reply) = responses.receive::<Reply>().await? {
        println!("echo via driver: {}", text(&reply.into_result()?));
    }
    commands.send(&Command::Stop).await?;
    driving
        .await
        .map_err(|e| HarnessError::ServerError(e.to_string()))??;

    let _ = stop_tx.send(());
    let calls = server
        .await
        .map_err(|e| HarnessError::ServerError(e.to_string()))??;

    println!("\n=== Collected Calls ===");
    for (i, call) in calls.iter().enumerate() {
        println!(
            "Call {}: {} {:?} requests={} responses={} status={:?}",
            i + 1,
            call.path(),
            call.cardinality,
            call.requests,
            call.responses,
            call.code
        );
    }

    Ok(())
}
