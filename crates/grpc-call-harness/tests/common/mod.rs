//! Shared fixtures: the greeter and example services, a server runner and
//! the peer side of the call driver's pipes.
#![allow(dead_code)]

use futures::{stream, StreamExt, TryStreamExt};
use grpc_call_harness::prelude::*;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tonic::Status;

// --- greeter ---------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloRequest {
    #[prost(string, tag = "1")]
    pub name: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct HelloReply {
    #[prost(string, tag = "1")]
    pub message: String,
}

impl prost::Name for HelloRequest {
    const NAME: &'static str = "HelloRequest";
    const PACKAGE: &'static str = "greeter";
}

impl prost::Name for HelloReply {
    const NAME: &'static str = "HelloReply";
    const PACKAGE: &'static str = "greeter";
}

impl ArtificialDelay for HelloRequest {}

pub struct Greeter;

impl ServiceDefinition for Greeter {
    fn descriptor() -> ServiceDescriptor {
        ServiceDescriptor::new("greeter")
            .with_method(MethodDefinition::typed::<HelloRequest, HelloReply>(
                "say_hello",
                false,
                false,
            ))
            .with_method(MethodDefinition::typed::<HelloRequest, HelloReply>(
                "say_hello_goodbye",
                false,
                true,
            ))
            .with_method(MethodDefinition::typed::<HelloRequest, HelloReply>(
                "say_hello_to_many",
                true,
                true,
            ))
            .with_method(MethodDefinition::typed::<HelloRequest, HelloReply>(
                "say_hello_to_many_at_once",
                true,
                false,
            ))
    }
}

fn reply(message: String) -> HelloReply {
    HelloReply { message }
}

pub fn greeter_service() -> Service {
    Service::of::<Greeter>()
        .with_method(Method::new(
            "say_hello",
            Handler::unary_unary(|_ctx, request: HelloRequest| async move {
                if request.name.is_empty() {
                    return Err(Status::invalid_argument("name must not be empty"));
                }
                Ok(reply(format!("Hello, {}!", request.name)))
            }),
        ))
        .with_method(Method::new(
            "say_hello_goodbye",
            Handler::unary_stream(|_ctx, request: HelloRequest| {
                stream::iter(vec![
                    Ok::<_, Status>(reply(format!("Hello, {}!", request.name))),
                    Ok(reply(format!("Goodbye, {}!", request.name))),
                ])
            }),
        ))
        .with_method(Method::new(
            "say_hello_to_many",
            Handler::stream_stream(|_ctx, requests: RequestStream<HelloRequest>| {
                requests.map_ok(|request| reply(format!("Hi {}", request.name)))
            }),
        ))
        .with_method(Method::new(
            "say_hello_to_many_at_once",
            Handler::stream_unary(|_ctx, requests: RequestStream<HelloRequest>| async move {
                let names: Vec<String> = requests.map_ok(|request| request.name).try_collect().await?;
                Ok::<_, Status>(reply(format!("Hi {}!", names.join(", "))))
            }),
        ))
}

pub fn hello(name: &str) -> Message {
    Message::from_prost(&HelloRequest {
        name: name.to_owned(),
    })
}

pub fn greeting(message: &Message) -> String {
    message.decode::<HelloReply>().expect("not a HelloReply").message
}

// --- example -----------------------------------------------------------------

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExampleRequest {
    #[prost(string, tag = "1")]
    pub value: String,
    #[prost(int32, tag = "2")]
    pub multiplier: i32,
    #[prost(int32, tag = "3")]
    pub response_count: i32,
    /// Milliseconds to wait before answering
    #[prost(int32, tag = "4")]
    pub delay: i32,
    #[prost(string, tag = "5")]
    pub stash: String,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct ExampleReply {
    #[prost(string, tag = "1")]
    pub message: String,
    #[prost(int32, tag = "2")]
    pub seqno: i32,
    #[prost(string, tag = "3")]
    pub metadata: String,
    #[prost(string, tag = "4")]
    pub stash: String,
}

impl prost::Name for ExampleRequest {
    const NAME: &'static str = "ExampleRequest";
    const PACKAGE: &'static str = "example";
}

impl prost::Name for ExampleReply {
    const NAME: &'static str = "ExampleReply";
    const PACKAGE: &'static str = "example";
}

impl ArtificialDelay for ExampleRequest {
    fn delay(&self) -> Option<Duration> {
        (self.delay > 0).then(|| Duration::from_millis(self.delay as u64))
    }
}

impl ExampleRequest {
    pub fn new(value: &str) -> Self {
        Self {
            value: value.to_owned(),
            ..Default::default()
        }
    }

    fn product(&self) -> String {
        self.value.repeat(self.multiplier.max(1) as usize)
    }
}

pub struct Example;

impl ServiceDefinition for Example {
    fn descriptor() -> ServiceDescriptor {
        Cardinality::ALL
            .iter()
            .fold(ServiceDescriptor::new("example"), |descriptor, cardinality| {
                let name = match cardinality {
                    Cardinality::UnaryUnary => "unary_unary",
                    Cardinality::UnaryStream => "unary_stream",
                    Cardinality::StreamUnary => "stream_unary",
                    Cardinality::StreamStream => "stream_stream",
                };
                descriptor.with_method(MethodDefinition::typed::<ExampleRequest, ExampleReply>(
                    name,
                    cardinality.request_streaming(),
                    cardinality.response_streaming(),
                ))
            })
    }
}

fn metadata_json(ctx: &RequestContext) -> Result<String, Status> {
    ctx.metadata
        .to_json()
        .map_err(|e| Status::internal(e.to_string()))
}

pub fn example_service() -> Service {
    Service::of::<Example>()
        .with_method(Method::new(
            "unary_unary",
            Handler::unary_unary(|ctx, request: ExampleRequest| async move {
                Ok::<_, Status>(ExampleReply {
                    message: request.product(),
                    seqno: 0,
                    metadata: metadata_json(&ctx)?,
                    stash: request.stash,
                })
            }),
        ))
        .with_method(Method::new(
            "unary_stream",
            Handler::unary_stream(|ctx, request: ExampleRequest| {
                let metadata = metadata_json(&ctx);
                let message = request.product();
                stream::iter(1..=request.response_count).map(move |seqno| {
                    Ok::<_, Status>(ExampleReply {
                        message: message.clone(),
                        seqno,
                        metadata: metadata.clone()?,
                        stash: request.stash.clone(),
                    })
                })
            }),
        ))
        .with_method(Method::new(
            "stream_unary",
            Handler::stream_unary(|ctx, requests: RequestStream<ExampleRequest>| async move {
                let requests: Vec<ExampleRequest> = requests.try_collect().await?;
                Ok::<_, Status>(ExampleReply {
                    message: requests
                        .iter()
                        .map(ExampleRequest::product)
                        .collect::<Vec<_>>()
                        .join(","),
                    seqno: 0,
                    metadata: metadata_json(&ctx)?,
                    stash: requests.last().map(|r| r.stash.clone()).unwrap_or_default(),
                })
            }),
        ))
        .with_method(Method::new(
            "stream_stream",
            Handler::stream_stream(|ctx, requests: RequestStream<ExampleRequest>| {
                let metadata = metadata_json(&ctx);
                requests.enumerate().map(move |(index, request)| {
                    let request = request?;
                    Ok::<_, Status>(ExampleReply {
                        message: request.product(),
                        seqno: index as i32 + 1,
                        metadata: metadata.clone()?,
                        stash: request.stash,
                    })
                })
            }),
        ))
}

pub fn example(request: ExampleRequest) -> Message {
    Message::from_prost(&request)
}

pub fn example_reply(message: &Message) -> ExampleReply {
    message.decode::<ExampleReply>().expect("not an ExampleReply")
}

// --- server ------------------------------------------------------------------

/// A host serving on an ephemeral port until stopped
pub struct TestServer {
    pub addr: SocketAddr,
    stop: oneshot::Sender<()>,
    handle: JoinHandle<Result<Vec<CollectedCall>, HarnessError>>,
}

impl TestServer {
    pub async fn start(services: Vec<Service>) -> Self {
        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(
            HostBuilder::new()
                .server(Hyper::default())
                .collector(DefaultCollector::new())
                .services(services)
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

        let addr = ready_rx.await.expect("server failed to start");
        Self {
            addr,
            stop: stop_tx,
            handle,
        }
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Stop accepting connections and return every collected call
    pub async fn stop(self) -> Vec<CollectedCall> {
        let _ = self.stop.send(());
        self.handle.await.unwrap().unwrap()
    }
}

// --- call driver peer --------------------------------------------------------

/// The controlling side of a call driver: owns the command pipe and creates
/// a fresh pair of pipes for every call
pub struct Peer {
    command_path: PathBuf,
    commands: Mutex<FifoPipe>,
    next_id: AtomicUsize,
    // Last, so the pipes inside are removed before the directory.
    dir: tempfile::TempDir,
}

impl Peer {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let commands = FifoPipe::create(dir.path().join("commands")).unwrap();
        Self {
            command_path: commands.path().to_path_buf(),
            commands: Mutex::new(commands),
            next_id: AtomicUsize::new(0),
            dir,
        }
    }

    pub fn command_pipe(&self) -> &Path {
        &self.command_path
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Run one call through the driver; `requests` must not be empty
    pub async fn call(&self, method: &str, requests: Vec<Message>) -> Vec<Reply> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut request_pipe = FifoPipe::create(self.dir().join(format!("request-{id}"))).unwrap();
        let mut response_pipe = FifoPipe::create(self.dir().join(format!("response-{id}"))).unwrap();

        self.commands
            .lock()
            .await
            .send(&Command::Call(CallConfig::new(
                method,
                request_pipe.path(),
                response_pipe.path(),
            )))
            .await
            .unwrap();

        for request in &requests {
            request_pipe.send(request).await.unwrap();
        }
        request_pipe.close();

        let mut replies = Vec::new();
        while let Some(reply) = response_pipe.receive::<Reply>().await.unwrap() {
            replies.push(reply);
        }
        replies
    }

    pub async fn stop(&self) {
        self.commands.lock().await.send(&Command::Stop).await.unwrap();
    }
}

/// Run `driver` in-process against `peer`'s command pipe
pub fn spawn_driver<I: Invoker>(
    driver: CallDriver<I>,
    peer: &Peer,
) -> JoinHandle<Result<(), HarnessError>> {
    let commands = FifoPipe::wrap(peer.command_pipe());
    tokio::spawn(async move { driver.run(commands).await })
}

pub fn messages(replies: Vec<Reply>) -> Vec<Message> {
    replies
        .into_iter()
        .map(|reply| reply.into_result().expect("unexpected error reply"))
        .collect()
}
