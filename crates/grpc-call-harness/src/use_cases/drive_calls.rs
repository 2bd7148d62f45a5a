use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinSet;
use tonic::Code;

use crate::adapters::gateways::FifoPipe;
use crate::entities::{CallConfig, CallError, Command, Message, Payload, Reply};
use crate::error::{HarnessError, PipeError};
use crate::use_cases::ports::Invoker;

/// What happens to in-flight calls once the driver stops accepting commands
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownPolicy {
    /// Wait for every in-flight call to finish
    #[default]
    Join,
    /// Abandon in-flight calls
    Cancel,
}

/// Cancels every call a driver is running, from anywhere
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Executes calls on behalf of another process.
///
/// Commands arrive on a command pipe. Each `Call` names a method and a pair
/// of per-call pipes: requests are read from one and replies written to the
/// other. Calls run concurrently; the command loop never waits on one.
pub struct CallDriver<I> {
    invoker: I,
    policy: ShutdownPolicy,
    cancel: CancelHandle,
}

impl<I: Invoker> CallDriver<I> {
    pub fn new(invoker: I) -> Self {
        let (tx, _) = watch::channel(false);
        Self {
            invoker,
            policy: ShutdownPolicy::default(),
            cancel: CancelHandle { tx: Arc::new(tx) },
        }
    }

    pub fn with_policy(mut self, policy: ShutdownPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Dispatch commands until `Stop`, end of stream, or cancellation.
    ///
    /// Returns once every worker has finished under the shutdown policy.
    pub async fn run(&self, mut commands: FifoPipe) -> Result<(), HarnessError> {
        let mut workers = JoinSet::new();
        let mut dispatched = 0usize;

        tracing::info!(pipe = %commands.path().display(), "call driver idle");

        let outcome = loop {
            let command = tokio::select! {
                command = commands.receive::<Command>() => command,
                _ = cancelled(self.cancel.tx.subscribe()) => {
                    tracing::info!("call driver cancelled");
                    break Ok(());
                }
            };

            match command {
                Ok(Some(Command::Call(config))) => {
                    dispatched += 1;
                    tracing::debug!(
                        method = %config.method_name,
                        requests = %config.request_pipe_path.display(),
                        responses = %config.response_pipe_path.display(),
                        "dispatching call"
                    );
                    reap(&mut workers);
                    workers.spawn(run_worker(
                        self.invoker.clone(),
                        config,
                        self.cancel.tx.subscribe(),
                    ));
                }
                Ok(Some(Command::Stop)) => {
                    tracing::info!("stop requested");
                    break Ok(());
                }
                Ok(None) => {
                    tracing::info!("command pipe closed");
                    break Ok(());
                }
                Err(err) => {
                    tracing::error!(error = %err, "unreadable command");
                    break Err(HarnessError::from(err));
                }
            }
        };
        commands.close();

        if self.policy == ShutdownPolicy::Cancel {
            self.cancel.cancel();
        }
        tracing::info!(in_flight = workers.len(), policy = ?self.policy, "call driver terminating");

        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = %err, "call worker panicked");
            }
        }

        tracing::info!(dispatched, "call driver terminated");
        outcome
    }
}

/// Take finished workers out of the set without waiting on running ones
fn reap(workers: &mut JoinSet<()>) {
    while let Some(joined) = workers.try_join_next() {
        if let Err(err) = joined {
            tracing::error!(error = %err, "call worker panicked");
        }
    }
}

/// Resolves once the cancellation flag is raised
async fn cancelled(mut rx: watch::Receiver<bool>) {
    while !*rx.borrow_and_update() {
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

async fn run_worker<I: Invoker>(invoker: I, config: CallConfig, cancel: watch::Receiver<bool>) {
    let method = config.method_name.clone();
    tokio::select! {
        biased;
        _ = cancelled(cancel) => tracing::debug!(%method, "call cancelled"),
        result = execute_call(&invoker, config) => match result {
            Ok(()) => tracing::debug!(%method, "call finished"),
            Err(err) => tracing::warn!(%method, error = %err, "call pipes failed"),
        },
    }
}

async fn execute_call<I: Invoker>(invoker: &I, config: CallConfig) -> Result<(), PipeError> {
    let mut requests = FifoPipe::wrap(&config.request_pipe_path);
    let mut responses = FifoPipe::wrap(&config.response_pipe_path);

    let cardinality = match invoker.inspector().cardinality_for_method(&config.method_name) {
        Ok(cardinality) => cardinality,
        Err(err) => {
            // Consume the pending request so the peer is not left blocked on it.
            if let Err(err) = requests.receive::<Message>().await {
                tracing::debug!(error = %err, "unreadable request for unknown method");
            }
            requests.close();
            let error = CallError::new(Code::Unimplemented, err.to_string());
            responses.send(&Reply::Error(error)).await?;
            responses.close();
            return Ok(());
        }
    };

    let (failed_tx, failed_rx) = oneshot::channel();
    let request_stream = if cardinality.request_streaming() {
        request_messages(requests, failed_tx).boxed()
    } else {
        match requests.receive::<Message>().await {
            Ok(Some(request)) => stream::iter([request]).boxed(),
            Ok(None) => stream::empty().boxed(),
            Err(err) => {
                responses.send(&Reply::Error(request_pipe_failed(&err))).await?;
                responses.close();
                return Err(err);
            }
        }
    };

    let outcome = tokio::select! {
        result = forward_replies(invoker, &config.method_name, request_stream, &mut responses) => Ok(result),
        Ok(err) = failed_rx => Err(err),
    };
    let result = match outcome {
        Ok(result) => result,
        // Dropping the call above cancelled the RPC.
        Err(err) => responses.send(&Reply::Error(request_pipe_failed(&err))).await,
    };
    responses.close();
    result
}

/// Invoke the method and write its result as replies
async fn forward_replies<I: Invoker>(
    invoker: &I,
    method: &str,
    requests: BoxStream<'static, Message>,
    responses: &mut FifoPipe,
) -> Result<(), PipeError> {
    match invoker.invoke(method, requests).await {
        Ok(Payload::Single(message)) => responses.send(&Reply::Message(message)).await?,
        Ok(Payload::Sequence(mut messages)) => {
            while let Some(item) = messages.next().await {
                match item {
                    Ok(message) => responses.send(&Reply::Message(message)).await?,
                    Err(status) => {
                        responses.send(&Reply::Error(CallError::from(status))).await?;
                        break;
                    }
                }
            }
        }
        Err(status) => responses.send(&Reply::Error(CallError::from(status))).await?,
    }
    Ok(())
}

fn request_pipe_failed(err: &PipeError) -> CallError {
    CallError::new(Code::Cancelled, format!("request pipe failed: {err}"))
}

/// Requests read lazily from the peer until it closes its end.
///
/// A broken pipe is not an end of stream: the failure is reported on
/// `failed` and the stream never completes, so the call cannot finish as if
/// every request had been sent.
fn request_messages(
    pipe: FifoPipe,
    failed: oneshot::Sender<PipeError>,
) -> impl futures::Stream<Item = Message> + Send + 'static {
    stream::unfold((pipe, Some(failed)), |(mut pipe, failed)| async move {
        match pipe.receive::<Message>().await {
            Ok(Some(message)) => Some((message, (pipe, failed))),
            Ok(None) => None,
            Err(err) => {
                tracing::warn!(pipe = %pipe.path().display(), error = %err, "request stream failed");
                if let Some(failed) = failed {
                    let _ = failed.send(err);
                }
                std::future::pending().await
            }
        }
    })
}
