//! grpc-call-driver: executes gRPC calls on behalf of another process.
//!
//! The controlling process writes `Call`/`Stop` commands to a named pipe;
//! each call streams its requests and replies over its own pair of pipes.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=debug grpc-call-driver --descriptor greeter.json /tmp/commands
//! ```

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use grpc_call_harness::config::{DriverConfig, DEFAULT_ENDPOINT};
use grpc_call_harness::{CallDriver, FifoPipe, GrpcStub, HarnessError, ShutdownPolicy};

#[derive(Parser, Debug)]
#[command(name = "grpc-call-driver")]
#[command(about = "Drive gRPC calls described on a named pipe")]
struct Args {
    /// Server to call
    #[arg(long, default_value = DEFAULT_ENDPOINT)]
    endpoint: String,

    /// JSON service descriptor
    #[arg(long)]
    descriptor: PathBuf,

    /// What to do with in-flight calls once commands stop
    #[arg(long, value_enum, default_value_t = ShutdownPolicy::Join)]
    on_stop: ShutdownPolicy,

    /// Command pipe created by the controlling process
    command_pipe: PathBuf,
}

impl From<Args> for DriverConfig {
    fn from(args: Args) -> Self {
        DriverConfig::new(args.descriptor, args.command_pipe)
            .with_endpoint(args.endpoint)
            .with_on_stop(args.on_stop)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = DriverConfig::from(Args::parse());

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "driver failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: DriverConfig) -> Result<(), HarnessError> {
    let descriptor = config.load_descriptor()?;
    let stub = GrpcStub::connect(config.endpoint.clone(), &descriptor).await?;
    tracing::info!(endpoint = %config.endpoint, service = %descriptor.name, "connected");

    let driver = CallDriver::new(stub).with_policy(config.on_stop);
    let cancel = driver.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupted, cancelling calls");
            cancel.cancel();
        }
    });

    driver.run(FifoPipe::wrap(config.command_pipe)).await
}
