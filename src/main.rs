mod config;
mod context;
mod diagnostics;
mod error;
mod output;
mod query;
mod responder;
mod response;

use crate::config::ResponderConfig;
use crate::context::{InvocationContext, ProcessInfo};
use crate::error::OutputError;
use crate::output::ResponseWriter;
use crate::responder::Responder;
use log::{error, trace};
use std::process::ExitCode;

fn main() -> ExitCode {
    diagnostics::init_logger();
    // One process per request, nothing to run in parallel
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            error!("error starting runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run());
    // A stdin read that timed out is still parked on a blocking thread and
    // would keep the process alive until the server closes stdin
    trace!("shutting down runtime");
    runtime.shutdown_background();
    code
}

async fn run() -> ExitCode {
    let config = ResponderConfig::load();
    let process = ProcessInfo::capture();

    // Anything failing before the response is written exits non-zero with
    // nothing on stdout, and the server answers for us
    let mut context = match InvocationContext::from_env() {
        Ok(ctx) => ctx,
        Err(e) => {
            error!("error reading request metadata: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = context
        .read_body(tokio::io::stdin(), config.max_body_bytes, config.body_timeout)
        .await
    {
        error!("{}", e);
        return ExitCode::FAILURE;
    }
    diagnostics::report(&context, &process, config.verbosity);

    let framed = Responder::new(config).prepare(&context, &process);
    trace!("sending {} bytes", framed.len());
    match ResponseWriter::new(tokio::io::stdout()).send(&framed).await {
        Ok(_) => ExitCode::SUCCESS,
        Err(e @ OutputError::NothingWritten(_)) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
        // Part of the response is out, so the exit status must stay success
        Err(e @ OutputError::Truncated { .. }) => {
            error!("{}", e);
            ExitCode::SUCCESS
        }
    }
}
