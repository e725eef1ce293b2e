// Debug info for the server's error log. Goes through `log`, which env_logger
// sends to stderr, so none of it can end up in the response.
use crate::config::Verbosity;
use crate::context::{InvocationContext, ProcessInfo};
use log::info;

const CURATED_FIELDS: &[&str] = &[
    "REQUEST_METHOD",
    "QUERY_STRING",
    "CONTENT_LENGTH",
    "CONTENT_TYPE",
    "SCRIPT_NAME",
];

pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .target(env_logger::Target::Stderr)
        .init();
}

pub fn report(ctx: &InvocationContext, process: &ProcessInfo, verbosity: Verbosity) {
    for line in lines(ctx, process, verbosity) {
        info!("{}", line);
    }
}

fn lines(ctx: &InvocationContext, process: &ProcessInfo, verbosity: Verbosity) -> Vec<String> {
    let mut lines = vec![
        "=== CGI Debug Info ===".to_owned(),
        format!("pid: {}", process.pid),
        format!("executable: {}", process.executable),
        format!("working dir: {}", process.working_dir),
        format!("started at: {}", process.started_at),
    ];
    match verbosity {
        Verbosity::Full => lines.extend(ctx.vars().map(|(k, v)| format!("{}: {}", k, v))),
        Verbosity::Curated => lines.extend(
            CURATED_FIELDS
                .iter()
                .map(|&k| format!("{}: {}", k, ctx.var_or_na(k))),
        ),
    }
    lines.push(format!("body bytes read: {}", ctx.body().len()));
    lines
}
