use crate::config::{Format, ResponderConfig, StatusStyle};
use crate::context::{InvocationContext, ProcessInfo, NOT_AVAILABLE};
use crate::error::RenderError;
use crate::query::parse_query;
use crate::response::{Response, Status, INTERNAL_SERVER_ERROR_RESPONSE};
use log::{error, info};
use serde::Serialize;
use std::collections::BTreeMap;

const CONTENT_TYPE: &str = "Content-Type";

pub struct Responder {
    config: ResponderConfig,
}

impl Responder {
    pub fn new(config: ResponderConfig) -> Self {
        Self { config }
    }

    /// Produces the complete framed response. Never fails: anything that goes
    /// wrong while rendering or encoding turns into a `500` response, so a
    /// malformed header block can never reach the server.
    pub fn prepare(&self, ctx: &InvocationContext, process: &ProcessInfo) -> Vec<u8> {
        match self
            .render(ctx, process)
            .and_then(|res| Ok(res.encode(self.config.status_style)?))
        {
            Ok(framed) => framed,
            Err(e) => {
                error!("error preparing response: {}", e);
                internal_error(&e)
            }
        }
    }

    pub fn render(
        &self,
        ctx: &InvocationContext,
        process: &ProcessInfo,
    ) -> Result<Response, RenderError> {
        let format = self.config.format;
        let body = match format {
            Format::Html => render_html(ctx, process).into_bytes(),
            Format::Json => serde_json::to_vec(&JsonPayload::new(ctx))?,
        };
        let mut res = Response::new(Status::OK).with_body(body);
        res.set_header(CONTENT_TYPE, format.content_type())?;
        info!(
            "responding {} with {} bytes of {}",
            res.status(),
            res.body().len(),
            format.content_type()
        );
        Ok(res)
    }
}

// Explicit 500 with a plain-text diagnostic body; the constant response is
// only used if even that cannot be encoded.
fn internal_error(cause: &RenderError) -> Vec<u8> {
    let mut res = Response::new(Status::INTERNAL_SERVER_ERROR)
        .with_body(format!("Internal Server Error: {}\n", cause));
    res.set_header(CONTENT_TYPE, "text/plain")
        .and_then(|_| res.encode(StatusStyle::Explicit))
        .unwrap_or_else(|e| {
            error!("error encoding error response: {}", e);
            INTERNAL_SERVER_ERROR_RESPONSE.as_bytes().to_vec()
        })
}

#[derive(Debug, Serialize)]
struct JsonPayload<'a> {
    status: &'static str,
    method: Option<&'a str>,
    query_string: Option<&'a str>,
    query: BTreeMap<String, Vec<String>>,
    content_type: Option<&'a str>,
    content_length: Option<u64>,
    body_length: usize,
    gateway_interface: Option<&'a str>,
    server_protocol: Option<&'a str>,
    server_software: Option<&'a str>,
    script_name: Option<&'a str>,
    path_info: Option<&'a str>,
    remote_addr: Option<&'a str>,
    headers: &'a BTreeMap<String, String>,
}

impl<'a> JsonPayload<'a> {
    fn new(ctx: &'a InvocationContext) -> Self {
        Self {
            status: "ok",
            method: ctx.request_method.as_deref(),
            query_string: ctx.query_string.as_deref(),
            query: ctx
                .query_string
                .as_deref()
                .map(parse_query)
                .unwrap_or_default(),
            content_type: ctx.content_type.as_deref(),
            content_length: ctx.content_length,
            body_length: ctx.body().len(),
            gateway_interface: ctx.gateway_interface.as_deref(),
            server_protocol: ctx.server_protocol.as_deref(),
            server_software: ctx.server_software.as_deref(),
            script_name: ctx.script_name.as_deref(),
            path_info: ctx.path_info.as_deref(),
            remote_addr: ctx.remote_addr.as_deref(),
            headers: &ctx.http_headers,
        }
    }
}

fn render_html(ctx: &InvocationContext, process: &ProcessInfo) -> String {
    let or_na = |v: &Option<String>| escape(v.as_deref().unwrap_or(NOT_AVAILABLE));
    let mut page = String::from(
        "<!DOCTYPE html>
<html>
<head>
    <meta charset=\"utf-8\">
    <title>CGI Test Script</title>
    <style>
        body { font-family: Arial, sans-serif; margin: 40px; }
        .container { max-width: 600px; margin: 0 auto; }
        h1 { color: #2c3e50; }
        .success { color: #27ae60; font-weight: bold; }
        .info { background: #ecf0f1; padding: 15px; border-radius: 5px; }
    </style>
</head>
<body>
    <div class=\"container\">
        <h1>CGI Test Script</h1>
        <p class=\"success\">CGI script executed successfully!</p>
",
    );
    page.push_str(&format!(
        "        <div class=\"info\">
            <h3>Script Information:</h3>
            <ul>
                <li><strong>Script:</strong> {}</li>
                <li><strong>Working dir:</strong> {}</li>
                <li><strong>Script path:</strong> {}</li>
            </ul>
            <h3>Request:</h3>
            <ul>
                <li><strong>Request method:</strong> {}</li>
                <li><strong>Query string:</strong> {}</li>
                <li><strong>Gateway interface:</strong> {}</li>
                <li><strong>Script name:</strong> {}</li>
                <li><strong>Script filename:</strong> {}</li>
                <li><strong>Body length:</strong> {}</li>
            </ul>
        </div>
",
        escape(env!("CARGO_PKG_NAME")),
        escape(&process.working_dir),
        escape(&process.executable),
        or_na(&ctx.request_method),
        or_na(&ctx.query_string),
        or_na(&ctx.gateway_interface),
        or_na(&ctx.script_name),
        or_na(&ctx.script_filename),
        ctx.body().len(),
    ));
    page.push_str(
        "        <p>This demonstrates that your server can execute CGI scripts.</p>
        <a href=\"/\">&larr; Back to Home</a>
    </div>
</body>
</html>
",
    );
    page
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            c => out.push(c),
        }
    }
    out
}
