use crate::error::ContextError;
use log::{trace, warn};
use std::collections::BTreeMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Rendered in place of metadata the server did not provide.
pub const NOT_AVAILABLE: &str = "N/A";

const HTTP_PREFIX: &str = "HTTP_";

// Initial body buffer capacity, it grows past this as needed
const BUFFER_SIZE: u64 = 1 << 12;

/// Read-only snapshot of one request: the metadata the server put in the
/// environment plus the request body from stdin.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct InvocationContext {
    pub request_method: Option<String>,
    pub query_string: Option<String>,
    pub content_length: Option<u64>,
    pub content_type: Option<String>,
    pub gateway_interface: Option<String>,
    pub server_protocol: Option<String>,
    pub server_software: Option<String>,
    pub script_name: Option<String>,
    pub script_filename: Option<String>,
    pub path_info: Option<String>,
    pub remote_addr: Option<String>,
    /// `HTTP_*` variables, i.e. the forwarded request headers
    pub http_headers: BTreeMap<String, String>,
    vars: BTreeMap<String, String>,
    body: Vec<u8>,
}

impl InvocationContext {
    pub fn from_env() -> Result<Self, ContextError> {
        Self::from_vars(std::env::vars_os().map(|(k, v)| {
            (
                k.to_string_lossy().into_owned(),
                v.to_string_lossy().into_owned(),
            )
        }))
    }

    pub fn from_vars<I, K, V>(vars: I) -> Result<Self, ContextError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        let get = |name: &str| vars.get(name).cloned();

        let content_length = match vars.get("CONTENT_LENGTH").map(|v| v.trim()) {
            None | Some("") => None,
            Some(v) => Some(
                v.parse::<u64>()
                    .map_err(|_| ContextError::InvalidContentLength(v.to_owned()))?,
            ),
        };
        let http_headers = vars
            .iter()
            .filter(|(k, _)| k.starts_with(HTTP_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        Ok(Self {
            request_method: get("REQUEST_METHOD"),
            query_string: get("QUERY_STRING"),
            content_length,
            content_type: get("CONTENT_TYPE"),
            gateway_interface: get("GATEWAY_INTERFACE"),
            server_protocol: get("SERVER_PROTOCOL"),
            server_software: get("SERVER_SOFTWARE"),
            script_name: get("SCRIPT_NAME"),
            script_filename: get("SCRIPT_FILENAME"),
            path_info: get("PATH_INFO"),
            remote_addr: get("REMOTE_ADDR"),
            http_headers,
            vars,
            body: Vec::new(),
        })
    }

    /// Any metadata variable, including ones without a typed field.
    pub fn var(&self, name: &str) -> Option<&str> {
        self.vars.get(name).map(String::as_str)
    }

    /// Like [`var`](Self::var) but absent variables read as [`NOT_AVAILABLE`].
    pub fn var_or_na(&self, name: &str) -> &str {
        self.var(name).unwrap_or(NOT_AVAILABLE)
    }

    /// Every metadata variable, sorted by name.
    pub fn vars(&self) -> impl Iterator<Item = (&str, &str)> {
        self.vars.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Reads the request body, at most `min(CONTENT_LENGTH, max_bytes)` bytes.
    /// Without a positive CONTENT_LENGTH the reader is never touched. A body
    /// shorter than declared (EOF or timeout) is kept as it is.
    pub async fn read_body<R>(
        &mut self,
        reader: R,
        max_bytes: u64,
        timeout: Duration,
    ) -> Result<usize, ContextError>
    where
        R: AsyncRead + Unpin,
    {
        let declared = match self.content_length {
            Some(n) if n > 0 => n,
            _ => {
                trace!("no request body declared");
                return Ok(0);
            }
        };
        let limit = declared.min(max_bytes);
        if limit < declared {
            warn!(
                "request body of {} bytes exceeds limit, reading {} bytes",
                declared, limit
            );
        }

        let mut reader = reader.take(limit);
        let mut buffer = Vec::with_capacity(limit.min(BUFFER_SIZE) as usize);
        trace!("reading {} body bytes from stdin", limit);
        let res = tokio::time::timeout(timeout, reader.read_to_end(&mut buffer)).await;
        match res {
            Ok(res) => {
                res?;
            }
            Err(_) => warn!("request body read timed out"),
        }
        if (buffer.len() as u64) < limit {
            warn!(
                "request body shorter than declared: got {} of {} bytes",
                buffer.len(),
                limit
            );
        }
        self.body = buffer;
        Ok(self.body.len())
    }
}

/// Facts about the responder process itself, captured once at start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub working_dir: String,
    pub executable: String,
    pub started_at: u64,
}

impl ProcessInfo {
    pub fn capture() -> Self {
        let working_dir = std::env::current_dir()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| NOT_AVAILABLE.to_owned());
        let executable = std::env::current_exe()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| NOT_AVAILABLE.to_owned());
        let started_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self {
            pid: std::process::id(),
            working_dir,
            executable,
            started_at,
        }
    }
}
