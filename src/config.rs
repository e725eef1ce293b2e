use clap::error::ErrorKind;
use clap::{Parser, ValueEnum};
use log::{debug, warn};
use std::ffi::OsString;
use std::time::Duration;

// Upper bound on request body bytes read from stdin
const DEFAULT_MAX_BODY_BYTES: u64 = 1 << 20;

// Stdin read timeout in ms
const DEFAULT_BODY_TIMEOUT: u64 = 1000;

/// Body serialization, one per invocation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Format {
    #[default]
    Html,
    Json,
}

impl Format {
    pub fn content_type(self) -> &'static str {
        match self {
            Format::Html => "text/html",
            Format::Json => "application/json",
        }
    }
}

/// Whether the response starts with a `Status:` line or leaves the status to
/// the server's default.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum StatusStyle {
    #[default]
    Implicit,
    Explicit,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Verbosity {
    /// Every metadata variable
    Full,
    /// Method, query string and body related fields only
    #[default]
    Curated,
}

#[derive(Debug, Parser)]
#[command(name = "cgi-responder", version, about = "Minimal CGI responder")]
struct Cli {
    /// Body format and declared content type
    #[arg(long, env = "CGI_RESPONDER_FORMAT", value_enum, default_value_t = Format::Html)]
    format: Format,

    /// Status declaration style
    #[arg(long, env = "CGI_RESPONDER_STATUS", value_enum, default_value_t = StatusStyle::Implicit)]
    status_style: StatusStyle,

    /// Diagnostic verbosity on stderr
    #[arg(long, env = "CGI_RESPONDER_DIAGNOSTICS", value_enum, default_value_t = Verbosity::Curated)]
    diagnostics: Verbosity,

    /// Maximum number of request body bytes read from stdin
    #[arg(long, env = "CGI_RESPONDER_MAX_BODY", default_value_t = DEFAULT_MAX_BODY_BYTES)]
    max_body_bytes: u64,

    /// Stdin read timeout in milliseconds
    #[arg(long, env = "CGI_RESPONDER_BODY_TIMEOUT_MS", default_value_t = DEFAULT_BODY_TIMEOUT)]
    body_timeout_ms: u64,

    /// Search words or script path passed by the server, ignored
    #[arg(hide = true)]
    extra: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResponderConfig {
    pub format: Format,
    pub status_style: StatusStyle,
    pub verbosity: Verbosity,
    pub max_body_bytes: u64,
    pub body_timeout: Duration,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            format: Format::default(),
            status_style: StatusStyle::default(),
            verbosity: Verbosity::default(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            body_timeout: Duration::from_millis(DEFAULT_BODY_TIMEOUT),
        }
    }
}

impl From<Cli> for ResponderConfig {
    fn from(cli: Cli) -> Self {
        Self {
            format: cli.format,
            status_style: cli.status_style,
            verbosity: cli.diagnostics,
            max_body_bytes: cli.max_body_bytes,
            body_timeout: Duration::from_millis(cli.body_timeout_ms),
        }
    }
}

impl ResponderConfig {
    /// Reads the configuration from the process arguments and environment.
    pub fn load() -> Self {
        let under_cgi = ["GATEWAY_INTERFACE", "REQUEST_METHOD"]
            .iter()
            .any(|name| std::env::var_os(name).is_some());
        Self::load_from(std::env::args_os(), under_cgi)
    }

    /// Never fails: a bad knob falls back to the defaults so the request still
    /// gets a response. Help and version text never go to stdout, which
    /// belongs to the response; under CGI `-h`/`-V` are just search words.
    pub fn load_from<I, T>(args: I, under_cgi: bool) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Cli::try_parse_from(args) {
            Ok(cli) => {
                if !cli.extra.is_empty() {
                    debug!("ignoring extra arguments: {:?}", cli.extra);
                }
                cli.into()
            }
            Err(e) if under_cgi => {
                debug!("ignoring arguments under CGI: {:?}", e.kind());
                Self::without_args()
            }
            Err(e) => match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                    eprint!("{}", e.render());
                    std::process::exit(0)
                }
                _ => {
                    warn!("invalid configuration, using defaults: {}", e);
                    Self::default()
                }
            },
        }
    }

    // Environment knobs only
    fn without_args() -> Self {
        match Cli::try_parse_from([env!("CARGO_PKG_NAME")]) {
            Ok(cli) => cli.into(),
            Err(e) => {
                warn!("invalid configuration, using defaults: {}", e);
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_arguments() {
        let config = ResponderConfig::load_from(["cgi-responder"], false);
        assert_eq!(config.format, Format::Html);
        assert_eq!(config.status_style, StatusStyle::Implicit);
        assert_eq!(config.verbosity, Verbosity::Curated);
        assert_eq!(config.max_body_bytes, DEFAULT_MAX_BODY_BYTES);
    }

    #[test]
    fn flags_select_variant() {
        let config = ResponderConfig::load_from([
            "cgi-responder",
            "--format",
            "json",
            "--status-style",
            "explicit",
            "--diagnostics",
            "full",
            "--body-timeout-ms",
            "250",
        ], false);
        assert_eq!(config.format, Format::Json);
        assert_eq!(config.status_style, StatusStyle::Explicit);
        assert_eq!(config.verbosity, Verbosity::Full);
        assert_eq!(config.body_timeout, Duration::from_millis(250));
    }

    #[test]
    fn extra_positional_arguments_are_ignored() {
        let config = ResponderConfig::load_from(["cgi-responder", "/var/www/cgi-bin/test", "foo"], true);
        assert_eq!(config, ResponderConfig::default());
    }

    #[test]
    fn invalid_value_falls_back_to_defaults() {
        let config = ResponderConfig::load_from(["cgi-responder", "--format", "xml"], false);
        assert_eq!(config, ResponderConfig::default());
    }

    #[test]
    fn flag_like_search_words_are_ignored_under_cgi() {
        for word in ["-h", "--help", "-V", "--version", "-x"] {
            let config = ResponderConfig::load_from(["cgi-responder", word], true);
            assert_eq!(config, ResponderConfig::default());
        }
    }

    #[test]
    fn content_types() {
        assert_eq!(Format::Html.content_type(), "text/html");
        assert_eq!(Format::Json.content_type(), "application/json");
    }
}
