use std::io::{Read, Write};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

fn run(vars: &[(&str, &str)], stdin: &[u8]) -> Output {
    let mut child = Command::new(env!("CARGO_BIN_EXE_cgi-responder"))
        .env_clear()
        .envs(vars.iter().copied())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn responder");
    // The responder may exit without reading stdin at all
    let _ = child.stdin.take().expect("stdin").write_all(stdin);
    child.wait_with_output().expect("wait for responder")
}

fn run_with_args(vars: &[(&str, &str)], args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_cgi-responder"))
        .env_clear()
        .envs(vars.iter().copied())
        .args(args)
        .stdin(Stdio::null())
        .output()
        .expect("run responder")
}

fn split(stdout: &[u8]) -> (Vec<String>, Vec<u8>) {
    let pos = stdout
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("header block must end with a blank line");
    let head = String::from_utf8(stdout[..pos].to_vec()).expect("utf-8 headers");
    (
        head.split("\r\n").map(str::to_owned).collect(),
        stdout[pos + 4..].to_vec(),
    )
}

fn header<'a>(head: &'a [String], name: &str) -> Vec<&'a str> {
    head.iter()
        .filter_map(|l| l.split_once(": "))
        .filter(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, v)| v)
        .collect()
}

#[test]
fn no_metadata_gives_implicit_html() {
    let out = run(&[], b"");
    assert!(out.status.success());
    let (head, body) = split(&out.stdout);
    assert_eq!(head[0], "Content-Type: text/html");
    assert_eq!(header(&head, "Content-Type"), vec!["text/html"]);
    assert!(header(&head, "Status").is_empty());
    assert!(!body.is_empty());
    assert!(String::from_utf8_lossy(&body).contains("<html>"));
}

#[test]
fn get_with_query_gives_explicit_json() {
    let out = run(
        &[
            ("REQUEST_METHOD", "GET"),
            ("QUERY_STRING", "foo=bar"),
            ("CGI_RESPONDER_FORMAT", "json"),
            ("CGI_RESPONDER_STATUS", "explicit"),
        ],
        b"",
    );
    assert!(out.status.success());
    let (head, body) = split(&out.stdout);
    assert_eq!(head[0], "Status: 200 OK");
    assert_eq!(header(&head, "Content-Type"), vec!["application/json"]);
    assert_eq!(
        header(&head, "Content-Length"),
        vec![body.len().to_string().as_str()]
    );

    let value: serde_json::Value = serde_json::from_slice(&body).expect("json body");
    assert_eq!(value["status"], "ok");
    assert_eq!(value["query"]["foo"][0], "bar");
}

#[test]
fn empty_body_with_zero_length_is_framed() {
    let out = run(
        &[("REQUEST_METHOD", "POST"), ("CONTENT_LENGTH", "0")],
        b"",
    );
    assert!(out.status.success());
    let (head, body) = split(&out.stdout);
    assert_eq!(header(&head, "Content-Type"), vec!["text/html"]);
    assert!(!body.is_empty());
}

#[test]
fn post_body_is_read_up_to_content_length() {
    let out = run(
        &[
            ("REQUEST_METHOD", "POST"),
            ("CONTENT_LENGTH", "5"),
            ("CONTENT_TYPE", "text/plain"),
            ("CGI_RESPONDER_FORMAT", "json"),
        ],
        b"hello, world!",
    );
    assert!(out.status.success());
    let (head, body) = split(&out.stdout);
    assert_eq!(head[0], "Content-Type: application/json");
    let value: serde_json::Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(value["body_length"], 5);
    assert_eq!(value["content_type"], "text/plain");
}

#[test]
fn short_body_does_not_fail() {
    let out = run(
        &[
            ("CONTENT_LENGTH", "64"),
            ("CGI_RESPONDER_BODY_TIMEOUT_MS", "200"),
        ],
        b"abc",
    );
    assert!(out.status.success());
    let (head, _) = split(&out.stdout);
    assert_eq!(header(&head, "Content-Type"), vec!["text/html"]);
}

#[test]
fn diagnostics_stay_on_stderr() {
    let out = run(
        &[
            ("REQUEST_METHOD", "GET"),
            ("QUERY_STRING", "marker=1"),
            ("CGI_RESPONDER_DIAGNOSTICS", "full"),
        ],
        b"",
    );
    let stderr = String::from_utf8_lossy(&out.stderr);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stderr.contains("CGI Debug Info"));
    assert!(stderr.contains("CGI_RESPONDER_DIAGNOSTICS: full"));
    assert!(!stdout.contains("CGI Debug Info"));
    assert!(!stdout.contains("pid:"));
}

#[test]
fn identical_metadata_gives_identical_framing() {
    let vars = [
        ("REQUEST_METHOD", "GET"),
        ("QUERY_STRING", "a=1&a=2"),
        ("CGI_RESPONDER_FORMAT", "json"),
        ("CGI_RESPONDER_STATUS", "explicit"),
    ];
    let first = run(&vars, b"");
    let second = run(&vars, b"");
    assert_eq!(split(&first.stdout).0, split(&second.stdout).0);
    assert_eq!(first.stdout, second.stdout);
}

#[test]
fn invalid_content_length_fails_before_response() {
    let out = run(&[("CONTENT_LENGTH", "lots")], b"");
    assert!(!out.status.success());
    assert!(out.stdout.is_empty());
    assert!(String::from_utf8_lossy(&out.stderr).contains("CONTENT_LENGTH"));
}

#[test]
fn bad_configuration_still_responds() {
    let out = run(&[("CGI_RESPONDER_FORMAT", "yaml")], b"");
    assert!(out.status.success());
    let (head, _) = split(&out.stdout);
    assert_eq!(head, vec!["Content-Type: text/html"]);
}

#[test]
fn stalled_stdin_does_not_keep_process_alive() {
    let mut child = Command::new(env!("CARGO_BIN_EXE_cgi-responder"))
        .env_clear()
        .env("CONTENT_LENGTH", "64")
        .env("CGI_RESPONDER_BODY_TIMEOUT_MS", "200")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .expect("spawn responder");
    // Keep stdin open for the whole test
    let mut stdin = child.stdin.take().expect("stdin");
    stdin.write_all(b"abc").expect("write stdin");

    let deadline = Instant::now() + Duration::from_secs(3);
    let status = loop {
        if let Some(status) = child.try_wait().expect("poll responder") {
            break Some(status);
        }
        if Instant::now() >= deadline {
            break None;
        }
        thread::sleep(Duration::from_millis(20));
    };
    if status.is_none() {
        let _ = child.kill();
    }
    drop(stdin);
    let status = status.expect("responder must exit while stdin is still open");
    assert!(status.success());

    let mut stdout = Vec::new();
    child
        .stdout
        .take()
        .expect("stdout")
        .read_to_end(&mut stdout)
        .expect("read stdout");
    let (head, body) = split(&stdout);
    assert_eq!(header(&head, "Content-Type"), vec!["text/html"]);
    assert!(String::from_utf8_lossy(&body).contains("<strong>Body length:</strong> 3"));
}

#[test]
fn help_flag_under_cgi_is_a_search_word() {
    let out = run_with_args(&[("REQUEST_METHOD", "GET")], &["-h"]);
    assert!(out.status.success());
    let (head, _) = split(&out.stdout);
    assert_eq!(head, vec!["Content-Type: text/html"]);
}

#[test]
fn help_and_version_never_reach_stdout() {
    for flag in ["--help", "--version"] {
        let out = run_with_args(&[], &[flag]);
        assert!(out.status.success());
        assert!(out.stdout.is_empty());
        assert!(String::from_utf8_lossy(&out.stderr).contains("cgi-responder"));
    }
}
