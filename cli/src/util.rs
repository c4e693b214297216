use std::sync::Arc;

use brightpath_client::{
    ClientConfig, EnvSessionStore, Executor, FileSessionStore, LoginRedirect, Reconciler,
    ReqwestTransport, SessionStore,
};
use brightpath_core::{ErrorKind, Failure};
use serde_json::json;

/// Exit codes: 0=success/confirmed, 1=client error (4xx), 2=server error or
/// unreadable payload, 3=connection error, 4=usage error, 5=unconfirmed write.
pub const EXIT_OK: i32 = 0;
pub const EXIT_USAGE: i32 = 4;
pub const EXIT_UNCONFIRMED: i32 = 5;

pub type CliExecutor = Executor<ReqwestTransport>;

pub fn exit_code_for(kind: ErrorKind) -> i32 {
    if kind.is_connection_level() {
        3
    } else if kind.is_client_error() {
        1
    } else {
        2
    }
}

fn docs_hint_for(kind: ErrorKind) -> Option<&'static str> {
    match kind {
        ErrorKind::Transport => Some("Is the API server running? Check BRIGHTPATH_API_URL."),
        ErrorKind::AuthExpired => Some("Run `brightpath login` or set BRIGHTPATH_TOKEN."),
        ErrorKind::Forbidden => Some("Your account lacks the role required for this endpoint."),
        ErrorKind::IncompleteResponse | ErrorKind::ProtocolError => {
            Some("The connection broke mid-response. Retrying a read is safe; check history before retrying a write.")
        }
        _ => None,
    }
}

fn print_error(err: &serde_json::Value) {
    match serde_json::to_string_pretty(err) {
        Ok(text) => eprintln!("{text}"),
        Err(_) => eprintln!("{err}"),
    }
}

pub fn exit_error(message: &str, docs_hint: Option<&str>) -> ! {
    let mut err = json!({
        "error": "cli_error",
        "message": message
    });
    if let Some(hint) = docs_hint {
        err["docs_hint"] = json!(hint);
    }
    print_error(&err);
    std::process::exit(EXIT_USAGE);
}

/// Print a classified failure on stderr and return its exit code.
pub fn report_failure(failure: &Failure) -> i32 {
    let mut err = json!({
        "error": failure.kind.as_str(),
        "message": failure.message,
    });
    if let Some(status) = failure.status {
        err["status"] = json!(status);
    }
    let field_errors = failure.field_errors();
    if !field_errors.is_empty() {
        err["field_errors"] = json!(field_errors);
    } else if let Some(details) = &failure.details {
        err["details"] = details.clone();
    }
    if let Some(hint) = docs_hint_for(failure.kind) {
        err["docs_hint"] = json!(hint);
    }
    print_error(&err);
    exit_code_for(failure.kind)
}

pub fn report_unconfirmed(resource: &str, message: &str) -> i32 {
    print_error(&json!({
        "error": "unconfirmed",
        "resource": resource,
        "message": message,
        "docs_hint": "Check the history before submitting again."
    }));
    EXIT_UNCONFIRMED
}

pub fn print_json(value: &serde_json::Value, raw: bool) {
    let formatted = if raw {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    match formatted {
        Ok(text) => println!("{text}"),
        Err(_) => println!("{value}"),
    }
}

/// Points the user back at `brightpath login` when the server drops the session.
pub struct CliRedirect;

impl LoginRedirect for CliRedirect {
    fn redirect_to_login(&self, login_route: &str) {
        eprintln!("Session expired. Run `brightpath login` (server route: {login_route}).");
    }
}

/// Session store used by the CLI: `BRIGHTPATH_TOKEN` over the session file.
pub fn session_store() -> Arc<dyn SessionStore> {
    Arc::new(EnvSessionStore::from_env(FileSessionStore::at_default_path()))
}

pub fn build_executor(config: &ClientConfig, session: Arc<dyn SessionStore>) -> Arc<CliExecutor> {
    let transport = match ReqwestTransport::new(config.request_timeout) {
        Ok(transport) => transport,
        Err(e) => exit_error(&e.to_string(), None),
    };
    Arc::new(Executor::new(transport, config, session, Arc::new(CliRedirect)))
}

pub fn build_reconciler(config: &ClientConfig, executor: Arc<CliExecutor>) -> Reconciler<ReqwestTransport> {
    Reconciler::new(executor, config.reconcile.clone())
}

/// Split repeatable `key<sep>value` arguments.
pub fn parse_pairs(raw: &[String], sep: char, flag: &str, example: &str) -> Vec<(String, String)> {
    raw.iter()
        .map(|item| match item.split_once(sep) {
            Some((k, v)) => (k.trim().to_string(), v.trim().to_string()),
            None => exit_error(
                &format!("Invalid {flag} value: '{item}'"),
                Some(&format!("Format: {example}")),
            ),
        })
        .collect()
}

pub fn parse_method(raw: &str) -> reqwest::Method {
    match raw.to_uppercase().as_str() {
        "GET" => reqwest::Method::GET,
        "POST" => reqwest::Method::POST,
        "PUT" => reqwest::Method::PUT,
        "DELETE" => reqwest::Method::DELETE,
        "PATCH" => reqwest::Method::PATCH,
        other => exit_error(
            &format!("Unknown HTTP method: {other}"),
            Some("Supported methods: GET, POST, PUT, DELETE, PATCH"),
        ),
    }
}

/// Read JSON from a file path or stdin (when path is "-").
pub fn read_json_from_file(path: &str) -> Result<serde_json::Value, String> {
    let raw = if path == "-" {
        std::io::read_to_string(std::io::stdin()).map_err(|e| format!("Failed to read stdin: {e}"))?
    } else {
        std::fs::read_to_string(path).map_err(|e| format!("Failed to read file '{path}': {e}"))?
    };
    serde_json::from_str(&raw).map_err(|e| format!("Invalid JSON in '{path}': {e}"))
}
