use std::sync::Arc;

use brightpath_client::store::TOKEN_ENV;
use brightpath_client::{
    ClientConfig, FileSessionStore, MemorySessionStore, Outcome, RequestDescriptor, Session,
    SessionStore,
};
use brightpath_core::fields::{canonicalize_keys, lookup};
use clap::Args;
use serde_json::{Value, json};

use crate::util::{
    EXIT_OK, build_executor, exit_error, print_json, report_failure, report_unconfirmed,
};

const PASSWORD_ENV: &str = "BRIGHTPATH_PASSWORD";

#[derive(Args)]
pub struct LoginArgs {
    /// Account email
    #[arg(long)]
    pub email: String,

    /// Password (prefer BRIGHTPATH_PASSWORD or --password-stdin)
    #[arg(long, env = PASSWORD_ENV, hide_env_values = true)]
    pub password: Option<String>,

    /// Read the password from the first line of stdin
    #[arg(long, conflicts_with = "password")]
    pub password_stdin: bool,

    /// Login endpoint
    #[arg(long, default_value = "/api/auth/login")]
    pub path: String,
}

/// Build a session from a login response, whatever the key spelling.
fn session_from_login(body: &Value) -> Option<Session> {
    let body = canonicalize_keys(body.clone());
    let payload = body.get("data").filter(|d| d.is_object()).unwrap_or(&body);

    let token = ["accessToken", "token"]
        .iter()
        .find_map(|key| lookup(payload, key).and_then(Value::as_str))
        .map(str::trim)
        .filter(|t| !t.is_empty())?;

    let mut session = Session::new(token);
    if let Some(refresh) = lookup(payload, "refreshToken").and_then(Value::as_str) {
        session = session.with_refresh_token(refresh);
    }
    if let Some(profile) = ["user", "profile"]
        .iter()
        .find_map(|key| lookup(payload, key))
        .filter(|p| p.is_object())
    {
        session = session.with_profile(profile.clone());
    }
    Some(session)
}

fn read_password(args: &LoginArgs) -> String {
    if args.password_stdin {
        let mut line = String::new();
        if let Err(e) = std::io::stdin().read_line(&mut line) {
            exit_error(&format!("Failed to read stdin: {e}"), None);
        }
        return line.trim_end_matches(['\r', '\n']).to_string();
    }
    match &args.password {
        Some(password) => password.clone(),
        None => exit_error(
            "No password given",
            Some("Use --password-stdin or set BRIGHTPATH_PASSWORD"),
        ),
    }
}

pub async fn login(config: &ClientConfig, args: LoginArgs) -> i32 {
    let password = read_password(&args);
    let descriptor = match RequestDescriptor::post(&args.path)
        .json(&json!({ "email": args.email, "password": password }))
        .and_then(|b| b.build())
    {
        Ok(descriptor) => descriptor,
        Err(e) => exit_error(&e.to_string(), None),
    };

    // Anonymous executor for the credential exchange; the result goes to the file store.
    let executor = build_executor(config, Arc::new(MemorySessionStore::new()));
    let body = match executor.execute(&descriptor).await {
        Outcome::Success { data } => data,
        Outcome::Failure(failure) => return report_failure(&failure),
        Outcome::Ambiguous(ambiguity) => {
            return report_unconfirmed(&ambiguity.hint.resource, "Login outcome unknown");
        }
    };

    let Some(session) = session_from_login(&body) else {
        exit_error(
            "Login response did not contain an access token",
            Some("Check --path points at the login endpoint"),
        );
    };

    let store = FileSessionStore::at_default_path();
    let profile = session.profile.clone();
    let saved_at = session.saved_at;
    if let Err(e) = store.store(session) {
        exit_error(&format!("Failed to save session: {e}"), None);
    }

    print_json(
        &json!({
            "status": "authenticated",
            "saved_at": saved_at,
            "profile": profile,
            "session_path": store.path().to_string_lossy()
        }),
        false,
    );
    EXIT_OK
}

pub fn logout() -> i32 {
    let store = FileSessionStore::at_default_path();
    if let Err(e) = store.clear() {
        exit_error(&format!("Failed to remove session: {e}"), None);
    }
    print_json(
        &json!({
            "status": "logged_out",
            "session_path": store.path().to_string_lossy()
        }),
        false,
    );
    EXIT_OK
}

pub fn status() -> i32 {
    if std::env::var(TOKEN_ENV).is_ok_and(|t| !t.trim().is_empty()) {
        print_json(&json!({ "status": "authenticated", "source": "env" }), false);
        return EXIT_OK;
    }

    let store = FileSessionStore::at_default_path();
    let output = match store.load().filter(|s| !s.access_token.trim().is_empty()) {
        Some(session) => json!({
            "status": "authenticated",
            "source": "file",
            "saved_at": session.saved_at,
            "has_refresh_token": session.refresh_token.is_some(),
            "profile": session.profile,
            "session_path": store.path().to_string_lossy()
        }),
        None => json!({
            "status": "anonymous",
            "session_path": store.path().to_string_lossy()
        }),
    };
    print_json(&output, false);
    EXIT_OK
}
