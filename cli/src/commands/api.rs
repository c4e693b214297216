use std::sync::Arc;

use brightpath_client::{
    ClientConfig, MemorySessionStore, Outcome, RequestDescriptor, Resolution, SessionStore,
};
use brightpath_core::outcome::{ComparisonField, FieldValue, UNCONFIRMED_MESSAGE};
use brightpath_core::MutationHint;
use clap::Args;

use crate::util::{
    EXIT_OK, build_executor, build_reconciler, exit_error, parse_method, parse_pairs, print_json,
    read_json_from_file, report_failure, report_unconfirmed, session_store,
};

#[derive(Args)]
pub struct ApiArgs {
    /// HTTP method (GET, POST, PUT, DELETE, PATCH)
    pub method: String,

    /// API path (e.g. /api/withdrawals)
    pub path: String,

    /// Request body as JSON string
    #[arg(long, short = 'd')]
    pub data: Option<String>,

    /// Read request body from file (use '-' for stdin)
    #[arg(long, short = 'f', conflicts_with = "data")]
    pub data_file: Option<String>,

    /// Query parameters (repeatable: key=value)
    #[arg(long, short = 'q')]
    pub query: Vec<String>,

    /// Extra headers (repeatable: Key:Value)
    #[arg(long, short = 'H')]
    pub header: Vec<String>,

    /// Skip pretty-printing (raw JSON for piping)
    #[arg(long)]
    pub raw: bool,

    /// Skip authentication (for public endpoints like /health)
    #[arg(long)]
    pub no_auth: bool,

    /// Treat a 404 as a normal answer
    #[arg(long)]
    pub expect_not_found: bool,

    /// Resource class of a write, enabling ambiguity detection (e.g. withdrawal)
    #[arg(long)]
    pub hint_resource: Option<String>,

    /// Comparison field of the write (repeatable: name=value)
    #[arg(long, requires = "hint_resource")]
    pub hint_field: Vec<String>,

    /// Record field holding the creation time (default: createdAt)
    #[arg(long, requires = "hint_resource")]
    pub timestamp_field: Option<String>,

    /// Collection path read to confirm an ambiguous write (e.g. /api/withdrawals)
    #[arg(long, requires = "hint_resource")]
    pub reconcile_path: Option<String>,
}

fn build_hint(args: &ApiArgs) -> Option<MutationHint> {
    let resource = args.hint_resource.as_deref()?;
    let mut hint = MutationHint::new(resource);
    for (name, value) in parse_pairs(&args.hint_field, '=', "--hint-field", "name=value, e.g. --hint-field amount=500000") {
        hint.fields.push(ComparisonField {
            name,
            value: FieldValue::parse(&value),
        });
    }
    if let Some(field) = &args.timestamp_field {
        hint = hint.timestamp_field(field.clone());
    }
    Some(hint)
}

fn build_descriptor(args: &ApiArgs) -> RequestDescriptor {
    let method = parse_method(&args.method);
    let query = parse_pairs(&args.query, '=', "--query", "key=value, e.g. --query status=pending");
    let headers = parse_pairs(&args.header, ':', "--header", "Key:Value, e.g. --header Accept-Language:vi");

    let body = if let Some(ref d) = args.data {
        match serde_json::from_str::<serde_json::Value>(d) {
            Ok(v) => Some(v),
            Err(e) => exit_error(
                &format!("Invalid JSON in --data: {e}"),
                Some("Provide valid JSON string"),
            ),
        }
    } else if let Some(ref f) = args.data_file {
        match read_json_from_file(f) {
            Ok(v) => Some(v),
            Err(e) => exit_error(&e, Some("Provide a valid JSON file or use '-' for stdin")),
        }
    } else {
        None
    };

    let mut builder = RequestDescriptor::builder(method, &args.path).query(&query);
    for (name, value) in headers {
        builder = builder.header(name, value);
    }
    if let Some(body) = body {
        builder = match builder.json(&body) {
            Ok(builder) => builder,
            Err(e) => exit_error(&e.to_string(), None),
        };
    }
    if let Some(hint) = build_hint(args) {
        builder = builder.hint(hint);
    }
    if args.expect_not_found {
        builder = builder.expect_not_found();
    }
    match builder.build() {
        Ok(descriptor) => descriptor,
        Err(e) => exit_error(
            &e.to_string(),
            Some("Hints apply to POST/PUT/PATCH/DELETE; paths are relative to BRIGHTPATH_API_URL"),
        ),
    }
}

pub async fn run(config: &ClientConfig, args: ApiArgs) -> i32 {
    let descriptor = build_descriptor(&args);
    let session: Arc<dyn SessionStore> = if args.no_auth {
        Arc::new(MemorySessionStore::new())
    } else {
        session_store()
    };
    let executor = build_executor(config, session);

    if let Some(path) = &args.reconcile_path {
        let read = match RequestDescriptor::get(path).build() {
            Ok(read) => read,
            Err(e) => exit_error(&e.to_string(), Some("Pass the collection path, e.g. /api/withdrawals")),
        };
        let reconciler = build_reconciler(config, executor);
        let resolution = reconciler.execute_reconciled(&descriptor, &read).await;
        return match resolution {
            Resolution::Success(data) | Resolution::Confirmed(data) => {
                print_json(&data, args.raw);
                EXIT_OK
            }
            Resolution::Failure(failure) => report_failure(&failure),
            Resolution::Unconfirmed(ambiguity) => {
                report_unconfirmed(&ambiguity.hint.resource, UNCONFIRMED_MESSAGE)
            }
        };
    }

    match executor.execute(&descriptor).await {
        Outcome::Success { data } => {
            print_json(&data, args.raw);
            EXIT_OK
        }
        Outcome::Failure(failure) => report_failure(&failure),
        Outcome::Ambiguous(ambiguity) => {
            report_unconfirmed(&ambiguity.hint.resource, UNCONFIRMED_MESSAGE)
        }
    }
}
