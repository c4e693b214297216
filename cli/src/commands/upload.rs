use std::path::Path;

use brightpath_client::{ClientConfig, FormPart, Outcome, RequestDescriptor};
use brightpath_core::outcome::UNCONFIRMED_MESSAGE;
use clap::Args;

use crate::util::{
    EXIT_OK, build_executor, exit_error, parse_pairs, print_json, report_failure,
    report_unconfirmed, session_store,
};

#[derive(Args)]
pub struct UploadArgs {
    /// Upload endpoint (e.g. /api/uploads/avatar)
    pub path: String,

    /// File to send (repeatable: field=path)
    #[arg(long, required = true)]
    pub file: Vec<String>,

    /// Extra form fields (repeatable: name=value)
    #[arg(long)]
    pub field: Vec<String>,

    /// Content type applied to every file part
    #[arg(long)]
    pub content_type: Option<String>,

    /// Path variant tried when the endpoint answers 405 (at most two)
    #[arg(long)]
    pub alternate: Vec<String>,

    /// Skip pretty-printing
    #[arg(long)]
    pub raw: bool,
}

fn file_part(field: String, path: &str, content_type: Option<&str>) -> FormPart {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) => exit_error(&format!("Failed to read file '{path}': {e}"), None),
    };
    let filename = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    let part = FormPart::file(field, filename, data);
    match content_type {
        Some(content_type) => part.with_content_type(content_type),
        None => part,
    }
}

pub async fn run(config: &ClientConfig, args: UploadArgs) -> i32 {
    let mut parts = Vec::new();
    for (field, path) in parse_pairs(&args.file, '=', "--file", "field=path, e.g. --file avatar=./me.png") {
        parts.push(file_part(field, &path, args.content_type.as_deref()));
    }
    for (name, value) in parse_pairs(&args.field, '=', "--field", "name=value") {
        parts.push(FormPart::text(name, value));
    }

    let mut builder = RequestDescriptor::post(&args.path).multipart(parts);
    for alternate in &args.alternate {
        builder = builder.alternate_path(alternate);
    }
    let descriptor = match builder.build() {
        Ok(descriptor) => descriptor,
        Err(e) => exit_error(&e.to_string(), None),
    };

    let executor = build_executor(config, session_store());
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
