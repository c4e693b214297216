use std::sync::Arc;

use brightpath_client::{ClientConfig, MemorySessionStore, Outcome, RequestDescriptor};
use brightpath_core::outcome::UNCONFIRMED_MESSAGE;

use crate::util::{EXIT_OK, build_executor, exit_error, print_json, report_failure, report_unconfirmed};

pub async fn run(config: &ClientConfig, path: &str) -> i32 {
    let descriptor = match RequestDescriptor::get(path).build() {
        Ok(descriptor) => descriptor,
        Err(e) => exit_error(&e.to_string(), None),
    };
    let executor = build_executor(config, Arc::new(MemorySessionStore::new()));
    match executor.execute(&descriptor).await {
        Outcome::Success { data } => {
            print_json(&data, false);
            EXIT_OK
        }
        Outcome::Failure(failure) => report_failure(&failure),
        Outcome::Ambiguous(ambiguity) => report_unconfirmed(&ambiguity.hint.resource, UNCONFIRMED_MESSAGE),
    }
}
