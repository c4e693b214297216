pub mod config;
pub mod descriptor;
pub mod executor;
pub mod reconcile;
pub mod store;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{ClientConfig, ConfigError};
pub use descriptor::{DescriptorError, FormPart, RequestBody, RequestBuilder, RequestDescriptor};
pub use executor::{Executor, LogRedirect, LoginRedirect};
pub use reconcile::{ReconcileConfig, Reconciler, Resolution};
pub use store::{EnvSessionStore, FileSessionStore, MemorySessionStore};
pub use transport::{ReqwestTransport, Transport, TransportError, TransportResponse};

pub use brightpath_core::{
    Ambiguity, ErrorKind, Failure, MatchResult, MutationHint, Outcome, Session, SessionStore,
};
