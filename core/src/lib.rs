pub mod error;
pub mod fields;
pub mod integrity;
pub mod matching;
pub mod outcome;
pub mod session;

pub use error::ErrorKind;
pub use integrity::Integrity;
pub use matching::{MatchPredicate, TimeWindow};
pub use outcome::{Ambiguity, Failure, FieldValue, MatchResult, MutationHint, Outcome};
pub use session::{Session, SessionStore, SessionStoreError};
