//! Data model for captured exchanges and live sessions

mod entry;
mod headers;
mod modifiable;
mod session;
mod variables;

pub use entry::{EntryMessage, RecordEntry};
pub use headers::Headers;
pub use modifiable::{ModifiableRecordSession, SessionExtensions};
pub use session::RecordSession;
pub use variables::Variables;
