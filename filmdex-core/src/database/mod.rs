pub mod sqlite;
pub mod traits;

pub use sqlite::SqliteStore;
pub use traits::{
    LookupKind, MediaStore, SessionTotals, SidecarCandidate, UpsertOutcome,
};
