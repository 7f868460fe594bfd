//! Client for the xeno-canto recordings search API.
//!
//! Search with [`SearchCriteria`], then either inspect the [`QueryResult`] or
//! let [`XenoCanto::download_files`] fetch every recording as `<id>.mp3` and
//! write a `metadata.csv` next to them.
//!
//! The library logs through `tracing`; install a subscriber to see output.

pub mod api;
pub mod error;
pub mod store;
pub mod types;

pub use api::{HttpTransport, Transport, XenoCanto, API_BASE};
pub use error::{Result, XcError};
pub use types::{DownloadSummary, QueryResult, RecordingRecord, SearchCriteria, SearchField};
