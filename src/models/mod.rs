pub mod record;

pub use record::{FapRecord, REPORT_HEADERS};
