/// Job identifiers are opaque strings assigned by the front end at submission.
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
