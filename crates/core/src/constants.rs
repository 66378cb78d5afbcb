/// Name of the SQLite database file inside the data directory.
pub const DATABASE_FILE_NAME: &str = "networth.db";

/// Name of the advisory lock file inside the data directory.
pub const LOCK_FILE_NAME: &str = ".pipeline.lock";

/// Timestamp column shared by every family table.
pub const TIMESTAMP_COLUMN: &str = "date";

/// Canonical text encoding of timestamps in storage. Fixed width, so
/// lexicographic order equals chronological order.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 30 * 60;
pub const DEFAULT_LOCK_POLL_MS: u64 = 500;
pub const DEFAULT_FETCHER_TIMEOUT_SECS: u64 = 120;

/// Process exit statuses of the command surface.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_RUN_FAILED: i32 = 1;
/// Hourly run succeeded, the out-of-band daily retry did not.
pub const EXIT_DAILY_RETRY_FAILED: i32 = 2;
/// EX_TEMPFAIL: the scheduler should try again later.
pub const EXIT_LOCK_CONTENTION: i32 = 75;

/// Error text stored when a fetcher fails without a usable message.
pub const UNKNOWN_FAILURE: &str = "unknown error";
