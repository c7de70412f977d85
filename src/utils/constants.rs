pub static DEFAULT_SUCCESSOR_LIST_SIZE: usize = 3;
pub static DEFAULT_RETRY_BUDGET: u32 = 3;

pub static DEFAULT_STABILIZE_PERIOD_MILLIS: u64 = 1_000;
pub static DEFAULT_CHECK_PREDECESSOR_PERIOD_MILLIS: u64 = 5_000;
pub static DEFAULT_FIX_FINGERS_PERIOD_MILLIS: u64 = 1_000;
pub static DEFAULT_REJOIN_PERIOD_MILLIS: u64 = 30_000;
pub static DEFAULT_REPLICATION_PERIOD_MILLIS: u64 = 30_000;

pub static CONNECT_TIMEOUT_MILLIS: u64 = 2_000;
pub static REQUEST_TIMEOUT_MILLIS: u64 = 5_000;

pub static DEBUG_RPCS_UNAVAILABLE_ERROR_MESSAGE: &str =
    "This RPC is only available on nodes running with dev_mode = true";
