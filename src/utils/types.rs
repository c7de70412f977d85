/// gRPC address of a node in `host:port` notation
pub type Address = String;

/// Position in the 64 bit hash ring
pub type HashPos = u64;

/// Storage key, lives in the same 64 bit identifier space as node positions
pub type Key = u64;

/// Monotonic counter identifying the state of one store
pub type StoreVersion = u64;

/// Opaque value blob, preserved byte for byte across replicas
pub type Value = Vec<u8>;
