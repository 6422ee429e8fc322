// Database Boundary
// Connections, DSNs, role verification, and the cluster lock

pub mod conn;
pub mod dsn;
pub mod lock;

// Re-export key types
pub use conn::{Conn, Connections, DbError, Role};
pub use dsn::Dsn;
pub use lock::{ClusterLock, LockConfig, LockError};
