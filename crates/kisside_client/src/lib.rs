pub mod auth;
pub mod client;
pub mod fs;

pub use auth::{AuthService, Session};
pub use client::{Client, ClientConfig, ClientError, DEFAULT_SERVICE};
pub use fs::{DirEntry, FileContents, FileStat, FsService};

pub use kisside_remote::{
    local_code, ErrorOrigin, LifecyclePhase, ProtocolVersion, QueueConfig, QueueEvent,
    QueueMetricsSnapshot, RpcError,
};
