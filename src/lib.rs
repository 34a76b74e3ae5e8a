pub mod config;
pub mod server;
pub mod storage;

pub use config::Config;
pub use gitgate_git::{HttpBackend, ProtocolBackend};
pub use server::GitGateServer;
pub use storage::{validate_identifier, RepoStore, RepositoryDescriptor, StoreError};
