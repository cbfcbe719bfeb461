// Authentication module
// Manages token pairs per alias, their storage and periodic refresh

mod manager;
mod refresh;
mod sqlite;
mod storage;
mod types;

pub use manager::TokenManager;
pub use sqlite::{default_db_path, SqliteTokenStorage};
pub use storage::{MemoryTokenStorage, TokenStorage};
pub use types::{AuthOptions, Endpoints, Tokens};
