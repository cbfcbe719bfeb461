// Jexia SDK - token lifecycle and dataset access

pub mod auth;
pub mod client;
pub mod config;
pub mod dataops;
pub mod error;
pub mod executer;
pub mod transport;

pub use auth::{AuthOptions, MemoryTokenStorage, SqliteTokenStorage, TokenManager, TokenStorage, Tokens};
pub use client::Client;
pub use dataops::{DataQuery, DataRequest, Dataset, QueryAction};
pub use error::{Result, SdkError};
pub use executer::RequestExecuter;
pub use transport::{HttpRequestAdapter, RequestAdapter, RequestMethod, RequestOptions};
