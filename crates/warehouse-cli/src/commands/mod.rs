pub mod auth;
pub mod connect;
pub mod query;
pub mod transfer;

pub use auth::AuthCommand;
pub use connect::ConnectCommand;
pub use query::QueryCommand;
pub use transfer::{GetCommand, PutCommand};
