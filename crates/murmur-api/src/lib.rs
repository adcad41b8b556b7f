pub mod comments;
pub mod convert;
pub mod directory;
pub mod error;
pub mod logging;
pub mod mentions;
pub mod middleware;
pub mod notifications;
pub mod rate_limit;
pub mod routes;
pub mod state;
pub mod users;
