//! Authentication Module
//! Mission: Secure API access with JWT tokens, revocation, and RBAC

pub mod api;
pub mod blacklist;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod session;
pub mod user_store;

pub use blacklist::{InMemoryBlacklist, TokenBlacklist};
pub use error::AuthError;
pub use jwt::TokenCodec;
pub use middleware::{access_guard, GuardState, RouteAccess, RouteTable};
pub use session::SessionService;
pub use user_store::SqliteUserStore;
