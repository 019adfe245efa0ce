//! Router Module Index
//!
//! Routes are split by access level. Authentication is applied per module through a
//! `route_layer` in `create_router`; admin role checks live inside the handlers.

/// Routes open to anonymous clients: health check and the auth flows.
pub mod public;

/// Routes that require a valid access token (any role).
pub mod authenticated;

/// User management and dashboard statistics, restricted to admins.
pub mod admin;
