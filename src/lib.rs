//! # Estuary
//!
//! A multi-user RSS/Atom aggregation service.
//!
//! ## Architecture
//!
//! ```text
//!                 ┌─────────────┐
//!   admin socket ─┤ AdminServer ├─ UserService ─┐
//!                 └─────────────┘               │
//!   clients ─ Authenticator ─ domain services ──┼─ Store (SQLite)
//!                                               │
//!   Synchronizer ─ WorkerPool ─ Puller ─────────┘
//! ```
//!
//! - [`store`]: ownership-scoped persistence with continuation paging
//! - [`puller`]: HTTP fetch with conditional requests, parsed by [`normalizer`]
//! - [`sync`]: periodic tick over every user's feeds
//! - [`auth`]: argon2 passwords, HMAC-signed access and refresh tokens
//! - [`services`]: category, feed, tag, entry and user use-cases, OPML
//! - [`admin`]: user management over a local Unix socket
//!
//! ## Quick Start
//!
//! ```bash
//! # Write a configuration and edit the secret
//! estuary config-template > ~/.config/estuary/config.toml
//!
//! # Run the service
//! estuary serve
//!
//! # Create a user through the admin socket
//! estuary admin new-user alice s3cret-long
//!
//! # Import subscriptions
//! estuary opml import --user alice feeds.opml
//! ```

/// Application context, service assembly and error types.
///
/// [`AppContext`](app::AppContext) wires the store, puller, authenticator
/// and domain services; [`Service`](app::Service) owns the background
/// lifecycles.
pub mod app;

/// Admin channel: wire protocol, Unix-socket server and client.
pub mod admin;

/// Password hashing and bearer tokens.
pub mod auth;

/// Command-line interface using clap.
///
/// - `serve` - Run the service
/// - `admin <action>` - Manage users of a running service
/// - `opml export|import` - Move subscriptions in and out
/// - `config-template` - Print an annotated configuration
pub mod cli;

/// TOML configuration with defaults and validation.
pub mod config;

/// Core domain models.
///
/// - [`User`](domain::User), [`Category`](domain::Category),
///   [`Feed`](domain::Feed), [`Entry`](domain::Entry), [`Tag`](domain::Tag)
/// - [`Marker`](domain::Marker), [`Stats`](domain::Stats),
///   [`Page`](domain::Page), [`Listing`](domain::Listing)
pub mod domain;

/// Feed parsing and normalization (RSS 2.0, Atom).
pub mod normalizer;

/// Feed fetching.
///
/// - [`Puller`](puller::Puller): Async trait for one fetch-and-parse cycle
/// - [`HttpPuller`](puller::HttpPuller): reqwest-based implementation
pub mod puller;

/// Domain use-cases over the store.
pub mod services;

/// Persistence layer.
///
/// - [`Store`](store::Store): Trait defining storage operations
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Periodic synchronization of all subscriptions.
pub mod sync;
