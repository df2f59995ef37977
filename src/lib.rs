//! # Rythm
//!
//! Backend for a shared checklist app. Users publish todos with checklists,
//! comment on each other's todos, and rate them with a thumb up or down.
//!
//! ## Architecture
//!
//! ```text
//! HTTP (axum) → DTO validation → bearer session → services → Store (SQLite)
//! ```
//!
//! - [`server`]: Router, extractors and error responses
//! - [`rating`]: The thumb-rating state machine
//! - [`todos`]: Todo lifecycle, comments and queries
//! - [`auth`]: Passwords, sessions, activation and social login
//! - [`store`]: SQLite persistence with full-text search
//!
//! ## Quick Start
//!
//! ```bash
//! # Create an account from the command line
//! rythm user add --email ada@example.com --username ada --password secret
//!
//! # Run the server
//! rythm serve --bind 127.0.0.1:8080
//!
//! # Check thumb counters against user reactions
//! rythm audit
//! ```
//!
//! ## Modules
//!
//! - [`app`]: Application context and error types
//! - [`cli`]: Command-line interface definitions
//! - [`config`]: TOML configuration with environment overrides
//! - [`domain`]: Core domain models (Todo, User, Reaction)

/// Application context and error handling.
///
/// The [`AppContext`](app::AppContext) struct wires together all components:
/// store, reaction engine, auth and todo services.
pub mod app;

/// Accounts and credentials.
///
/// - [`AuthService`](auth::AuthService): register, login, activation, sessions
/// - [`IdentityProvider`](auth::IdentityProvider): social login seam
/// - [`OAuth2Provider`](auth::OAuth2Provider): reqwest-based GitHub, Google and LinkedIn clients
/// - [`Mailer`](auth::Mailer): activation mail
pub mod auth;

/// Command-line interface using clap.
///
/// - `serve` - Run the HTTP server
/// - `user add` - Create a local account
/// - `todo import <file>` - Bulk-load todos for a user
/// - `audit` - Report thumb counter drift
pub mod cli;

/// Configuration management.
///
/// Loads from `~/.config/rythm/config.toml`, with `RYTHM_*` overrides.
pub mod config;

/// Core domain models.
///
/// - [`Todo`](domain::Todo): A checklist with comments and thumb counters
/// - [`User`](domain::User): Account plus its liked / notLiked sets
/// - [`Reaction`](domain::Reaction): thumbUp / thumbDown and its transition table
pub mod domain;

/// Thumb ratings.
pub mod rating;

/// HTTP server built on axum.
pub mod server;

/// SQLite persistence layer.
///
/// - [`Store`](store::Store): Union of the storage traits
/// - [`SqliteStore`](store::SqliteStore): SQLite implementation
pub mod store;

/// Todo operations on behalf of a caller.
pub mod todos;
