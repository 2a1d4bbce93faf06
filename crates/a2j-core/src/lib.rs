//! a2j-core library.
//!
//! Moves Assembla ticket comments into Jira. The pipeline is:
//!
//! 1. [`identity`] loads the user, ticket and attachment maps produced by the
//!    earlier migration stages.
//! 2. [`record`] loads the exported comments.
//! 3. [`filter`] drops empty, commit and out-of-range comments and sorts the
//!    rest oldest first.
//! 4. [`driver`] rewrites each body with [`rewrite`] and posts it through a
//!    [`remote::IssueApi`], recording every outcome in CSV ledgers.
//!
//! # Conventions
//!
//! - **Errors**: fallible operations return [`error::Result`]; remote
//!   failures are [`remote::RemoteError`] values recorded per comment.
//! - **Logging**: use `tracing` macros (`info!`, `warn!`, `debug!`).

pub mod config;
pub mod driver;
pub mod error;
pub mod filter;
pub mod html;
pub mod identity;
pub mod record;
pub mod remote;
pub mod rewrite;
pub mod table;
pub mod users;
