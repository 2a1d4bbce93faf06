pub mod comments;
pub mod completions;
pub mod rewrite;
pub mod users;
