mod contribution;
mod profile;
mod repository;
mod sync_state;

pub use contribution::*;
pub use profile::*;
pub use repository::*;
pub use sync_state::*;

/// Stable login name of a GitHub account.
pub type GithubHandle = String;
