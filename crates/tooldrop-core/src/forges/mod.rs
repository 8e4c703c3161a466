pub mod github;
pub mod traits;

pub use github::GitHubSource;
pub use traits::ListingSource;
