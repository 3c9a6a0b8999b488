mod config;
mod engagement;
mod error;
mod feed;
mod models;
mod paginator;
mod score;
mod session;
pub mod store;

pub use config::Config;
pub use engagement::EngagementCoordinator;
pub use error::{Error, Result, StoreError};
pub use feed::Feed;
pub use models::{
    CoverImage, EngagementRecord, FeedCursor, FeedPage, LikeOutcome, Post, PostId, PostMetadata,
    ShareOutcome, UserId,
};
pub use paginator::FeedPaginator;
pub use score::{ScoreEngine, ScoreWeights, Signal};
pub use session::{FeedSession, PageSizes};

/// Collection holding the posts.
pub const POSTS: &str = "posts";

pub const SCORE_FIELD: &str = "score";
pub const LIKE_COUNT_FIELD: &str = "metadata.likeCount";
pub const SHARE_COUNT_FIELD: &str = "metadata.shareCount";
pub const AUTHOR_FIELD: &str = "metadata.author";
