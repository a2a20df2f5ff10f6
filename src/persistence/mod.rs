//! Comment persistence
//!
//! The coordinator only needs two operations from storage: insert a comment and
//! read back the comments of a media inside a range of playback positions. Both
//! are expressed by the [`CommentStore`] port; [`PgCommentStore`] backs it with
//! PostgreSQL and [`MemoryCommentStore`] keeps everything in process.

pub mod error;
pub mod memory;
pub mod model;
pub mod port;
pub mod postgres;

pub use error::StoreError;
pub use memory::MemoryCommentStore;
pub use model::{Comment, InsertedComment, NewComment};
pub use port::CommentStore;
pub use postgres::PgCommentStore;
