//! Client logic written against the `Ledger` port

pub mod feed_poster;
pub mod feed_reader;
pub mod notification;
pub mod refresh_loop;
pub mod session;

pub use feed_poster::{FeedPoster, PostReceipt};
pub use feed_reader::{FeedReader, StoredMessage};
pub use notification::{explorer_url, transaction_url, Notification};
pub use refresh_loop::{LoopState, RefreshConfig, RefreshHandle, RefreshLoop};
pub use session::FeedSession;
