pub mod channel;
pub mod feed;
pub mod item;

pub use channel::Channel;
pub use feed::{normalize_link, normalize_url, FeedDescriptor};
pub use item::Item;
