//! Feed construction and delivery: manifest rendering, the multipart POST to
//! the indexer, and the batching/retrying push engine.

pub mod manifest;
pub mod pusher;
pub mod sender;

pub use manifest::ManifestMaker;
pub use pusher::{
    BatchingPusher, DefaultFeedErrorHandler, DefaultListingErrorHandler, FeedErrorHandler,
    ListingErrorHandler, PushRunner,
};
pub use sender::{FeedError, FeedSender, ManifestTransport, FEED_PORT};
