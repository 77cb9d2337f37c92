//! Protobuf parser for GTFS Realtime feeds.

use prost::Message;

use crate::gtfs_rt::FeedMessage;

/// Decodes a protobuf-encoded GTFS-RT [`FeedMessage`] from raw bytes.
///
/// # Errors
///
/// Returns the decode error if the bytes are not valid protobuf for a
/// `FeedMessage`. Callers map it to [`crate::fetch::FetchError::DecodeFailure`].
pub fn parse_feed(bytes: &[u8]) -> Result<FeedMessage, prost::DecodeError> {
    FeedMessage::decode(bytes)
}
