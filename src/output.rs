//! Output helpers for the one-shot CLI commands.

use anyhow::Result;
use serde::Serialize;
use std::path::Path;
use tracing::info;

/// Logs any serializable value as pretty-printed JSON.
pub fn print_json<T: Serialize>(value: &T) -> Result<()> {
    info!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Writes `value` as pretty-printed JSON to `path`, replacing any existing file.
pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    info!(path = %path.display(), "Wrote JSON output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gtfs_rt::{FeedHeader, FeedMessage};
    use std::env;
    use std::fs;

    fn feed() -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: Some(1234567890),
                incrementality: None,
                feed_version: None,
            },
            entity: vec![],
        }
    }

    #[test]
    fn test_print_json_does_not_panic() {
        print_json(&feed()).unwrap();
    }

    #[test]
    fn test_write_json_replaces_file() {
        let path = env::temp_dir().join("gtfs_rt_map_test_write.json");
        let _ = fs::remove_file(&path);

        write_json(&path, &vec![1, 2]).unwrap();
        write_json(&path, &feed()).unwrap();

        let content: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(content["header"]["gtfs_realtime_version"], "2.0");
        assert_eq!(content["header"]["timestamp"], 1234567890);

        fs::remove_file(&path).unwrap();
    }
}
