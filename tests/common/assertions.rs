//! Assertions over run output

use std::collections::BTreeSet;
use std::future::Future;
use std::path::Path;
use std::time::Duration;

use feed_dl::{Attributes, Event};
use tokio::sync::broadcast;

use super::fixtures::{content_for, file_entry};

/// Upper bound for any single pipeline run in these tests
pub const RUN_TIMEOUT: Duration = Duration::from_secs(10);

/// Await `fut`, failing the test instead of hanging if the pipeline never stops
pub async fn within_timeout<T>(fut: impl Future<Output = T>) -> T {
    tokio::time::timeout(RUN_TIMEOUT, fut)
        .await
        .expect("pipeline did not terminate in time")
}

/// Identifiers that have a content artifact in `dir`
pub fn stored_ids(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter(|name| !name.ends_with(".json"))
        .collect()
}

/// Identifiers that have a metadata artifact in `dir`
pub fn stored_metadata(dir: &Path) -> BTreeSet<String> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
        .filter_map(|name| name.strip_suffix(".json").map(str::to_string))
        .collect()
}

/// Check both artifacts for `id`: raw content, and metadata that parses back to the
/// entry's attribute mapping
pub fn assert_artifacts(dir: &Path, id: &str) {
    let content = std::fs::read(dir.join(id)).unwrap();
    assert_eq!(content, content_for(id), "content artifact for {id}");

    let raw = std::fs::read_to_string(dir.join(format!("{id}.json"))).unwrap();
    let metadata: Attributes = serde_json::from_str(&raw).unwrap();
    assert_eq!(metadata, file_entry(id).attributes, "metadata artifact for {id}");
}

/// Every event already sent on `events`
pub fn drain_events(events: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut collected = Vec::new();
    while let Ok(event) = events.try_recv() {
        collected.push(event);
    }
    collected
}

/// Identifiers of `ItemQueued` events, in send order
pub fn queued_ids(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::ItemQueued { id, .. } => Some(id.clone()),
            _ => None,
        })
        .collect()
}
