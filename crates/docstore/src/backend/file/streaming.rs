//! Streaming utilities for walking a collection directory.

use std::{path::PathBuf, pin::Pin};

use async_stream::stream;
use futures::Stream;
use tokio::fs as tokio_fs;
use tracing::trace;

use crate::{backend::BackendResult, constants::DOCUMENT_EXTENSION, ObjectId};

/// Streams the identifiers of the documents stored in a collection directory.
///
/// Files that are not `<24 hex chars>.json` (temporary files, foreign files) are
/// skipped. A missing directory yields an empty stream: the collection simply has
/// not been written to yet.
pub fn stream_document_ids(collection_path: PathBuf) -> Pin<Box<dyn Stream<Item = BackendResult<ObjectId>> + Send>> {
    Box::pin(stream! {
        let mut entries = match tokio_fs::read_dir(&collection_path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return,
            Err(e) => {
                yield Err(e.into());
                return;
            }
        };

        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    yield Err(e.into());
                    continue;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(DOCUMENT_EXTENSION) {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()).map(ObjectId::parse_str) {
                Some(Ok(id)) => {
                    yield Ok(id);
                },
                _ => {
                    trace!("Skipping foreign file {:?}", path);
                },
            }
        }
    })
}
