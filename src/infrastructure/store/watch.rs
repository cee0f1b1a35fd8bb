use std::future::Future;

use futures_util::stream::{self, BoxStream, StreamExt};

use crate::application::ports::document_store::SnapshotStream;
use crate::domain::documents::document::Document;
use crate::domain::documents::snapshot::QuerySnapshot;

struct WatchState<F> {
    triggers: BoxStream<'static, ()>,
    fetch: F,
    started: bool,
    delivered: bool,
    previous: Vec<Document>,
}

/// Turns "something in this collection may have changed" notifications into
/// a snapshot stream. The query is refetched once up front and after every
/// trigger; refetches that leave the result set unchanged are swallowed.
/// The stream ends when the trigger source ends.
pub fn snapshot_stream<F, Fut>(triggers: BoxStream<'static, ()>, fetch: F) -> SnapshotStream
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Vec<Document>>> + Send + 'static,
{
    let state = WatchState {
        triggers,
        fetch,
        started: false,
        delivered: false,
        previous: Vec::new(),
    };
    stream::unfold(state, |mut state| async move {
        loop {
            if state.started {
                state.triggers.next().await?;
            }
            state.started = true;
            match (state.fetch)().await {
                Ok(docs) => {
                    let snapshot = QuerySnapshot::diff(&state.previous, docs);
                    let first = !state.delivered;
                    state.previous = snapshot.docs.clone();
                    if first || !snapshot.changes.is_empty() {
                        state.delivered = true;
                        return Some((Ok(snapshot), state));
                    }
                }
                Err(err) => return Some((Err(err), state)),
            }
        }
    })
    .boxed()
}
