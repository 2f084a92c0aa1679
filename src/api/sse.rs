//! `stream` (§6 "Snapshot stream (outbound)"): one SSE `snapshot` event per
//! persisted decision. Built on `futures_util::stream::unfold` over the
//! store's broadcast receiver rather than pulling in a `tokio-stream`
//! dependency the rest of this crate's stack never reaches for.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_util::stream::{self, Stream};
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

use super::AppState;

pub async fn stream(State(state): State<Arc<AppState>>) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let rx = state.store.subscribe_snapshots();

    let events = stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(snapshot) => {
                    let event = Event::default().event("snapshot").json_data(&snapshot).unwrap_or_else(|_| Event::default());
                    return Some((Ok(event), rx));
                }
                // Reconnect is the client's responsibility (§6); a lagged
                // subscriber just resumes from the next published snapshot.
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "snapshot subscriber lagged, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(events).keep_alive(KeepAlive::default())
}
