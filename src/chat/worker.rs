//! Background fact extraction.
//!
//! One worker task per session drains an unbounded queue in arrival order, so
//! two extractions that touch the same key apply in the order their exchanges
//! happened.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::db::{self, SharedConnection};
use crate::llm::CompletionClient;
use crate::memory::store;
use crate::memory::types::Exchange;

/// Extract facts from one exchange and upsert each of them.
///
/// Each fact is written independently; a failed write is logged and the rest
/// still go through. Returns how many facts were stored.
pub async fn extract_and_store(
    client: &dyn CompletionClient,
    db: &SharedConnection,
    exchange: Exchange,
) -> usize {
    let facts = client.extract_facts(&exchange).await;
    if facts.is_empty() {
        debug!(user_id = %exchange.user_id, "nothing worth remembering");
        return 0;
    }

    let user_id = exchange.user_id;
    let result = db::call(db, move |conn| {
        let mut stored = 0;
        for fact in facts {
            match store::upsert_fact(
                conn,
                &user_id,
                fact.category,
                &fact.key,
                &fact.value,
                fact.importance,
            ) {
                Ok(_) => {
                    info!(
                        user_id = %user_id,
                        key = %fact.key,
                        category = %fact.category,
                        importance = fact.importance,
                        "auto-remembered"
                    );
                    stored += 1;
                }
                Err(e) => warn!(user_id = %user_id, key = %fact.key, error = %e, "failed to store fact"),
            }
        }
        Ok(stored)
    })
    .await;

    match result {
        Ok(stored) => stored,
        Err(e) => {
            warn!(error = %e, "extraction write failed");
            0
        }
    }
}

/// Handle to the per-session extraction task.
pub struct ExtractionWorker {
    tx: mpsc::UnboundedSender<Exchange>,
    handle: JoinHandle<()>,
}

impl ExtractionWorker {
    pub fn spawn(client: Arc<dyn CompletionClient>, db: SharedConnection) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<Exchange>();
        let handle = tokio::spawn(async move {
            while let Some(exchange) = rx.recv().await {
                extract_and_store(client.as_ref(), &db, exchange).await;
            }
            debug!("extraction worker drained");
        });
        Self { tx, handle }
    }

    /// Queue an exchange. Never blocks.
    pub fn submit(&self, exchange: Exchange) {
        if self.tx.send(exchange).is_err() {
            warn!("extraction worker is gone; dropping job");
        }
    }

    /// Close the queue and wait for every pending job to finish.
    pub async fn shutdown(self) {
        drop(self.tx);
        if let Err(e) = self.handle.await {
            warn!(error = %e, "extraction worker panicked");
        }
    }
}
