use std::{
    sync::{
        atomic::{
            AtomicUsize,
            Ordering,
        },
        Arc,
    },
    time::Duration,
};

use tokio::sync::{
    Mutex,
    RwLock,
};
use tracing::debug;

pub mod api;
pub mod migrate;
pub mod types;

pub use api::{
    escape_query_value,
    query_term,
    AnkiConnectClient,
};
pub use types::{
    DeckInfo,
    NoteInfo,
};

use crate::config::Settings;

pub const DEFAULT_ANKI_CONNECT_URL: &str = "http://localhost:8765";

/// Shared access to one [`AnkiConnectClient`], built on first use.
///
/// The fast path only takes the read lock. Construction happens under `init`
/// with a second check, and the client is published once it exists.
pub struct AnkiClientHandle {
    url: String,
    timeout: Duration,
    client: RwLock<Option<Arc<AnkiConnectClient>>>,
    init: Mutex<()>,
    constructed: AtomicUsize,
}

impl AnkiClientHandle {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            url: url.into(),
            timeout,
            client: RwLock::new(None),
            init: Mutex::new(()),
            constructed: AtomicUsize::new(0),
        }
    }

    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(settings.anki_url.clone(), settings.anki_timeout)
    }

    pub async fn get(&self) -> Arc<AnkiConnectClient> {
        if let Some(client) = self.client.read().await.as_ref() {
            return client.clone();
        }

        let _guard = self.init.lock().await;
        if let Some(client) = self.client.read().await.as_ref() {
            return client.clone();
        }

        debug!(url = %self.url, "creating AnkiConnect client");
        let client = Arc::new(AnkiConnectClient::new(self.url.clone(), self.timeout));
        self.constructed.fetch_add(1, Ordering::SeqCst);
        *self.client.write().await = Some(client.clone());
        client
    }

    /// How many clients this handle has built.
    pub fn constructed(&self) -> usize {
        self.constructed.load(Ordering::SeqCst)
    }

    /// Closes the pooled connections of the current client, if any.
    pub async fn close(&self) {
        let client = self.client.read().await.clone();
        if let Some(client) = client {
            client.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::future::join_all;

    use super::*;

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_access_constructs_once() {
        let handle = Arc::new(AnkiClientHandle::new(DEFAULT_ANKI_CONNECT_URL, Duration::from_secs(1)));

        let tasks = (0..32).map(|_| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.get().await })
        });
        let clients: Vec<Arc<AnkiConnectClient>> =
            join_all(tasks).await.into_iter().map(Result::unwrap).collect();

        assert_eq!(handle.constructed(), 1);
        assert!(clients.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[tokio::test]
    async fn close_keeps_the_same_client() {
        let handle = AnkiClientHandle::new(DEFAULT_ANKI_CONNECT_URL, Duration::from_secs(1));
        handle.close().await;

        let first = handle.get().await;
        handle.close().await;
        let second = handle.get().await;

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(handle.constructed(), 1);
        assert_eq!(second.url(), DEFAULT_ANKI_CONNECT_URL);
    }
}
