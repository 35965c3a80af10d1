//! In-memory [`ObjectStore`] used by the sync tests.

use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use upload_missing_core::{ListPage, ObjectStore, PutRequest, StoreError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRecord {
    pub key: String,
    pub acl: String,
    pub content_type: String,
    pub body: Vec<u8>,
    pub mode: u32,
}

#[derive(Debug, Default)]
struct State {
    objects: BTreeSet<String>,
    list_calls: usize,
    put_attempts: HashMap<String, u32>,
    puts: Vec<PutRecord>,
    delete_calls: Vec<Vec<String>>,
    open_streams: usize,
    max_open_streams: usize,
}

#[derive(Debug)]
pub struct MemoryStore {
    state: Mutex<State>,
    page_size: usize,
    fail_list_page: Option<usize>,
    put_failures: HashMap<String, u32>,
    delete_failures: u32,
    put_latency: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 1000,
            fail_list_page: None,
            put_failures: HashMap::new(),
            delete_failures: 0,
            put_latency: Duration::from_millis(2),
        }
    }
}

impl MemoryStore {
    pub fn with_objects<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let store = Self::default();
        store.state.lock().unwrap().objects = keys.into_iter().map(Into::into).collect();
        store
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn fail_list_on_page(mut self, page: usize) -> Self {
        self.fail_list_page = Some(page);
        self
    }

    /// The first `times` puts of `key` fail; `u32::MAX` fails forever.
    pub fn fail_puts(mut self, key: &str, times: u32) -> Self {
        self.put_failures.insert(key.to_string(), times);
        self
    }

    /// The first `times` delete calls fail, whatever their keys.
    pub fn fail_deletes(mut self, times: u32) -> Self {
        self.delete_failures = times;
        self
    }

    pub fn with_put_latency(mut self, latency: Duration) -> Self {
        self.put_latency = latency;
        self
    }

    pub fn objects(&self) -> Vec<String> {
        self.state.lock().unwrap().objects.iter().cloned().collect()
    }

    pub fn list_calls(&self) -> usize {
        self.state.lock().unwrap().list_calls
    }

    pub fn puts(&self) -> Vec<PutRecord> {
        self.state.lock().unwrap().puts.clone()
    }

    pub fn put_attempts(&self, key: &str) -> u32 {
        self.state
            .lock()
            .unwrap()
            .put_attempts
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    pub fn delete_calls(&self) -> Vec<Vec<String>> {
        self.state.lock().unwrap().delete_calls.clone()
    }

    pub fn max_open_streams(&self) -> usize {
        self.state.lock().unwrap().max_open_streams
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        prefix: &str,
        continuation: Option<&str>,
    ) -> Result<ListPage, StoreError> {
        let mut state = self.state.lock().unwrap();
        state.list_calls += 1;
        if self.fail_list_page == Some(state.list_calls) {
            return Err(StoreError::List {
                prefix: prefix.to_string(),
                message: "injected list failure".into(),
            });
        }

        let start: usize = continuation.map_or(0, |t| t.parse().unwrap());
        let matching: Vec<String> = state
            .objects
            .iter()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect();
        let end = (start + self.page_size).min(matching.len());
        Ok(ListPage {
            keys: matching[start..end].to_vec(),
            next_token: (end < matching.len()).then(|| end.to_string()),
        })
    }

    async fn put_object(&self, request: PutRequest) -> Result<(), StoreError> {
        let attempt = {
            let mut state = self.state.lock().unwrap();
            state.open_streams += 1;
            state.max_open_streams = state.max_open_streams.max(state.open_streams);
            let attempt = state.put_attempts.entry(request.key.clone()).or_insert(0);
            *attempt += 1;
            *attempt
        };

        let PutRequest {
            key,
            acl,
            content_type,
            mut body,
        } = request;
        let mode = file_mode(&body).await;
        let mut bytes = Vec::new();
        let read = body.read_to_end(&mut bytes).await;
        tokio::time::sleep(self.put_latency).await;

        let mut state = self.state.lock().unwrap();
        state.open_streams -= 1;
        if let Err(err) = read {
            return Err(StoreError::Body {
                key,
                message: err.to_string(),
            });
        }
        let failures = self.put_failures.get(&key).copied().unwrap_or(0);
        if attempt <= failures {
            return Err(StoreError::Put {
                key,
                message: format!("injected failure on attempt {attempt}"),
            });
        }
        state.objects.insert(key.clone());
        state.puts.push(PutRecord {
            key,
            acl,
            content_type,
            body: bytes,
            mode,
        });
        Ok(())
    }

    async fn delete_objects(&self, keys: &[String]) -> Result<(), StoreError> {
        let mut state = self.state.lock().unwrap();
        state.delete_calls.push(keys.to_vec());
        if (state.delete_calls.len() as u32) <= self.delete_failures {
            return Err(StoreError::Delete {
                message: "injected delete failure".into(),
            });
        }
        for key in keys {
            state.objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(unix)]
async fn file_mode(file: &tokio::fs::File) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    file.metadata()
        .await
        .map(|m| m.permissions().mode() & 0o7777)
        .unwrap_or(0)
}

#[cfg(not(unix))]
async fn file_mode(_file: &tokio::fs::File) -> u32 {
    0
}
