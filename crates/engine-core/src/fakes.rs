//! In-memory warehouse, object store and chat client for tests.

use async_trait::async_trait;
use connectors::{
    chat::{ChatClient, ChatTarget, FileUpload},
    error::ServiceError,
    object_store::ObjectStore,
    warehouse::{TableRef, Warehouse, WriteDisposition},
};
use model::records::record::Record;
use std::{
    collections::{BTreeMap, VecDeque},
    sync::Mutex,
};

fn rejected(service: &'static str) -> ServiceError {
    ServiceError::Api {
        service,
        message: "rejected by test".into(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadCall {
    pub table: TableRef,
    pub disposition: WriteDisposition,
    pub rows: usize,
}

#[derive(Default)]
struct WarehouseState {
    tables: BTreeMap<String, Vec<Record>>,
    queries: Vec<String>,
    results: VecDeque<Vec<Record>>,
    loads: Vec<LoadCall>,
    fail_loads: bool,
}

#[derive(Default)]
pub struct FakeWarehouse {
    state: Mutex<WarehouseState>,
}

impl FakeWarehouse {
    pub fn create_table(&self, table: &TableRef) {
        self.lock().tables.entry(table.to_string()).or_default();
    }

    pub fn seed(&self, table: &TableRef, rows: Vec<Record>) {
        self.lock().tables.insert(table.to_string(), rows);
    }

    /// Queued results are handed out to queries in order; an empty result
    /// once the queue runs dry.
    pub fn push_query_result(&self, rows: Vec<Record>) {
        self.lock().results.push_back(rows);
    }

    pub fn fail_loads(&self) {
        self.lock().fail_loads = true;
    }

    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    pub fn loads(&self) -> Vec<LoadCall> {
        self.lock().loads.clone()
    }

    pub fn rows(&self, table: &TableRef) -> Vec<Record> {
        self.lock()
            .tables
            .get(&table.to_string())
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WarehouseState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Warehouse for FakeWarehouse {
    async fn query(&self, sql: &str) -> Result<Vec<Record>, ServiceError> {
        let mut state = self.lock();
        state.queries.push(sql.to_string());
        Ok(state.results.pop_front().unwrap_or_default())
    }

    async fn table_exists(&self, table: &TableRef) -> Result<bool, ServiceError> {
        Ok(self.lock().tables.contains_key(&table.to_string()))
    }

    async fn load(
        &self,
        table: &TableRef,
        records: &[Record],
        disposition: WriteDisposition,
    ) -> Result<usize, ServiceError> {
        let mut state = self.lock();
        if state.fail_loads {
            return Err(rejected("fake-warehouse"));
        }
        state.loads.push(LoadCall {
            table: table.clone(),
            disposition,
            rows: records.len(),
        });
        let rows = state.tables.entry(table.to_string()).or_default();
        match disposition {
            WriteDisposition::Append => rows.extend_from_slice(records),
            WriteDisposition::Truncate => *rows = records.to_vec(),
            WriteDisposition::Empty if rows.is_empty() => *rows = records.to_vec(),
            WriteDisposition::Empty => return Err(rejected("fake-warehouse")),
        }
        Ok(records.len())
    }
}

#[derive(Default)]
struct StoreState {
    objects: BTreeMap<String, (String, Vec<u8>)>,
    fail: bool,
}

#[derive(Default)]
pub struct FakeObjectStore {
    state: Mutex<StoreState>,
}

impl FakeObjectStore {
    pub fn fail_uploads(&self) {
        self.lock().fail = true;
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    pub fn object(&self, name: &str) -> Option<(String, Vec<u8>)> {
        self.lock().objects.get(name).cloned()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ObjectStore for FakeObjectStore {
    async fn put_object(
        &self,
        name: &str,
        content_type: &str,
        body: Vec<u8>,
    ) -> Result<(), ServiceError> {
        let mut state = self.lock();
        if state.fail {
            return Err(rejected("fake-store"));
        }
        state
            .objects
            .insert(name.to_string(), (content_type.to_string(), body));
        Ok(())
    }

    fn object_url(&self, name: &str) -> String {
        format!("mem://{name}")
    }
}

#[derive(Default)]
struct ChatState {
    messages: Vec<(ChatTarget, String)>,
    files: Vec<(ChatTarget, FileUpload)>,
    fail: bool,
}

#[derive(Default)]
pub struct FakeChat {
    state: Mutex<ChatState>,
}

impl FakeChat {
    pub fn fail_calls(&self) {
        self.lock().fail = true;
    }

    pub fn messages(&self) -> Vec<(ChatTarget, String)> {
        self.lock().messages.clone()
    }

    pub fn files(&self) -> Vec<(ChatTarget, FileUpload)> {
        self.lock().files.clone()
    }

    /// Number of chat API calls attempted, failed ones included.
    pub fn calls(&self) -> usize {
        let state = self.lock();
        state.messages.len() + state.files.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ChatState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ChatClient for FakeChat {
    async fn post_message(&self, target: &ChatTarget, text: &str) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.messages.push((target.clone(), text.to_string()));
        if state.fail {
            return Err(rejected("fake-chat"));
        }
        Ok(())
    }

    async fn upload_file(&self, target: &ChatTarget, file: FileUpload) -> Result<(), ServiceError> {
        let mut state = self.lock();
        state.files.push((target.clone(), file));
        if state.fail {
            return Err(rejected("fake-chat"));
        }
        Ok(())
    }
}
