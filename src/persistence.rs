//! PersistenceSession port (SPEC_FULL.md §4.12): the transactional
//! storage boundary `BillStore`, `SyncEngine`, and `AnalysisEngine`
//! depend on (spec §1 collaborator i). The CRUD surface mirrors
//! `codegraph-storage`'s `CodeSnapshotStore` port-trait shape; the
//! `begin_transaction`/`commit`/`rollback` triple on top of it is this
//! crate's own addition, needed because spec.md §4.8/§7 require the
//! multi-step bill and analysis writes to roll back as a unit on
//! failure, which `CodeSnapshotStore` (CRUD-only, no transactions) has
//! no counterpart for. The in-memory reference implementation used by
//! this crate's own tests realizes rollback via snapshot-and-restore.
//! The real `DATABASE_URL`-backed implementation is supplied by the
//! surrounding application, out of scope per spec §1.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::error::{PolicyPulseError, Result};
use crate::model::{Amendment, Analysis, Bill, BillSponsor, BillText, Priority, SyncRun};

/// Opaque handle returned by `begin_transaction`, passed back to
/// `commit`/`rollback`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TransactionId(Uuid);

/// The persistence boundary. `begin_transaction` opens a scope within
/// which writes made through the CRUD methods below are provisional:
/// `commit` makes them permanent, `rollback` undoes all of them,
/// restoring the state as of `begin_transaction`. `BillStore::upsert_bill`
/// and `AnalysisEngine`'s analysis-plus-priority write both run inside
/// such a scope (spec §4.8/§7's "transaction/savepoint ... commit or
/// rollback on error").
#[async_trait]
pub trait PersistenceSession: Send + Sync {
    async fn find_bill(&self, data_source: &str, external_id: &str) -> Result<Option<Bill>>;
    async fn get_bill(&self, bill_id: Uuid) -> Result<Option<Bill>>;
    async fn save_bill(&self, bill: Bill) -> Result<Bill>;
    async fn replace_sponsors(&self, bill_id: Uuid, sponsors: Vec<BillSponsor>) -> Result<()>;
    async fn upsert_bill_text(&self, text: BillText) -> Result<()>;
    async fn latest_bill_text(&self, bill_id: Uuid) -> Result<Option<BillText>>;
    async fn upsert_amendment(&self, amendment: Amendment) -> Result<()>;
    async fn amendment_count(&self, bill_id: Uuid) -> Result<usize>;
    async fn next_analysis_version(&self, bill_id: Uuid) -> Result<i32>;
    async fn insert_analysis(&self, analysis: Analysis) -> Result<()>;
    async fn current_analysis(&self, bill_id: Uuid) -> Result<Option<Analysis>>;
    async fn upsert_priority(&self, priority: Priority) -> Result<()>;
    async fn get_priority(&self, bill_id: Uuid) -> Result<Option<Priority>>;
    async fn insert_sync_run(&self, run: SyncRun) -> Result<()>;
    async fn update_sync_run(&self, run: SyncRun) -> Result<()>;

    async fn begin_transaction(&self) -> Result<TransactionId>;
    async fn commit(&self, tx: TransactionId) -> Result<()>;
    async fn rollback(&self, tx: TransactionId) -> Result<()>;
}

#[derive(Default, Clone)]
struct Tables {
    bills: HashMap<Uuid, Bill>,
    bill_keys: HashMap<(String, String), Uuid>,
    sponsors: HashMap<Uuid, Vec<BillSponsor>>,
    texts: HashMap<(Uuid, i32), BillText>,
    amendments: HashMap<(Uuid, String), Amendment>,
    analyses: HashMap<Uuid, Vec<Analysis>>,
    priorities: HashMap<Uuid, Priority>,
    sync_runs: HashMap<Uuid, SyncRun>,
}

/// `tokio::sync::Mutex`-guarded in-memory reference implementation,
/// used by this crate's own tests (SPEC_FULL.md §4.12). Open
/// transactions are tracked as a snapshot of `Tables` taken at
/// `begin_transaction`; `rollback` restores it wholesale.
#[derive(Default)]
pub struct InMemorySession {
    tables: Mutex<Tables>,
    snapshots: Mutex<HashMap<Uuid, Tables>>,
}

impl InMemorySession {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PersistenceSession for InMemorySession {
    async fn find_bill(&self, data_source: &str, external_id: &str) -> Result<Option<Bill>> {
        let tables = self.tables.lock().await;
        let key = (data_source.to_string(), external_id.to_string());
        Ok(tables.bill_keys.get(&key).and_then(|id| tables.bills.get(id)).cloned())
    }

    async fn get_bill(&self, bill_id: Uuid) -> Result<Option<Bill>> {
        let tables = self.tables.lock().await;
        Ok(tables.bills.get(&bill_id).cloned())
    }

    async fn save_bill(&self, bill: Bill) -> Result<Bill> {
        let mut tables = self.tables.lock().await;
        let key = (bill.data_source.clone(), bill.external_id.clone());
        tables.bill_keys.insert(key, bill.id);
        tables.bills.insert(bill.id, bill.clone());
        Ok(bill)
    }

    async fn replace_sponsors(&self, bill_id: Uuid, sponsors: Vec<BillSponsor>) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.sponsors.insert(bill_id, sponsors);
        Ok(())
    }

    async fn upsert_bill_text(&self, text: BillText) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.texts.insert((text.bill_id, text.version_number), text);
        Ok(())
    }

    async fn latest_bill_text(&self, bill_id: Uuid) -> Result<Option<BillText>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .texts
            .values()
            .filter(|t| t.bill_id == bill_id)
            .max_by_key(|t| t.version_number)
            .cloned())
    }

    async fn upsert_amendment(&self, amendment: Amendment) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables
            .amendments
            .insert((amendment.bill_id, amendment.amendment_external_id.clone()), amendment);
        Ok(())
    }

    async fn amendment_count(&self, bill_id: Uuid) -> Result<usize> {
        let tables = self.tables.lock().await;
        Ok(tables.amendments.keys().filter(|(id, _)| *id == bill_id).count())
    }

    async fn next_analysis_version(&self, bill_id: Uuid) -> Result<i32> {
        let tables = self.tables.lock().await;
        Ok(tables
            .analyses
            .get(&bill_id)
            .and_then(|versions| versions.iter().map(|a| a.version).max())
            .unwrap_or(0)
            + 1)
    }

    async fn insert_analysis(&self, analysis: Analysis) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.analyses.entry(analysis.bill_id).or_default().push(analysis);
        Ok(())
    }

    async fn current_analysis(&self, bill_id: Uuid) -> Result<Option<Analysis>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .analyses
            .get(&bill_id)
            .and_then(|versions| versions.iter().max_by_key(|a| a.version))
            .cloned())
    }

    async fn upsert_priority(&self, priority: Priority) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.priorities.insert(priority.bill_id, priority);
        Ok(())
    }

    async fn get_priority(&self, bill_id: Uuid) -> Result<Option<Priority>> {
        let tables = self.tables.lock().await;
        Ok(tables.priorities.get(&bill_id).cloned())
    }

    async fn insert_sync_run(&self, run: SyncRun) -> Result<()> {
        let mut tables = self.tables.lock().await;
        tables.sync_runs.insert(run.id, run);
        Ok(())
    }

    async fn update_sync_run(&self, run: SyncRun) -> Result<()> {
        let mut tables = self.tables.lock().await;
        if !tables.sync_runs.contains_key(&run.id) {
            return Err(PolicyPulseError::NotFound(format!("sync run {}", run.id)));
        }
        tables.sync_runs.insert(run.id, run);
        Ok(())
    }

    async fn begin_transaction(&self) -> Result<TransactionId> {
        let snapshot = self.tables.lock().await.clone();
        let id = Uuid::new_v4();
        self.snapshots.lock().await.insert(id, snapshot);
        Ok(TransactionId(id))
    }

    async fn commit(&self, tx: TransactionId) -> Result<()> {
        self.snapshots
            .lock()
            .await
            .remove(&tx.0)
            .ok_or_else(|| PolicyPulseError::ContentProcessing(format!("unknown transaction {}", tx.0)))?;
        Ok(())
    }

    async fn rollback(&self, tx: TransactionId) -> Result<()> {
        let snapshot = self
            .snapshots
            .lock()
            .await
            .remove(&tx.0)
            .ok_or_else(|| PolicyPulseError::ContentProcessing(format!("unknown transaction {}", tx.0)))?;
        *self.tables.lock().await = snapshot;
        Ok(())
    }
}
