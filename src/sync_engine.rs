//! C9 SyncEngine (spec §4.9): orchestrates session discovery, change
//! detection, and per-bill sync. Grounded on
//! `original_source/app/legiscan/sync.py`'s `SyncManager.run_sync`.

use std::sync::Arc;

use chrono::Utc;

use crate::bill_store::{BillStore, DATA_SOURCE};
use crate::error::Result;
use crate::logging::{report_progress, ProgressEvent};
use crate::model::{SyncRun, SyncRunStatus, SyncRunType, SyncSummary};
use crate::persistence::PersistenceSession;
use crate::upstream_client::UpstreamClient;

pub struct SyncEngine<P: PersistenceSession, U: UpstreamClient> {
    persistence: Arc<P>,
    upstream: Arc<U>,
    bill_store: Arc<BillStore<P, U>>,
    monitored_jurisdictions: Vec<String>,
}

impl<P: PersistenceSession, U: UpstreamClient> SyncEngine<P, U> {
    pub fn new(
        persistence: Arc<P>,
        upstream: Arc<U>,
        bill_store: Arc<BillStore<P, U>>,
        monitored_jurisdictions: Vec<String>,
    ) -> Self {
        Self {
            persistence,
            upstream,
            bill_store,
            monitored_jurisdictions,
        }
    }

    /// Entry point (spec §4.9). A single run; the caller is
    /// responsible for serializing concurrent invocations (spec §5:
    /// "no concurrent runSync for the same process").
    pub async fn run_sync(&self, run_type: SyncRunType) -> Result<SyncSummary> {
        let started_at = Utc::now();
        let mut run = SyncRun::new(run_type, started_at);
        self.persistence.insert_sync_run(run.clone()).await?;
        report_progress(ProgressEvent::SyncStarted {
            run_id: run.id.to_string(),
            run_type: format!("{run_type:?}"),
        });

        let current_year = started_at.format("%Y").to_string().parse::<i32>().unwrap_or(started_at.year());

        for jurisdiction in self.monitored_jurisdictions.clone() {
            self.sync_jurisdiction(&jurisdiction, current_year, &mut run).await;
        }

        run.status = if run.error_samples.is_empty() {
            SyncRunStatus::Completed
        } else {
            SyncRunStatus::Partial
        };
        run.finished_at = Some(Utc::now());

        self.persistence.update_sync_run(run.clone()).await?;

        report_progress(ProgressEvent::SyncCompleted {
            run_id: run.id.to_string(),
            status: format!("{:?}", run.status),
            new_bills: run.new_bills,
            updated_bills: run.updated_bills,
        });

        Ok(SyncSummary {
            run_id: run.id,
            status: run.status,
            new_bills: run.new_bills,
            updated_bills: run.updated_bills,
            amendments_tracked: run.amendments_tracked,
            error_count: run.error_samples.len(),
            error_samples: run.error_samples,
        })
    }

    async fn sync_jurisdiction(&self, jurisdiction: &str, current_year: i32, run: &mut SyncRun) {
        let sessions = match self.upstream.session_list(jurisdiction).await {
            Ok(sessions) => sessions,
            Err(err) => {
                run.record_error(None, "ApiError", &format!("session_list({jurisdiction}) failed: {err}"), None);
                report_progress(ProgressEvent::SyncErrorRecorded {
                    bill_id: None,
                    message: err.to_string(),
                });
                return;
            }
        };

        let kept: Vec<_> = sessions
            .into_iter()
            .filter(|s| s.year_end >= current_year || s.sine_die == 0)
            .collect();
        report_progress(ProgressEvent::SessionsDiscovered {
            jurisdiction: jurisdiction.to_string(),
            session_count: kept.len(),
        });

        for session in kept {
            self.sync_session(session.session_id, run).await;
        }
    }

    async fn sync_session(&self, session_id: i64, run: &mut SyncRun) {
        let master_list = match self.upstream.master_list_raw(session_id).await {
            Ok(list) => list,
            Err(err) => {
                run.record_error(
                    None,
                    "ApiError",
                    &format!("master_list_raw({session_id}) failed: {err}"),
                    None,
                );
                return;
            }
        };

        let mut changed_ids = Vec::new();
        for (key, entry) in master_list.iter() {
            if key == "0" {
                continue;
            }
            let local = self
                .persistence
                .find_bill(DATA_SOURCE, &entry.bill_id.to_string())
                .await
                .ok()
                .flatten();
            let changed = match &local {
                Some(bill) => bill.change_hash.as_deref() != Some(entry.change_hash.as_str()),
                None => true,
            };
            if changed {
                changed_ids.push(entry.bill_id);
                report_progress(ProgressEvent::BillChangeDetected {
                    bill_id: entry.bill_id,
                    session_id,
                });
            }
        }

        for bill_id in changed_ids {
            self.sync_bill(bill_id, run).await;
        }
    }

    async fn sync_bill(&self, bill_id: i64, run: &mut SyncRun) {
        let detail = match self.upstream.bill(bill_id).await {
            Ok(detail) => detail,
            Err(err) => {
                run.record_error(Some(bill_id), "ApiError", &err.to_string(), None);
                report_progress(ProgressEvent::SyncErrorRecorded {
                    bill_id: Some(bill_id),
                    message: err.to_string(),
                });
                return;
            }
        };

        let amendment_count = detail.amendments.iter().filter(|a| a.amendment_id.is_some()).count() as u32;
        match self.bill_store.upsert_bill(detail).await {
            Ok(bill) => {
                if bill.is_newly_created() {
                    run.new_bills += 1;
                } else {
                    run.updated_bills += 1;
                }
                run.amendments_tracked += amendment_count;
            }
            Err(err) => {
                run.record_error(Some(bill_id), "PersistenceError", &err.to_string(), None);
                report_progress(ProgressEvent::SyncErrorRecorded {
                    bill_id: Some(bill_id),
                    message: err.to_string(),
                });
            }
        }
    }
}

trait YearExt {
    fn year(&self) -> i32;
}

impl YearExt for chrono::DateTime<Utc> {
    fn year(&self) -> i32 {
        chrono::Datelike::year(self)
    }
}
