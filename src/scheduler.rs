//! Scheduler — runs scan cycles back to back with a fixed pause between them.
//!
//! A cycle always runs to completion before the pause starts, so cycles
//! never overlap. Failed cycles do not change the pause length.

use std::time::Duration;

use tracing::{error, info};

use crate::scanner::{CycleReport, InboxScanner};

pub struct Scheduler {
    scanner: InboxScanner,
    interval: Duration,
}

impl Scheduler {
    pub fn new(scanner: InboxScanner, interval: Duration) -> Self {
        Self { scanner, interval }
    }

    /// Run one cycle and log its outcome.
    pub async fn run_cycle(&self) -> Option<CycleReport> {
        match self.scanner.scan_once().await {
            Ok(report) => {
                info!(
                    selected = report.selected,
                    saved = report.attachments_saved,
                    sent = report.notifications_sent,
                    marked_read = report.marked_read,
                    failed = report.failed_messages,
                    "Scan cycle complete"
                );
                Some(report)
            }
            Err(e) => {
                error!("Error checking emails: {e}");
                None
            }
        }
    }

    /// Cycle forever. Returns only if the task is dropped.
    pub async fn run(&self) {
        info!(
            "Scheduler started, scanning every {}s",
            self.interval.as_secs()
        );
        loop {
            self.run_cycle().await;
            tokio::time::sleep(self.interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::error::MailError;
    use crate::extractor::{ExtractionFailure, Table};
    use crate::mail::{
        Attachment, AttachmentInfo, InboundMessage, MailStore, OutboundNotification,
    };
    use crate::sheet::TableReader;
    use crate::storage::AttachmentStore;

    /// Mail store that records how many snapshot queries ran and how many
    /// overlapped.
    #[derive(Default)]
    struct CountingStore {
        queries: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MailStore for CountingStore {
        async fn unread_matching(&self, _prefix: &str) -> Result<Vec<InboundMessage>, MailError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            self.queries.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(MailError::Protocol("inbox unavailable".into()));
            }
            Ok(Vec::new())
        }

        async fn attachment(
            &self,
            message: &InboundMessage,
            _info: &AttachmentInfo,
        ) -> Result<Attachment, MailError> {
            Err(MailError::NotFound {
                id: message.id.clone(),
            })
        }

        async fn mark_read(&self, _message: &mut InboundMessage) -> Result<(), MailError> {
            Ok(())
        }

        async fn send(&self, _notification: &OutboundNotification) -> Result<(), MailError> {
            Ok(())
        }
    }

    struct NoTables;

    impl TableReader for NoTables {
        fn read_table(&self, _path: &std::path::Path) -> Result<Table, ExtractionFailure> {
            Err(ExtractionFailure::Empty)
        }
    }

    fn scheduler(store: Arc<CountingStore>, interval: Duration) -> Scheduler {
        let scanner = InboxScanner::new(
            store,
            AttachmentStore::new(std::env::temp_dir()),
            Arc::new(NoTables),
            "ops@example.com",
            "XPOR",
        );
        Scheduler::new(scanner, interval)
    }

    #[tokio::test]
    async fn cycles_repeat_without_overlap() {
        let store = Arc::new(CountingStore::default());
        let scheduler = scheduler(Arc::clone(&store), Duration::from_millis(10));

        let _ = tokio::time::timeout(Duration::from_millis(200), scheduler.run()).await;

        assert!(store.queries.load(Ordering::SeqCst) >= 2);
        assert_eq!(store.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_cycles_keep_running() {
        let store = Arc::new(CountingStore {
            fail: true,
            ..CountingStore::default()
        });
        let scheduler = scheduler(Arc::clone(&store), Duration::from_millis(10));

        assert!(scheduler.run_cycle().await.is_none());
        let _ = tokio::time::timeout(Duration::from_millis(100), scheduler.run()).await;

        assert!(store.queries.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn empty_cycle_reports_zero() {
        let store = Arc::new(CountingStore::default());
        let scheduler = scheduler(store, Duration::from_secs(300));

        assert_eq!(scheduler.run_cycle().await, Some(CycleReport::default()));
    }
}
