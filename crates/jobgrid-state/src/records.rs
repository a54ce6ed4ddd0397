//! Job records — request ids, allocation records and per-user queues.
//!
//! A job spread over several nodes is stored as several records, each with
//! its own request id. Their ids are appended to the owner's queue
//! back-to-back, and the record with `index == 0` marks where a job
//! starts. `retrieve_job_metadata` relies on that boundary to pop exactly
//! one job per call.

use std::collections::VecDeque;

use redb::{ReadableDatabase, ReadableTable, WriteTransaction};
use tracing::{debug, warn};

use crate::error::StateResult;
use crate::ledger::bump_counter;
use crate::store::{StateStore, decode, encode};
use crate::tables::*;
use crate::types::*;

impl StateStore {
    // ── Counter ────────────────────────────────────────────────────

    /// Atomically read and increment `next_request_id`. The first call
    /// returns 1.
    pub fn next_req_id(&self) -> StateResult<ReqId> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let id = bump_counter(&txn)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(id)
    }

    // ── Records ────────────────────────────────────────────────────

    /// Insert or overwrite the record stored under `record.req_id`.
    pub fn put_record(&self, record: &AllocationRecord) -> StateResult<()> {
        let value = encode(record)?;
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut table = txn.open_table(JOB_REQUESTS).map_err(map_err!(Table))?;
            table
                .insert(record.req_id, value.as_slice())
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn get_record(&self, req_id: ReqId) -> StateResult<Option<AllocationRecord>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(JOB_REQUESTS).map_err(map_err!(Table))?;
        match table.get(req_id).map_err(map_err!(Read))? {
            Some(guard) => Ok(Some(decode(guard.value())?)),
            None => Ok(None),
        }
    }

    // ── User queues ────────────────────────────────────────────────

    /// Append one request id to the tail of the user's queue.
    pub fn enqueue_for_user(&self, user_id: &str, req_id: ReqId) -> StateResult<()> {
        self.enqueue_job(user_id, &[req_id])
    }

    /// Append a job's request ids in one transaction, keeping them
    /// contiguous even when the same user submits concurrently.
    pub fn enqueue_job(&self, user_id: &str, req_ids: &[ReqId]) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut queue = load_queue(&txn, user_id)?;
        queue.extend(req_ids.iter().copied());
        store_queue(&txn, user_id, &queue)?;
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(user = user_id, ?req_ids, depth = queue.len(), "queued request ids");
        Ok(())
    }

    /// Pop the head of the user's queue.
    pub fn dequeue_for_user(&self, user_id: &str) -> StateResult<Option<ReqId>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut queue = load_queue(&txn, user_id)?;
        let head = queue.pop_front();
        if head.is_some() {
            store_queue(&txn, user_id, &queue)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(head)
    }

    /// Push a request id back onto the head of the user's queue.
    pub fn requeue_front(&self, user_id: &str, req_id: ReqId) -> StateResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut queue = load_queue(&txn, user_id)?;
        queue.push_front(req_id);
        store_queue(&txn, user_id, &queue)?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    pub fn queue_len(&self, user_id: &str) -> StateResult<usize> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(USER_QUEUES).map_err(map_err!(Table))?;
        let queue: VecDeque<ReqId> = match table.get(user_id).map_err(map_err!(Read))? {
            Some(guard) => decode(guard.value())?,
            None => VecDeque::new(),
        };
        Ok(queue.len())
    }

    /// Pop the records of the oldest unclaimed job for `user_id`.
    ///
    /// Request ids are popped until the queue is empty or a record from
    /// another job shows up after the first record (`index == 0`, or a
    /// different `job_id` when the next job's first record was released);
    /// that id is put back at the head for the next call. Ids whose record
    /// no longer exists (released) are dropped with a warning. The whole
    /// walk is one transaction.
    pub fn retrieve_job_metadata(&self, user_id: &str) -> StateResult<Vec<AllocationRecord>> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let mut queue = load_queue(&txn, user_id)?;
        let mut records: Vec<AllocationRecord> = Vec::new();

        {
            let table = txn.open_table(JOB_REQUESTS).map_err(map_err!(Table))?;
            while let Some(req_id) = queue.pop_front() {
                let record: Option<AllocationRecord> =
                    match table.get(req_id).map_err(map_err!(Read))? {
                        Some(guard) => Some(decode(guard.value())?),
                        None => None,
                    };

                let Some(record) = record else {
                    warn!(user = user_id, req_id, "queued request has no record, skipping");
                    continue;
                };

                if records.first().is_some_and(|first| record.is_other_job(first)) {
                    queue.push_front(req_id);
                    break;
                }
                records.push(record);
            }
        }

        store_queue(&txn, user_id, &queue)?;
        txn.commit().map_err(map_err!(Transaction))?;

        debug!(
            user = user_id,
            records = records.len(),
            remaining = queue.len(),
            "job metadata retrieved"
        );
        Ok(records)
    }
}

fn load_queue(txn: &WriteTransaction, user_id: &str) -> StateResult<VecDeque<ReqId>> {
    let table = txn.open_table(USER_QUEUES).map_err(map_err!(Table))?;
    let queue = match table.get(user_id).map_err(map_err!(Read))? {
        Some(guard) => decode(guard.value())?,
        None => VecDeque::new(),
    };
    Ok(queue)
}

/// Write the queue back; an empty queue removes the user's key.
fn store_queue(txn: &WriteTransaction, user_id: &str, queue: &VecDeque<ReqId>) -> StateResult<()> {
    let mut table = txn.open_table(USER_QUEUES).map_err(map_err!(Table))?;
    if queue.is_empty() {
        table.remove(user_id).map_err(map_err!(Write))?;
    } else {
        let value = encode(queue)?;
        table
            .insert(user_id, value.as_slice())
            .map_err(map_err!(Write))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn record(req_id: ReqId, index: u32) -> AllocationRecord {
        AllocationRecord {
            req_id,
            user_id: "alice".to_string(),
            node_id: format!("node-{index}"),
            hostname: format!("host{index}"),
            cpus_allocated: 4,
            memory_allocated: 1024,
            index,
            job_id: req_id - u64::from(index),
        }
    }

    fn store_job(store: &StateStore, records: &[AllocationRecord]) {
        for r in records {
            store.put_record(r).unwrap();
        }
        let ids: Vec<ReqId> = records.iter().map(|r| r.req_id).collect();
        store.enqueue_job("alice", &ids).unwrap();
    }

    #[test]
    fn counter_starts_at_one_and_increments() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(store.next_req_id().unwrap(), 1);
        assert_eq!(store.next_req_id().unwrap(), 2);
        assert_eq!(store.next_req_id().unwrap(), 3);
    }

    #[test]
    fn counter_is_gap_free_under_concurrency() {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..25).map(|_| store.next_req_id().unwrap()).collect::<Vec<_>>()
                })
            })
            .collect();

        let mut all: Vec<ReqId> = Vec::new();
        for h in handles {
            let ids = h.join().unwrap();
            // Each caller observes its own ids strictly increasing.
            assert!(ids.windows(2).all(|w| w[0] < w[1]));
            all.extend(ids);
        }

        all.sort_unstable();
        assert_eq!(all, (1..=200).collect::<Vec<ReqId>>());
    }

    #[test]
    fn record_put_get_overwrite() {
        let store = StateStore::open_in_memory().unwrap();
        let mut r = record(7, 0);
        store.put_record(&r).unwrap();
        assert_eq!(store.get_record(7).unwrap(), Some(r.clone()));

        r.cpus_allocated = 9;
        store.put_record(&r).unwrap();
        assert_eq!(store.get_record(7).unwrap().unwrap().cpus_allocated, 9);
    }

    #[test]
    fn queue_is_fifo_per_user() {
        let store = StateStore::open_in_memory().unwrap();
        store.enqueue_for_user("alice", 1).unwrap();
        store.enqueue_for_user("bob", 2).unwrap();
        store.enqueue_for_user("alice", 3).unwrap();

        assert_eq!(store.queue_len("alice").unwrap(), 2);
        assert_eq!(store.dequeue_for_user("alice").unwrap(), Some(1));
        assert_eq!(store.dequeue_for_user("alice").unwrap(), Some(3));
        assert_eq!(store.dequeue_for_user("alice").unwrap(), None);
        assert_eq!(store.dequeue_for_user("bob").unwrap(), Some(2));
    }

    #[test]
    fn requeue_front_goes_to_head() {
        let store = StateStore::open_in_memory().unwrap();
        store.enqueue_job("alice", &[5, 6]).unwrap();
        store.requeue_front("alice", 4).unwrap();

        assert_eq!(store.dequeue_for_user("alice").unwrap(), Some(4));
        assert_eq!(store.dequeue_for_user("alice").unwrap(), Some(5));
    }

    #[test]
    fn retrieve_stops_at_next_job_boundary() {
        let store = StateStore::open_in_memory().unwrap();
        store_job(&store, &[record(1, 0), record(2, 1), record(3, 2)]);
        store_job(&store, &[record(4, 0)]);

        let first = store.retrieve_job_metadata("alice").unwrap();
        let indices: Vec<u32> = first.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(store.queue_len("alice").unwrap(), 1);

        let second = store.retrieve_job_metadata("alice").unwrap();
        assert_eq!(second, vec![record(4, 0)]);
        assert_eq!(store.queue_len("alice").unwrap(), 0);

        assert!(store.retrieve_job_metadata("alice").unwrap().is_empty());
    }

    #[test]
    fn retrieve_consecutive_single_node_jobs_one_at_a_time() {
        let store = StateStore::open_in_memory().unwrap();
        store_job(&store, &[record(1, 0)]);
        store_job(&store, &[record(2, 0)]);

        assert_eq!(store.retrieve_job_metadata("alice").unwrap(), vec![record(1, 0)]);
        assert_eq!(store.retrieve_job_metadata("alice").unwrap(), vec![record(2, 0)]);
    }

    #[test]
    fn retrieve_skips_ids_without_records() {
        let store = StateStore::open_in_memory().unwrap();
        store.put_record(&record(2, 1)).unwrap();
        // 1 was never stored (e.g. released).
        store.enqueue_job("alice", &[1, 2]).unwrap();

        let got = store.retrieve_job_metadata("alice").unwrap();
        assert_eq!(got, vec![record(2, 1)]);
        assert_eq!(store.queue_len("alice").unwrap(), 0);
    }

    #[test]
    fn retrieve_stops_at_job_whose_first_record_was_released() {
        let store = StateStore::open_in_memory().unwrap();
        store_job(&store, &[record(1, 0)]);
        store_job(&store, &[record(2, 0), record(3, 1)]);
        // Job 2 lost its first record; its second record still says job 2.
        let txn = store.db.begin_write().unwrap();
        txn.open_table(JOB_REQUESTS).unwrap().remove(2).unwrap();
        txn.commit().unwrap();

        assert_eq!(store.retrieve_job_metadata("alice").unwrap(), vec![record(1, 0)]);
        assert_eq!(store.retrieve_job_metadata("alice").unwrap(), vec![record(3, 1)]);
        assert_eq!(store.queue_len("alice").unwrap(), 0);
    }

    #[test]
    fn retrieve_does_not_touch_other_users() {
        let store = StateStore::open_in_memory().unwrap();
        store_job(&store, &[record(1, 0)]);
        store.enqueue_for_user("bob", 1).unwrap();

        store.retrieve_job_metadata("alice").unwrap();
        assert_eq!(store.queue_len("bob").unwrap(), 1);
    }
}
