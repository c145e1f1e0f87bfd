//! Хранилище фоновых задач слияния с TTL и ограничением размера

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

/// Состояние задачи
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobStatus<T> {
    Pending,
    Done { result: T },
    Error { error: String },
}

/// Снимок задачи для ответа API
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobView<T> {
    pub job_id: Uuid,
    #[serde(flatten)]
    pub status: JobStatus<T>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug)]
struct JobEntry<T> {
    status: JobStatus<T>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct JobStore<T> {
    ttl: chrono::Duration,
    capacity: usize,
    jobs: Mutex<HashMap<Uuid, JobEntry<T>>>,
}

impl<T: Clone> JobStore<T> {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl: chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::weeks(52 * 100)),
            capacity: capacity.max(1),
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn create(&self) -> Uuid {
        self.create_at(Utc::now())
    }

    pub fn finish(&self, job_id: Uuid, status: JobStatus<T>) {
        self.finish_at(job_id, status, Utc::now())
    }

    pub fn get(&self, job_id: &Uuid) -> Option<JobView<T>> {
        self.get_at(job_id, Utc::now())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn create_at(&self, now: DateTime<Utc>) -> Uuid {
        let mut jobs = self.lock();
        self.evict_expired(&mut jobs, now);

        while jobs.len() >= self.capacity {
            let oldest = jobs
                .iter()
                .min_by_key(|(_, entry)| entry.created_at)
                .map(|(id, _)| *id);
            match oldest {
                Some(id) => {
                    jobs.remove(&id);
                    info!(job_id = %id, "Job store full, evicted oldest job");
                }
                None => break,
            }
        }

        let job_id = Uuid::new_v4();
        jobs.insert(
            job_id,
            JobEntry {
                status: JobStatus::Pending,
                created_at: now,
                updated_at: now,
            },
        );
        job_id
    }

    /// Задача могла быть вытеснена, пока выполнялась; тогда результат отбрасывается
    fn finish_at(&self, job_id: Uuid, status: JobStatus<T>, now: DateTime<Utc>) {
        if let Some(entry) = self.lock().get_mut(&job_id) {
            entry.status = status;
            entry.updated_at = now;
        }
    }

    fn get_at(&self, job_id: &Uuid, now: DateTime<Utc>) -> Option<JobView<T>> {
        let mut jobs = self.lock();
        self.evict_expired(&mut jobs, now);
        jobs.get(job_id).map(|entry| JobView {
            job_id: *job_id,
            status: entry.status.clone(),
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        })
    }

    fn evict_expired(&self, jobs: &mut HashMap<Uuid, JobEntry<T>>, now: DateTime<Utc>) {
        let before = jobs.len();
        jobs.retain(|_, entry| now - entry.updated_at <= self.ttl);
        let expired = before - jobs.len();
        if expired > 0 {
            info!(expired, "Cleaned up expired jobs");
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, JobEntry<T>>> {
        self.jobs.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
