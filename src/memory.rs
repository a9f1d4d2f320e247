//! In-process collaborators.
//!
//! Useful for embedding the cloner without a database and for tests. Each
//! type is a cheap handle around shared state; clones see the same data.

use crate::errors::StorageError;
use crate::models::{
    Category, CategoryId, CloneJob, Course, CourseId, CourseUpdate, DuplicateRequest, JobId,
    NewCategory, QueuedJob,
};
use crate::outcome::{OutcomeLog, OutcomeQuery, OutcomeRecord};
use crate::queue::{JobQueue, PendingFilter};
use crate::store::{CourseStore, DuplicateError};
use anyhow::{anyhow, bail};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Default)]
struct StoreState {
    next_id: i64,
    categories: BTreeMap<CategoryId, Category>,
    courses: BTreeMap<CourseId, Course>,
    duplicate_failures: HashMap<CourseId, String>,
    duplicates: Vec<DuplicateRequest>,
}

impl StoreState {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Category/course store held in memory.
///
/// Short identifiers are unique across all courses, so concurrent duplicates
/// of the same target fail with [`DuplicateError::ShortIdentifierTaken`].
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a category and return it.
    pub fn add_category(
        &self,
        name: impl Into<String>,
        tag: impl Into<String>,
        parent_id: CategoryId,
    ) -> Category {
        let mut state = self.state.lock();
        let category = Category {
            id: CategoryId(state.next_id()),
            name: name.into(),
            tag: tag.into(),
            parent_id,
        };
        state.categories.insert(category.id, category.clone());
        category
    }

    /// Add a course and return it.
    pub fn add_course(
        &self,
        short_identifier: impl Into<String>,
        full_name: impl Into<String>,
        category_id: CategoryId,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Course {
        let mut state = self.state.lock();
        let course = Course {
            id: CourseId(state.next_id()),
            short_identifier: short_identifier.into(),
            full_name: full_name.into(),
            category_id,
            start_date,
            end_date,
        };
        state.courses.insert(course.id, course.clone());
        course
    }

    /// Make every duplication of `course_id` fail with `message`.
    pub fn fail_duplication_of(&self, course_id: CourseId, message: impl Into<String>) {
        self.state
            .lock()
            .duplicate_failures
            .insert(course_id, message.into());
    }

    /// Every category, ordered by id.
    pub fn categories(&self) -> Vec<Category> {
        self.state.lock().categories.values().cloned().collect()
    }

    /// Every course, ordered by id.
    pub fn courses(&self) -> Vec<Course> {
        self.state.lock().courses.values().cloned().collect()
    }

    /// Every duplication request received so far.
    pub fn duplicate_requests(&self) -> Vec<DuplicateRequest> {
        self.state.lock().duplicates.clone()
    }

    fn is_within(state: &StoreState, category_id: CategoryId, root: CategoryId) -> bool {
        let mut current = category_id;
        // Parent chains are bounded by the number of categories.
        for _ in 0..=state.categories.len() {
            if current == root {
                return true;
            }
            match state.categories.get(&current) {
                Some(category) if category.parent_id != current => current = category.parent_id,
                _ => return false,
            }
        }
        false
    }
}

impl CourseStore for MemoryStore {
    async fn get_category(&self, id: CategoryId) -> anyhow::Result<Option<Category>> {
        Ok(self.state.lock().categories.get(&id).cloned())
    }

    async fn find_category_by_tag(&self, tag: &str) -> anyhow::Result<Option<Category>> {
        Ok(self
            .state
            .lock()
            .categories
            .values()
            .find(|category| category.tag == tag)
            .cloned())
    }

    async fn create_category(&self, category: NewCategory) -> anyhow::Result<Category> {
        let mut state = self.state.lock();
        if !category.tag.is_empty() && state.categories.values().any(|c| c.tag == category.tag) {
            bail!("category idnumber {:?} is already in use", category.tag);
        }
        let created = Category {
            id: CategoryId(state.next_id()),
            name: category.name,
            tag: category.tag,
            parent_id: category.parent_id,
        };
        state.categories.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_courses(
        &self,
        category_id: CategoryId,
        recursive: bool,
    ) -> anyhow::Result<Vec<Course>> {
        let state = self.state.lock();
        Ok(state
            .courses
            .values()
            .filter(|course| {
                course.category_id == category_id
                    || (recursive && Self::is_within(&state, course.category_id, category_id))
            })
            .cloned()
            .collect())
    }

    async fn get_course(&self, id: CourseId) -> anyhow::Result<Option<Course>> {
        Ok(self.state.lock().courses.get(&id).cloned())
    }

    async fn find_course(
        &self,
        short_identifier: &str,
        category_id: CategoryId,
    ) -> anyhow::Result<Option<Course>> {
        Ok(self
            .state
            .lock()
            .courses
            .values()
            .find(|c| c.short_identifier == short_identifier && c.category_id == category_id)
            .cloned())
    }

    async fn duplicate_course(&self, request: DuplicateRequest) -> Result<Course, DuplicateError> {
        let mut state = self.state.lock();
        state.duplicates.push(request.clone());

        if let Some(message) = state.duplicate_failures.get(&request.course_id) {
            return Err(anyhow!("{message}").into());
        }
        let source = state
            .courses
            .get(&request.course_id)
            .cloned()
            .ok_or_else(|| anyhow!("course {} does not exist", request.course_id))?;
        if !state.categories.contains_key(&request.category_id) {
            return Err(anyhow!("category {} does not exist", request.category_id).into());
        }
        if state
            .courses
            .values()
            .any(|c| c.short_identifier == request.short_identifier)
        {
            return Err(DuplicateError::ShortIdentifierTaken(request.short_identifier));
        }

        let clone = Course {
            id: CourseId(state.next_id()),
            short_identifier: request.short_identifier,
            full_name: request.full_name,
            category_id: request.category_id,
            start_date: source.start_date,
            end_date: source.end_date,
        };
        state.courses.insert(clone.id, clone.clone());
        Ok(clone)
    }

    async fn update_course(&self, id: CourseId, update: CourseUpdate) -> anyhow::Result<()> {
        let mut state = self.state.lock();
        let course = state
            .courses
            .get_mut(&id)
            .ok_or_else(|| anyhow!("course {id} does not exist"))?;
        course.full_name = update.full_name;
        course.start_date = update.start_date;
        course.end_date = update.end_date;
        Ok(())
    }
}

#[derive(Debug, Default)]
struct QueueState {
    next_id: i64,
    jobs: BTreeMap<JobId, QueuedJob>,
}

/// Job queue held in memory. Jobs are claimed in submission order.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobQueue {
    state: Arc<Mutex<QueueState>>,
}

impl MemoryJobQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of jobs still in the queue.
    pub fn len(&self) -> usize {
        self.state.lock().jobs.len()
    }

    /// Whether every job has completed.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobQueue for MemoryJobQueue {
    async fn enqueue(&self, job: &CloneJob) -> Result<JobId, StorageError> {
        let mut state = self.state.lock();
        state.next_id += 1;
        let id = JobId(state.next_id);
        state.jobs.insert(
            id,
            QueuedJob {
                id,
                job: job.clone(),
                submitted_at: Utc::now(),
                started_at: None,
            },
        );
        Ok(id)
    }

    async fn list_pending(&self, filter: &PendingFilter) -> Result<Vec<QueuedJob>, StorageError> {
        Ok(self
            .state
            .lock()
            .jobs
            .values()
            .filter(|queued| filter.matches(&queued.job))
            .cloned()
            .collect())
    }

    async fn claim_next(&self, lease: Duration) -> Result<Option<QueuedJob>, StorageError> {
        let now = Utc::now();
        let lease = chrono::Duration::from_std(lease).unwrap_or(chrono::Duration::MAX);
        let mut state = self.state.lock();
        let claimable = state.jobs.values_mut().find(|queued| match queued.started_at {
            None => true,
            Some(started_at) => started_at
                .checked_add_signed(lease)
                .is_some_and(|expires_at| expires_at < now),
        });
        Ok(claimable.map(|queued| {
            queued.started_at = Some(now);
            queued.clone()
        }))
    }

    async fn complete(&self, id: JobId) -> Result<(), StorageError> {
        self.state.lock().jobs.remove(&id);
        Ok(())
    }
}

/// Outcome log held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryOutcomeLog {
    records: Arc<Mutex<Vec<OutcomeRecord>>>,
}

impl MemoryOutcomeLog {
    /// Create an empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every record, oldest first.
    pub fn records(&self) -> Vec<OutcomeRecord> {
        self.records.lock().clone()
    }
}

impl OutcomeLog for MemoryOutcomeLog {
    async fn append(&self, record: &OutcomeRecord) -> Result<(), StorageError> {
        self.records.lock().push(record.clone());
        Ok(())
    }

    async fn query(&self, query: &OutcomeQuery) -> Result<Vec<OutcomeRecord>, StorageError> {
        let records = self.records.lock();
        let matching = records.iter().rev().filter(|record| query.matches(record)).cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }
}
