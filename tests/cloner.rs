#![allow(missing_docs)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::unwrap_used)]
#![allow(clippy::indexing_slicing)]

use category_cloner::memory::{MemoryJobQueue, MemoryOutcomeLog, MemoryStore};
use category_cloner::models::{
    BatchId, Category, CategoryId, CloneBatch, CourseId, DuplicateOptions, NewChildCategory,
};
use category_cloner::outcome::{CloneOutcome, OutcomeLog, OutcomeQuery};
use category_cloner::{
    CategoryPreparer, CloneError, CloneExecutor, CloneJobQueue, CloneRequest, CloneState, Cloner,
    JobQueue, PendingFilter, StatusReconciler,
};
use chrono::{DateTime, TimeZone, Utc};
use claims::{assert_err, assert_matches, assert_none, assert_ok, assert_some};
use insta::assert_snapshot;
use std::time::Duration;

/// Test utilities and common setup
mod test_utils {
    use super::*;

    pub(super) fn date(year: i32, month: u32, day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(year, month, day, 0, 0, 0).unwrap()
    }

    /// Source category "Science" (id 1, tag `SCI`) and an "Archive"
    /// category (id 2, tag `ARCH`) to clone under.
    pub(super) struct Fixture {
        pub(super) store: MemoryStore,
        pub(super) queue: MemoryJobQueue,
        pub(super) log: MemoryOutcomeLog,
        pub(super) source: Category,
        pub(super) archive: Category,
    }

    impl Fixture {
        pub(super) fn new() -> Self {
            let store = MemoryStore::new();
            let source = store.add_category("Science", "SCI", CategoryId::TOP);
            let archive = store.add_category("Archive", "ARCH", CategoryId::TOP);
            Self {
                store,
                queue: MemoryJobQueue::new(),
                log: MemoryOutcomeLog::new(),
                source,
                archive,
            }
        }

        pub(super) fn add_source_course(&self, short_identifier: &str, full_name: &str) -> CourseId {
            self.store
                .add_course(
                    short_identifier,
                    full_name,
                    self.source.id,
                    date(2023, 2, 1),
                    date(2023, 6, 30),
                )
                .id
        }

        pub(super) fn cloner(&self) -> Cloner<MemoryStore, MemoryJobQueue> {
            Cloner::new(self.store.clone(), self.queue.clone())
        }

        pub(super) fn executor(&self) -> CloneExecutor<MemoryStore, MemoryOutcomeLog> {
            CloneExecutor::new(self.store.clone(), self.log.clone())
        }

        pub(super) fn reconciler(&self) -> StatusReconciler<MemoryStore, MemoryJobQueue> {
            StatusReconciler::new(self.store.clone(), self.queue.clone())
        }

        /// Clone into a new `SCI2024` sub-category of the archive.
        pub(super) fn request(&self) -> CloneRequest {
            CloneRequest {
                source: self.source.id,
                destination: self.archive.id,
                new_child: Some(NewChildCategory::new("Science 2024", "SCI2024")),
                start_date: date(2024, 2, 1),
                end_date: date(2024, 6, 30),
            }
        }

        /// Claim and execute every queued job, the way a worker does.
        pub(super) async fn drain(&self) -> Vec<CloneOutcome> {
            let executor = self.executor();
            let mut outcomes = Vec::new();
            while let Some(queued) = self.queue.claim_next(executor.lease()).await.unwrap() {
                outcomes.push(executor.run(&queued.job).await);
                self.queue.complete(queued.id).await.unwrap();
            }
            outcomes
        }
    }
}

use test_utils::{Fixture, date};

#[tokio::test]
async fn batch_queues_one_job_per_immediate_course() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    fixture.add_source_course("SCI_101", "Science 101");
    fixture.add_source_course("SCI_102", "Science 102");
    fixture.add_source_course("SCI_103", "Science 103");
    let nested = fixture
        .store
        .add_category("Science labs", "SCILAB", fixture.source.id);
    fixture
        .store
        .add_course("LAB_1", "Lab 1", nested.id, date(2023, 2, 1), date(2023, 6, 30));

    let submitted = fixture.cloner().submit_clone(&fixture.request()).await?;

    assert_eq!(submitted.jobs.len(), 3);
    let pending = fixture.queue.list_pending(&PendingFilter::default()).await?;
    assert_eq!(pending.len(), 3);
    assert!(pending.iter().all(|queued| queued.job.batch_id == submitted.batch.id));
    assert!(pending.iter().all(|queued| queued.started_at.is_none()));
    assert!(
        pending
            .iter()
            .all(|queued| queued.job.destination_category_id == submitted.destination.id)
    );

    Ok(())
}

#[tokio::test]
async fn empty_source_category_queues_nothing() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let batch = CloneBatch {
        id: BatchId::generate(),
        source_category_id: fixture.source.id,
        destination_category_id: fixture.archive.id,
        start_date: date(2024, 2, 1),
        end_date: date(2024, 6, 30),
    };

    let jobs = CloneJobQueue::new(fixture.store.clone(), fixture.queue.clone())
        .submit_batch(&fixture.source, &fixture.archive, &batch)
        .await?;

    assert!(jobs.is_empty());
    assert!(fixture.queue.is_empty());

    Ok(())
}

#[tokio::test]
async fn preparing_twice_reuses_the_child_category() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let preparer = CategoryPreparer::new(fixture.store.clone());
    let child = NewChildCategory::new("Science 2024", "SCI2024");

    let (_, first) = preparer
        .prepare(fixture.source.id, fixture.archive.id, Some(&child))
        .await?;
    let (source, second) = preparer
        .prepare(fixture.source.id, fixture.archive.id, Some(&child))
        .await?;

    assert_eq!(source, fixture.source);
    assert_eq!(first, second);
    assert_eq!(second.parent_id, fixture.archive.id);
    assert_eq!(second.tag, "SCI2024");
    assert_eq!(fixture.store.categories().len(), 3);

    Ok(())
}

#[tokio::test]
async fn child_name_and_tag_are_trimmed() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let preparer = CategoryPreparer::new(fixture.store.clone());
    let child = NewChildCategory::new("  Science 2024 ", " SCI2024\t");

    let (_, destination) = preparer
        .prepare(fixture.source.id, fixture.archive.id, Some(&child))
        .await?;

    assert_eq!(destination.name, "Science 2024");
    assert_eq!(destination.tag, "SCI2024");

    Ok(())
}

#[tokio::test]
async fn tag_held_under_another_parent_is_a_conflict() {
    let fixture = Fixture::new();
    let elsewhere = fixture
        .store
        .add_category("Elsewhere", "ELSE", CategoryId::TOP);
    fixture
        .store
        .add_category("Science 2024", "SCI2024", elsewhere.id);
    fixture.add_source_course("SCI_101", "Science 101");

    let error = assert_err!(fixture.cloner().submit_clone(&fixture.request()).await);

    assert_matches!(
        error,
        CloneError::TagConflict { ref tag, requested_parent, .. }
            if tag == "SCI2024" && requested_parent == fixture.archive.id
    );
    assert_eq!(fixture.store.categories().len(), 4);
    assert!(fixture.queue.is_empty());
}

#[tokio::test]
async fn missing_categories_are_not_found() {
    let fixture = Fixture::new();
    let preparer = CategoryPreparer::new(fixture.store.clone());

    let error = assert_err!(preparer.prepare(CategoryId(99), fixture.archive.id, None).await);
    assert_matches!(error, CloneError::CategoryNotFound(CategoryId(99)));

    let error = assert_err!(preparer.prepare(fixture.source.id, CategoryId(98), None).await);
    assert_matches!(error, CloneError::CategoryNotFound(CategoryId(98)));
}

#[tokio::test]
async fn source_without_tag_is_rejected_before_anything_is_created() {
    let fixture = Fixture::new();
    let untagged = fixture.store.add_category("Misc", "", CategoryId::TOP);
    let mut request = fixture.request();
    request.source = untagged.id;

    let error = assert_err!(fixture.cloner().submit_clone(&request).await);

    assert_matches!(error, CloneError::MissingTag(id) if id == untagged.id);
    assert_eq!(fixture.store.categories().len(), 3);
}

#[tokio::test]
async fn blank_child_tag_never_matches_an_untagged_category() {
    let fixture = Fixture::new();
    fixture.store.add_category("Misc", "", fixture.archive.id);
    let preparer = CategoryPreparer::new(fixture.store.clone());
    let child = NewChildCategory::new("New", "   ");

    let error = assert_err!(
        preparer
            .prepare(fixture.source.id, fixture.archive.id, Some(&child))
            .await
    );

    assert_matches!(error, CloneError::MissingTag(id) if id == fixture.archive.id);
    assert_eq!(fixture.store.categories().len(), 3);
}

#[tokio::test]
async fn without_child_the_destination_is_used_directly() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    fixture.add_source_course("SCI_101", "Science 101");
    let mut request = fixture.request();
    request.new_child = None;

    let submitted = fixture.cloner().submit_clone(&request).await?;

    assert_eq!(submitted.destination, fixture.archive);
    assert_eq!(fixture.store.categories().len(), 2);

    Ok(())
}

#[test]
fn invalid_requests_report_every_field() {
    let request = CloneRequest {
        source: CategoryId(1),
        destination: CategoryId::TOP,
        new_child: None,
        start_date: date(2024, 6, 30),
        end_date: date(2024, 6, 30),
    };

    let errors = assert_err!(request.validate());

    assert_snapshot!(errors.to_string(), @"destination: Destination cannot be Top when not adding a new category; end_date: The end date must occur after the start date");
}

#[test]
fn top_destination_is_valid_with_a_new_child() {
    let request = CloneRequest {
        source: CategoryId(1),
        destination: CategoryId::TOP,
        new_child: Some(NewChildCategory::new("Science 2024", "SCI2024")),
        start_date: date(2024, 2, 1),
        end_date: date(2024, 6, 30),
    };

    assert_ok!(request.validate());
}

#[tokio::test]
async fn blank_child_fields_fail_validation() {
    let fixture = Fixture::new();
    let mut request = fixture.request();
    request.new_child = Some(NewChildCategory::new("Science 2024", "  "));

    let error = assert_err!(fixture.cloner().submit_clone(&request).await);

    let CloneError::InvalidRequest(errors) = error else {
        panic!("expected a validation error, got {error:?}");
    };
    assert_some!(errors.get("new_child.tag"));
    assert_none!(errors.get("new_child.name"));
    assert_eq!(fixture.store.categories().len(), 2);
}

#[tokio::test]
async fn top_level_child_category_is_created_under_top() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    fixture.add_source_course("SCI_101", "Science 101");
    let mut request = fixture.request();
    request.destination = CategoryId::TOP;

    let submitted = fixture.cloner().submit_clone(&request).await?;

    assert_eq!(submitted.destination.parent_id, CategoryId::TOP);
    let outcomes = fixture.drain().await;
    assert!(outcomes[0].is_success());

    Ok(())
}

#[tokio::test]
async fn successful_clone_renames_redates_and_logs() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let course_id = fixture.add_source_course("SCI_101", "Science SCI 101");

    let submitted = fixture.cloner().submit_clone(&fixture.request()).await?;
    let outcomes = fixture.drain().await;

    let clone = match &outcomes[..] {
        [CloneOutcome::Succeeded { clone, .. }] => clone.clone(),
        other => panic!("unexpected outcomes: {other:?}"),
    };
    assert_eq!(clone.short_identifier, "SCI_SCI2024");
    assert_eq!(clone.full_name, "Science SCI2024 101");
    assert_eq!(clone.category_id, submitted.destination.id);
    assert_eq!(clone.start_date, date(2024, 2, 1));
    assert_eq!(clone.end_date, date(2024, 6, 30));

    let stored = fixture.store.courses();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1], clone);

    let requests = fixture.store.duplicate_requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].options, DuplicateOptions::CONTENT_ONLY);

    let records = fixture
        .log
        .query(&OutcomeQuery::batch(submitted.batch.id.clone()))
        .await?;
    assert_eq!(records.len(), 1);
    assert!(records[0].success);
    assert_eq!(records[0].course_id, course_id);
    assert_snapshot!(records[0].message, @"Cloned 3/SCI_101 into 5/SCI_SCI2024;");
    assert!(!records.iter().any(|r| !r.success && r.course_id == course_id));

    Ok(())
}

#[tokio::test]
async fn existing_destination_course_is_skipped_and_untouched() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let destination = fixture.store.add_category("Science 2024", "SCI2024", fixture.archive.id);
    let course_id = fixture.add_source_course("SCI_101", "Science 101");
    let existing = fixture.store.add_course(
        "SCI_SCI2024",
        "Hand made",
        destination.id,
        date(2020, 1, 1),
        date(2020, 2, 1),
    );

    fixture.cloner().submit_clone(&fixture.request()).await?;
    let outcomes = fixture.drain().await;

    assert_matches!(
        &outcomes[..],
        [CloneOutcome::SkippedDuplicate { short_identifier }] if short_identifier == "SCI_SCI2024"
    );
    let records = fixture.log.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(
        records[0].message,
        format!(
            "Cloning of course {course_id} failed with message Course with shortname SCI_SCI2024 already exists in the category. Skipped."
        )
    );
    assert_eq!(fixture.store.courses().len(), 2);
    assert_eq!(
        assert_some!(fixture.store.courses().into_iter().find(|c| c.id == existing.id)),
        existing
    );
    assert!(fixture.store.duplicate_requests().is_empty());

    Ok(())
}

#[tokio::test]
async fn resubmitting_a_finished_batch_creates_nothing() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    fixture.add_source_course("SCI_101", "Science 101");
    fixture.add_source_course("MATH_201", "Maths 201");

    fixture.cloner().submit_clone(&fixture.request()).await?;
    let first = fixture.drain().await;
    assert!(first.iter().all(CloneOutcome::is_success));
    let courses = fixture.store.courses();

    let again = fixture.cloner().submit_clone(&fixture.request()).await?;
    let second = fixture.drain().await;

    assert_eq!(second.len(), 2);
    assert!(
        second
            .iter()
            .all(|outcome| matches!(outcome, CloneOutcome::SkippedDuplicate { .. }))
    );
    assert_eq!(fixture.store.courses(), courses);
    let records = fixture.log.query(&OutcomeQuery::batch(again.batch.id)).await?;
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| !record.success));

    Ok(())
}

#[tokio::test]
async fn failures_stay_local_to_their_job() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let broken = fixture.add_source_course("SCI_101", "Science 101");
    fixture.add_source_course("MATH_201", "Maths 201");
    fixture.store.fail_duplication_of(broken, "disk full");

    fixture.cloner().submit_clone(&fixture.request()).await?;
    let outcomes = fixture.drain().await;

    assert_matches!(&outcomes[0], CloneOutcome::Failed { reason } if reason == "disk full");
    assert!(outcomes[1].is_success());
    assert!(fixture.queue.is_empty());

    let records = fixture.log.records();
    assert_eq!(records.len(), 2);
    assert_snapshot!(records[0].message, @"Cloning of course 3 failed with message disk full");
    assert!(records[1].success);

    Ok(())
}

#[tokio::test]
async fn deleted_source_course_is_recorded_as_failed() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let batch = CloneBatch {
        id: BatchId::generate(),
        source_category_id: fixture.source.id,
        destination_category_id: fixture.archive.id,
        start_date: date(2024, 2, 1),
        end_date: date(2024, 6, 30),
    };

    let outcome = fixture.executor().run(&batch.job_for(CourseId(42))).await;

    assert_matches!(outcome, CloneOutcome::Failed { ref reason } if reason == "course 42 not found");
    let records = fixture.log.records();
    assert_eq!(records.len(), 1);
    assert!(!records[0].success);
    assert_eq!(records[0].batch_id, batch.id);

    Ok(())
}

#[tokio::test]
async fn status_follows_queue_until_the_clone_exists() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    fixture.add_source_course("SCI_101", "Science 101");
    fixture.add_source_course("MATH_201", "Maths 201");
    let now = Utc::now();

    let submitted = fixture.cloner().submit_clone(&fixture.request()).await?;
    let destination = submitted.destination.id;
    let reconciler = fixture.reconciler();

    let statuses = reconciler
        .category_status(fixture.source.id, destination, now)
        .await?;
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0].destination_short_identifier, "SCI_SCI2024");
    assert_eq!(statuses[1].destination_short_identifier, "MATH_SCI2024");
    assert_matches!(&statuses[0].state, CloneState::NotStarted { .. });
    assert_matches!(&statuses[1].state, CloneState::NotStarted { .. });

    // A worker claims the first job but has not finished it.
    let claimed = assert_some!(fixture.queue.claim_next(Duration::from_secs(600)).await?);
    let later = now + chrono::Duration::minutes(5);
    let statuses = reconciler
        .category_status(fixture.source.id, destination, later)
        .await?;
    let started_at = assert_some!(claimed.started_at);
    assert_eq!(
        statuses[0].state,
        CloneState::Running {
            started_at,
            elapsed: later - started_at,
        }
    );

    // The clone exists although its job is still in the queue.
    fixture.executor().run(&claimed.job).await;
    let statuses = reconciler
        .category_status(fixture.source.id, destination, later)
        .await?;
    assert_eq!(statuses[0].state, CloneState::Succeeded);
    assert_eq!(
        assert_some!(statuses[0].destination.as_ref()).short_identifier,
        "SCI_SCI2024"
    );
    assert_none!(statuses[1].destination.as_ref());

    Ok(())
}

#[tokio::test]
async fn status_is_unknown_without_clone_or_job() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    let broken = fixture.add_source_course("SCI_101", "Science 101");
    fixture.store.fail_duplication_of(broken, "disk full");

    let submitted = fixture.cloner().submit_clone(&fixture.request()).await?;
    fixture.drain().await;

    let statuses = fixture
        .reconciler()
        .category_status(fixture.source.id, submitted.destination.id, Utc::now())
        .await?;

    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0].state, CloneState::Unknown);

    Ok(())
}

#[tokio::test]
async fn outcome_history_filters_by_batch_and_time() -> anyhow::Result<()> {
    let fixture = Fixture::new();
    fixture.add_source_course("SCI_101", "Science 101");
    fixture.add_source_course("MATH_201", "Maths 201");

    let first = fixture.cloner().submit_clone(&fixture.request()).await?;
    fixture.drain().await;
    let second = fixture.cloner().submit_clone(&fixture.request()).await?;
    fixture.drain().await;

    let log = &fixture.log;
    assert_eq!(log.query(&OutcomeQuery::default()).await?.len(), 4);
    assert_eq!(log.query(&OutcomeQuery::batch(first.batch.id.clone())).await?.len(), 2);
    let latest = log
        .query(&OutcomeQuery::batch(second.batch.id.clone()).limit(1))
        .await?;
    assert_eq!(latest.len(), 1);
    assert_eq!(latest[0].batch_id, second.batch.id);

    let recent = log
        .query(&OutcomeQuery::within(chrono::Duration::days(1), Utc::now()))
        .await?;
    assert_eq!(recent.len(), 4);
    let stale = log
        .query(&OutcomeQuery::within(
            chrono::Duration::days(1),
            Utc::now() - chrono::Duration::days(7),
        ))
        .await?;
    assert!(stale.is_empty());

    Ok(())
}
