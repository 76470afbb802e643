#![allow(async_fn_in_trait)]

use crate::error::StoreResult;
use crate::models::{AccessEvent, NewAccessEvent};
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tessera_core::FacilityContext;

const EVENT_COLUMNS: &str = r#"
    id, student_id, tag_id, facility, instance,
    kind, granted, deny_reason, created_at
"#;

/// Repository trait for the append-only access event log.
///
/// All list queries return newest-first: `created_at DESC` with `id DESC`
/// as the tiebreaker for events landing in the same millisecond.
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
pub trait AccessEventRepository: Send + Sync {
    /// Append a new event, returning its server-assigned id once the write
    /// is durable
    async fn create(&self, event: &NewAccessEvent) -> StoreResult<i64>;

    /// Fetch one event by id
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<AccessEvent>>;

    /// The most recent granted event for a student in a facility context.
    ///
    /// This is the toggle-rule lookup: its kind decides the direction of
    /// the next grant. Instance must match exactly, so each hostel keeps
    /// its own toggle.
    async fn find_last_granted(
        &self,
        student_id: i64,
        context: &FacilityContext,
    ) -> StoreResult<Option<AccessEvent>>;

    /// Recent events for a student, optionally narrowed to one facility
    /// context
    async fn find_recent_for_student(
        &self,
        student_id: i64,
        context: Option<&FacilityContext>,
        limit: i64,
    ) -> StoreResult<Vec<AccessEvent>>;

    /// Recent events for a raw tag id, resolved or not
    async fn find_recent_for_tag(&self, tag_id: &str, limit: i64) -> StoreResult<Vec<AccessEvent>>;

    /// Recent denied events across all facilities (security monitoring)
    async fn find_recent_denied(&self, limit: i64) -> StoreResult<Vec<AccessEvent>>;

    /// Count denied attempts for a tag since a point in time
    async fn count_denied_for_tag(
        &self,
        tag_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64>;

    /// Bulk-delete events older than the cutoff (retention). Returns the
    /// number of rows removed
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64>;
}

/// SQLite implementation of AccessEventRepository
pub struct SqliteAccessEventRepository {
    pool: SqlitePool,
}

impl SqliteAccessEventRepository {
    /// Create a new SQLite access event repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AccessEventRepository for SqliteAccessEventRepository {
    async fn create(&self, event: &NewAccessEvent) -> StoreResult<i64> {
        // created_at is deliberately absent: the schema default assigns it
        let result = sqlx::query(
            r#"
            INSERT INTO access_events (
                student_id, tag_id, facility, instance,
                kind, granted, deny_reason
            )
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.student_id)
        .bind(&event.tag_id)
        .bind(&event.facility)
        .bind(&event.instance)
        .bind(&event.kind)
        .bind(event.granted)
        .bind(&event.deny_reason)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<AccessEvent>> {
        let event = sqlx::query_as::<_, AccessEvent>(&format!(
            "SELECT {EVENT_COLUMNS} FROM access_events WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn find_last_granted(
        &self,
        student_id: i64,
        context: &FacilityContext,
    ) -> StoreResult<Option<AccessEvent>> {
        let event = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM access_events
            WHERE student_id = ? AND facility = ? AND instance IS ? AND granted = 1
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#
        ))
        .bind(student_id)
        .bind(context.facility.as_str())
        .bind(&context.instance)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    async fn find_recent_for_student(
        &self,
        student_id: i64,
        context: Option<&FacilityContext>,
        limit: i64,
    ) -> StoreResult<Vec<AccessEvent>> {
        let events = match context {
            Some(context) => {
                sqlx::query_as::<_, AccessEvent>(&format!(
                    r#"
                    SELECT {EVENT_COLUMNS}
                    FROM access_events
                    WHERE student_id = ? AND facility = ? AND instance IS ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#
                ))
                .bind(student_id)
                .bind(context.facility.as_str())
                .bind(&context.instance)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as::<_, AccessEvent>(&format!(
                    r#"
                    SELECT {EVENT_COLUMNS}
                    FROM access_events
                    WHERE student_id = ?
                    ORDER BY created_at DESC, id DESC
                    LIMIT ?
                    "#
                ))
                .bind(student_id)
                .bind(limit)
                .fetch_all(&self.pool)
                .await?
            }
        };

        Ok(events)
    }

    async fn find_recent_for_tag(&self, tag_id: &str, limit: i64) -> StoreResult<Vec<AccessEvent>> {
        let events = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM access_events
            WHERE tag_id = ?
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(tag_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn find_recent_denied(&self, limit: i64) -> StoreResult<Vec<AccessEvent>> {
        let events = sqlx::query_as::<_, AccessEvent>(&format!(
            r#"
            SELECT {EVENT_COLUMNS}
            FROM access_events
            WHERE granted = 0
            ORDER BY created_at DESC, id DESC
            LIMIT ?
            "#
        ))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }

    async fn count_denied_for_tag(
        &self,
        tag_id: &str,
        since: DateTime<Utc>,
    ) -> StoreResult<i64> {
        // datetime() normalizes the stored and bound timestamp formats
        // before comparison
        let result: (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM access_events
            WHERE tag_id = ? AND granted = 0 AND datetime(created_at) >= datetime(?)
            "#,
        )
        .bind(tag_id)
        .bind(since)
        .fetch_one(&self.pool)
        .await?;

        Ok(result.0)
    }

    async fn purge_before(&self, cutoff: DateTime<Utc>) -> StoreResult<u64> {
        let result =
            sqlx::query("DELETE FROM access_events WHERE datetime(created_at) < datetime(?)")
                .bind(cutoff)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Database;
    use crate::models::Student;
    use crate::repositories::student::{SqliteStudentRepository, StudentRepository};
    use chrono::Duration;
    use tessera_core::EventKind;

    async fn setup_test_db() -> Database {
        Database::in_memory().await.unwrap()
    }

    async fn create_test_student(db: &Database, tag_id: &str) -> i64 {
        let student = Student {
            id: 0,
            tag_id: tag_id.to_string(),
            name: "Test Student".to_string(),
            allow_campus: true,
            allow_hostel: true,
            allow_library: true,
            allow_medical: true,
            allow_attendance: true,
            hostel_id: Some("BH-2".to_string()),
            room: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let repo = SqliteStudentRepository::new(db.pool().clone());
        repo.create(&student).await.unwrap()
    }

    fn event(
        student_id: i64,
        tag_id: &str,
        context: &FacilityContext,
        kind: EventKind,
        granted: bool,
    ) -> NewAccessEvent {
        let reason = (!granted).then(|| "no permission".to_string());
        NewAccessEvent::new(Some(student_id), tag_id, context, kind, granted, reason)
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_timestamp() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());

        let id = repo
            .create(&event(
                student_id,
                "04AB12CD",
                &FacilityContext::campus(),
                EventKind::Entry,
                true,
            ))
            .await
            .unwrap();
        assert!(id > 0);

        let stored = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.student_id, Some(student_id));
        assert!(stored.granted);
        assert!(stored.created_at <= Utc::now() + Duration::seconds(5));
    }

    #[tokio::test]
    async fn test_unresolved_event_has_no_student() {
        let db = setup_test_db().await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());

        let id = repo
            .create(&NewAccessEvent::new(
                None,
                "GHOST123",
                &FacilityContext::campus(),
                EventKind::Entry,
                false,
                Some("subject not found".to_string()),
            ))
            .await
            .unwrap();

        let stored = repo.find_by_id(id).await.unwrap().unwrap();
        assert_eq!(stored.student_id, None);
        assert_eq!(stored.tag_id, "GHOST123");
        assert_eq!(stored.deny_reason.as_deref(), Some("subject not found"));
    }

    #[tokio::test]
    async fn test_last_granted_ignores_denials() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());
        let campus = FacilityContext::campus();

        repo.create(&event(student_id, "04AB12CD", &campus, EventKind::Entry, true))
            .await
            .unwrap();
        repo.create(&event(student_id, "04AB12CD", &campus, EventKind::Entry, false))
            .await
            .unwrap();

        let last = repo.find_last_granted(student_id, &campus).await.unwrap().unwrap();
        assert!(last.granted);
        assert_eq!(last.kind().unwrap(), EventKind::Entry);
    }

    #[tokio::test]
    async fn test_last_granted_same_millisecond_uses_id_tiebreak() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());
        let campus = FacilityContext::campus();

        // Inserted back-to-back; may share a created_at millisecond
        repo.create(&event(student_id, "04AB12CD", &campus, EventKind::Entry, true))
            .await
            .unwrap();
        let exit_id = repo
            .create(&event(student_id, "04AB12CD", &campus, EventKind::Exit, true))
            .await
            .unwrap();

        let last = repo.find_last_granted(student_id, &campus).await.unwrap().unwrap();
        assert_eq!(last.id, exit_id);
        assert_eq!(last.kind().unwrap(), EventKind::Exit);
    }

    #[tokio::test]
    async fn test_last_granted_is_per_instance() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());

        let bh2 = FacilityContext::hostel("BH-2");
        let bh3 = FacilityContext::hostel("BH-3");
        repo.create(&event(student_id, "04AB12CD", &bh2, EventKind::Entry, true))
            .await
            .unwrap();

        assert!(repo.find_last_granted(student_id, &bh2).await.unwrap().is_some());
        assert!(repo.find_last_granted(student_id, &bh3).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recent_for_student_newest_first_with_limit() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());
        let campus = FacilityContext::campus();

        for kind in [EventKind::Entry, EventKind::Exit, EventKind::Entry] {
            repo.create(&event(student_id, "04AB12CD", &campus, kind, true))
                .await
                .unwrap();
        }

        let events = repo
            .find_recent_for_student(student_id, None, 2)
            .await
            .unwrap();
        assert_eq!(events.len(), 2);
        assert!(events[0].id > events[1].id);
        assert_eq!(events[0].kind().unwrap(), EventKind::Entry);
    }

    #[tokio::test]
    async fn test_recent_for_student_context_filter() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());

        repo.create(&event(
            student_id,
            "04AB12CD",
            &FacilityContext::campus(),
            EventKind::Entry,
            true,
        ))
        .await
        .unwrap();
        repo.create(&event(
            student_id,
            "04AB12CD",
            &FacilityContext::hostel("BH-2"),
            EventKind::Entry,
            true,
        ))
        .await
        .unwrap();

        let hostel_only = repo
            .find_recent_for_student(student_id, Some(&FacilityContext::hostel("BH-2")), 10)
            .await
            .unwrap();
        assert_eq!(hostel_only.len(), 1);
        assert_eq!(hostel_only[0].facility, "hostel");
    }

    #[tokio::test]
    async fn test_recent_denied_and_count() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());
        let campus = FacilityContext::campus();

        repo.create(&event(student_id, "04AB12CD", &campus, EventKind::Entry, false))
            .await
            .unwrap();
        repo.create(&event(student_id, "04AB12CD", &campus, EventKind::Entry, true))
            .await
            .unwrap();

        let denied = repo.find_recent_denied(10).await.unwrap();
        assert_eq!(denied.len(), 1);
        assert!(!denied[0].granted);

        let since = Utc::now() - Duration::hours(1);
        let count = repo.count_denied_for_tag("04AB12CD", since).await.unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_purge_before_cutoff() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let repo = SqliteAccessEventRepository::new(db.pool().clone());
        let campus = FacilityContext::campus();

        repo.create(&event(student_id, "04AB12CD", &campus, EventKind::Entry, true))
            .await
            .unwrap();

        let removed = repo.purge_before(Utc::now() - Duration::days(1)).await.unwrap();
        assert_eq!(removed, 0);

        let removed = repo.purge_before(Utc::now() + Duration::days(1)).await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_student_delete_cascades_events() {
        let db = setup_test_db().await;
        let student_id = create_test_student(&db, "04AB12CD").await;
        let events = SqliteAccessEventRepository::new(db.pool().clone());
        let students = SqliteStudentRepository::new(db.pool().clone());

        events
            .create(&event(
                student_id,
                "04AB12CD",
                &FacilityContext::campus(),
                EventKind::Entry,
                true,
            ))
            .await
            .unwrap();

        assert!(students.delete(student_id).await.unwrap());
        let remaining = events.find_recent_for_tag("04AB12CD", 10).await.unwrap();
        assert!(remaining.is_empty());
    }
}
