#![allow(async_fn_in_trait)]

use crate::error::StoreResult;
use crate::models::Student;
use sqlx::SqlitePool;

const STUDENT_COLUMNS: &str = r#"
    id, tag_id, name,
    allow_campus, allow_hostel, allow_library, allow_medical, allow_attendance,
    hostel_id, room, created_at, updated_at
"#;

/// Repository trait for Student entity operations
///
/// # Implementation Note
///
/// This trait uses native async trait methods (Edition 2024 feature),
/// eliminating the need for the async-trait crate while maintaining
/// full async/await support in trait methods.
pub trait StudentRepository: Send + Sync {
    /// Find a student by exact tag id match
    async fn find_by_tag(&self, tag_id: &str) -> StoreResult<Option<Student>>;

    /// Find a student whose stored tag matches any of the given candidate
    /// strings, honoring candidate order when several match
    async fn find_by_tag_candidates(&self, candidates: &[String]) -> StoreResult<Option<Student>>;

    /// Find a student by primary key
    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Student>>;

    /// Create a new student, returning the assigned id
    async fn create(&self, student: &Student) -> StoreResult<i64>;

    /// Update an existing student's enrollment and permission fields
    async fn update(&self, student: &Student) -> StoreResult<()>;

    /// Delete a student; their events cascade-delete with them.
    /// Returns `true` if a row was removed
    async fn delete(&self, id: i64) -> StoreResult<bool>;

    /// List all students assigned to the given hostel
    async fn find_by_hostel(&self, hostel_id: &str) -> StoreResult<Vec<Student>>;
}

/// SQLite implementation of StudentRepository
pub struct SqliteStudentRepository {
    pool: SqlitePool,
}

impl SqliteStudentRepository {
    /// Create a new SQLite student repository
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl StudentRepository for SqliteStudentRepository {
    async fn find_by_tag(&self, tag_id: &str) -> StoreResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE tag_id = ?"
        ))
        .bind(tag_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(student)
    }

    async fn find_by_tag_candidates(&self, candidates: &[String]) -> StoreResult<Option<Student>> {
        if candidates.is_empty() {
            return Ok(None);
        }

        let placeholders = vec!["?"; candidates.len()].join(", ");
        let sql = format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE tag_id IN ({placeholders})"
        );

        let mut query = sqlx::query_as::<_, Student>(&sql);
        for candidate in candidates {
            query = query.bind(candidate);
        }
        let matches = query.fetch_all(&self.pool).await?;

        // IN () returns matches in storage order; pick by candidate priority
        // so distinct students on case-variant tags resolve deterministically
        for candidate in candidates {
            if let Some(student) = matches.iter().find(|s| &s.tag_id == candidate) {
                return Ok(Some(student.clone()));
            }
        }

        Ok(None)
    }

    async fn find_by_id(&self, id: i64) -> StoreResult<Option<Student>> {
        let student = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(student)
    }

    async fn create(&self, student: &Student) -> StoreResult<i64> {
        let result = sqlx::query(
            r#"
            INSERT INTO students (
                tag_id, name,
                allow_campus, allow_hostel, allow_library, allow_medical, allow_attendance,
                hostel_id, room
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&student.tag_id)
        .bind(&student.name)
        .bind(student.allow_campus)
        .bind(student.allow_hostel)
        .bind(student.allow_library)
        .bind(student.allow_medical)
        .bind(student.allow_attendance)
        .bind(&student.hostel_id)
        .bind(&student.room)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    async fn update(&self, student: &Student) -> StoreResult<()> {
        sqlx::query(
            r#"
            UPDATE students SET
                tag_id = ?, name = ?,
                allow_campus = ?, allow_hostel = ?, allow_library = ?,
                allow_medical = ?, allow_attendance = ?,
                hostel_id = ?, room = ?,
                updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
            WHERE id = ?
            "#,
        )
        .bind(&student.tag_id)
        .bind(&student.name)
        .bind(student.allow_campus)
        .bind(student.allow_hostel)
        .bind(student.allow_library)
        .bind(student.allow_medical)
        .bind(student.allow_attendance)
        .bind(&student.hostel_id)
        .bind(&student.room)
        .bind(student.id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM students WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_by_hostel(&self, hostel_id: &str) -> StoreResult<Vec<Student>> {
        let students = sqlx::query_as::<_, Student>(&format!(
            "SELECT {STUDENT_COLUMNS} FROM students WHERE hostel_id = ? ORDER BY name"
        ))
        .bind(hostel_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(students)
    }
}
