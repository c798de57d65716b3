//! Database module

mod filters;
mod models;
mod schema;
mod seed;

use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous},
    Pool, Sqlite,
};
use std::{str::FromStr, sync::Arc};
use tokio::sync::Mutex;

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};

pub use models::{
    Comparison, CreateGroupInput, Group, GroupMember, GroupStudent, Roll, RollStates, Student,
    StudentRollState, UpdateGroupInput,
};

type GroupRow = (i64, String, i64, String, i64, String, Option<i64>, i64);

const SELECT_GROUP: &str = r#"
    SELECT id, name, number_of_weeks, roll_states, incidents, ltmt, run_at, student_count
    FROM "group"
"#;

fn timestamp(ms: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(ms).unwrap_or_default()
}

/// Decode a stored comparison operator. A foreign value is a server-side data fault.
fn stored_ltmt(id: i64, raw: &str) -> Result<Comparison> {
    raw.parse::<Comparison>().map_err(|e| match e {
        AppError::InvalidInput(msg) => AppError::StoredData(format!("group {}: {}", id, msg)),
        other => other,
    })
}

fn build_group(row: GroupRow, ltmt: Comparison) -> Group {
    let (id, name, number_of_weeks, roll_states, incidents, _, run_at, student_count) = row;
    Group {
        id,
        name,
        number_of_weeks,
        roll_states,
        incidents,
        ltmt,
        run_at: run_at.map(timestamp),
        student_count,
    }
}

fn group_from_row(row: GroupRow) -> Result<Group> {
    let ltmt = stored_ltmt(row.0, &row.5)?;
    Ok(build_group(row, ltmt))
}

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    /// Serializes filter runs so two rebuilds never interleave
    filter_lock: Arc<Mutex<()>>,
}

impl Database {
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        let options = Self::connect_options(&format!("sqlite:{}", config.url))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;
        Ok(Self::from_pool(pool))
    }

    /// Pragmas applied to every pooled connection.
    /// WAL lets readers keep the previous membership while a rebuild commits.
    fn connect_options(url: &str) -> Result<SqliteConnectOptions> {
        Ok(SqliteConnectOptions::from_str(url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal))
    }

    fn from_pool(pool: Pool<Sqlite>) -> Self {
        Self {
            pool,
            filter_lock: Arc::new(Mutex::new(())),
        }
    }

    /// Fresh migrated database living in a single in-memory connection
    #[cfg(test)]
    pub async fn in_memory() -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(Self::connect_options("sqlite::memory:")?)
            .await?;
        let db = Self::from_pool(pool);
        db.run_migrations().await?;
        Ok(db)
    }

    pub async fn run_migrations(&self) -> Result<()> {
        for statement in schema::MIGRATIONS {
            sqlx::query(*statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    // --- students ---

    pub async fn insert_student(
        &self,
        first_name: &str,
        last_name: &str,
        photo_url: &str,
    ) -> Result<Student> {
        let result = sqlx::query(
            "INSERT INTO student (first_name, last_name, photo_url) VALUES (?, ?, ?)",
        )
        .bind(first_name)
        .bind(last_name)
        .bind(photo_url)
        .execute(&self.pool)
        .await?;

        Ok(Student {
            id: result.last_insert_rowid(),
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            photo_url: photo_url.to_string(),
        })
    }

    pub async fn list_students(&self) -> Result<Vec<Student>> {
        let rows: Vec<(i64, String, String, String)> = sqlx::query_as(
            "SELECT id, first_name, last_name, photo_url FROM student ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, first_name, last_name, photo_url)| Student {
                id,
                first_name,
                last_name,
                photo_url,
            })
            .collect())
    }

    pub async fn count_students(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM student")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    // --- attendance ---

    pub async fn insert_roll(&self, name: &str, completed_at: DateTime<Utc>) -> Result<Roll> {
        let result = sqlx::query("INSERT INTO roll (name, completed_at) VALUES (?, ?)")
            .bind(name)
            .bind(completed_at.timestamp_millis())
            .execute(&self.pool)
            .await?;

        Ok(Roll {
            id: result.last_insert_rowid(),
            name: name.to_string(),
            completed_at: timestamp(completed_at.timestamp_millis()),
        })
    }

    pub async fn count_rolls(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM roll")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    pub async fn insert_roll_state(
        &self,
        roll_id: i64,
        student_id: i64,
        state: &str,
    ) -> Result<StudentRollState> {
        let result = sqlx::query(
            "INSERT INTO student_roll_state (roll_id, student_id, state) VALUES (?, ?, ?)",
        )
        .bind(roll_id)
        .bind(student_id)
        .bind(state)
        .execute(&self.pool)
        .await?;

        Ok(StudentRollState {
            id: result.last_insert_rowid(),
            roll_id,
            student_id,
            state: state.to_string(),
        })
    }

    // --- groups ---

    async fn list_group_rows(&self) -> Result<Vec<GroupRow>> {
        let rows = sqlx::query_as(&format!("{} ORDER BY id", SELECT_GROUP))
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn group_row(&self, id: i64) -> Result<Option<GroupRow>> {
        let row = sqlx::query_as(&format!("{} WHERE id = ?", SELECT_GROUP))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row)
    }

    pub async fn list_groups(&self) -> Result<Vec<Group>> {
        self.list_group_rows()
            .await?
            .into_iter()
            .map(group_from_row)
            .collect()
    }

    pub async fn get_group(&self, id: i64) -> Result<Option<Group>> {
        self.group_row(id).await?.map(group_from_row).transpose()
    }

    pub async fn insert_group(&self, input: CreateGroupInput) -> Result<Group> {
        let result = sqlx::query(
            r#"
            INSERT INTO "group" (name, number_of_weeks, roll_states, incidents, ltmt, run_at, student_count)
            VALUES (?, ?, ?, ?, ?, NULL, 0)
            "#,
        )
        .bind(&input.name)
        .bind(input.number_of_weeks)
        .bind(&input.roll_states)
        .bind(input.incidents)
        .bind(input.ltmt.as_str())
        .execute(&self.pool)
        .await?;

        Ok(Group {
            id: result.last_insert_rowid(),
            name: input.name,
            number_of_weeks: input.number_of_weeks,
            roll_states: input.roll_states,
            incidents: input.incidents,
            ltmt: input.ltmt,
            run_at: None,
            student_count: 0,
        })
    }

    /// Load, patch and persist a group.
    /// A patch carrying `ltmt` also repairs a stored operator that no longer decodes.
    pub async fn update_group(&self, input: UpdateGroupInput) -> Result<Group> {
        let id = input.id;
        let row = self
            .group_row(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {}", id)))?;
        let ltmt = match input.ltmt {
            Some(ltmt) => ltmt,
            None => stored_ltmt(id, &row.5)?,
        };
        let mut group = build_group(row, ltmt);
        group.apply_update(input);

        sqlx::query(
            r#"
            UPDATE "group"
            SET name = ?, number_of_weeks = ?, roll_states = ?, incidents = ?, ltmt = ?
            WHERE id = ?
            "#,
        )
        .bind(&group.name)
        .bind(group.number_of_weeks)
        .bind(&group.roll_states)
        .bind(group.incidents)
        .bind(group.ltmt.as_str())
        .bind(group.id)
        .execute(&self.pool)
        .await?;

        Ok(group)
    }

    /// Delete a group and its derived membership.
    ///
    /// Returns the removed group, or `None` when its stored row no longer
    /// decodes. Waits for any running filter job so it cannot re-insert
    /// membership for the removed group.
    pub async fn delete_group(&self, id: i64) -> Result<Option<Group>> {
        let _guard = self.filter_lock.lock().await;

        let row = self
            .group_row(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("group {}", id)))?;
        let group = match group_from_row(row) {
            Ok(group) => Some(group),
            Err(e) => {
                tracing::warn!("Removing undecodable {}", e);
                None
            }
        };

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM group_student WHERE group_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(r#"DELETE FROM "group" WHERE id = ?"#)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        Ok(group)
    }

    // --- membership ---

    pub async fn group_members(&self, group_id: i64) -> Result<Vec<GroupMember>> {
        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            r#"
            SELECT student.id, student.first_name, student.last_name
            FROM group_student
            INNER JOIN student ON student.id = group_student.student_id
            WHERE group_student.group_id = ?
            ORDER BY group_student.id
            "#,
        )
        .bind(group_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, first_name, last_name)| GroupMember::new(id, first_name, last_name))
            .collect())
    }

    #[cfg(test)]
    pub async fn list_group_students(&self) -> Result<Vec<GroupStudent>> {
        let rows: Vec<(i64, i64, i64, i64)> = sqlx::query_as(
            "SELECT id, group_id, student_id, incident_count FROM group_student ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(id, group_id, student_id, incident_count)| GroupStudent {
                id,
                group_id,
                student_id,
                incident_count,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn absentees() -> CreateGroupInput {
        CreateGroupInput {
            name: "Absentees".into(),
            number_of_weeks: 2,
            incidents: 1,
            ltmt: Comparison::GreaterThan,
            roll_states: "absent".into(),
        }
    }

    #[tokio::test]
    async fn create_group_starts_with_no_students() {
        let db = Database::in_memory().await.unwrap();
        let created = db.insert_group(absentees()).await.unwrap();
        assert_eq!(created.student_count, 0);
        assert!(created.run_at.is_none());

        let loaded = db.get_group(created.id).await.unwrap().unwrap();
        assert_eq!(loaded, created);
        assert_eq!(db.list_groups().await.unwrap(), vec![created]);
    }

    #[tokio::test]
    async fn partial_update_keeps_other_fields() {
        let db = Database::in_memory().await.unwrap();
        let created = db.insert_group(absentees()).await.unwrap();

        let updated = db
            .update_group(UpdateGroupInput {
                id: created.id,
                incidents: Some(5),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(updated.incidents, 5);

        let loaded = db.get_group(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.incidents, 5);
        assert_eq!(loaded.name, created.name);
        assert_eq!(loaded.number_of_weeks, created.number_of_weeks);
        assert_eq!(loaded.ltmt, created.ltmt);
        assert_eq!(loaded.roll_states, created.roll_states);
    }

    #[tokio::test]
    async fn update_and_delete_report_missing_group() {
        let db = Database::in_memory().await.unwrap();
        let update = db
            .update_group(UpdateGroupInput {
                id: 42,
                ..Default::default()
            })
            .await;
        assert!(matches!(update, Err(AppError::NotFound(_))));
        assert!(matches!(db.delete_group(42).await, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_returns_removed_group() {
        let db = Database::in_memory().await.unwrap();
        let created = db.insert_group(absentees()).await.unwrap();
        let removed = db.delete_group(created.id).await.unwrap();
        assert_eq!(removed, Some(created.clone()));
        assert!(db.get_group(created.id).await.unwrap().is_none());
    }

    async fn insert_legacy_group(db: &Database, ltmt: &str) -> i64 {
        sqlx::query(
            r#"INSERT INTO "group" (name, number_of_weeks, roll_states, incidents, ltmt, student_count)
               VALUES ('legacy', 1, 'absent', 1, ?, 0)"#,
        )
        .bind(ltmt)
        .execute(&db.pool)
        .await
        .unwrap()
        .last_insert_rowid()
    }

    #[tokio::test]
    async fn stored_operator_outside_enum_is_a_stored_data_fault() {
        let db = Database::in_memory().await.unwrap();
        insert_legacy_group(&db, ">=").await;

        match db.list_groups().await {
            Err(AppError::StoredData(msg)) => assert!(msg.contains(">=")),
            other => panic!("expected stored data error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn undecodable_group_can_be_repaired_or_removed() {
        let db = Database::in_memory().await.unwrap();
        let repaired = insert_legacy_group(&db, ">=").await;
        let removed = insert_legacy_group(&db, "=").await;

        let rename_only = db
            .update_group(UpdateGroupInput {
                id: repaired,
                name: Some("renamed".into()),
                ..Default::default()
            })
            .await;
        assert!(matches!(rename_only, Err(AppError::StoredData(_))));

        let fixed = db
            .update_group(UpdateGroupInput {
                id: repaired,
                ltmt: Some(Comparison::LessThan),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(fixed.ltmt, Comparison::LessThan);
        assert_eq!(fixed.name, "legacy");

        assert_eq!(db.delete_group(removed).await.unwrap(), None);
        let remaining = db.list_groups().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, repaired);
        assert_eq!(remaining[0].ltmt, Comparison::LessThan);
    }

    #[tokio::test]
    async fn members_come_back_with_full_names() {
        let db = Database::in_memory().await.unwrap();
        let bowie = db.insert_student("David", "Bowie", "").await.unwrap();
        sqlx::query("INSERT INTO group_student (group_id, student_id, incident_count) VALUES (7, ?, 2)")
            .bind(bowie.id)
            .execute(&db.pool)
            .await
            .unwrap();

        let members = db.group_members(7).await.unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, bowie.id);
        assert_eq!(members[0].full_name, "David Bowie");
        assert!(db.group_members(8).await.unwrap().is_empty());
    }
}
