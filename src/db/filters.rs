//! Group filter job
//!
//! Every run recomputes the full `group_student` table. Matching students are
//! collected for all groups first; the wipe, the inserts and the group
//! metadata updates then commit in one transaction, so readers see either the
//! previous membership or the new one.

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, warn};

use super::{group_from_row, Database, Group, RollStates};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Incidents {
    student_id: i64,
    count: i64,
}

struct GroupOutcome {
    group_id: i64,
    members: Vec<Incidents>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FilterRunSummary {
    pub groups: usize,
    pub memberships: usize,
    pub ran_at: DateTime<Utc>,
}

/// Start of a trailing window of whole weeks ending at `now`.
///
/// Saturates at the earliest representable instant for spans too long to
/// subtract (and at the latest one for huge negative spans), so any stored
/// week count still yields a window.
pub fn window_start(now: DateTime<Utc>, weeks: i64) -> DateTime<Utc> {
    match TimeDelta::try_weeks(weeks).and_then(|span| now.checked_sub_signed(span)) {
        Some(start) => start,
        None if weeks < 0 => DateTime::<Utc>::MAX_UTC,
        None => DateTime::<Utc>::MIN_UTC,
    }
}

fn matching(counts: Vec<Incidents>, group: &Group) -> Vec<Incidents> {
    counts
        .into_iter()
        .filter(|c| group.ltmt.holds(c.count, group.incidents))
        .collect()
}

/// Replace the whole membership table and stamp each evaluated group.
/// Nothing becomes visible to readers until the caller commits.
async fn write_outcomes(
    conn: &mut SqliteConnection,
    outcomes: &[GroupOutcome],
    ran_at: DateTime<Utc>,
) -> Result<usize> {
    let ran_at = ran_at.timestamp_millis();
    let mut memberships = 0;

    sqlx::query("DELETE FROM group_student")
        .execute(&mut *conn)
        .await?;

    for outcome in outcomes {
        for member in &outcome.members {
            sqlx::query(
                "INSERT INTO group_student (group_id, student_id, incident_count) VALUES (?, ?, ?)",
            )
            .bind(outcome.group_id)
            .bind(member.student_id)
            .bind(member.count)
            .execute(&mut *conn)
            .await?;
        }
        memberships += outcome.members.len();

        sqlx::query(r#"UPDATE "group" SET run_at = ?, student_count = ? WHERE id = ?"#)
            .bind(ran_at)
            .bind(outcome.members.len() as i64)
            .bind(outcome.group_id)
            .execute(&mut *conn)
            .await?;
    }

    Ok(memberships)
}

impl Database {
    /// Qualifying-state counts per student over rolls completed since `since`
    async fn incident_counts(
        &self,
        states: &RollStates,
        since: DateTime<Utc>,
    ) -> Result<Vec<Incidents>> {
        if states.is_empty() {
            return Ok(Vec::new());
        }

        let mut query = QueryBuilder::<Sqlite>::new(
            r#"
            SELECT student_roll_state.student_id, COUNT(*)
            FROM student_roll_state
            INNER JOIN roll ON roll.id = student_roll_state.roll_id
            WHERE roll.completed_at >= "#,
        );
        query.push_bind(since.timestamp_millis());
        query.push(" AND student_roll_state.state IN (");
        let mut list = query.separated(", ");
        for state in states.iter() {
            list.push_bind(state.to_string());
        }
        list.push_unseparated(")");
        query.push(" GROUP BY student_roll_state.student_id ORDER BY student_roll_state.student_id");

        let rows: Vec<(i64, i64)> = query.build_query_as().fetch_all(&self.pool).await?;
        Ok(rows
            .into_iter()
            .map(|(student_id, count)| Incidents { student_id, count })
            .collect())
    }

    async fn evaluate_group(&self, group: &Group, now: DateTime<Utc>) -> Result<GroupOutcome> {
        let since = window_start(now, group.number_of_weeks);
        let counts = self.incident_counts(&group.qualifying_states(), since).await?;
        let members = matching(counts, group);
        debug!(
            "Group {} ({} {} incidents since {}): {} students",
            group.id,
            group.ltmt,
            group.incidents,
            since,
            members.len()
        );
        Ok(GroupOutcome {
            group_id: group.id,
            members,
        })
    }

    /// Candidate membership of every decodable group as of `now`.
    /// Groups whose stored row no longer decodes are skipped and logged.
    async fn evaluate_groups(&self, now: DateTime<Utc>) -> Result<Vec<GroupOutcome>> {
        let mut outcomes = Vec::new();
        for row in self.list_group_rows().await? {
            let group = match group_from_row(row) {
                Ok(group) => group,
                Err(e) => {
                    warn!("Skipping group in filter run: {}", e);
                    continue;
                }
            };
            outcomes.push(self.evaluate_group(&group, now).await?);
        }
        Ok(outcomes)
    }

    /// Recompute the membership of every group as of `now`
    pub async fn run_group_filters(&self, now: DateTime<Utc>) -> Result<FilterRunSummary> {
        let _guard = self.filter_lock.lock().await;

        let outcomes = self.evaluate_groups(now).await?;

        let mut tx = self.pool.begin().await?;
        let memberships = write_outcomes(&mut *tx, &outcomes, now).await?;
        tx.commit().await?;

        debug!(
            "Membership rebuilt: {} groups, {} rows",
            outcomes.len(),
            memberships
        );

        Ok(FilterRunSummary {
            groups: outcomes.len(),
            memberships,
            ran_at: now,
        })
    }
}
