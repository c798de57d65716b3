//! Database schema definitions
//!
//! Timestamps are Unix milliseconds.

pub const CREATE_STUDENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS student (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    first_name TEXT NOT NULL,
    last_name TEXT NOT NULL,
    photo_url TEXT NOT NULL DEFAULT ''
)
"#;

pub const CREATE_ROLL_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS roll (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    completed_at BIGINT NOT NULL
)
"#;

pub const CREATE_STUDENT_ROLL_STATE_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS student_roll_state (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    roll_id INTEGER NOT NULL REFERENCES roll(id),
    student_id INTEGER NOT NULL REFERENCES student(id),
    state TEXT NOT NULL
)
"#;

pub const CREATE_GROUP_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS "group" (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    number_of_weeks INTEGER NOT NULL,
    roll_states TEXT NOT NULL,
    incidents INTEGER NOT NULL,
    ltmt TEXT NOT NULL,
    run_at BIGINT,
    student_count INTEGER NOT NULL DEFAULT 0
)
"#;

// Derived from student_roll_state by the filter job, never edited directly
pub const CREATE_GROUP_STUDENT_TABLE: &str = r#"
CREATE TABLE IF NOT EXISTS group_student (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    group_id INTEGER NOT NULL,
    student_id INTEGER NOT NULL REFERENCES student(id),
    incident_count INTEGER NOT NULL
)
"#;

// For the trailing-window filter on roll completion
pub const CREATE_INDEX_ROLL_COMPLETED_AT: &str =
    "CREATE INDEX IF NOT EXISTS idx_roll_completed_at ON roll(completed_at)";

// For the per-student state aggregation
pub const CREATE_INDEX_STATE_ROLL: &str =
    "CREATE INDEX IF NOT EXISTS idx_student_roll_state_roll ON student_roll_state(roll_id, state, student_id)";

// For membership lookups by group
pub const CREATE_INDEX_GROUP_STUDENT_GROUP: &str =
    "CREATE INDEX IF NOT EXISTS idx_group_student_group ON group_student(group_id)";

/// Statements applied in order on every start
pub const MIGRATIONS: &[&str] = &[
    CREATE_STUDENT_TABLE,
    CREATE_ROLL_TABLE,
    CREATE_STUDENT_ROLL_STATE_TABLE,
    CREATE_GROUP_TABLE,
    CREATE_GROUP_STUDENT_TABLE,
    CREATE_INDEX_ROLL_COMPLETED_AT,
    CREATE_INDEX_STATE_ROLL,
    CREATE_INDEX_GROUP_STUDENT_GROUP,
];
