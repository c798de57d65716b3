//! Records stored in the database and the inputs that create them

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Student {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub photo_url: String,
}

/// A single attendance-taking session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Roll {
    pub id: i64,
    pub name: String,
    pub completed_at: DateTime<Utc>,
}

/// Attendance status of one student on one roll
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StudentRollState {
    pub id: i64,
    pub roll_id: i64,
    pub student_id: i64,
    pub state: String,
}

/// How a student's incident count is compared with a group's threshold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Comparison {
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = ">")]
    GreaterThan,
}

impl Comparison {
    pub fn as_str(self) -> &'static str {
        match self {
            Comparison::LessThan => "<",
            Comparison::GreaterThan => ">",
        }
    }

    pub fn holds(self, count: i64, threshold: i64) -> bool {
        match self {
            Comparison::LessThan => count < threshold,
            Comparison::GreaterThan => count > threshold,
        }
    }
}

impl fmt::Display for Comparison {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparison {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Comparison::LessThan),
            ">" => Ok(Comparison::GreaterThan),
            other => Err(AppError::InvalidInput(format!(
                "unsupported comparison operator {:?}, expected \"<\" or \">\"",
                other
            ))),
        }
    }
}

/// Qualifying attendance states parsed from a group's `roll_states` column
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RollStates(Vec<String>);

impl RollStates {
    /// Split the stored comma-separated list.
    ///
    /// A stored value of one character or less counts as no states at all.
    /// Segments are trimmed and empty segments dropped, so `"late, absent,"`
    /// is `{late, absent}`.
    pub fn parse(raw: &str) -> Self {
        if raw.chars().count() <= 1 {
            return Self::default();
        }
        let states = raw
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self(states)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

/// A saved filter selecting students by incident count over a trailing window
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Group {
    pub id: i64,
    pub name: String,
    pub number_of_weeks: i64,
    pub roll_states: String,
    pub incidents: i64,
    pub ltmt: Comparison,
    pub run_at: Option<DateTime<Utc>>,
    pub student_count: i64,
}

impl Group {
    /// Apply only the fields present in the patch
    pub fn apply_update(&mut self, input: UpdateGroupInput) {
        if let Some(name) = input.name {
            self.name = name;
        }
        if let Some(incidents) = input.incidents {
            self.incidents = incidents;
        }
        if let Some(number_of_weeks) = input.number_of_weeks {
            self.number_of_weeks = number_of_weeks;
        }
        if let Some(ltmt) = input.ltmt {
            self.ltmt = ltmt;
        }
        if let Some(roll_states) = input.roll_states {
            self.roll_states = roll_states;
        }
    }

    pub fn qualifying_states(&self) -> RollStates {
        RollStates::parse(&self.roll_states)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroupInput {
    pub name: String,
    pub number_of_weeks: i64,
    pub incidents: i64,
    pub ltmt: Comparison,
    pub roll_states: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateGroupInput {
    pub id: i64,
    pub name: Option<String>,
    pub incidents: Option<i64>,
    pub number_of_weeks: Option<i64>,
    pub ltmt: Option<Comparison>,
    pub roll_states: Option<String>,
}

/// Derived membership row written by the filter job
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupStudent {
    pub id: i64,
    pub group_id: i64,
    pub student_id: i64,
    pub incident_count: i64,
}

/// Student fields returned by the group membership listing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMember {
    pub id: i64,
    pub first_name: String,
    pub last_name: String,
    pub full_name: String,
}

impl GroupMember {
    pub fn new(id: i64, first_name: String, last_name: String) -> Self {
        let full_name = format!("{} {}", first_name, last_name);
        Self {
            id,
            first_name,
            last_name,
            full_name,
        }
    }
}
