//! Demo data inserted on startup

use chrono::{NaiveDate, NaiveTime};
use tracing::info;

use super::Database;
use crate::error::Result;

const DEMO_STUDENTS: &[(&str, &str)] = &[
    ("David", "Bowie"),
    ("Robert", "Plant"),
    ("James", "Bond"),
    ("Bob", "Marley"),
    ("Paul", "McCartney"),
    ("George", "Harrison"),
    ("Elton", "John"),
    ("Simon", "Joyner"),
    ("John", "Denver"),
    ("Neil", "Diamond"),
    ("Donna", "Summer"),
    ("Aretha", "Franklin"),
    ("Diana", "Ross"),
    ("Kate", "Bush"),
    ("Boz", "Scaggs"),
];

/// Students that get an "absent" mark on their mock roll
const MOCK_ABSENT_STUDENTS: usize = 9;

impl Database {
    /// Insert the demo students into an empty student table. Returns how many were added.
    pub async fn seed_demo_students(&self) -> Result<usize> {
        let existing = self.count_students().await?;
        info!("We have {} students", existing);
        if existing > 0 {
            return Ok(0);
        }

        for (first_name, last_name) in DEMO_STUDENTS {
            self.insert_student(first_name, last_name, "").await?;
        }
        info!("Seeded {} demo students", DEMO_STUDENTS.len());
        Ok(DEMO_STUDENTS.len())
    }

    /// One roll per student completed on `date`, with the first few students marked absent.
    /// Skipped once any roll exists. Returns how many rolls were added.
    pub async fn seed_mock_attendance(&self, date: NaiveDate) -> Result<usize> {
        if self.count_rolls().await? > 0 {
            return Ok(0);
        }

        let completed_at = date.and_time(NaiveTime::MIN).and_utc();
        let students = self.list_students().await?;
        for (i, student) in students.iter().enumerate() {
            let roll = self.insert_roll(&student.first_name, completed_at).await?;
            if i < MOCK_ABSENT_STUDENTS {
                self.insert_roll_state(roll.id, student.id, "absent").await?;
            }
        }

        info!("Inserted roll data for students on date: {}", date);
        Ok(students.len())
    }
}
