use std::fmt;
use std::path::Path;

use serde::Serialize;

use crate::error::{Result, VtopError};

pub const COURSE_COLUMN: &str = "Course Title";
pub const ATTENDED_COLUMN: &str = "Attended Classes";
pub const TOTAL_COLUMN: &str = "Total Classes";

/// One course where attendance is below the possible total.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MissedCourse {
    pub course: String,
    pub attended: u64,
    pub total: u64,
}

/// Aggregate attendance statistics for one combined delimited file.
/// Computed and returned; never persisted by this component.
#[derive(Debug, Clone, Serialize)]
pub struct AttendanceSummary {
    pub attended_sum: u64,
    pub total_sum: u64,
    pub overall_percent: f64,
    pub missed: Vec<MissedCourse>,
}

impl fmt::Display for AttendanceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Overall Percentage: {:.2}%", self.overall_percent)?;
        writeln!(f, "Total Attended Classes: {}", self.attended_sum)?;
        writeln!(f, "Total Classes: {}", self.total_sum)?;
        if self.missed.is_empty() {
            write!(f, "No classes missed in any course.")?;
        } else {
            write!(f, "Courses with missed classes:")?;
            for course in &self.missed {
                write!(
                    f,
                    "\n  {} ({}/{})",
                    course.course, course.attended, course.total
                )?;
            }
        }
        Ok(())
    }
}

/// Aggregates a combined attendance file.
///
/// The source table carries a trailing summary row that must not enter the
/// arithmetic. It is identified by content, not position: any row whose
/// attended/total cells do not both parse as integers is skipped.
pub fn summarize(path: &Path) -> Result<AttendanceSummary> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let column = |name: &str| {
        headers
            .iter()
            .position(|h| h == name)
            .ok_or_else(|| VtopError::Aggregation(format!("missing column {name:?}")))
    };
    let attended_idx = column(ATTENDED_COLUMN)?;
    let total_idx = column(TOTAL_COLUMN)?;
    let course_idx = headers.iter().position(|h| h == COURSE_COLUMN);

    let mut attended_sum = 0u64;
    let mut total_sum = 0u64;
    let mut missed = Vec::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        let attended = record
            .get(attended_idx)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let total = record
            .get(total_idx)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let (Some(attended), Some(total)) = (attended, total) else {
            tracing::debug!(row = index + 2, "skipping non-numeric summary row");
            continue;
        };

        attended_sum += attended;
        total_sum += total;
        if attended < total {
            let course = course_idx
                .and_then(|i| record.get(i))
                .unwrap_or_default()
                .to_string();
            missed.push(MissedCourse {
                course,
                attended,
                total,
            });
        }
    }

    if total_sum == 0 {
        return Err(VtopError::Aggregation(
            "total class count is zero".to_string(),
        ));
    }

    Ok(AttendanceSummary {
        attended_sum,
        total_sum,
        overall_percent: 100.0 * attended_sum as f64 / total_sum as f64,
        missed,
    })
}
