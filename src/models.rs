use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A single anonymous feedback submission. Never mutated once stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Submission {
    pub id: Uuid,
    pub faculty_id: Uuid,
    pub department_id: Uuid,
    pub college_id: Uuid,
    pub rating: i32,
    pub category_ratings: BTreeMap<String, i32>,
    pub comment_text: Option<String>,
    pub submitted_at: DateTime<Utc>,
}

/// Aggregation boundary for feedback statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum Scope {
    Faculty(Uuid),
    Department(Uuid),
    College(Uuid),
}

impl Scope {
    pub fn id(&self) -> Uuid {
        match self {
            Scope::Faculty(id) | Scope::Department(id) | Scope::College(id) => *id,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Scope::Faculty(_) => "faculty",
            Scope::Department(_) => "department",
            Scope::College(_) => "college",
        }
    }

    pub fn contains(&self, submission: &Submission) -> bool {
        match self {
            Scope::Faculty(id) => submission.faculty_id == *id,
            Scope::Department(id) => submission.department_id == *id,
            Scope::College(id) => submission.college_id == *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryScore {
    pub average: f64,
    pub count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyBucket {
    pub submissions: usize,
    pub average_rating: f64,
}

/// Trailing-window averages. A value of 0.0 means the window had no data.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrendWindows {
    pub last_7_days: f64,
    pub last_30_days: f64,
    pub last_90_days: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FeedbackStats {
    pub scope: Option<Scope>,
    pub average_rating: f64,
    pub total_submissions: usize,
    pub rating_distribution: BTreeMap<i32, usize>,
    pub category_scores: BTreeMap<String, CategoryScore>,
    pub monthly: BTreeMap<String, MonthlyBucket>,
    pub trend: TrendWindows,
    pub excluded_submissions: usize,
    pub last_updated: DateTime<Utc>,
}

/// Faculty account row from a validated bulk upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyAccount {
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: String,
    pub designation: Option<String>,
    pub specialization: Option<String>,
    pub highest_qualification: Option<String>,
    pub experience: Option<String>,
    pub phone: Option<String>,
}

/// Subject allocation row from a validated bulk upload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAllocation {
    pub full_name: String,
    pub program: String,
    pub year: String,
    pub department: String,
    pub subject_name: String,
    pub subject_code: String,
    pub subject_type: String,
    pub specialization: Option<String>,
}
