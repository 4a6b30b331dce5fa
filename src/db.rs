use std::collections::BTreeMap;

use anyhow::Context;
use sha2::{Digest, Sha256};
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::models::{FacultyAccount, Scope, Submission, SubjectAllocation};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

pub async fn fetch_submissions(pool: &PgPool, scope: Scope) -> anyhow::Result<Vec<Submission>> {
    let column = match scope {
        Scope::Faculty(_) => "faculty_id",
        Scope::Department(_) => "department_id",
        Scope::College(_) => "college_id",
    };
    let query = format!(
        "SELECT id, faculty_id, department_id, college_id, rating, category_ratings, \
         comment_text, submitted_at \
         FROM feedback.submissions \
         WHERE {column} = $1 \
         ORDER BY submitted_at"
    );

    let rows = sqlx::query(&query)
        .bind(scope.id())
        .fetch_all(pool)
        .await
        .with_context(|| {
            format!(
                "failed to load submissions for {} {}",
                scope.label(),
                scope.id()
            )
        })?;

    let mut submissions = Vec::with_capacity(rows.len());
    for row in rows {
        let id: Uuid = row.get("id");
        let raw_categories: Json<Value> = row
            .try_get("category_ratings")
            .with_context(|| format!("failed to read category ratings of submission {id}"))?;
        submissions.push(Submission {
            id,
            faculty_id: row.get("faculty_id"),
            department_id: row.get("department_id"),
            college_id: row.get("college_id"),
            rating: row.get("rating"),
            category_ratings: integer_category_ratings(id, raw_categories.0),
            comment_text: row.get("comment_text"),
            submitted_at: row.get("submitted_at"),
        });
    }

    Ok(submissions)
}

/// Keeps the integer category ratings of a stored submission. Anything else
/// is dropped with a warning so one bad row cannot sink a whole stats run.
pub fn integer_category_ratings(submission_id: Uuid, raw: Value) -> BTreeMap<String, i32> {
    let entries = match raw {
        Value::Object(entries) => entries,
        Value::Null => return BTreeMap::new(),
        other => {
            warn!(%submission_id, value = %other, "ignoring non-object category ratings");
            return BTreeMap::new();
        }
    };

    entries
        .into_iter()
        .filter_map(|(category, value)| {
            match value.as_i64().and_then(|v| i32::try_from(v).ok()) {
                Some(rating) => Some((category, rating)),
                None => {
                    warn!(
                        %submission_id,
                        category = %category,
                        value = %value,
                        "dropping non-integer category rating"
                    );
                    None
                }
            }
        })
        .collect()
}

/// Emails from `emails` that already belong to a stored faculty account.
pub async fn existing_emails(pool: &PgPool, emails: &[String]) -> anyhow::Result<Vec<String>> {
    let rows = sqlx::query(
        "SELECT email FROM feedback.faculty WHERE lower(email) = ANY($1) ORDER BY email",
    )
    .bind(emails)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|row| row.get("email")).collect())
}

pub fn hash_password(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b":");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

/// Stores a validated faculty batch. Either every row lands or none do.
pub async fn insert_faculty_batch(
    pool: &PgPool,
    college_id: Uuid,
    department_id: Uuid,
    accounts: &[FacultyAccount],
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    for (i, account) in accounts.iter().enumerate() {
        let salt = Uuid::new_v4().simple().to_string();

        sqlx::query(
            r#"
            INSERT INTO feedback.faculty
            (id, college_id, department_id, full_name, email, password_salt, password_hash,
             role, designation, specialization, highest_qualification, experience, phone)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(college_id)
        .bind(department_id)
        .bind(&account.name)
        .bind(&account.email)
        .bind(&salt)
        .bind(hash_password(&salt, &account.password))
        .bind(&account.role)
        .bind(&account.designation)
        .bind(&account.specialization)
        .bind(&account.highest_qualification)
        .bind(&account.experience)
        .bind(&account.phone)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert faculty item {}", i + 1))?;
    }

    tx.commit().await.context("failed to commit faculty batch")?;
    info!(%college_id, %department_id, rows = accounts.len(), "faculty batch stored");
    Ok(accounts.len())
}

/// Stores a validated allocation batch in a single transaction.
pub async fn insert_allocation_batch(
    pool: &PgPool,
    college_id: Uuid,
    allocations: &[SubjectAllocation],
) -> anyhow::Result<usize> {
    let mut tx = pool.begin().await?;

    for (i, allocation) in allocations.iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO feedback.subject_allocations
            (id, college_id, faculty_name, program, year, department, subject_name,
             subject_code, subject_type, specialization)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(college_id)
        .bind(&allocation.full_name)
        .bind(&allocation.program)
        .bind(&allocation.year)
        .bind(&allocation.department)
        .bind(&allocation.subject_name)
        .bind(&allocation.subject_code)
        .bind(&allocation.subject_type)
        .bind(&allocation.specialization)
        .execute(&mut *tx)
        .await
        .with_context(|| format!("failed to insert allocation item {}", i + 1))?;
    }

    tx.commit().await.context("failed to commit allocation batch")?;
    info!(%college_id, rows = allocations.len(), "allocation batch stored");
    Ok(allocations.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_ratings_keep_only_integers() {
        let id = Uuid::new_v4();
        let raw = serde_json::json!({
            "Clarity": 4,
            "Punctuality": 4.5,
            "Engagement": "5",
            "Fairness": null,
            "Preparation": 9
        });
        let ratings = integer_category_ratings(id, raw);
        assert_eq!(
            ratings,
            BTreeMap::from([("Clarity".to_string(), 4), ("Preparation".to_string(), 9)])
        );
    }

    #[test]
    fn category_ratings_tolerate_wrong_shapes() {
        let id = Uuid::new_v4();
        assert!(integer_category_ratings(id, serde_json::json!([4, 5])).is_empty());
        assert!(integer_category_ratings(id, Value::Null).is_empty());
        assert!(integer_category_ratings(id, serde_json::json!({})).is_empty());
    }

    #[test]
    fn password_hash_depends_on_salt() {
        let a = hash_password("salt-a", "hunter2");
        let b = hash_password("salt-b", "hunter2");
        assert_eq!(a.len(), 64);
        assert_ne!(a, b);
        assert_eq!(a, hash_password("salt-a", "hunter2"));
        assert!(!a.contains("hunter2"));
    }
}
