//! Bulk LMS account workers.

use std::sync::Arc;

use super::JobRegistry;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{JobId, LmsOperation, Target};

/// Process every target of a job, recording per-target failures without stopping.
pub async fn run_lms_job(
    repo: Arc<Repository>,
    jobs: JobRegistry,
    job_id: JobId,
    operation: LmsOperation,
    targets: Vec<Target>,
) {
    tracing::info!(job_id = %job_id, %operation, targets = targets.len(), "Job started");
    let total = targets.len();

    for (index, target) in targets.iter().enumerate() {
        let outcome = match operation {
            LmsOperation::Create => provision(&repo, target).await,
            LmsOperation::Delete => remove(&repo, target).await,
        };

        if let Err(message) = outcome {
            jobs.push_error(&job_id, message).await;
        }

        jobs.set_progress(&job_id, progress_for(index, total)).await;
    }

    jobs.finish(&job_id).await;
}

async fn provision(repo: &Repository, target: &Target) -> Result<(), String> {
    let full_name = target.full_name();
    let username = generate_username(&full_name, &target.email);

    repo.create_lms_account(&username, &full_name, &target.email)
        .await
        .map_err(|e| format!("Could not create LMS user - {}", e.message()))
}

async fn remove(repo: &Repository, target: &Target) -> Result<(), String> {
    repo.delete_lms_account(&target.email)
        .await
        .map_err(|e| match e {
            AppError::NotFound(_) => format!("Could not find LMS user with email {}", target.email),
            other => format!(
                "Could not delete LMS user with email {} - {}",
                target.email,
                other.message()
            ),
        })
}

/// Percentage of targets handled before `index`.
fn progress_for(index: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (index * 100 / total).min(100) as u8
}

/// Derive an LMS username from a person's name and email.
///
/// Lower-cased name without spaces, or the email local part when the name is blank,
/// suffixed with the email length in bytes.
pub fn generate_username(full_name: &str, email: &str) -> String {
    let mut username: String = full_name
        .to_lowercase()
        .chars()
        .filter(|c| *c != ' ')
        .collect();

    if username.is_empty() {
        if let Some((local, _)) = email.rsplit_once('@') {
            username = local.to_string();
        }
    }

    if username.is_empty() {
        return username;
    }

    format!("{}{}", username, email.len())
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::init_database;

    fn target(email: &str) -> Target {
        Target {
            id: 1,
            first_name: "Ann".to_string(),
            last_name: "Lee".to_string(),
            email: email.to_string(),
            position: String::new(),
            is_lms_user: false,
        }
    }

    #[test]
    fn test_generate_username_from_name() {
        assert_eq!(
            generate_username("Jane Van Doe", "jane@example.com"),
            "janevandoe16"
        );
    }

    #[test]
    fn test_generate_username_from_email() {
        assert_eq!(generate_username("", "j.doe@example.com"), "j.doe17");
        assert_eq!(generate_username("", "not-an-email"), "");
    }

    #[test]
    fn test_generate_username_counts_email_bytes() {
        assert_eq!(generate_username("", "josé@example.com"), "josé17");
        assert_eq!(
            generate_username("José Ortiz", "josé@example.com"),
            "joséortiz17"
        );
    }

    #[tokio::test]
    async fn test_remove_missing_account() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        let repo = Repository::new(pool);

        let err = remove(&repo, &target("a@example.com")).await.unwrap_err();
        assert_eq!(err, "Could not find LMS user with email a@example.com");
    }

    #[tokio::test]
    async fn test_remove_reports_database_failure() {
        let dir = TempDir::new().unwrap();
        let pool = init_database(&dir.path().join("test.sqlite")).await.unwrap();
        let repo = Repository::new(pool.clone());
        pool.close().await;

        let err = remove(&repo, &target("a@example.com")).await.unwrap_err();
        assert!(
            err.starts_with("Could not delete LMS user with email a@example.com - Database error"),
            "{}",
            err
        );
    }

    #[test]
    fn test_progress_for() {
        assert_eq!(progress_for(0, 4), 0);
        assert_eq!(progress_for(1, 4), 25);
        assert_eq!(progress_for(2, 3), 66);
        assert_eq!(progress_for(0, 0), 100);
    }
}
