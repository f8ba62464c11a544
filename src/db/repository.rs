//! Database repository for group and LMS account operations.
//!
//! Multi-row changes to a group run inside a single transaction.

use std::collections::HashMap;

use chrono::Utc;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};

use crate::errors::AppError;
use crate::models::{normalize_email, Group, GroupId, GroupRequest, Target, TargetInput};

/// Target columns plus a derived flag telling whether an LMS account exists for the email.
const TARGET_SELECT: &str = "SELECT t.id, t.group_id, t.first_name, t.last_name, t.email, t.position, \
     EXISTS (SELECT 1 FROM lms_accounts a WHERE a.email = t.email) AS is_lms_user \
     FROM targets t";

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== GROUP OPERATIONS ====================

    /// List the groups of one owner with their targets.
    pub async fn list_groups(&self, owner: &str) -> Result<Vec<Group>, AppError> {
        let rows = sqlx::query(
            "SELECT id, owner, name, modified_date FROM target_groups WHERE owner = ? ORDER BY name, id",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let target_rows = sqlx::query(&format!(
            "{} JOIN target_groups g ON g.id = t.group_id WHERE g.owner = ? ORDER BY t.id",
            TARGET_SELECT
        ))
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let mut targets_by_group: HashMap<GroupId, Vec<Target>> = HashMap::new();
        for row in &target_rows {
            let group_id: i64 = row.get("group_id");
            targets_by_group
                .entry(group_id)
                .or_default()
                .push(target_from_row(row));
        }

        Ok(rows
            .iter()
            .map(|row| {
                let id: i64 = row.get("id");
                Group {
                    id,
                    owner: row.get("owner"),
                    name: row.get("name"),
                    modified_date: row.get("modified_date"),
                    targets: targets_by_group.remove(&id).unwrap_or_default(),
                }
            })
            .collect())
    }

    /// Get a group by ID.
    pub async fn get_group(&self, id: GroupId) -> Result<Option<Group>, AppError> {
        let row = sqlx::query("SELECT id, owner, name, modified_date FROM target_groups WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let targets = sqlx::query(&format!("{} WHERE t.group_id = ? ORDER BY t.id", TARGET_SELECT))
            .bind(id)
            .fetch_all(&self.pool)
            .await?;

        Ok(Some(Group {
            id: row.get("id"),
            owner: row.get("owner"),
            name: row.get("name"),
            modified_date: row.get("modified_date"),
            targets: targets.iter().map(target_from_row).collect(),
        }))
    }

    /// Create a new group with its targets.
    pub async fn create_group(&self, owner: &str, request: &GroupRequest) -> Result<Group, AppError> {
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await?;

        let result =
            sqlx::query("INSERT INTO target_groups (owner, name, modified_date) VALUES (?, ?, ?)")
                .bind(owner)
                .bind(request.name.trim())
                .bind(&now)
                .execute(&mut *tx)
                .await?;
        let id = result.last_insert_rowid();

        for target in request.deduplicated_targets() {
            upsert_target(&mut tx, id, &target).await?;
        }

        tx.commit().await?;
        tracing::info!("Created group {} ({}) for {}", id, request.name.trim(), owner);

        self.get_group(id)
            .await?
            .ok_or_else(|| AppError::Internal(format!("Group {} vanished after insert", id)))
    }

    /// Replace a group's name and targets.
    ///
    /// Targets are matched by email: matching rows are updated in place and keep their ids,
    /// rows missing from the request are removed, new emails are inserted.
    pub async fn update_group(&self, id: GroupId, request: &GroupRequest) -> Result<Group, AppError> {
        let now = Utc::now().to_rfc3339();
        let incoming = request.deduplicated_targets();
        let mut tx = self.pool.begin().await?;

        let result = sqlx::query("UPDATE target_groups SET name = ?, modified_date = ? WHERE id = ?")
            .bind(request.name.trim())
            .bind(&now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Group {} not found", id)));
        }

        let existing = sqlx::query("SELECT id, email FROM targets WHERE group_id = ?")
            .bind(id)
            .fetch_all(&mut *tx)
            .await?;

        for row in &existing {
            let target_id: i64 = row.get("id");
            let email = normalize_email(row.get("email"));
            if !incoming.iter().any(|t| t.email == email) {
                sqlx::query("DELETE FROM targets WHERE id = ?")
                    .bind(target_id)
                    .execute(&mut *tx)
                    .await?;
            }
        }

        for target in &incoming {
            upsert_target(&mut tx, id, target).await?;
        }

        tx.commit().await?;

        self.get_group(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Group {} not found", id)))
    }

    /// Delete a group and its targets.
    pub async fn delete_group(&self, id: GroupId) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM target_groups WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Group {} not found", id)));
        }

        Ok(())
    }

    // ==================== LMS ACCOUNT OPERATIONS ====================

    /// Create an LMS account for an email. Fails if one already exists.
    pub async fn create_lms_account(
        &self,
        username: &str,
        full_name: &str,
        email: &str,
    ) -> Result<(), AppError> {
        let now = Utc::now().to_rfc3339();

        let result = sqlx::query(
            "INSERT INTO lms_accounts (email, username, full_name, created_at) VALUES (?, ?, ?, ?) ON CONFLICT(email) DO NOTHING",
        )
        .bind(normalize_email(email))
        .bind(username)
        .bind(full_name)
        .bind(&now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Validation(format!(
                "LMS user {} already exists",
                email
            )));
        }

        Ok(())
    }

    /// Remove the LMS account of an email.
    pub async fn delete_lms_account(&self, email: &str) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM lms_accounts WHERE email = ?")
            .bind(normalize_email(email))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("LMS user {} not found", email)));
        }

        Ok(())
    }
}

/// Insert a target or update the existing row with the same normalized email.
async fn upsert_target(
    tx: &mut Transaction<'_, Sqlite>,
    group_id: GroupId,
    target: &TargetInput,
) -> Result<(), AppError> {
    sqlx::query(
        "INSERT INTO targets (group_id, first_name, last_name, email, position) VALUES (?, ?, ?, ?, ?) \
         ON CONFLICT(group_id, email) DO UPDATE SET \
         first_name = excluded.first_name, last_name = excluded.last_name, \
         email = excluded.email, position = excluded.position",
    )
    .bind(group_id)
    .bind(target.first_name.trim())
    .bind(target.last_name.trim())
    .bind(&target.email)
    .bind(target.position.trim())
    .execute(&mut **tx)
    .await?;

    Ok(())
}

fn target_from_row(row: &sqlx::sqlite::SqliteRow) -> Target {
    let is_lms_user: i64 = row.get("is_lms_user");

    Target {
        id: row.get("id"),
        first_name: row.get("first_name"),
        last_name: row.get("last_name"),
        email: row.get("email"),
        position: row.get("position"),
        is_lms_user: is_lms_user != 0,
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;
    use crate::db::init_database;

    async fn repo() -> (Repository, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let pool = init_database(&temp_dir.path().join("test.sqlite"))
            .await
            .unwrap();
        (Repository::new(pool), temp_dir)
    }

    fn target(email: &str, first_name: &str) -> TargetInput {
        TargetInput {
            first_name: first_name.to_string(),
            last_name: "Doe".to_string(),
            email: email.to_string(),
            position: "Analyst".to_string(),
        }
    }

    #[tokio::test]
    async fn test_update_group_keeps_matching_target_ids() {
        let (repo, _dir) = repo().await;

        let group = repo
            .create_group("alice", &GroupRequest {
                name: "Finance".to_string(),
                targets: vec![target("a@example.com", "Ann"), target("b@example.com", "Ben")],
            })
            .await
            .unwrap();
        let ann_id = group.targets[0].id;

        let updated = repo
            .update_group(
                group.id,
                &GroupRequest {
                    name: "Finance EU".to_string(),
                    targets: vec![target("A@EXAMPLE.COM", "Annie"), target("c@example.com", "Cy")],
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "Finance EU");
        assert_eq!(updated.targets.len(), 2);
        assert_eq!(updated.targets[0].id, ann_id);
        assert_eq!(updated.targets[0].first_name, "Annie");
        assert!(updated.targets.iter().all(|t| t.email != "b@example.com"));
    }

    #[tokio::test]
    async fn test_lms_flag_follows_accounts() {
        let (repo, _dir) = repo().await;

        let group = repo
            .create_group("alice", &GroupRequest {
                name: "IT".to_string(),
                targets: vec![target("it@example.com", "Ida")],
            })
            .await
            .unwrap();
        assert!(!group.targets[0].is_lms_user);

        repo.create_lms_account("idadoe14", "Ida Doe", "IT@example.com")
            .await
            .unwrap();
        let group = repo.get_group(group.id).await.unwrap().unwrap();
        assert!(group.targets[0].is_lms_user);

        let dup = repo
            .create_lms_account("idadoe14", "Ida Doe", "it@example.com")
            .await;
        assert!(matches!(dup, Err(AppError::Validation(_))));

        repo.delete_lms_account("it@example.com").await.unwrap();
        let group = repo.get_group(group.id).await.unwrap().unwrap();
        assert!(!group.targets[0].is_lms_user);
        assert!(matches!(
            repo.delete_lms_account("it@example.com").await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_group_cascades() {
        let (repo, _dir) = repo().await;

        let group = repo
            .create_group("alice", &GroupRequest {
                name: "HR".to_string(),
                targets: vec![target("hr@example.com", "Hal")],
            })
            .await
            .unwrap();

        repo.delete_group(group.id).await.unwrap();
        assert!(repo.get_group(group.id).await.unwrap().is_none());
        assert!(repo.list_groups("alice").await.unwrap().is_empty());
        assert!(matches!(
            repo.delete_group(group.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_groups_is_scoped_to_owner() {
        let (repo, _dir) = repo().await;

        let group = repo
            .create_group("alice", &GroupRequest {
                name: "Legal".to_string(),
                targets: vec![target("lee@example.com", "Lee")],
            })
            .await
            .unwrap();
        assert_eq!(group.owner, "alice");

        let alice = repo.list_groups("alice").await.unwrap();
        assert_eq!(alice.len(), 1);
        assert_eq!(alice[0].targets.len(), 1);
        assert!(repo.list_groups("bob").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_lms_accounts_match_non_ascii_case() {
        let (repo, _dir) = repo().await;

        let group = repo
            .create_group("alice", &GroupRequest {
                name: "Lyon".to_string(),
                targets: vec![target("ÉLODIE@example.com", "Élodie")],
            })
            .await
            .unwrap();
        assert_eq!(group.targets[0].email, "élodie@example.com");

        repo.create_lms_account("elodie", "Élodie Doe", "Élodie@Example.com")
            .await
            .unwrap();
        let group = repo.get_group(group.id).await.unwrap().unwrap();
        assert!(group.targets[0].is_lms_user);

        repo.delete_lms_account("ÉLODIE@EXAMPLE.COM").await.unwrap();
    }
}
