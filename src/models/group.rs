//! Group and target models.

use serde::{Deserialize, Serialize};

/// Identifier of a group.
pub type GroupId = i64;

/// Identifier of a target within a group.
pub type TargetId = i64;

/// A person targeted by simulations, member of exactly one group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: TargetId,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub position: String,
    /// Whether an LMS account exists for this email
    #[serde(default)]
    pub is_lms_user: bool,
}

impl Target {
    /// First and last name joined by a space, trimmed.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

/// A named collection of targets.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Group {
    pub id: GroupId,
    /// User that owns the group; only they may change it or run jobs on it
    #[serde(default)]
    pub owner: String,
    pub name: String,
    pub modified_date: String,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl Group {
    /// Find a member target by id.
    pub fn target(&self, id: TargetId) -> Option<&Target> {
        self.targets.iter().find(|t| t.id == id)
    }

    /// Ids from `ids` that are not members of this group, in input order.
    pub fn foreign_targets(&self, ids: &[TargetId]) -> Vec<TargetId> {
        ids.iter()
            .copied()
            .filter(|id| self.target(*id).is_none())
            .collect()
    }

    /// Whether every id in `ids` is a member of this group.
    pub fn has_targets(&self, ids: &[TargetId]) -> bool {
        self.foreign_targets(ids).is_empty()
    }
}

/// Target fields supplied when creating or updating a group.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TargetInput {
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub email: String,
    #[serde(default)]
    pub position: String,
}

/// Request body for creating a group or replacing its contents.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRequest {
    pub name: String,
    #[serde(default)]
    pub targets: Vec<TargetInput>,
}

impl GroupRequest {
    /// Targets with normalized emails and duplicates collapsed.
    ///
    /// A later entry replaces the earlier one in place, so the first occurrence
    /// keeps its position.
    pub fn deduplicated_targets(&self) -> Vec<TargetInput> {
        let mut unique: Vec<TargetInput> = Vec::with_capacity(self.targets.len());

        for target in &self.targets {
            let target = TargetInput {
                email: normalize_email(&target.email),
                ..target.clone()
            };
            match unique.iter_mut().find(|t| t.email == target.email) {
                Some(existing) => *existing = target,
                None => unique.push(target),
            }
        }

        unique
    }
}

/// Canonical form of an email: trimmed and lower-cased, including non-ASCII letters.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Loose email check: one `@` with non-empty local and domain parts.
pub fn is_valid_email(email: &str) -> bool {
    let mut parts = email.split('@');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(email: &str, first_name: &str) -> TargetInput {
        TargetInput {
            first_name: first_name.to_string(),
            last_name: String::new(),
            email: email.to_string(),
            position: String::new(),
        }
    }

    #[test]
    fn test_dedup_replaces_case_insensitive() {
        let request = GroupRequest {
            name: "Sales".to_string(),
            targets: vec![
                input("a@example.com", "First"),
                input("b@example.com", "Bob"),
                input("A@Example.com", "Second"),
            ],
        };

        let targets = request.deduplicated_targets();
        assert_eq!(targets.len(), 2);
        assert_eq!(targets[0].first_name, "Second");
        assert_eq!(targets[0].email, "a@example.com");
        assert_eq!(targets[1].email, "b@example.com");
    }

    #[test]
    fn test_dedup_folds_non_ascii_case() {
        let request = GroupRequest {
            name: "Lyon".to_string(),
            targets: vec![
                input(" José@Example.com", "First"),
                input("JOSÉ@example.com", "Second"),
            ],
        };

        let targets = request.deduplicated_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].first_name, "Second");
        assert_eq!(targets[0].email, "josé@example.com");
    }

    #[test]
    fn test_foreign_targets() {
        let group = Group {
            id: 1,
            owner: "alice".to_string(),
            name: "Ops".to_string(),
            modified_date: String::new(),
            targets: vec![Target {
                id: 10,
                first_name: "Ann".to_string(),
                last_name: "Lee".to_string(),
                email: "ann@example.com".to_string(),
                position: String::new(),
                is_lms_user: false,
            }],
        };

        assert!(group.has_targets(&[10]));
        assert_eq!(group.foreign_targets(&[11, 10, 12]), vec![11, 12]);
        assert_eq!(group.targets[0].full_name(), "Ann Lee");
    }

    #[test]
    fn test_is_valid_email() {
        assert!(is_valid_email("user@example.com"));
        assert!(!is_valid_email("user.example.com"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@"));
        assert!(!is_valid_email("a@b@c"));
        assert!(!is_valid_email("us er@example.com"));
    }
}
