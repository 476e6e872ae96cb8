use std::sync::Arc;

use async_trait::async_trait;
use ferry_workos::{CreateUser, Directory, PasswordHashType, UpdateUser, User};
use tracing::{debug, warn};

use super::{RecordProcessor, check_tag};
use crate::{ExportedUser, RecordKind, TaskOutcome, TranslationEntry};

/// Destination hash type for a source `password_hasher` value.
///
/// Exports that carry a digest without naming the hasher use bcrypt.
/// Returns `None` for hashers the destination cannot import.
pub fn password_hash_type(hasher: Option<&str>) -> Option<PasswordHashType> {
    let Some(hasher) = hasher else {
        return Some(PasswordHashType::Bcrypt);
    };

    match hasher {
        "bcrypt" | "bcrypt_sha256_django" => Some(PasswordHashType::Bcrypt),
        "scrypt_firebase" => Some(PasswordHashType::FirebaseScrypt),
        "scrypt_werkzeug" | "scrypt" => Some(PasswordHashType::Scrypt),
        "ssha" => Some(PasswordHashType::Ssha),
        h if h.starts_with("argon2") => Some(PasswordHashType::Argon2),
        h if h.starts_with("pbkdf2") => Some(PasswordHashType::Pbkdf2),
        _ => None,
    }
}

/// Migrates users, keyed by primary email.
pub struct UserProcessor {
    directory: Arc<dyn Directory>,
}

impl UserProcessor {
    pub fn new(directory: Arc<dyn Directory>) -> Self {
        Self { directory }
    }

    fn create_request(record: &ExportedUser, email: &str) -> CreateUser {
        let mut request = CreateUser {
            email: email.to_string(),
            first_name: record.first_name.clone(),
            last_name: record.last_name.clone(),
            email_verified: Some(true),
            external_id: Some(record.id.clone()),
            ..Default::default()
        };

        if let Some(digest) = record.password_digest.as_deref().filter(|d| !d.is_empty()) {
            match password_hash_type(record.password_hasher.as_deref()) {
                Some(hash_type) => {
                    request.password_hash = Some(digest.to_string());
                    request.password_hash_type = Some(hash_type);
                }
                None => warn!(
                    source_id = %record.id,
                    hasher = record.password_hasher.as_deref().unwrap_or_default(),
                    "unsupported password hasher, migrating without password"
                ),
            }
        }

        request
    }

    /// Attach the correlation key to the user that already holds `email`.
    async fn adopt_existing(
        &self,
        record: &ExportedUser,
        email: &str,
    ) -> TaskOutcome<TranslationEntry> {
        let lowered = email.to_lowercase();
        let mut matches = attempt!(self.directory.find_users_by_email(&lowered).await);

        if matches.len() != 1 {
            return TaskOutcome::skipped(format!(
                "email {} is taken but {} destination users match it",
                lowered,
                matches.len()
            ));
        }

        let existing: User = matches.remove(0);
        if existing.external_id.as_deref() == Some(record.id.as_str()) {
            debug!(source_id = %record.id, destination_id = %existing.id, "user already migrated");
            return TaskOutcome::Success(TranslationEntry::new(&record.id, existing.id));
        }

        let update = UpdateUser {
            external_id: Some(record.id.clone()),
            ..Default::default()
        };
        let user = attempt!(self.directory.update_user(&existing.id, &update).await);
        debug!(source_id = %record.id, destination_id = %user.id, "attached to existing user");
        TaskOutcome::Success(TranslationEntry::new(&record.id, user.id))
    }
}

#[async_trait]
impl RecordProcessor for UserProcessor {
    type Record = ExportedUser;

    const KIND: RecordKind = RecordKind::User;

    fn record_id(record: &ExportedUser) -> &str {
        &record.id
    }

    async fn process(&self, record: &ExportedUser) -> TaskOutcome<TranslationEntry> {
        if let Err(skip) = check_tag(Self::KIND, record.object.as_deref()) {
            return skip;
        }

        let Some(email) = record.primary_email() else {
            return TaskOutcome::skipped("no primary email address");
        };

        let request = Self::create_request(record, email);
        match self.directory.create_user(&request).await {
            Ok(user) => TaskOutcome::Success(TranslationEntry::new(&record.id, user.id)),
            Err(err) if err.is_conflict() => self.adopt_existing(record, email).await,
            Err(err) => err.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::EmailAddress;
    use ferry_workos::MemoryDirectory;
    use test_case::test_case;

    fn user(id: &str, email: &str) -> ExportedUser {
        ExportedUser {
            object: Some("user".to_string()),
            id: id.to_string(),
            first_name: Some("Ada".to_string()),
            last_name: Some("Lovelace".to_string()),
            primary_email_address_id: Some(format!("idn_{id}")),
            email_addresses: Some(vec![Some(EmailAddress {
                id: format!("idn_{id}"),
                email_address: email.to_string(),
            })]),
            password_digest: Some("$2a$10$abcdefghijklmnopqrstuv".to_string()),
            password_hasher: Some("bcrypt".to_string()),
            ..Default::default()
        }
    }

    fn success(outcome: TaskOutcome<TranslationEntry>) -> TranslationEntry {
        match outcome {
            TaskOutcome::Success(entry) => entry,
            other => panic!("expected success, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_creates_user_with_correlation_key_and_hash() {
        let directory = Arc::new(MemoryDirectory::new());
        let processor = UserProcessor::new(directory.clone());

        let entry = success(processor.process(&user("user_a", "ada@example.com")).await);

        let users = directory.users().await;
        pretty_assertions::assert_eq!(users.len(), 1);
        pretty_assertions::assert_eq!(entry, TranslationEntry::new("user_a", users[0].id.clone()));
        pretty_assertions::assert_eq!(users[0].external_id.as_deref(), Some("user_a"));
        assert!(users[0].email_verified);
    }

    #[tokio::test]
    async fn test_rerun_resolves_to_the_same_user() {
        let directory = Arc::new(MemoryDirectory::new());
        let processor = UserProcessor::new(directory.clone());
        let record = user("user_a", "ada@example.com");

        let first = success(processor.process(&record).await);
        let second = success(processor.process(&record).await);

        pretty_assertions::assert_eq!(first, second);
        pretty_assertions::assert_eq!(directory.users().await.len(), 1);
    }

    #[tokio::test]
    async fn test_shared_email_resolves_to_one_destination_user() {
        let directory = Arc::new(MemoryDirectory::new());
        let processor = UserProcessor::new(directory.clone());

        let first = success(processor.process(&user("user_a", "ada@example.com")).await);
        let second = success(processor.process(&user("user_b", "Ada@Example.com")).await);

        pretty_assertions::assert_eq!(first.destination_id, second.destination_id);
        pretty_assertions::assert_eq!(second.source_id, "user_b");
        let users = directory.users().await;
        pretty_assertions::assert_eq!(users.len(), 1);
        pretty_assertions::assert_eq!(users[0].external_id.as_deref(), Some("user_b"));
    }

    #[tokio::test]
    async fn test_skips_without_primary_email() {
        let directory = Arc::new(MemoryDirectory::new());
        let processor = UserProcessor::new(directory.clone());
        let mut record = user("user_a", "ada@example.com");
        record.primary_email_address_id = None;

        let outcome = processor.process(&record).await;
        assert!(matches!(outcome, TaskOutcome::SkippedExpected(_)));
        pretty_assertions::assert_eq!(directory.calls(), 0);
    }

    #[tokio::test]
    async fn test_skips_wrong_object_tag() {
        let processor = UserProcessor::new(Arc::new(MemoryDirectory::new()));
        let mut record = user("user_a", "ada@example.com");
        record.object = Some("organization".to_string());

        let outcome = processor.process(&record).await;
        assert!(matches!(outcome, TaskOutcome::SkippedExpected(_)));
    }

    #[tokio::test]
    async fn test_rate_limit_surfaces_as_outcome() {
        let directory = Arc::new(MemoryDirectory::new());
        directory.inject_rate_limits(1, Some(5)).await;
        let processor = UserProcessor::new(directory.clone());

        let outcome = processor.process(&user("user_a", "ada@example.com")).await;
        assert!(outcome.is_rate_limited());
        assert!(directory.users().await.is_empty());
    }

    #[test]
    fn test_unsupported_hasher_drops_password() {
        let mut record = user("user_a", "ada@example.com");
        record.password_hasher = Some("md5".to_string());

        let request = UserProcessor::create_request(&record, "ada@example.com");
        pretty_assertions::assert_eq!(request.password_hash, None);
        pretty_assertions::assert_eq!(request.password_hash_type, None);
    }

    #[test_case(None => Some(PasswordHashType::Bcrypt); "absent defaults to bcrypt")]
    #[test_case(Some("bcrypt") => Some(PasswordHashType::Bcrypt))]
    #[test_case(Some("argon2id") => Some(PasswordHashType::Argon2))]
    #[test_case(Some("scrypt_firebase") => Some(PasswordHashType::FirebaseScrypt))]
    #[test_case(Some("pbkdf2_sha256") => Some(PasswordHashType::Pbkdf2))]
    #[test_case(Some("ssha") => Some(PasswordHashType::Ssha))]
    #[test_case(Some("md5") => None)]
    fn test_password_hash_type(hasher: Option<&str>) -> Option<PasswordHashType> {
        password_hash_type(hasher)
    }
}
