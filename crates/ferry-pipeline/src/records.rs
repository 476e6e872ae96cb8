//! Record shapes found in a source snapshot.
//!
//! Only `id` is required. Everything else is optional and nullable, matching
//! what the export actually contains; unknown fields are ignored.

use serde::{Deserialize, Serialize};

/// The kinds of record a migration moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    User,
    Organization,
    OrganizationMembership,
}

impl RecordKind {
    /// The `object` tag records of this kind carry.
    pub fn tag(&self) -> &'static str {
        match self {
            RecordKind::User => "user",
            RecordKind::Organization => "organization",
            RecordKind::OrganizationMembership => "organization_membership",
        }
    }
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// One address in a user's `email_addresses` list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailAddress {
    pub id: String,
    pub email_address: String,
}

/// A user record from the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedUser {
    #[serde(default)]
    pub object: Option<String>,
    pub id: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub primary_email_address_id: Option<String>,
    /// Entries may be `null` in exports; those are ignored.
    #[serde(default)]
    pub email_addresses: Option<Vec<Option<EmailAddress>>>,
    #[serde(default)]
    pub totp_secret: Option<String>,
    #[serde(default)]
    pub password_digest: Option<String>,
    #[serde(default)]
    pub password_hasher: Option<String>,
    #[serde(default)]
    pub public_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub private_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub unsafe_metadata: Option<serde_json::Value>,
}

impl ExportedUser {
    /// The address whose id matches `primary_email_address_id`.
    pub fn primary_email(&self) -> Option<&str> {
        let primary_id = self.primary_email_address_id.as_deref()?;
        self.email_addresses
            .as_ref()?
            .iter()
            .flatten()
            .find(|email| email.id == primary_id)
            .map(|email| email.email_address.as_str())
    }
}

/// An organization record from the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedOrganization {
    #[serde(default)]
    pub object: Option<String>,
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub has_image: Option<bool>,
    #[serde(default)]
    pub max_allowed_memberships: Option<i64>,
    #[serde(default)]
    pub admin_delete_enabled: Option<bool>,
    #[serde(default)]
    pub public_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub private_metadata: Option<serde_json::Value>,
    #[serde(default)]
    pub created_by: Option<String>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
    #[serde(default)]
    pub logo_url: Option<String>,
}

/// Organization reference embedded in a membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipOrganization {
    #[serde(default)]
    pub object: Option<String>,
    pub id: String,
}

/// User reference embedded in a membership.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipUser {
    pub user_id: String,
    #[serde(default)]
    pub identifier: Option<String>,
}

/// An organization membership record from the snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExportedMembership {
    #[serde(default)]
    pub object: Option<String>,
    pub id: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub organization: Option<MembershipOrganization>,
    #[serde(default)]
    pub public_user_data: Option<MembershipUser>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_with_nulls_parses() {
        let user: ExportedUser = serde_json::from_str(
            r#"{"object":"user","id":"user_1","first_name":null,"email_addresses":[null,{"id":"idn_1","email_address":"ada@example.com"}],"primary_email_address_id":"idn_1","extra":42}"#,
        )
        .unwrap();
        assert_eq!(user.primary_email(), Some("ada@example.com"));
    }

    #[test]
    fn test_primary_email_missing() {
        let user = ExportedUser {
            id: "user_1".to_string(),
            primary_email_address_id: Some("idn_2".to_string()),
            email_addresses: Some(vec![Some(EmailAddress {
                id: "idn_1".to_string(),
                email_address: "ada@example.com".to_string(),
            })]),
            ..Default::default()
        };
        assert_eq!(user.primary_email(), None);

        let user = ExportedUser {
            id: "user_1".to_string(),
            ..Default::default()
        };
        assert_eq!(user.primary_email(), None);
    }

    #[test]
    fn test_id_is_required() {
        let result = serde_json::from_str::<ExportedOrganization>(r#"{"object":"organization"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_kind_tags() {
        assert_eq!(RecordKind::User.tag(), "user");
        assert_eq!(
            RecordKind::OrganizationMembership.to_string(),
            "organization_membership"
        );
    }
}
