use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Directory entry shown in a client's sidebar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    /// Unique identifier for the user.
    pub id: Uuid,

    /// Login name, unique across the system.
    pub username: String,

    /// Display name.
    pub full_name: String,

    /// Profile image reference, empty when the user has none.
    #[serde(default)]
    pub profile_pic: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_user_summary_uses_camel_case_fields() {
        let id = Uuid::new_v4();
        let user = UserSummary {
            id,
            username: "alice".into(),
            full_name: "Alice Liddell".into(),
            profile_pic: "https://avatar.example/alice.png".into(),
        };

        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(
            value,
            json!({
                "id": id,
                "username": "alice",
                "fullName": "Alice Liddell",
                "profilePic": "https://avatar.example/alice.png",
            })
        );
    }

    #[test]
    fn test_user_summary_profile_pic_defaults_to_empty() {
        let user: UserSummary = serde_json::from_value(json!({
            "id": Uuid::nil(),
            "username": "bob",
            "fullName": "Bob",
        }))
        .unwrap();

        assert!(user.profile_pic.is_empty());
    }
}
