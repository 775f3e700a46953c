//! User model
//!
//! The user record owned by the profile CRUD layer. The authentication core
//! only reads `id`, `username` and `password_hash` from it.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// A registered user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(skip_serializing)]
    pub id: i64,
    pub username: String,
    /// Password hash (argon2, PHC string)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub email: String,
    pub name: String,
    pub surname: String,
    pub birthdate: Option<NaiveDate>,
    pub phone_number: String,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing)]
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Public projection of the profile
    pub fn public(&self) -> UserPublic {
        UserPublic {
            username: self.username.clone(),
            name: self.name.clone(),
            surname: self.surname.clone(),
        }
    }
}

/// Fields visible to anyone, authenticated or not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPublic {
    pub username: String,
    pub name: String,
    pub surname: String,
}

/// A user about to be inserted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password_hash: String,
    pub email: String,
}

/// Partial profile update; empty/absent fields are left untouched.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateUserInput {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub surname: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    /// `YYYY-MM-DD`
    #[serde(default)]
    pub birthdate: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_serialization_hides_secrets() {
        let now = Utc::now();
        let user = User {
            id: 7,
            username: "alice".to_string(),
            password_hash: "$argon2id$secret".to_string(),
            email: "alice@example.com".to_string(),
            name: "Alice".to_string(),
            surname: "Liddell".to_string(),
            birthdate: NaiveDate::from_ymd_opt(1990, 5, 4),
            phone_number: String::new(),
            created_at: now,
            updated_at: now,
        };

        let json = serde_json::to_value(&user).unwrap();
        assert!(json.get("password_hash").is_none());
        assert!(json.get("id").is_none());
        assert_eq!(json["email"], "alice@example.com");
        assert_eq!(json["birthdate"], "1990-05-04");

        assert_eq!(
            user.public(),
            UserPublic {
                username: "alice".to_string(),
                name: "Alice".to_string(),
                surname: "Liddell".to_string(),
            }
        );
    }
}
