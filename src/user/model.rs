use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use crate::auth::{AuthenticatedUser, Role};

static USERNAME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_.-]+$").expect("username pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    #[serde(skip_serializing)]
    pub password: String, // bcrypt 哈希
    pub email: String,
    pub profile_image_url: String,
    pub last_login_date: Option<DateTime<Utc>>,
    pub last_login_date_display: Option<DateTime<Utc>>,
    pub join_date: DateTime<Utc>,
    pub role: Role,
    pub authorities: Vec<String>,
    #[serde(rename = "active")]
    pub is_active: bool,
    #[serde(rename = "notLocked")]
    pub is_not_locked: bool,
}

impl User {
    pub fn principal(&self) -> AuthenticatedUser {
        AuthenticatedUser::new(self.username.clone(), self.authorities.clone())
    }

    /// 设置角色时同步权限列表
    pub fn assign_role(&mut self, role: Role) {
        self.role = role;
        self.authorities = role.authority_list();
    }
}

/// 新增或更新用户时的字段
#[derive(Debug, Clone)]
pub struct UserDetails {
    pub first_name: String,
    pub last_name: String,
    pub username: String,
    pub email: String,
    pub role: Role,
    pub is_active: bool,
    pub is_non_locked: bool,
}

pub(crate) fn validate_username(username: &str) -> Result<(), ValidationError> {
    if !USERNAME_RE.is_match(username) {
        return Err(ValidationError::new("invalid_username")
            .with_message("Username may only contain letters, digits, '.', '_' and '-'".into()));
    }
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[validate(length(min = 3, max = 30), custom(function = "validate_username"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddUserForm {
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[serde(rename = "userName")]
    #[validate(length(min = 3, max = 30), custom(function = "validate_username"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub is_non_locked: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserForm {
    #[validate(length(min = 1))]
    pub current_username: String,
    #[validate(length(min = 1, max = 50))]
    pub first_name: String,
    #[validate(length(min = 1, max = 50))]
    pub last_name: String,
    #[serde(rename = "userName")]
    #[validate(length(min = 3, max = 30), custom(function = "validate_username"))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    pub role: String,
    pub is_active: bool,
    pub is_non_locked: bool,
}

impl TryFrom<AddUserForm> for UserDetails {
    type Error = crate::auth::RoleError;

    fn try_from(form: AddUserForm) -> Result<Self, Self::Error> {
        Ok(Self {
            role: form.role.parse()?,
            first_name: form.first_name,
            last_name: form.last_name,
            username: form.username,
            email: form.email,
            is_active: form.is_active,
            is_non_locked: form.is_non_locked,
        })
    }
}

impl UpdateUserForm {
    /// 拆分为 (当前用户名, 新字段)
    pub fn into_parts(self) -> Result<(String, UserDetails), crate::auth::RoleError> {
        let details = UserDetails {
            role: self.role.parse()?,
            first_name: self.first_name,
            last_name: self.last_name,
            username: self.username,
            email: self.email,
            is_active: self.is_active,
            is_non_locked: self.is_non_locked,
        };
        Ok((self.current_username, details))
    }
}

#[derive(Debug, Deserialize)]
pub struct ProfileImageQuery {
    pub username: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User {
            id: 1,
            user_id: "1234567890".to_string(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            username: "alice".to_string(),
            password: "$2b$04$hash".to_string(),
            email: "alice@example.com".to_string(),
            profile_image_url: "http://localhost/user/image/profile/alice".to_string(),
            last_login_date: None,
            last_login_date_display: None,
            join_date: Utc::now(),
            role: Role::User,
            authorities: Role::User.authority_list(),
            is_active: true,
            is_not_locked: true,
        }
    }

    #[test]
    fn password_is_never_serialized() {
        let json = serde_json::to_value(sample_user()).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["username"], "alice");
        assert_eq!(json["role"], "ROLE_USER");
        assert_eq!(json["notLocked"], true);
        assert_eq!(json["profileImageUrl"], "http://localhost/user/image/profile/alice");
    }

    #[test]
    fn assigning_role_refreshes_authorities() {
        let mut user = sample_user();
        user.assign_role(Role::SuperAdmin);
        assert!(user.principal().has_authority("user:delete"));
    }

    #[test]
    fn register_request_validates_fields() {
        let valid = RegisterRequest {
            first_name: "Bob".into(),
            last_name: "Builder".into(),
            username: "bob_b".into(),
            email: "bob@example.com".into(),
        };
        assert!(valid.validate().is_ok());

        let invalid = RegisterRequest {
            first_name: "".into(),
            last_name: "Builder".into(),
            username: "bob builder".into(),
            email: "not-an-email".into(),
        };
        let errors = invalid.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("first_name"));
        assert!(fields.contains_key("username"));
        assert!(fields.contains_key("email"));
    }

    #[test]
    fn unknown_role_in_form_is_rejected() {
        let form = AddUserForm {
            first_name: "Bob".into(),
            last_name: "Builder".into(),
            username: "bob".into(),
            email: "bob@example.com".into(),
            role: "ROLE_OVERLORD".into(),
            is_active: true,
            is_non_locked: true,
        };
        assert!(UserDetails::try_from(form).is_err());
    }
}
