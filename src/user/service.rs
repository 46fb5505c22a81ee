use chrono::Utc;
use log::{debug, error, info, warn};
use std::sync::Arc;

use crate::auth::{
    generate_password, generate_user_id, AuthenticationEvent, AuthenticationListener,
    LoginAttemptListener, LoginAttemptTracker, PasswordEncoder, Role,
};
use crate::error::ApiError;
use crate::user::email::EmailSender;
use crate::user::image::ImageStore;
use crate::user::model::{User, UserDetails};
use crate::user::repository::UserRepository;

pub struct UserService {
    repository: Arc<dyn UserRepository>,
    email: Arc<dyn EmailSender>,
    images: Arc<dyn ImageStore>,
    attempts: Arc<LoginAttemptTracker>,
    listeners: Vec<Arc<dyn AuthenticationListener>>,
    encoder: PasswordEncoder,
    base_url: String,
}

impl UserService {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        email: Arc<dyn EmailSender>,
        images: Arc<dyn ImageStore>,
        attempts: Arc<LoginAttemptTracker>,
        encoder: PasswordEncoder,
        base_url: impl Into<String>,
    ) -> Self {
        let listener: Arc<dyn AuthenticationListener> =
            Arc::new(LoginAttemptListener::new(attempts.clone()));
        Self {
            repository,
            email,
            images,
            attempts,
            listeners: vec![listener],
            encoder,
            base_url: base_url.into(),
        }
    }

    fn publish(&self, event: AuthenticationEvent) {
        for listener in &self.listeners {
            listener.on_event(&event);
        }
    }

    /// 校验用户名和密码。
    ///
    /// 顺序：加载用户并重新计算锁定状态、记录登录时间，然后依次检查锁定、禁用和密码。
    /// 只有密码错误（包括用户不存在）会计入失败次数。
    pub async fn login(&self, username: &str, password: &str) -> Result<User, ApiError> {
        info!("用户 {} 尝试登录", username);

        let user = match self.load_user_for_login(username).await? {
            Some(user) => user,
            None => {
                warn!("用户 {} 不存在", username);
                self.publish(AuthenticationEvent::BadCredentials {
                    username: username.to_string(),
                });
                return Err(ApiError::BadCredentials);
            }
        };

        if !user.is_not_locked {
            warn!("用户 {} 已被锁定", username);
            return Err(ApiError::AccountLocked);
        }
        if !user.is_active {
            warn!("用户 {} 已被禁用", username);
            return Err(ApiError::AccountDisabled);
        }
        if !self.encoder.matches(password, &user.password) {
            warn!("用户 {} 密码错误", username);
            self.publish(AuthenticationEvent::BadCredentials {
                username: username.to_string(),
            });
            return Err(ApiError::BadCredentials);
        }

        self.publish(AuthenticationEvent::Success {
            username: user.username.clone(),
        });
        info!("用户 {} 登录成功", username);
        Ok(user)
    }

    async fn load_user_for_login(&self, username: &str) -> Result<Option<User>, ApiError> {
        let mut user = match self.repository.find_by_username(username).await? {
            Some(user) => user,
            None => return Ok(None),
        };

        self.validate_login_attempt(&mut user);
        user.last_login_date_display = user.last_login_date;
        user.last_login_date = Some(Utc::now());
        Ok(Some(self.repository.save(&user).await?))
    }

    /// 已锁定的账户保持锁定，并清除失败记录；未锁定的账户按失败次数重新计算
    fn validate_login_attempt(&self, user: &mut User) {
        if user.is_not_locked {
            user.is_not_locked = !self.attempts.is_locked_out(&user.username);
            if !user.is_not_locked {
                warn!("用户 {} 登录失败次数过多，账户已锁定", user.username);
            }
        } else {
            self.attempts.record_success(&user.username);
        }
    }

    pub async fn register(
        &self,
        first_name: &str,
        last_name: &str,
        username: &str,
        email: &str,
    ) -> Result<User, ApiError> {
        info!("注册新用户: {}", username);
        self.validate_new_username_and_email(None, username, email)
            .await?;

        let details = UserDetails {
            first_name: first_name.to_string(),
            last_name: last_name.to_string(),
            username: username.to_string(),
            email: email.to_string(),
            role: Role::User,
            is_active: true,
            is_non_locked: true,
        };
        let user = self.create_user(details).await?;
        info!("用户注册成功: {}", username);
        Ok(user)
    }

    pub async fn add_new_user(&self, details: UserDetails) -> Result<User, ApiError> {
        info!("管理员新增用户: {} ({})", details.username, details.role);
        self.validate_new_username_and_email(None, &details.username, &details.email)
            .await?;
        self.create_user(details).await
    }

    async fn create_user(&self, details: UserDetails) -> Result<User, ApiError> {
        let password = generate_password();
        let mut user = User {
            id: 0,
            user_id: generate_user_id(),
            first_name: details.first_name,
            last_name: details.last_name,
            profile_image_url: self.temporary_profile_image_url(&details.username),
            username: details.username,
            password: self.encoder.encode(&password)?,
            email: details.email,
            last_login_date: None,
            last_login_date_display: None,
            join_date: Utc::now(),
            role: details.role,
            authorities: Vec::new(),
            is_active: details.is_active,
            is_not_locked: details.is_non_locked,
        };
        user.assign_role(details.role);
        let user = self.repository.save(&user).await?;

        // 邮件失败不影响账户创建
        if let Err(e) = self
            .email
            .send_new_password_email(&user.first_name, &password, &user.email)
            .await
        {
            error!("向 {} 发送新密码邮件失败: {}", user.email, e);
        }
        Ok(user)
    }

    pub async fn update_user(
        &self,
        current_username: &str,
        details: UserDetails,
    ) -> Result<User, ApiError> {
        info!("更新用户: {} -> {}", current_username, details.username);
        let mut user = self
            .validate_new_username_and_email(Some(current_username), &details.username, &details.email)
            .await?
            .ok_or_else(|| ApiError::UserNotFound(current_username.to_string()))?;

        user.first_name = details.first_name;
        user.last_name = details.last_name;
        user.username = details.username;
        user.email = details.email;
        user.is_active = details.is_active;
        user.is_not_locked = details.is_non_locked;
        user.assign_role(details.role);

        Ok(self.repository.save(&user).await?)
    }

    pub async fn reset_password(&self, email: &str) -> Result<(), ApiError> {
        let mut user = self.find_user_by_email(email).await?;

        let password = generate_password();
        user.password = self.encoder.encode(&password)?;
        self.repository.save(&user).await?;
        info!("用户 {} 的密码已重置", user.username);

        self.email
            .send_new_password_email(&user.first_name, &password, &user.email)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))
    }

    pub async fn update_profile_image(
        &self,
        username: &str,
        image: Vec<u8>,
    ) -> Result<User, ApiError> {
        let mut user = self.find_user_by_username(username).await?;
        if image.is_empty() {
            return Err(ApiError::Validation("Profile image is empty".to_string()));
        }

        let file_name = self.images.save(&user.username, image).await?;
        user.profile_image_url = format!(
            "{}/user/image/{}/{}",
            self.base_url, user.username, file_name
        );
        debug!("用户 {} 的头像地址: {}", username, user.profile_image_url);
        Ok(self.repository.save(&user).await?)
    }

    pub async fn profile_image(&self, username: &str, file_name: &str) -> Result<Vec<u8>, ApiError> {
        self.images
            .load(username, file_name)
            .await?
            .ok_or(ApiError::NoMapping)
    }

    pub async fn get_users(&self) -> Result<Vec<User>, ApiError> {
        Ok(self.repository.find_all().await?)
    }

    pub async fn find_user_by_username(&self, username: &str) -> Result<User, ApiError> {
        self.repository
            .find_by_username(username)
            .await?
            .ok_or_else(|| ApiError::UserNotFound(username.to_string()))
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<User, ApiError> {
        self.repository
            .find_by_email(email)
            .await?
            .ok_or_else(|| ApiError::EmailNotFound(email.to_string()))
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), ApiError> {
        if self.repository.delete_by_id(id).await? {
            info!("用户 {} 已删除", id);
            Ok(())
        } else {
            Err(ApiError::UserIdNotFound(id))
        }
    }

    fn temporary_profile_image_url(&self, username: &str) -> String {
        format!("{}/user/image/profile/{}", self.base_url, username)
    }

    /// 检查用户名与邮箱是否被其他用户占用。
    /// 传入当前用户名时返回该用户，排除其自身的记录。
    async fn validate_new_username_and_email(
        &self,
        current_username: Option<&str>,
        new_username: &str,
        new_email: &str,
    ) -> Result<Option<User>, ApiError> {
        let by_username = self.repository.find_by_username(new_username).await?;
        let by_email = self.repository.find_by_email(new_email).await?;

        match current_username.filter(|name| !name.trim().is_empty()) {
            Some(current) => {
                let current_user = self
                    .repository
                    .find_by_username(current)
                    .await?
                    .ok_or_else(|| ApiError::UserNotFound(current.to_string()))?;
                if by_username.map_or(false, |u| u.id != current_user.id) {
                    return Err(ApiError::UsernameExists);
                }
                if by_email.map_or(false, |u| u.id != current_user.id) {
                    return Err(ApiError::EmailExists);
                }
                Ok(Some(current_user))
            }
            None => {
                if by_username.is_some() {
                    return Err(ApiError::UsernameExists);
                }
                if by_email.is_some() {
                    return Err(ApiError::EmailExists);
                }
                Ok(None)
            }
        }
    }
}
