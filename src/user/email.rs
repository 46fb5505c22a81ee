use async_trait::async_trait;
use log::info;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("邮件发送失败: {0}")]
pub struct EmailError(pub String);

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_new_password_email(
        &self,
        first_name: &str,
        password: &str,
        email: &str,
    ) -> Result<(), EmailError>;
}

/// 只记录投递动作，不包含密码；真实投递由外部邮件服务完成
pub struct LogEmailSender;

#[async_trait]
impl EmailSender for LogEmailSender {
    async fn send_new_password_email(
        &self,
        first_name: &str,
        _password: &str,
        email: &str,
    ) -> Result<(), EmailError> {
        info!("已向 {} <{}> 发送新密码邮件", first_name, email);
        Ok(())
    }
}
