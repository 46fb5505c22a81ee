use bcrypt::{hash, verify, BcryptError};
use log::{debug, error, warn};
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};

const GENERATED_PASSWORD_LEN: usize = 10;
const USER_ID_LEN: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct PasswordEncoder {
    cost: u32,
}

impl PasswordEncoder {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    pub fn encode(&self, password: &str) -> Result<String, BcryptError> {
        debug!("加密密码");
        hash(password.as_bytes(), self.cost).map_err(|e| {
            error!("密码加密失败: {}", e);
            e
        })
    }

    /// 哈希格式损坏时视为不匹配
    pub fn matches(&self, password: &str, hashed: &str) -> bool {
        match verify(password, hashed) {
            Ok(result) => {
                if !result {
                    warn!("密码验证失败");
                }
                result
            }
            Err(e) => {
                error!("密码验证过程出错: {}", e);
                false
            }
        }
    }
}

pub fn generate_password() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

pub fn generate_user_id() -> String {
    let mut rng = thread_rng();
    (0..USER_ID_LEN)
        .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
        .collect()
}
