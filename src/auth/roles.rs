//! 角色与权限字符串
//!
//! 每个角色对应一组固定的权限，映射是静态且完整的。

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub const USER_READ: &str = "user:read";
pub const USER_CREATE: &str = "user:create";
pub const USER_UPDATE: &str = "user:update";
pub const USER_DELETE: &str = "user:delete";

const USER_AUTHORITIES: &[&str] = &[USER_READ];
const HR_AUTHORITIES: &[&str] = &[USER_READ, USER_UPDATE];
const MANAGER_AUTHORITIES: &[&str] = &[USER_READ, USER_UPDATE];
const ADMIN_AUTHORITIES: &[&str] = &[USER_READ, USER_CREATE, USER_UPDATE];
const SUPER_ADMIN_AUTHORITIES: &[&str] = &[USER_READ, USER_CREATE, USER_UPDATE, USER_DELETE];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoleError {
    #[error("Unknown role: {0}")]
    Unknown(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    User,
    Hr,
    Manager,
    Admin,
    SuperAdmin,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::User,
        Role::Hr,
        Role::Manager,
        Role::Admin,
        Role::SuperAdmin,
    ];

    /// 存储与序列化使用的名称
    pub fn name(&self) -> &'static str {
        match self {
            Role::User => "ROLE_USER",
            Role::Hr => "ROLE_HR",
            Role::Manager => "ROLE_MANAGER",
            Role::Admin => "ROLE_ADMIN",
            Role::SuperAdmin => "ROLE_SUPER_ADMIN",
        }
    }

    pub fn authorities(&self) -> &'static [&'static str] {
        match self {
            Role::User => USER_AUTHORITIES,
            Role::Hr => HR_AUTHORITIES,
            Role::Manager => MANAGER_AUTHORITIES,
            Role::Admin => ADMIN_AUTHORITIES,
            Role::SuperAdmin => SUPER_ADMIN_AUTHORITIES,
        }
    }

    pub fn authority_list(&self) -> Vec<String> {
        self.authorities().iter().map(|a| a.to_string()).collect()
    }
}

impl FromStr for Role {
    type Err = RoleError;

    /// 接受 "ROLE_ADMIN" 或 "admin"，不区分大小写
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_uppercase();
        let wanted = if upper.starts_with("ROLE_") {
            upper
        } else {
            format!("ROLE_{}", upper)
        };
        Role::ALL
            .into_iter()
            .find(|role| role.name() == wanted)
            .ok_or_else(|| RoleError::Unknown(s.to_string()))
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Serialize for Role {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
