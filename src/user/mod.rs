mod email;
pub mod handlers;
mod image;
pub mod model;
mod repository;
mod service;

pub use email::LogEmailSender;
pub use image::{FsImageStore, StorageError};
pub use repository::{PostgresUserRepository, RepositoryError};
pub use service::UserService;
