mod attempts;
mod events;
mod jwt;
mod middleware;
mod password;
mod public_paths;
pub mod roles;
mod types;

pub use attempts::{AttemptPolicy, LoginAttemptTracker};
pub use events::{AuthenticationEvent, AuthenticationListener, LoginAttemptListener};
pub use jwt::{TokenError, TokenService};
pub use middleware::{AccessDecision, JwtAuthorization, TOKEN_PREFIX};
pub use password::{generate_password, generate_user_id, PasswordEncoder};
pub use public_paths::PublicPaths;
pub use roles::{Role, RoleError};
pub use types::{AuthContext, AuthenticatedUser};
