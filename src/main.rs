mod auth;
mod config;
mod error;
mod logger;
mod user;

use actix_cors::Cors;
use actix_web::{web, App, HttpServer};
use dotenv::dotenv;
use log::{debug, error, info};
use sqlx::postgres::PgPoolOptions;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use auth::{
    AccessDecision, JwtAuthorization, LoginAttemptTracker, PasswordEncoder, PublicPaths,
    TokenService,
};
use config::AppConfig;
use user::{FsImageStore, LogEmailSender, PostgresUserRepository, UserService};

const ATTEMPT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

// 应用状态
struct AppState {
    users: UserService,
    tokens: Arc<TokenService>,
    attempts: Arc<LoginAttemptTracker>,
    public_paths: Arc<PublicPaths>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    // 加载 .env
    dotenv().ok();

    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("配置错误: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    logger::init(config.log_file.as_deref(), config.log_level);
    info!("应用程序启动");

    // 连接数据库
    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("数据库连接错误: {}", e)))?;

    let repository = PostgresUserRepository::new(pool);
    repository
        .init_schema()
        .await
        .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("数据库初始化错误: {}", e)))?;

    let attempts = Arc::new(LoginAttemptTracker::new(config.login_attempts.clone()));
    let users = UserService::new(
        Arc::new(repository),
        Arc::new(LogEmailSender),
        Arc::new(FsImageStore::new(config.user_image_root.clone())),
        attempts.clone(),
        PasswordEncoder::new(config.bcrypt_cost),
        config.public_base_url.clone(),
    );

    let app_state = web::Data::new(AppState {
        users,
        tokens: Arc::new(TokenService::new(&config.jwt)),
        attempts,
        public_paths: Arc::new(PublicPaths::parse(config.public_urls.iter())),
    });

    // 定期清理过期的登录失败记录
    let sweep_state = app_state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ATTEMPT_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            let removed = sweep_state.attempts.purge_expired();
            if removed > 0 {
                debug!(
                    "清理过期登录失败记录 {} 条，剩余 {} 条",
                    removed,
                    sweep_state.attempts.len()
                );
            }
        }
    });

    info!("服务器启动在 http://{}:{}", config.host, config.port);

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .configure(user::handlers::payload_configs)
            .wrap(AccessDecision::new(app_state.public_paths.clone()))
            .wrap(JwtAuthorization::new(app_state.tokens.clone()))
            .wrap(
                Cors::default()
                    .allow_any_origin()
                    .allow_any_method()
                    .allow_any_header()
                    .expose_headers([user::handlers::JWT_TOKEN_HEADER])
                    .max_age(3600),
            )
            .configure(user::handlers::configure)
            .default_service(web::to(user::handlers::no_mapping))
    })
    .bind((config.host.as_str(), config.port))
    .map_err(|e| {
        error!("端口绑定失败: {}", e);
        e
    })?
    .run()
    .await
}
