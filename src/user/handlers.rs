use actix_web::{
    http::{header, StatusCode},
    web, HttpResponse,
};
use log::info;
use validator::Validate;

use crate::auth::{roles::USER_DELETE, AuthenticatedUser};
use crate::error::{ApiError, ApiResponse};
use crate::user::model::{
    AddUserForm, LoginRequest, ProfileImageQuery, RegisterRequest, UpdateUserForm, UserDetails,
};
use crate::AppState;

pub const JWT_TOKEN_HEADER: &str = "Jwt-Token";
const TEMP_PROFILE_IMAGE_BASE_URL: &str = "https://robohash.org/";

/// 注册 `/user` 下的全部路由
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/user")
            .route("/login", web::post().to(login))
            .route("/register", web::post().to(register))
            .route("/add", web::post().to(add_user))
            .route("/update", web::post().to(update_user))
            .route("/find/{username}", web::get().to(find_user))
            .route("/list", web::get().to(list_users))
            .route("/resetPassword/{email}", web::get().to(reset_password))
            .route("/delete/{id}", web::delete().to(delete_user))
            .route("/updateProfileImage", web::post().to(update_profile_image))
            // 必须先于 /image/{username}/{file_name} 注册
            .route("/image/profile/{username}", web::get().to(temporary_profile_image))
            .route("/image/{username}/{file_name}", web::get().to(profile_image)),
    );
}

/// 请求体解析失败统一按参数错误返回
pub fn payload_configs(cfg: &mut web::ServiceConfig) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::FormConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _| ApiError::Validation(err.to_string()).into()),
    );
}

pub async fn no_mapping() -> Result<HttpResponse, ApiError> {
    Err(ApiError::NoMapping)
}

async fn login(
    data: web::Data<AppState>,
    body: web::Json<LoginRequest>,
) -> Result<HttpResponse, ApiError> {
    let user = data.users.login(&body.username, &body.password).await?;
    let token = data.tokens.issue(&user.principal())?;
    Ok(HttpResponse::Ok()
        .insert_header((JWT_TOKEN_HEADER, token))
        .json(user))
}

async fn register(
    data: web::Data<AppState>,
    body: web::Json<RegisterRequest>,
) -> Result<HttpResponse, ApiError> {
    body.validate()?;
    let user = data
        .users
        .register(&body.first_name, &body.last_name, &body.username, &body.email)
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn add_user(
    data: web::Data<AppState>,
    current: AuthenticatedUser,
    form: web::Form<AddUserForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();
    form.validate()?;
    info!("{} 新增用户 {}", current.username, form.username);
    let user = data.users.add_new_user(UserDetails::try_from(form)?).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn update_user(
    data: web::Data<AppState>,
    current: AuthenticatedUser,
    form: web::Form<UpdateUserForm>,
) -> Result<HttpResponse, ApiError> {
    let form = form.into_inner();
    form.validate()?;
    let (current_username, details) = form.into_parts()?;
    info!("{} 更新用户 {}", current.username, current_username);
    let user = data.users.update_user(&current_username, details).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn find_user(
    data: web::Data<AppState>,
    username: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    let user = data.users.find_user_by_username(&username).await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn list_users(data: web::Data<AppState>) -> Result<HttpResponse, ApiError> {
    Ok(HttpResponse::Ok().json(data.users.get_users().await?))
}

async fn reset_password(
    data: web::Data<AppState>,
    email: web::Path<String>,
) -> Result<HttpResponse, ApiError> {
    data.users.reset_password(&email).await?;
    Ok(ApiResponse::respond(
        StatusCode::OK,
        &format!("An email with a new password was sent to: {}", email),
    ))
}

async fn delete_user(
    data: web::Data<AppState>,
    current: AuthenticatedUser,
    id: web::Path<i64>,
) -> Result<HttpResponse, ApiError> {
    current.require_authority(USER_DELETE)?;
    data.users.delete_user(id.into_inner()).await?;
    Ok(ApiResponse::respond(StatusCode::OK, "User deleted successfully"))
}

async fn update_profile_image(
    data: web::Data<AppState>,
    query: web::Query<ProfileImageQuery>,
    body: web::Bytes,
) -> Result<HttpResponse, ApiError> {
    let user = data
        .users
        .update_profile_image(&query.username, body.to_vec())
        .await?;
    Ok(HttpResponse::Ok().json(user))
}

async fn profile_image(
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> Result<HttpResponse, ApiError> {
    let (username, file_name) = path.into_inner();
    let bytes = data.users.profile_image(&username, &file_name).await?;
    let mime = mime_guess::from_path(&file_name).first_or_octet_stream();
    Ok(HttpResponse::Ok()
        .content_type(mime.as_ref())
        .body(bytes))
}

/// 尚未上传头像时，跳转到按用户名生成的占位图
async fn temporary_profile_image(username: web::Path<String>) -> HttpResponse {
    HttpResponse::Found()
        .insert_header((
            header::LOCATION,
            format!("{}{}", TEMP_PROFILE_IMAGE_BASE_URL, username),
        ))
        .finish()
}
