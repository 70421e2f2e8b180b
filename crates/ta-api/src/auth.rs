use actix_session::Session;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::{json, Value};
use ta_core::notices;
use ta_core::submission::{sanitize_line, truthy};
use ta_core::{AppError, NewUser, Role, User};
use validator::ValidateEmail;

use crate::error::ApiResult;
use crate::session::{self, CurrentUser, NonceUser, SessionUser};
use crate::state::AppState;

pub const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct RegisterForm {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password: String,
    pub password_confirm: String,
    pub accept_terms: Option<Value>,
}

impl RegisterForm {
    /// Every problem with the form, in field order.
    pub fn problems(&self) -> Vec<&'static str> {
        let mut problems = Vec::new();
        let username = self.username.trim();
        if username.is_empty() {
            problems.push("Username is required");
        } else if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            problems.push("Username may only contain letters, numbers, and underscores");
        }
        if self.email.trim().is_empty() {
            problems.push("Email is required");
        } else if !self.email.trim().validate_email() {
            problems.push("Please enter a valid email address");
        }
        if sanitize_line(&self.first_name).is_empty() {
            problems.push("First name is required");
        }
        if sanitize_line(&self.last_name).is_empty() {
            problems.push("Last name is required");
        }
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            problems.push("Password must be at least 8 characters long");
        }
        if self.password != self.password_confirm {
            problems.push("Passwords do not match");
        }
        if !truthy(self.accept_terms.as_ref()) {
            problems.push("You must agree to the terms and conditions");
        }
        problems
    }
}

fn user_json(user: &User) -> Value {
    json!({
        "id": user.id,
        "username": user.username,
        "display_name": user.display_name,
        "role": user.role,
    })
}

pub async fn register(
    data: web::Data<AppState>,
    form: web::Json<RegisterForm>,
) -> ApiResult<HttpResponse> {
    let form = form.into_inner();
    let mut problems = form.problems();
    if problems.is_empty() {
        if data.repo.username_exists(&form.username).await? {
            problems.push("Username already exists");
        }
        if data.repo.email_exists(&form.email).await? {
            problems.push("Email address is already registered");
        }
    }
    if !problems.is_empty() {
        return Err(AppError::invalid(problems.join("; ")).into());
    }

    let first_name = sanitize_line(&form.first_name);
    let last_name = sanitize_line(&form.last_name);
    let new_user = NewUser {
        username: form.username.trim().to_string(),
        email: form.email.trim().to_string(),
        display_name: format!("{first_name} {last_name}"),
        password_hash: data.auth.hash_password(&form.password)?,
        role: Role::TrailAgent,
    };
    let user_id = data.repo.create_user(&new_user).await?;

    let welcome = notices::welcome(
        &new_user.email,
        &first_name,
        &new_user.username,
        &format!("{}/outstanding", data.config.base_url),
    );
    if let Err(e) = data.notifier.send(&welcome).await {
        log::warn!("welcome notice for user #{user_id} not sent: {e:#}");
    }

    Ok(HttpResponse::Created().json(json!({
        "success": true,
        "user_id": user_id,
        "message": "Registration successful! You can now log in.",
    })))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(alias = "username", alias = "email")]
    pub login: String,
    pub password: String,
}

pub async fn login(
    data: web::Data<AppState>,
    session: Session,
    form: web::Json<LoginForm>,
) -> ApiResult<HttpResponse> {
    let form = form.into_inner();
    let bad_credentials = || AppError::Unauthorized("Invalid username or password".into());

    let user = data
        .repo
        .find_user_by_login(&form.login)
        .await?
        .ok_or_else(bad_credentials)?;
    if !data.auth.verify_password(&form.password, &user.password_hash).await {
        log::info!("failed login for {:?}", form.login.trim());
        return Err(bad_credentials().into());
    }

    let nonce = data.auth.issue_nonce();
    session::store(&session, &SessionUser::new(&user, nonce.clone()))?;
    log::info!("user #{} logged in", user.id);

    Ok(HttpResponse::Ok().json(json!({
        "success": true,
        "user": user_json(&user),
        "nonce": nonce,
    })))
}

pub async fn logout(session: Session, user: NonceUser) -> ApiResult<HttpResponse> {
    session.purge();
    log::info!("user #{} logged out", user.id);
    Ok(HttpResponse::Ok().json(json!({ "success": true })))
}

pub async fn me(
    data: web::Data<AppState>,
    session: Session,
    user: CurrentUser,
) -> ApiResult<HttpResponse> {
    let Some(stored) = data.repo.get_user(user.id).await? else {
        session.purge();
        return Err(AppError::Unauthorized("You must be logged in".into()).into());
    };
    Ok(HttpResponse::Ok().json(json!({
        "user": user_json(&stored),
        "nonce": user.nonce,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn form() -> RegisterForm {
        RegisterForm {
            username: "sam_lee".into(),
            email: "sam@example.org".into(),
            first_name: "Sam".into(),
            last_name: "Lee".into(),
            password: "correct horse".into(),
            password_confirm: "correct horse".into(),
            accept_terms: Some(json!(true)),
        }
    }

    #[test]
    fn a_complete_form_has_no_problems() {
        assert!(form().problems().is_empty());
    }

    #[test]
    fn each_rule_is_reported() {
        let bad = RegisterForm {
            username: "sam lee!".into(),
            email: "not-an-email".into(),
            first_name: "<b></b>".into(),
            password: "short".into(),
            password_confirm: "shorter".into(),
            accept_terms: Some(json!("0")),
            ..form()
        };
        assert_eq!(
            bad.problems(),
            vec![
                "Username may only contain letters, numbers, and underscores",
                "Please enter a valid email address",
                "First name is required",
                "Password must be at least 8 characters long",
                "Passwords do not match",
                "You must agree to the terms and conditions",
            ]
        );
    }
}
