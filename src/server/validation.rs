use crate::server::response::ApiError;

const MAX_USERNAME_LEN: usize = 32;
const MAX_EMAIL_LEN: usize = 254;
const MIN_PASSWORD_LEN: usize = 6;
const MAX_TITLE_LEN: usize = 200;
const MAX_GROUP_NAME_LEN: usize = 100;

fn is_valid_username_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.is_empty() {
        return Err(ApiError::bad_request("Username cannot be empty"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Username cannot exceed {MAX_USERNAME_LEN} characters"
        )));
    }
    if !username.chars().all(is_valid_username_char) {
        return Err(ApiError::bad_request(
            "Username can only contain alphanumeric characters, hyphens, and underscores",
        ));
    }
    if username.starts_with('-') || username.starts_with('_') {
        return Err(ApiError::bad_request(
            "Username cannot start with a hyphen or underscore",
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ApiError> {
    if email.is_empty() {
        return Err(ApiError::bad_request("Email cannot be empty"));
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(ApiError::bad_request(format!(
            "Email cannot exceed {MAX_EMAIL_LEN} characters"
        )));
    }
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
        _ => Err(ApiError::bad_request("Email is not valid")),
    }
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_task_title(title: &str) -> Result<(), ApiError> {
    if title.trim().is_empty() {
        return Err(ApiError::bad_request("Task title is required"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(ApiError::bad_request(format!(
            "Task title cannot exceed {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

pub fn validate_group_name(name: &str) -> Result<(), ApiError> {
    if name.trim().is_empty() {
        return Err(ApiError::bad_request("Group name is required"));
    }
    if name.len() > MAX_GROUP_NAME_LEN {
        return Err(ApiError::bad_request(format!(
            "Group name cannot exceed {MAX_GROUP_NAME_LEN} characters"
        )));
    }
    Ok(())
}
