use std::borrow::Cow;

use serde::Deserialize;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::models::{NewAccount, NewItem, Priority, ProfileUpdate};

/// Body of `POST /api/items`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateItemInput {
    #[validate(required(message = "Required"), length(min = 1, max = 100))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub priority: Priority,
}

impl CreateItemInput {
    /// Only meaningful after `validate()` succeeded
    pub fn into_new_item(self) -> NewItem {
        NewItem {
            title: self.title.unwrap_or_default(),
            description: self.description,
            priority: self.priority,
        }
    }
}

/// Credentials for the JSON login endpoint
#[derive(Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(required(message = "Required"))]
    pub email: Option<String>,
    #[validate(required(message = "Required"))]
    pub password: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UserInput {
    #[validate(required(message = "Required"), email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[validate(
        required(message = "Required"),
        length(min = 8, message = "Password must be at least 8 characters")
    )]
    pub password: Option<String>,
    #[validate(length(min = 2, max = 50))]
    pub name: Option<String>,
}

/// Sign-up form: the user shape plus a confirmation that must match
#[derive(Debug, Clone, Deserialize)]
pub struct SignUpInput {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "confirmPassword")]
    pub confirm_password: Option<String>,
}

impl SignUpInput {
    fn user(&self) -> UserInput {
        UserInput {
            email: self.email.clone(),
            password: self.password.clone(),
            name: self.name.clone(),
        }
    }

    pub fn into_account(self) -> NewAccount {
        NewAccount {
            email: self.email.unwrap_or_default(),
            password: self.password.unwrap_or_default(),
            name: self.name,
        }
    }
}

impl Validate for SignUpInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = match self.user().validate() {
            Ok(()) => ValidationErrors::new(),
            Err(errors) => errors,
        };

        match &self.confirm_password {
            None => errors.add("confirmPassword", message_error("required", "Required")),
            Some(confirm) if self.password.as_ref() != Some(confirm) => {
                errors.add("confirmPassword", message_error("must_match", "Passwords don't match"))
            }
            Some(_) => {}
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

fn message_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Body of `PUT /api/profile`
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ProfileUpdateInput {
    #[validate(required(message = "Required"), length(min = 1, max = 100))]
    pub full_name: Option<String>,
    #[validate(url(message = "Invalid url"))]
    pub avatar_url: Option<String>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
}

impl ProfileUpdateInput {
    pub fn into_update(self) -> ProfileUpdate {
        ProfileUpdate {
            full_name: self.full_name.unwrap_or_default(),
            avatar_url: self.avatar_url,
            bio: self.bio,
        }
    }
}
