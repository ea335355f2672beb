//! Form actions behind the login, sign-up and sign-out pages.
//!
//! Each action finishes with a redirect. A successful change of session
//! revalidates the whole page tree so cached pages are re-rendered.

use std::collections::HashMap;

use axum::{
    extract::{Extension, Form, State},
    http::{header::SET_COOKIE, StatusCode},
    response::{AppendHeaders, Html, IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{error, info, warn};

use crate::app::{paths, AppState};
use crate::backend::Caller;
use crate::cache::RevalidateScope;
use crate::middleware::session::{clear_session_cookies, session_cookies};
use crate::validation::{parse, SignUpInput};
use crate::views::{self, SignUpForm};

#[derive(Debug, Default, Deserialize)]
pub struct SignInForm {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

/// POST /login
pub async fn sign_in(State(state): State<AppState>, Form(form): Form<SignInForm>) -> Response {
    let session = match state
        .backend
        .auth
        .sign_in_with_password(&form.email, &form.password)
        .await
    {
        Ok(session) => session,
        Err(e) => {
            warn!("Sign-in failed for {}: {}", form.email, e);
            return Redirect::to(paths::ERROR).into_response();
        }
    };

    info!("Signed in {}", session.user.email);
    state.pages.revalidate_path(paths::HOME, RevalidateScope::Layout).await;

    let [access, refresh] = session_cookies(&session, &state.config.security);
    (
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        Redirect::to(paths::DASHBOARD),
    )
        .into_response()
}

/// Form fields as a JSON object; blank fields count as absent
fn form_object(fields: &HashMap<String, String>) -> Value {
    let object: Map<String, Value> = fields
        .iter()
        .filter(|(_, value)| !value.trim().is_empty())
        .map(|(key, value)| (key.clone(), Value::String(value.clone())))
        .collect();
    Value::Object(object)
}

/// POST /signup
pub async fn sign_up(State(state): State<AppState>, Form(fields): Form<HashMap<String, String>>) -> Response {
    let input = match parse::<SignUpInput>(form_object(&fields)) {
        Ok(input) => input,
        Err(issues) => {
            let form = SignUpForm {
                email: fields.get("email").map(String::as_str).unwrap_or(""),
                name: fields.get("name").map(String::as_str).unwrap_or(""),
            };
            return (StatusCode::BAD_REQUEST, Html(views::signup(&form, &issues))).into_response();
        }
    };

    match state.backend.auth.sign_up(input.into_account()).await {
        Ok(user) => {
            info!("Registered {}", user.email);
            state.pages.revalidate_path(paths::HOME, RevalidateScope::Layout).await;
            Redirect::to(paths::HOME).into_response()
        }
        Err(e) => {
            warn!("Sign-up failed: {}", e);
            Redirect::to(paths::ERROR).into_response()
        }
    }
}

/// POST /logout
pub async fn sign_out(State(state): State<AppState>, caller: Option<Extension<Caller>>) -> Response {
    if let Some(Extension(caller)) = caller {
        match state.backend.auth.sign_out(&caller.access_token).await {
            Ok(()) => info!("Signed out {}", caller.user.email),
            Err(e) => error!("Sign-out failed for {}: {}", caller.user.email, e),
        }
    }

    state.pages.revalidate_path(paths::HOME, RevalidateScope::Layout).await;

    let [access, refresh] = clear_session_cookies(&state.config.security);
    (
        AppendHeaders([(SET_COOKIE, access), (SET_COOKIE, refresh)]),
        Redirect::to(paths::LOGIN),
    )
        .into_response()
}
