use axum::{
    extract::{Extension, State},
    response::Html,
};
use tracing::warn;

use crate::app::{paths, AppState};
use crate::backend::Caller;
use crate::views::{self, SignUpForm};

// Public pages are cached until the next revalidation

pub async fn home(State(state): State<AppState>) -> Html<String> {
    Html(state.pages.get_or_render(paths::HOME, views::home).await)
}

pub async fn login(State(state): State<AppState>) -> Html<String> {
    Html(state.pages.get_or_render(paths::LOGIN, views::login).await)
}

pub async fn signup(State(state): State<AppState>) -> Html<String> {
    Html(
        state
            .pages
            .get_or_render(paths::SIGNUP, || views::signup(&SignUpForm::default(), &[]))
            .await,
    )
}

pub async fn error() -> Html<String> {
    Html(views::error())
}

pub async fn dashboard(Extension(caller): Extension<Caller>) -> Html<String> {
    Html(views::dashboard(&caller.user.email))
}

/// Greets by profile name, falling back to the email when there is no usable profile
pub async fn profile(State(state): State<AppState>, Extension(caller): Extension<Caller>) -> Html<String> {
    let name = match state.backend.store.select_profile(&caller).await {
        Ok(Some(profile)) => profile.full_name,
        Ok(None) => caller.user.email.clone(),
        Err(e) => {
            warn!("Profile lookup failed for {}: {}", caller.user.email, e);
            caller.user.email.clone()
        }
    };
    Html(views::profile(&name))
}
