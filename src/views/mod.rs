//! Server-rendered HTML for the page routes.
//!
//! Pages are plain strings; anything that came from a user goes through
//! [`escape_html`] first.

use crate::app::paths;
use crate::validation::FieldIssue;

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
</head>
<body>
<nav><a href="{home}">Home</a> <a href="{dashboard}">Dashboard</a> <a href="{profile}">Profile</a></nav>
<main>
{body}
</main>
</body>
</html>
"#,
        title = escape_html(title),
        home = paths::HOME,
        dashboard = paths::DASHBOARD,
        profile = paths::PROFILE,
        body = body,
    )
}

fn sign_out_form() -> String {
    format!(
        r#"<form method="post" action="{}"><button type="submit">Sign out</button></form>"#,
        paths::LOGOUT
    )
}

fn issue_list(issues: &[FieldIssue]) -> String {
    if issues.is_empty() {
        return String::new();
    }
    let entries: String = issues
        .iter()
        .map(|issue| {
            format!(
                r#"<li data-field="{field}">{message}</li>"#,
                field = escape_html(&issue.field),
                message = escape_html(&issue.message),
            )
        })
        .collect();
    format!(r#"<ul class="issues">{}</ul>"#, entries)
}

pub fn home() -> String {
    layout(
        "Items",
        &format!(
            r#"<h1>Items</h1>
<p>Keep track of what matters.</p>
<p><a href="{login}">Log in</a> or <a href="{signup}">create an account</a>.</p>"#,
            login = paths::LOGIN,
            signup = paths::SIGNUP,
        ),
    )
}

pub fn login() -> String {
    layout(
        "Log in",
        &format!(
            r#"<h1>Log in</h1>
<form method="post" action="{login}">
<label for="email">Email</label>
<input id="email" name="email" type="email" required>
<label for="password">Password</label>
<input id="password" name="password" type="password" required>
<button type="submit">Log in</button>
</form>
<p>No account? <a href="{signup}">Sign up</a></p>"#,
            login = paths::LOGIN,
            signup = paths::SIGNUP,
        ),
    )
}

/// Previously submitted sign-up values, echoed back when the form is re-shown
#[derive(Debug, Default)]
pub struct SignUpForm<'a> {
    pub email: &'a str,
    pub name: &'a str,
}

pub fn signup(form: &SignUpForm<'_>, issues: &[FieldIssue]) -> String {
    layout(
        "Sign up",
        &format!(
            r#"<h1>Sign up</h1>
{issues}
<form method="post" action="{signup}">
<label for="email">Email</label>
<input id="email" name="email" type="email" value="{email}" required>
<label for="name">Name</label>
<input id="name" name="name" type="text" value="{name}">
<label for="password">Password</label>
<input id="password" name="password" type="password" required>
<label for="confirmPassword">Confirm password</label>
<input id="confirmPassword" name="confirmPassword" type="password" required>
<button type="submit">Sign up</button>
</form>
<p>Already registered? <a href="{login}">Log in</a></p>"#,
            issues = issue_list(issues),
            signup = paths::SIGNUP,
            login = paths::LOGIN,
            email = escape_html(form.email),
            name = escape_html(form.name),
        ),
    )
}

pub fn error() -> String {
    layout(
        "Error",
        &format!(
            r#"<h1>Sorry, something went wrong</h1>
<p><a href="{}">Back to log in</a></p>"#,
            paths::LOGIN
        ),
    )
}

pub fn dashboard(email: &str) -> String {
    layout(
        "Dashboard",
        &format!(
            r#"<h1>Dashboard</h1>
<p>Signed in as <strong>{email}</strong></p>
{sign_out}"#,
            email = escape_html(email),
            sign_out = sign_out_form(),
        ),
    )
}

/// `display_name` is the profile's full name, or the account email when there is no profile
pub fn profile(display_name: &str) -> String {
    layout(
        "Profile",
        &format!(
            r#"<h1>Welcome {name}</h1>
{sign_out}"#,
            name = escape_html(display_name),
            sign_out = sign_out_form(),
        ),
    )
}
