//! # Page Shells
//!
//! Minimal server-rendered pages. The public ones exist so the edge gate's
//! allowlist has a real surface; the protected ones sit behind both the gate
//! and the render guard.

use axum::response::Html;

use crate::guard::PageSession;

fn shell(title: &str, body: &str) -> Html<String> {
    Html(format!(
        "<!doctype html><html><head><title>{title} · botdesk</title></head>\
         <body><main><h1>{title}</h1>{body}</main></body></html>",
        title = title,
        body = body,
    ))
}

/// Protected dashboard landing page.
pub async fn dashboard(PageSession(session): PageSession) -> Html<String> {
    shell(
        "Dashboard",
        &format!("<p>Signed in as {}</p>", session.user.email),
    )
}

/// Protected knowledge overview, the post-submission landing target.
pub async fn knowledge(PageSession(_session): PageSession) -> Html<String> {
    shell("Knowledge", "<p>Training sources for the selected chatbot.</p>")
}

pub async fn login() -> Html<String> {
    shell("Log in", "<form method=\"post\" action=\"/api/auth/sign-in\"></form>")
}

pub async fn signup() -> Html<String> {
    shell("Sign up", "<p>Create an account.</p>")
}

pub async fn signup_form() -> Html<String> {
    shell("Sign up", "<form method=\"post\" action=\"/api/auth/sign-up\"></form>")
}

pub async fn forgot_password() -> Html<String> {
    shell(
        "Forgot password",
        "<form method=\"post\" action=\"/api/auth/reset-password\"></form>",
    )
}
