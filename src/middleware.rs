//! Request guards and decorators attached to routes by the route tables.
//!
//! Each `Middleware` value names one `from_fn` middleware below. Route tables list them in
//! execution order; `Middleware::apply` wraps a route so that order is preserved and every
//! guard runs before the route's handler.

use axum::{
    extract::{Request, State},
    middleware::{Next, from_fn, from_fn_with_state},
    response::{IntoResponse, Redirect, Response},
    routing::MethodRouter,
};
use chrono::Utc;
use serde::Serialize;

use crate::{
    AppState, auth::CurrentUser, error::ForumError, routes::RouteParams, views::PageHeader,
};

/// Marker inserted by `prepare_api`; controllers see it as `RequestContext::is_api`.
#[derive(Clone, Copy, Debug)]
pub struct ApiRequest;

/// Middleware
///
/// The middleware vocabulary of the route tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Middleware {
    IsAdmin,
    AdminBuildHeader,
    Authenticate,
    CheckGlobalPrivacySettings,
    CheckAccountPermissions,
    RedirectToAccountIfLoggedIn,
    GuestSearchingAllowed,
    AddSlug,
    BuildHeader,
    UpdateLastOnlineTime,
    PrepareApi,
}

impl Middleware {
    pub fn name(self) -> &'static str {
        match self {
            Self::IsAdmin => "admin.isAdmin",
            Self::AdminBuildHeader => "admin.buildHeader",
            Self::Authenticate => "authenticate",
            Self::CheckGlobalPrivacySettings => "checkGlobalPrivacySettings",
            Self::CheckAccountPermissions => "checkAccountPermissions",
            Self::RedirectToAccountIfLoggedIn => "redirectToAccountIfLoggedIn",
            Self::GuestSearchingAllowed => "guestSearchingAllowed",
            Self::AddSlug => "addSlug",
            Self::BuildHeader => "buildHeader",
            Self::UpdateLastOnlineTime => "updateLastOnlineTime",
            Self::PrepareApi => "prepareAPI",
        }
    }

    /// Guards that can refuse a request for lack of a session or privilege.
    pub fn is_authorization(self) -> bool {
        matches!(
            self,
            Self::IsAdmin
                | Self::Authenticate
                | Self::CheckGlobalPrivacySettings
                | Self::CheckAccountPermissions
                | Self::GuestSearchingAllowed
        )
    }

    /// Wraps `route` with this middleware. The layer applied last runs first, so callers
    /// apply a chain in reverse.
    pub fn apply(self, route: MethodRouter<AppState>, state: &AppState) -> MethodRouter<AppState> {
        let state = state.clone();
        match self {
            Self::IsAdmin => route.route_layer(from_fn(is_admin)),
            Self::AdminBuildHeader => route.route_layer(from_fn_with_state(state, admin_build_header)),
            Self::Authenticate => route.route_layer(from_fn(authenticate)),
            Self::CheckGlobalPrivacySettings => {
                route.route_layer(from_fn_with_state(state, check_global_privacy_settings))
            }
            Self::CheckAccountPermissions => route.route_layer(from_fn(check_account_permissions)),
            Self::RedirectToAccountIfLoggedIn => {
                route.route_layer(from_fn_with_state(state, redirect_to_account_if_logged_in))
            }
            Self::GuestSearchingAllowed => {
                route.route_layer(from_fn_with_state(state, guest_searching_allowed))
            }
            Self::AddSlug => route.route_layer(from_fn_with_state(state, add_slug)),
            Self::BuildHeader => route.route_layer(from_fn_with_state(state, build_header)),
            Self::UpdateLastOnlineTime => {
                route.route_layer(from_fn_with_state(state, update_last_online_time))
            }
            Self::PrepareApi => route.route_layer(from_fn(prepare_api)),
        }
    }
}

// --- Authorization guards ---

pub async fn is_admin(
    current: CurrentUser,
    request: Request,
    next: Next,
) -> Result<Response, ForumError> {
    if !current.is_admin() {
        tracing::warn!(uid = current.uid(), path = %request.uri().path(), "admin route refused");
        return Err(ForumError::Forbidden);
    }
    Ok(next.run(request).await)
}

pub async fn authenticate(
    current: CurrentUser,
    request: Request,
    next: Next,
) -> Result<Response, ForumError> {
    if current.user().is_none() {
        return Err(ForumError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// Guests may not see user profiles or user lists when user info is private.
pub async fn check_global_privacy_settings(
    State(state): State<AppState>,
    current: CurrentUser,
    request: Request,
    next: Next,
) -> Result<Response, ForumError> {
    if state.config.private_user_info && current.user().is_none() {
        return Err(ForumError::Forbidden);
    }
    Ok(next.run(request).await)
}

/// Only the owner of `:userslug`, or an administrator, may continue.
pub async fn check_account_permissions(
    current: CurrentUser,
    params: RouteParams,
    request: Request,
    next: Next,
) -> Result<Response, ForumError> {
    let Some(user) = current.user() else {
        return Err(ForumError::Forbidden);
    };
    let owns = params
        .iter()
        .any(|(key, value)| key == "userslug" && value == user.userslug);

    if !owns && !user.is_admin {
        return Err(ForumError::Forbidden);
    }
    Ok(next.run(request).await)
}

pub async fn guest_searching_allowed(
    State(state): State<AppState>,
    current: CurrentUser,
    request: Request,
    next: Next,
) -> Result<Response, ForumError> {
    if !state.config.allow_guest_searching && current.user().is_none() {
        return Err(ForumError::Forbidden);
    }
    Ok(next.run(request).await)
}

// --- Redirects ---

/// Logged-in users asking for /login or /register are sent to their own profile.
pub async fn redirect_to_account_if_logged_in(
    State(state): State<AppState>,
    current: CurrentUser,
    request: Request,
    next: Next,
) -> Response {
    match current.user() {
        Some(user) => Redirect::to(&format!(
            "{}/user/{}",
            state.config.relative_path, user.userslug
        ))
        .into_response(),
        None => next.run(request).await,
    }
}

/// Redirects `/topic/5` (or `/category/5`) to its canonical slugged URL when the forum
/// knows a slug for it. Requests that already carry a slug pass through.
pub async fn add_slug(
    State(state): State<AppState>,
    params: RouteParams,
    request: Request,
    next: Next,
) -> Response {
    let mut kind = None;
    let mut has_slug = false;
    for (key, value) in params.iter() {
        match key {
            "topic_id" => kind = value.parse::<u64>().ok().map(|id| ("topic", id)),
            "category_id" => kind = value.parse::<u64>().ok().map(|id| ("category", id)),
            "slug" => has_slug = !value.is_empty(),
            _ => {}
        }
    }

    let Some((resource, id)) = kind.filter(|_| !has_slug) else {
        return next.run(request).await;
    };

    let slug = match resource {
        "topic" => state.forum.topic_slug(id).await,
        _ => state.forum.category_slug(id).await,
    };

    match slug {
        Some(slug) => Redirect::to(&format!(
            "{}/{}/{}/{}",
            state.config.relative_path, resource, id, slug
        ))
        .into_response(),
        None => next.run(request).await,
    }
}

// --- Decorators ---

pub async fn build_header(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut request: Request,
    next: Next,
) -> Response {
    request
        .extensions_mut()
        .insert(PageHeader::new(&state.config, user, false));
    next.run(request).await
}

pub async fn admin_build_header(
    State(state): State<AppState>,
    CurrentUser(user): CurrentUser,
    mut request: Request,
    next: Next,
) -> Response {
    request
        .extensions_mut()
        .insert(PageHeader::new(&state.config, user, true));
    next.run(request).await
}

pub async fn update_last_online_time(
    State(state): State<AppState>,
    current: CurrentUser,
    request: Request,
    next: Next,
) -> Response {
    if let Some(user) = current.user() {
        state.forum.update_last_online(user.uid, Utc::now()).await;
    }
    next.run(request).await
}

pub async fn prepare_api(mut request: Request, next: Next) -> Response {
    request.extensions_mut().insert(ApiRequest);
    next.run(request).await
}
