use super::{Endpoint, RouteMethod, RouteSpec, RouteTable, Surface, user_routes};
use crate::{controllers::Controller, middleware::Middleware};

/// Public API Router
///
/// JSON mirror of the site under `/api`, plus the upload and helper endpoints. Every
/// request refreshes the session user's last-online time and is marked as an API request.
///
/// Order matters: `/recent/posts/:term?` must precede `/recent/:term?`.
pub fn api_routes() -> RouteTable {
    use Middleware::{
        Authenticate, CheckGlobalPrivacySettings, GuestSearchingAllowed,
        RedirectToAccountIfLoggedIn,
    };

    let mut routes = vec![
        RouteSpec::get("/config", Controller::Config),
        RouteSpec::get("/user/uid/:uid", Controller::UserByUid).with(&[CheckGlobalPrivacySettings]),
        RouteSpec::endpoint(RouteMethod::Get, "/get_templates_listing", Endpoint::TemplatesListing),
        RouteSpec::endpoint(RouteMethod::Get, "/categories/:cid/moderators", Endpoint::Moderators),
        RouteSpec::endpoint(RouteMethod::Get, "/recent/posts/:term?", Endpoint::RecentPosts),
        RouteSpec::endpoint(RouteMethod::Post, "/post/upload", Endpoint::UploadPost),
        RouteSpec::endpoint(RouteMethod::Post, "/topic/thumb/upload", Endpoint::UploadThumb),
        // Page data
        RouteSpec::get("/home", Controller::Home),
        RouteSpec::get("/login", Controller::Login).with(&[RedirectToAccountIfLoggedIn]),
        RouteSpec::get("/register", Controller::Register).with(&[RedirectToAccountIfLoggedIn]),
        RouteSpec::get("/confirm/:code", Controller::ConfirmEmail),
        RouteSpec::get("/outgoing", Controller::Outgoing),
        RouteSpec::get("/search/:term?", Controller::Search).with(&[GuestSearchingAllowed]),
        RouteSpec::get("/reset/:code?", Controller::Reset),
        RouteSpec::get("/404", Controller::NotFound),
        RouteSpec::get("/403", Controller::Forbidden),
        RouteSpec::get("/500", Controller::ServerError),
        RouteSpec::get("/topic/:topic_id/:slug?", Controller::Topic),
        RouteSpec::get("/popular/:set?", Controller::Popular),
        RouteSpec::get("/recent/:term?", Controller::Recent),
        RouteSpec::get("/unread", Controller::Unread).with(&[Authenticate]),
        RouteSpec::get("/unread/total", Controller::UnreadTotal).with(&[Authenticate]),
        RouteSpec::get("/category/:category_id/:slug?", Controller::Category),
        RouteSpec::get("/notifications", Controller::Notifications).with(&[Authenticate]),
    ];
    routes.extend(user_routes());

    RouteTable {
        name: "api",
        mount: "/api",
        surface: Surface::Json,
        middleware: &[Middleware::UpdateLastOnlineTime, Middleware::PrepareApi],
        routes,
    }
}
