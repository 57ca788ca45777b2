use super::{Endpoint, RouteMethod, RouteSpec, RouteTable, Surface, user_routes};
use crate::{controllers::Controller, middleware::Middleware};

/// App Router
///
/// Routes registered directly on the application, between the API and the site.
pub fn app_routes() -> RouteTable {
    RouteTable {
        name: "app",
        mount: "",
        surface: Surface::Json,
        middleware: &[],
        routes: vec![
            RouteSpec::endpoint(RouteMethod::Post, "/user/uploadpicture", Endpoint::UploadUserPicture)
                .with(&[Middleware::Authenticate, Middleware::CheckGlobalPrivacySettings]),
        ],
    }
}

/// Site Router
///
/// Server-rendered pages at the root. Every page gets the header data built first,
/// except that logged-in users are redirected away from /login and /register before it.
/// Topic and category links without a slug are redirected to their canonical form.
pub fn site_routes() -> RouteTable {
    use Middleware::{AddSlug, Authenticate, GuestSearchingAllowed, RedirectToAccountIfLoggedIn};

    let mut routes = vec![
        RouteSpec::get("/", Controller::Home),
        RouteSpec::get("/login", Controller::Login).first(&[RedirectToAccountIfLoggedIn]),
        RouteSpec::get("/register", Controller::Register).first(&[RedirectToAccountIfLoggedIn]),
        RouteSpec::get("/confirm/:code", Controller::ConfirmEmail),
        RouteSpec::get("/outgoing", Controller::Outgoing),
        RouteSpec::get("/reset/:code?", Controller::Reset),
        RouteSpec::get("/search/:term?", Controller::Search).with(&[GuestSearchingAllowed]),
        RouteSpec::get("/404", Controller::NotFound),
        RouteSpec::get("/403", Controller::Forbidden),
        RouteSpec::get("/500", Controller::ServerError),
        RouteSpec::get("/popular/:set?", Controller::Popular),
        RouteSpec::get("/recent/:term?", Controller::Recent),
        RouteSpec::get("/notifications", Controller::Notifications).with(&[Authenticate]),
        RouteSpec::get("/unread", Controller::Unread).with(&[Authenticate]),
        RouteSpec::get("/unread/total", Controller::UnreadTotal).with(&[Authenticate]),
        RouteSpec::get("/topic/:topic_id/:slug?", Controller::Topic).with(&[AddSlug]),
        RouteSpec::get("/category/:category_id/:slug?", Controller::Category).with(&[AddSlug]),
    ];
    routes.extend(user_routes());

    RouteTable {
        name: "site",
        mount: "",
        surface: Surface::Page,
        middleware: &[Middleware::BuildHeader],
        routes,
    }
}
