//! Controller identities and the seam to the controllers that produce page data.
//!
//! Route tables name controllers by `Controller` value. Two routes naming the same value
//! are aliases: they reach the same code with the same inputs.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Query},
    http::request::Parts,
};
use serde::Serialize;
use serde_json::{Value, json};

use crate::{
    auth::{CurrentUser, SessionUser},
    config::AppConfig,
    error::ForumError,
    forum::ForumState,
    middleware::ApiRequest,
    routes::RouteParams,
    views::PageHeader,
};

/// Controller
///
/// Every controller reachable from the site, API and admin route tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Controller {
    // Core
    Home,
    Login,
    Register,
    ConfirmEmail,
    Outgoing,
    Reset,
    Search,
    Config,
    // Static
    NotFound,
    Forbidden,
    ServerError,
    // Categories
    Popular,
    Recent,
    Unread,
    UnreadTotal,
    Category,
    // Topics
    Topic,
    // Accounts
    Notifications,
    Account,
    UserByUid,
    Following,
    Followers,
    AccountPosts,
    AccountTopics,
    Favourites,
    AccountEdit,
    AccountSettings,
    // Users
    OnlineUsers,
    UsersByPosts,
    UsersByReputation,
    UsersByJoinDate,
    UsersSearch,
    // Admin
    AdminHome,
    AdminPlugins,
    AdminSettings,
    AdminThemes,
    AdminLanguages,
    AdminGroups,
    AdminSounds,
    AdminUsersSearch,
    AdminUsersByJoinDate,
    AdminUsersByPosts,
    AdminUsersByReputation,
    AdminCategoriesActive,
    AdminCategoriesDisabled,
    AdminDatabase,
    AdminEvents,
}

impl Controller {
    /// Qualified controller name, as shown in route dumps and logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Login => "login",
            Self::Register => "register",
            Self::ConfirmEmail => "confirmEmail",
            Self::Outgoing => "outgoing",
            Self::Reset => "reset",
            Self::Search => "search",
            Self::Config => "api.getConfig",
            Self::NotFound => "static.404",
            Self::Forbidden => "static.403",
            Self::ServerError => "static.500",
            Self::Popular => "categories.popular",
            Self::Recent => "categories.recent",
            Self::Unread => "categories.unread",
            Self::UnreadTotal => "categories.unreadTotal",
            Self::Category => "categories.get",
            Self::Topic => "topics.get",
            Self::Notifications => "accounts.getNotifications",
            Self::Account => "accounts.getAccount",
            Self::UserByUid => "accounts.getUserByUID",
            Self::Following => "accounts.getFollowing",
            Self::Followers => "accounts.getFollowers",
            Self::AccountPosts => "accounts.getPosts",
            Self::AccountTopics => "accounts.getTopics",
            Self::Favourites => "accounts.getFavourites",
            Self::AccountEdit => "accounts.accountEdit",
            Self::AccountSettings => "accounts.accountSettings",
            Self::OnlineUsers => "users.getOnlineUsers",
            Self::UsersByPosts => "users.getUsersSortedByPosts",
            Self::UsersByReputation => "users.getUsersSortedByReputation",
            Self::UsersByJoinDate => "users.getUsersSortedByJoinDate",
            Self::UsersSearch => "users.getUsersForSearch",
            Self::AdminHome => "admin.home",
            Self::AdminPlugins => "admin.plugins.get",
            Self::AdminSettings => "admin.settings.get",
            Self::AdminThemes => "admin.themes.get",
            Self::AdminLanguages => "admin.languages.get",
            Self::AdminGroups => "admin.groups.get",
            Self::AdminSounds => "admin.sounds.get",
            Self::AdminUsersSearch => "admin.users.search",
            Self::AdminUsersByJoinDate => "admin.users.sortByJoinDate",
            Self::AdminUsersByPosts => "admin.users.sortByPosts",
            Self::AdminUsersByReputation => "admin.users.sortByReputation",
            Self::AdminCategoriesActive => "admin.categories.active",
            Self::AdminCategoriesDisabled => "admin.categories.disabled",
            Self::AdminDatabase => "admin.database.get",
            Self::AdminEvents => "admin.events.get",
        }
    }

    /// Template rendered for the page form of this controller.
    pub fn template(self) -> &'static str {
        match self {
            Self::Home => "home",
            Self::Login => "login",
            Self::Register => "register",
            Self::ConfirmEmail => "confirm",
            Self::Outgoing => "outgoing",
            Self::Reset => "reset",
            Self::Search => "search",
            Self::Config => "config",
            Self::NotFound => "404",
            Self::Forbidden => "403",
            Self::ServerError => "500",
            Self::Popular => "popular",
            Self::Recent => "recent",
            Self::Unread | Self::UnreadTotal => "unread",
            Self::Category => "category",
            Self::Topic => "topic",
            Self::Notifications => "notifications",
            Self::Account | Self::UserByUid => "account/profile",
            Self::Following => "account/following",
            Self::Followers => "account/followers",
            Self::AccountPosts => "account/posts",
            Self::AccountTopics => "account/topics",
            Self::Favourites => "account/favourites",
            Self::AccountEdit => "account/edit",
            Self::AccountSettings => "account/settings",
            Self::OnlineUsers
            | Self::UsersByPosts
            | Self::UsersByReputation
            | Self::UsersByJoinDate
            | Self::UsersSearch => "users",
            Self::AdminHome => "admin/index",
            Self::AdminPlugins => "admin/plugins",
            Self::AdminSettings => "admin/settings",
            Self::AdminThemes => "admin/themes",
            Self::AdminLanguages => "admin/languages",
            Self::AdminGroups => "admin/groups",
            Self::AdminSounds => "admin/sounds",
            Self::AdminUsersSearch
            | Self::AdminUsersByJoinDate
            | Self::AdminUsersByPosts
            | Self::AdminUsersByReputation => "admin/users",
            Self::AdminCategoriesActive | Self::AdminCategoriesDisabled => "admin/categories",
            Self::AdminDatabase => "admin/database",
            Self::AdminEvents => "admin/events",
        }
    }
}

/// RequestContext
///
/// Everything a controller may look at: captured path params, the query string, the
/// session and whether the request came through the API surface.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestContext {
    pub params: HashMap<String, String>,
    pub query: HashMap<String, String>,
    pub user: Option<SessionUser>,
    pub is_api: bool,
    #[serde(skip)]
    pub header: Option<PageHeader>,
}

impl RequestContext {
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    pub fn uid(&self) -> u64 {
        self.user.as_ref().map_or(0, |user| user.uid)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Ok(RouteParams(params)) = RouteParams::from_request_parts(parts, state).await;
        let params = params.into_iter().collect();
        let query = Query::<HashMap<String, String>>::try_from_uri(&parts.uri)
            .map(|Query(query)| query)
            .unwrap_or_default();
        let CurrentUser(user) = parts
            .extensions
            .get::<CurrentUser>()
            .cloned()
            .unwrap_or_default();

        Ok(Self {
            params,
            query,
            user,
            is_api: parts.extensions.get::<ApiRequest>().is_some(),
            header: parts.extensions.get::<PageHeader>().cloned(),
        })
    }
}

/// Controllers
///
/// Produces the data for a page or API response. Site routes render the value through
/// the view renderer; API routes return it as JSON.
#[async_trait]
pub trait Controllers: Send + Sync {
    async fn handle(&self, controller: Controller, ctx: &RequestContext) -> Result<Value, ForumError>;
}

pub type ControllerState = Arc<dyn Controllers>;

/// DefaultControllers
///
/// Controllers backed only by the forum service and the configuration. Pages without
/// dedicated data echo their template, params and session state.
pub struct DefaultControllers {
    forum: ForumState,
    config: AppConfig,
}

impl DefaultControllers {
    pub fn new(forum: ForumState, config: AppConfig) -> Self {
        Self { forum, config }
    }

    fn client_config(&self, ctx: &RequestContext) -> Value {
        let uploads = &self.config.uploads;
        json!({
            "relative_path": self.config.relative_path,
            "siteTitle": self.config.site_title,
            "allowFileUploads": uploads.allow_file_uploads,
            "allowTopicsThumbnail": uploads.allow_topics_thumbnail,
            "maximumFileSize": uploads.maximum_file_size_kb,
            "privateUserInfo": self.config.private_user_info,
            "allowGuestSearching": self.config.allow_guest_searching,
            "loggedIn": ctx.user.is_some(),
        })
    }
}

#[async_trait]
impl Controllers for DefaultControllers {
    async fn handle(&self, controller: Controller, ctx: &RequestContext) -> Result<Value, ForumError> {
        match controller {
            Controller::Config => Ok(self.client_config(ctx)),
            Controller::UserByUid => {
                let uid = ctx
                    .param("uid")
                    .and_then(|uid| uid.parse().ok())
                    .ok_or(ForumError::InvalidData)?;
                let user = self.forum.get_user(uid).await.ok_or(ForumError::NotFound)?;
                serde_json::to_value(user).map_err(|e| ForumError::Internal(e.to_string()))
            }
            _ => Ok(json!({
                "template": controller.template(),
                "params": ctx.params,
                "query": ctx.query,
                "loggedIn": ctx.user.is_some(),
                "isAPI": ctx.is_api,
            })),
        }
    }
}
