//! Route table of the Blog Social app
//!
//! Structure only: a root switch between the auth flow and the main tabs,
//! five tabs, and a stack of screens per tab. Route parameters are typed.

use serde::{Deserialize, Serialize};

/// Top-level navigation root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RootRoute {
    /// Login / registration flow
    Auth,
    /// Tabbed main application
    Main,
}

impl RootRoute {
    pub fn name(&self) -> &'static str {
        match self {
            RootRoute::Auth => "Auth",
            RootRoute::Main => "Main",
        }
    }
}

impl std::fmt::Display for RootRoute {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthRoute {
    Login,
    Register,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum HomeRoute {
    Feed,
    PostDetail { post_id: u64 },
    UserProfile { user_id: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExploreRoute {
    Search,
    TagPosts { tag_id: u64, tag_name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CreateRoute {
    CreatePost,
    PostPreview { title: String, content: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationsRoute {
    NotificationsList,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProfileRoute {
    MyProfile,
    EditProfile,
    Settings,
}

/// Bottom tabs of the main flow, in display order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MainTab {
    Home,
    Explore,
    Create,
    Notifications,
    Profile,
}

impl MainTab {
    pub const ALL: [MainTab; 5] = [
        MainTab::Home,
        MainTab::Explore,
        MainTab::Create,
        MainTab::Notifications,
        MainTab::Profile,
    ];

    pub fn title(&self) -> &'static str {
        match self {
            MainTab::Home => "Home",
            MainTab::Explore => "Explore",
            MainTab::Create => "Create",
            MainTab::Notifications => "Notifications",
            MainTab::Profile => "Profile",
        }
    }

    /// Screen shown when the tab is first opened
    pub fn initial_route(&self) -> Route {
        match self {
            MainTab::Home => Route::Home(HomeRoute::Feed),
            MainTab::Explore => Route::Explore(ExploreRoute::Search),
            MainTab::Create => Route::Create(CreateRoute::CreatePost),
            MainTab::Notifications => Route::Notifications(NotificationsRoute::NotificationsList),
            MainTab::Profile => Route::Profile(ProfileRoute::MyProfile),
        }
    }
}

/// Any screen in the app
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Route {
    Auth(AuthRoute),
    Home(HomeRoute),
    Explore(ExploreRoute),
    Create(CreateRoute),
    Notifications(NotificationsRoute),
    Profile(ProfileRoute),
}

impl Route {
    /// Root the screen belongs to
    pub fn root(&self) -> RootRoute {
        match self {
            Route::Auth(_) => RootRoute::Auth,
            _ => RootRoute::Main,
        }
    }

    /// Tab the screen belongs to, if it is part of the main flow
    pub fn tab(&self) -> Option<MainTab> {
        match self {
            Route::Auth(_) => None,
            Route::Home(_) => Some(MainTab::Home),
            Route::Explore(_) => Some(MainTab::Explore),
            Route::Create(_) => Some(MainTab::Create),
            Route::Notifications(_) => Some(MainTab::Notifications),
            Route::Profile(_) => Some(MainTab::Profile),
        }
    }
}

impl RootRoute {
    /// First screen mounted under this root
    pub fn initial_route(&self) -> Route {
        match self {
            RootRoute::Auth => Route::Auth(AuthRoute::Login),
            RootRoute::Main => MainTab::Home.initial_route(),
        }
    }
}
