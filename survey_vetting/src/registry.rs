use std::collections::HashMap;

use serde::Serialize;

use crate::config::{Locale, UserId};

/// Survey user levels. Lower numeric levels carry more rights.
#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum UserLevel {
    Admin,
    Tc,
    Manager,
    Expert,
    Vetter,
    Street,
    Locked,
    Anonymous,
}

impl UserLevel {
    pub fn st_level(&self) -> u32 {
        match self {
            UserLevel::Admin => 0,
            UserLevel::Tc => 1,
            UserLevel::Manager => 2,
            UserLevel::Expert => 3,
            UserLevel::Vetter => 5,
            UserLevel::Anonymous => 8,
            UserLevel::Street => 10,
            UserLevel::Locked => 999,
        }
    }

    pub fn from_name(name: &str) -> Option<UserLevel> {
        match name.to_lowercase().as_str() {
            "admin" => Some(UserLevel::Admin),
            "tc" => Some(UserLevel::Tc),
            "manager" => Some(UserLevel::Manager),
            "expert" => Some(UserLevel::Expert),
            "vetter" => Some(UserLevel::Vetter),
            "street" => Some(UserLevel::Street),
            "locked" => Some(UserLevel::Locked),
            "anonymous" => Some(UserLevel::Anonymous),
            _ => None,
        }
    }
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub org: String,
    pub level: UserLevel,
    /// Locales this user may modify. Empty means all of them.
    pub locales: Vec<Locale>,
}

impl User {
    fn at_least(&self, level: UserLevel) -> bool {
        self.level.st_level() <= level.st_level()
    }

    pub fn is_admin(&self) -> bool {
        self.at_least(UserLevel::Admin)
    }

    pub fn is_tc(&self) -> bool {
        self.at_least(UserLevel::Tc)
    }

    pub fn is_expert(&self) -> bool {
        self.at_least(UserLevel::Expert)
    }

    pub fn is_vetter(&self) -> bool {
        self.at_least(UserLevel::Vetter)
    }

    pub fn is_street(&self) -> bool {
        self.at_least(UserLevel::Street)
    }

    pub fn is_locked(&self) -> bool {
        self.level == UserLevel::Locked
    }

    /// May vote and submit in any locale.
    pub fn can_submit_any_locale(&self) -> bool {
        self.is_tc() || (self.is_street() && self.locales.is_empty())
    }

    pub fn can_modify_locale(&self, locale: &Locale) -> bool {
        if !self.is_street() {
            return false;
        }
        self.can_submit_any_locale() || self.locales.iter().any(|l| l.covers(locale))
    }
}

/// The users known to the survey.
#[derive(Eq, PartialEq, Debug, Clone, Default)]
pub struct UserRegistry {
    users: HashMap<UserId, User>,
}

impl UserRegistry {
    pub fn new(users: Vec<User>) -> UserRegistry {
        UserRegistry {
            users: users.into_iter().map(|u| (u.id, u)).collect(),
        }
    }

    pub fn get(&self, id: UserId) -> Option<&User> {
        self.users.get(&id)
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
