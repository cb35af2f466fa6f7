use async_trait::async_trait;
use pgwire::api::auth::{AuthSource, LoginInfo, Password};
use pgwire::error::PgWireResult;
use ulid::Ulid;

use crate::model::Actor;

/// Shared-password source. The login user name carries the actor identity,
/// the password only gates access to the server.
#[derive(Debug)]
pub struct KinderSlotAuthSource {
    password: String,
}

impl KinderSlotAuthSource {
    pub fn new(password: String) -> Self {
        Self { password }
    }
}

#[async_trait]
impl AuthSource for KinderSlotAuthSource {
    async fn get_password(&self, login: &LoginInfo) -> PgWireResult<Password> {
        if login.user().as_ref().and_then(|u| parse_actor(u)).is_none() {
            metrics::counter!(crate::observability::AUTH_FAILURES_TOTAL).increment(1);
            tracing::debug!("login with unrecognized user {:?}", login.user());
        }
        Ok(Password::new(None, self.password.as_bytes().to_vec()))
    }
}

/// `admin`, `teacher:<ULID>` or `parent:<ULID>`.
pub fn parse_actor(user: &str) -> Option<Actor> {
    let user = user.trim();
    if user.eq_ignore_ascii_case("admin") {
        return Some(Actor::Admin);
    }
    let (role, id) = user.split_once(':')?;
    let id = Ulid::from_string(id.trim()).ok()?;
    match role.to_ascii_lowercase().as_str() {
        "teacher" => Some(Actor::Teacher(id)),
        "parent" => Some(Actor::Parent(id)),
        _ => None,
    }
}
