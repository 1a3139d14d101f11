//! Request identity and ownership checks.
//!
//! The server sits behind a front proxy that performs authentication and
//! forwards the verified identity in `x-shelf-user` / `x-shelf-role` headers.
//! The [`OwnershipGuard`] trait is the seam for swapping that scheme out;
//! handlers only ever see an [`Actor`].
//!
//! Authorization failures on hidden entities deliberately return 404 rather
//! than 403 so unprivileged callers cannot probe which ids exist.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use async_trait::async_trait;
use axum::extract::{Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use serde::{Deserialize, Serialize};
use shelf_core::LifecycleState;

pub const USER_HEADER: &str = "x-shelf-user";
pub const ROLE_HEADER: &str = "x-shelf-role";

/// Caller role, ordered by privilege.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Reader,
    Editor,
    Admin,
    SuperAdmin,
}

impl Role {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "reader" => Some(Self::Reader),
            "editor" => Some(Self::Editor),
            "admin" => Some(Self::Admin),
            "superadmin" => Some(Self::SuperAdmin),
            _ => None,
        }
    }
}

/// The authenticated caller, attached to every request as an extension.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: Option<i64>,
    pub role: Role,
}

impl Actor {
    pub fn anonymous() -> Self {
        Self {
            user_id: None,
            role: Role::Reader,
        }
    }

    /// Admins and super-admins see and edit everything.
    pub fn is_privileged(&self) -> bool {
        self.role >= Role::Admin
    }

    pub fn is_super_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// Whether the caller may modify an entity owned by `created_by`.
    pub fn can_edit(&self, created_by: Option<i64>) -> bool {
        if self.is_privileged() {
            return true;
        }
        if self.role < Role::Editor {
            return false;
        }
        match (self.user_id, created_by) {
            (Some(me), Some(owner)) => me == owner,
            // Ownerless entities are editable by any editor.
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Whether the caller may see an entity in the given state.
    pub fn can_see(&self, state: LifecycleState, created_by: Option<i64>) -> bool {
        if state.publicly_visible() {
            return true;
        }
        if !state.owner_visible() {
            // Purging entities are gone for everyone.
            return false;
        }
        self.is_privileged() || self.can_edit(created_by)
    }
}

/// Resolves the caller identity for a request.
#[async_trait]
pub trait OwnershipGuard: Send + Sync + 'static {
    async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<Actor>;
}

/// Header-trusting guard for deployment behind an authenticating proxy.
///
/// Absent headers mean an anonymous reader; present but malformed headers are
/// rejected rather than silently downgraded.
#[derive(Debug, Default)]
pub struct HeaderGuard;

#[async_trait]
impl OwnershipGuard for HeaderGuard {
    async fn authenticate(&self, headers: &HeaderMap) -> ApiResult<Actor> {
        let role = match headers.get(ROLE_HEADER) {
            None => Role::Reader,
            Some(value) => {
                let s = value
                    .to_str()
                    .map_err(|_| ApiError::Unauthorized("invalid role header".into()))?;
                Role::parse(s)
                    .ok_or_else(|| ApiError::Unauthorized(format!("unknown role: {s}")))?
            }
        };
        let user_id = match headers.get(USER_HEADER) {
            None => None,
            Some(value) => {
                let s = value
                    .to_str()
                    .map_err(|_| ApiError::Unauthorized("invalid user header".into()))?;
                let id = s
                    .parse::<i64>()
                    .map_err(|_| ApiError::Unauthorized(format!("invalid user id: {s}")))?;
                Some(id)
            }
        };
        Ok(Actor { user_id, role })
    }
}

/// Middleware that resolves the actor and stashes it in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let actor = state.guard.authenticate(request.headers()).await?;
    request.extensions_mut().insert(actor);
    Ok(next.run(request).await)
}
