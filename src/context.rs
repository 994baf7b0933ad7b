//! Caller identity carried through every registry operation.

use crate::{
    model::{AccessRecord, Image},
    policy,
};

/// Role name that grants administrative rights.
pub const ADMIN_ROLE: &str = "admin";

/// Who is calling, as established by the authentication layer in front of
/// the service.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    /// Tenant the caller acts for. `None` for anonymous callers.
    pub tenant: Option<String>,
    pub user: Option<String>,
    pub roles: Vec<String>,
    pub is_admin: bool,
}

impl RequestContext {
    /// A regular, non-admin caller acting for `tenant`.
    pub fn new<S: Into<String>>(tenant: S) -> Self {
        Self {
            tenant: Some(tenant.into()),
            ..Default::default()
        }
    }

    /// A caller without a tenant. It can only see public images.
    pub fn anonymous() -> Self {
        Self::default()
    }

    /// An administrative caller without a tenant, used by the management CLI.
    pub fn admin() -> Self {
        Self {
            roles: vec![ADMIN_ROLE.to_string()],
            is_admin: true,
            ..Default::default()
        }
    }

    pub fn with_user<S: Into<String>>(mut self, user: S) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Replaces the role list; the admin flag follows the presence of [`ADMIN_ROLE`].
    pub fn with_roles<T: IntoIterator<Item = String>>(mut self, roles: T) -> Self {
        self.roles = roles.into_iter().collect();
        self.is_admin = self
            .roles
            .iter()
            .any(|r| r.eq_ignore_ascii_case(ADMIN_ROLE));
        self
    }

    pub fn owns(&self, image: &Image) -> bool {
        match (&self.tenant, &image.owner) {
            (Some(tenant), Some(owner)) => tenant == owner,
            _ => false,
        }
    }

    /// See [`policy::can_share`].
    pub fn is_image_sharable(&self, image: &Image, membership: Option<&AccessRecord>) -> bool {
        policy::can_share(self, image, membership)
    }
}
