use crate::context::RequestContext;
use axum::{extract::FromRequestParts, http::request::Parts};
use std::convert::Infallible;

pub const TENANT_HEADER: &str = "x-tenant-id";
pub const USER_HEADER: &str = "x-user-id";
/// Comma separated role names.
pub const ROLES_HEADER: &str = "x-roles";

/// Builds the caller's context from the identity headers set by the
/// authenticating proxy. Requests without a tenant are anonymous.
impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(String::from)
        };

        let mut ctx = match header(TENANT_HEADER) {
            Some(tenant) => RequestContext::new(tenant),
            None => RequestContext::anonymous(),
        };

        if let Some(user) = header(USER_HEADER) {
            ctx = ctx.with_user(user);
        }

        if let Some(roles) = header(ROLES_HEADER) {
            ctx = ctx.with_roles(
                roles
                    .split(',')
                    .map(str::trim)
                    .filter(|r| !r.is_empty())
                    .map(String::from)
                    .collect::<Vec<_>>(),
            );
        }

        Ok(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::{ROLES_HEADER, TENANT_HEADER, USER_HEADER};
    use crate::context::RequestContext;
    use axum::{extract::FromRequestParts, http::Request};

    async fn extract(request: Request<()>) -> RequestContext {
        let (mut parts, _) = request.into_parts();
        RequestContext::from_request_parts(&mut parts, &())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_context_from_headers() {
        let ctx = extract(
            Request::builder()
                .header(TENANT_HEADER, "tenant1")
                .header(USER_HEADER, "alice")
                .header(ROLES_HEADER, "member, Admin")
                .body(())
                .unwrap(),
        )
        .await;

        assert_eq!(Some("tenant1".to_string()), ctx.tenant);
        assert_eq!(Some("alice".to_string()), ctx.user);
        assert_eq!(vec!["member", "Admin"], ctx.roles);
        assert!(ctx.is_admin);
    }

    #[tokio::test]
    async fn test_anonymous_context() {
        let ctx = extract(
            Request::builder()
                .header(TENANT_HEADER, "  ")
                .body(())
                .unwrap(),
        )
        .await;

        assert_eq!(RequestContext::anonymous(), ctx);
    }
}
