//! Who may see, change and share an image.
//!
//! `membership` is always the caller's own access record for the image, if
//! any. Deleted records never grant anything.

use crate::{
    context::RequestContext,
    model::{AccessRecord, Image},
};

fn active(membership: Option<&AccessRecord>) -> Option<&AccessRecord> {
    membership.filter(|m| !m.deleted)
}

/// Whether `ctx` may see `image` at all.
pub fn is_image_visible(
    ctx: &RequestContext,
    image: &Image,
    membership: Option<&AccessRecord>,
) -> bool {
    if ctx.is_admin {
        return true;
    }

    // Images without an owner belong to everybody.
    if image.owner.is_none() || image.visibility.is_public() {
        return true;
    }

    if ctx.tenant.is_none() {
        return false;
    }

    ctx.owns(image) || active(membership).is_some()
}

/// Whether `ctx` may change or delete `image`.
pub fn is_image_mutable(ctx: &RequestContext, image: &Image) -> bool {
    if ctx.is_admin {
        return true;
    }

    ctx.owns(image)
}

/// Whether `ctx` may grant other tenants access to `image`.
///
/// Admins and owners always may; a member may only when its grant carries
/// `can_share`.
pub fn can_share(ctx: &RequestContext, image: &Image, membership: Option<&AccessRecord>) -> bool {
    if ctx.is_admin {
        return true;
    }

    if ctx.tenant.is_none() {
        return false;
    }

    if ctx.owns(image) {
        return true;
    }

    active(membership).is_some_and(|m| m.can_share)
}

#[cfg(test)]
mod tests {
    use super::{can_share, is_image_mutable, is_image_visible};
    use crate::{
        context::RequestContext,
        model::{AccessRecord, Image, ImageStatus, Properties, Visibility},
    };
    use chrono::Utc;

    fn image(owner: Option<&str>, visibility: Visibility) -> Image {
        let now = Utc::now();
        Image {
            id: "image".to_string(),
            name: None,
            owner: owner.map(String::from),
            status: ImageStatus::Active,
            visibility,
            size: None,
            checksum: None,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
            properties: Properties::new(),
        }
    }

    fn member(tenant: &str, can_share: bool, deleted: bool) -> AccessRecord {
        let now = Utc::now();
        AccessRecord {
            image_id: "image".to_string(),
            member: tenant.to_string(),
            can_share,
            deleted,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_visibility() {
        let private = image(Some("owner"), Visibility::Private);
        let public = image(Some("owner"), Visibility::Public);
        let unowned = image(None, Visibility::Private);

        let owner = RequestContext::new("owner");
        let stranger = RequestContext::new("stranger");
        let anonymous = RequestContext::anonymous();

        assert!(is_image_visible(&owner, &private, None));
        assert!(is_image_visible(&RequestContext::admin(), &private, None));
        assert!(!is_image_visible(&stranger, &private, None));
        assert!(!is_image_visible(&anonymous, &private, None));
        assert!(is_image_visible(&anonymous, &public, None));
        assert!(is_image_visible(&stranger, &unowned, None));

        let grant = member("stranger", false, false);
        assert!(is_image_visible(&stranger, &private, Some(&grant)));

        let revoked = member("stranger", true, true);
        assert!(!is_image_visible(&stranger, &private, Some(&revoked)));
    }

    #[test]
    fn test_can_share() {
        let private = image(Some("owner"), Visibility::Private);

        assert!(can_share(&RequestContext::new("owner"), &private, None));
        assert!(can_share(&RequestContext::admin(), &private, None));
        assert!(!can_share(&RequestContext::anonymous(), &private, None));

        let stranger = RequestContext::new("stranger");
        assert!(!can_share(&stranger, &private, None));
        assert!(!can_share(
            &stranger,
            &private,
            Some(&member("stranger", false, false))
        ));
        assert!(can_share(
            &stranger,
            &private,
            Some(&member("stranger", true, false))
        ));
        assert!(!can_share(
            &stranger,
            &private,
            Some(&member("stranger", true, true))
        ));
    }

    #[test]
    fn test_public_images_are_not_sharable_by_strangers() {
        let public = image(Some("owner"), Visibility::Public);

        assert!(!can_share(&RequestContext::new("stranger"), &public, None));
        assert!(!is_image_mutable(&RequestContext::new("stranger"), &public));
        assert!(is_image_mutable(&RequestContext::new("owner"), &public));
    }
}
