//! Hypermedia links attached to every representation.

use serde::Serialize;

pub const IMAGE_SCHEMA_HREF: &str = "/v2/schemas/image";
pub const ACCESS_SCHEMA_HREF: &str = "/v2/schemas/image/access";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Link {
    pub rel: &'static str,
    pub href: String,
}

impl Link {
    fn new<S: Into<String>>(rel: &'static str, href: S) -> Self {
        Self {
            rel,
            href: href.into(),
        }
    }
}

/// `/v2/images/{id}`, or a subcollection of it.
pub fn image_href(image_id: &str, subcollection: Option<&str>) -> String {
    match subcollection {
        Some(sub) => format!("/v2/images/{image_id}/{sub}"),
        None => format!("/v2/images/{image_id}"),
    }
}

pub fn image_links(image_id: &str) -> Vec<Link> {
    vec![
        Link::new("self", image_href(image_id, None)),
        Link::new("file", image_href(image_id, Some("file"))),
        Link::new("describedby", IMAGE_SCHEMA_HREF),
    ]
}

/// `/v2/images/{id}/access`, or the record of one tenant under it.
pub fn access_href(image_id: &str, tenant: Option<&str>) -> String {
    let collection = image_href(image_id, Some("access"));
    match tenant {
        Some(tenant) => format!("{collection}/{tenant}"),
        None => collection,
    }
}

pub fn access_links(image_id: &str, tenant: &str) -> Vec<Link> {
    vec![
        Link::new("self", access_href(image_id, Some(tenant))),
        Link::new("describedby", ACCESS_SCHEMA_HREF),
    ]
}

pub fn schema_links() -> Vec<Link> {
    vec![
        Link::new("image", IMAGE_SCHEMA_HREF),
        Link::new("access", ACCESS_SCHEMA_HREF),
    ]
}

/// Link to the root of an API version on `base_url`.
pub fn version_link(base_url: &str, version: &str) -> Link {
    Link::new("self", format!("{}/{version}/", base_url.trim_end_matches('/')))
}

#[cfg(test)]
mod tests {
    use super::{access_href, image_href, version_link};

    #[test]
    fn test_hrefs() {
        assert_eq!("/v2/images/abc", image_href("abc", None));
        assert_eq!("/v2/images/abc/file", image_href("abc", Some("file")));
        assert_eq!("/v2/images/abc/access", access_href("abc", None));
        assert_eq!("/v2/images/abc/access/t1", access_href("abc", Some("t1")));
        assert_eq!(
            "http://localhost:9292/v2/",
            version_link("http://localhost:9292/", "v2").href
        );
    }
}
