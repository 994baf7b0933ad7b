//! Filters for listing images.
//!
//! An [`ImageQuery`] combines an optional tag/date expression, the deleted
//! filter, the caller's visibility [`Scope`] and pagination. It renders to SQL
//! for the database adapter and can be evaluated directly against records for
//! the in-memory registry.

use crate::{
    context::RequestContext,
    dialect::{CurrentDialect, Dialect},
    model::{Image, timestamp},
};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

/// Represents a logical tag-based query expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ImageQueryExpr {
    /// A single tag condition.
    Tag(String),

    /// Logical AND of two subexpressions.
    And(Box<ImageQueryExpr>, Box<ImageQueryExpr>),

    /// Logical OR of two subexpressions.
    Or(Box<ImageQueryExpr>, Box<ImageQueryExpr>),

    /// Logical NOT of a subexpression.
    Not(Box<ImageQueryExpr>),

    /// Created at or before the given instant.
    CreatedUntil(DateTime<Utc>),

    /// Created at or after the given instant.
    CreatedSince(DateTime<Utc>),
}

impl ImageQueryExpr {
    /// Creates a query expression from a single tag.
    pub fn tag<T: Into<String>>(tag: T) -> Self {
        ImageQueryExpr::Tag(tag.into())
    }

    /// Combines two expressions with a logical AND.
    pub fn and(self, other: ImageQueryExpr) -> Self {
        ImageQueryExpr::And(Box::new(self), Box::new(other))
    }

    /// Combines two expressions with a logical OR.
    pub fn or(self, other: ImageQueryExpr) -> Self {
        ImageQueryExpr::Or(Box::new(self), Box::new(other))
    }

    /// Negates a query expression.
    pub fn not(expr: ImageQueryExpr) -> Self {
        ImageQueryExpr::Not(Box::new(expr))
    }

    pub fn created_until(date: DateTime<Utc>) -> Self {
        ImageQueryExpr::CreatedUntil(date)
    }

    pub fn created_since(date: DateTime<Utc>) -> Self {
        ImageQueryExpr::CreatedSince(date)
    }

    /// Converts the query expression into an SQL condition and its bound parameters.
    ///
    /// Placeholders are numbered starting after the `offset` parameters that
    /// are already bound ahead of this expression.
    pub fn to_sql(&self, offset: usize) -> (String, Vec<String>) {
        let mut params = Vec::new();
        let sql = self.build_sql(offset, &mut params);
        (sql, params)
    }

    fn build_sql(&self, offset: usize, params: &mut Vec<String>) -> String {
        match self {
            ImageQueryExpr::Tag(tag) => {
                params.push(tag.clone());
                CurrentDialect::exists_tag_query(offset + params.len())
            }
            ImageQueryExpr::And(lhs, rhs) => {
                format!(
                    "({} AND {})",
                    lhs.build_sql(offset, params),
                    rhs.build_sql(offset, params)
                )
            }
            ImageQueryExpr::Or(lhs, rhs) => {
                format!(
                    "({} OR {})",
                    lhs.build_sql(offset, params),
                    rhs.build_sql(offset, params)
                )
            }
            ImageQueryExpr::Not(expr) => {
                format!("NOT {}", expr.build_sql(offset, params))
            }
            ImageQueryExpr::CreatedUntil(date_time) => {
                params.push(timestamp(date_time));
                CurrentDialect::created_until_query(offset + params.len())
            }
            ImageQueryExpr::CreatedSince(date_time) => {
                params.push(timestamp(date_time));
                CurrentDialect::created_since_query(offset + params.len())
            }
        }
    }

    /// Evaluates the expression against a record and its tag values.
    pub fn matches(&self, image: &Image, tags: &BTreeSet<String>) -> bool {
        match self {
            ImageQueryExpr::Tag(tag) => tags.contains(tag),
            ImageQueryExpr::And(lhs, rhs) => lhs.matches(image, tags) && rhs.matches(image, tags),
            ImageQueryExpr::Or(lhs, rhs) => lhs.matches(image, tags) || rhs.matches(image, tags),
            ImageQueryExpr::Not(expr) => !expr.matches(image, tags),
            ImageQueryExpr::CreatedUntil(date_time) => image.created_at <= *date_time,
            ImageQueryExpr::CreatedSince(date_time) => image.created_at >= *date_time,
        }
    }
}

/// Which images a caller may list.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Scope {
    /// No restriction (admins).
    #[default]
    All,
    /// Public and unowned images, plus those owned by or shared with the tenant.
    Tenant(String),
    /// Public and unowned images only (anonymous callers).
    Public,
}

impl Scope {
    pub fn for_context(ctx: &RequestContext) -> Self {
        if ctx.is_admin {
            return Scope::All;
        }

        match &ctx.tenant {
            Some(tenant) => Scope::Tenant(tenant.clone()),
            None => Scope::Public,
        }
    }

    fn to_sql(&self) -> Option<(String, Vec<String>)> {
        match self {
            Scope::All => None,
            Scope::Tenant(tenant) => Some((
                CurrentDialect::tenant_scope_query(1, 2),
                vec![tenant.clone(), tenant.clone()],
            )),
            Scope::Public => Some((CurrentDialect::public_scope_query(), vec![])),
        }
    }
}

/// Represents a full query including logical expression and pagination.
#[derive(Debug, Clone, Default)]
pub struct ImageQuery {
    /// The logical expression used for filtering.
    pub expr: Option<ImageQueryExpr>,

    /// Restrict to deleted (`Some(true)`) or live (`Some(false)`) records.
    pub deleted: Option<bool>,

    pub scope: Scope,

    /// The maximum number of results to return.
    pub limit: Option<u32>,

    /// The offset into the result set.
    pub offset: Option<u32>,
}

impl ImageQuery {
    /// A query for every live image.
    pub fn live() -> Self {
        Self {
            deleted: Some(false),
            ..Default::default()
        }
    }

    pub fn with_expr(mut self, expr: ImageQueryExpr) -> Self {
        self.expr = Some(expr);
        self
    }

    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the `LIMIT` for this query.
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Sets the `OFFSET` for this query.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Converts the full query into an SQL tail (`WHERE … ORDER BY … LIMIT …`)
    /// and bound parameters.
    pub fn to_sql(&self) -> (String, Vec<String>) {
        let mut conditions = Vec::new();
        let mut params = Vec::new();

        if let Some((sql, scope_params)) = self.scope.to_sql() {
            conditions.push(sql);
            params.extend(scope_params);
        }

        if let Some(deleted) = self.deleted {
            conditions.push(CurrentDialect::deleted_query(deleted));
        }

        if let Some(expr) = &self.expr {
            let (sql, expr_params) = expr.to_sql(params.len());
            conditions.push(sql);
            params.extend(expr_params);
        }

        let mut sql = String::new();
        if !conditions.is_empty() {
            sql.push_str("WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(" ORDER BY images.seq");

        // Integers are rendered inline; they never carry caller text.
        match (self.limit, self.offset) {
            (Some(limit), offset) => {
                sql.push_str(&format!(" LIMIT {}", limit));
                if let Some(offset) = offset {
                    sql.push_str(&format!(" OFFSET {}", offset));
                }
            }
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {}", offset)),
            (None, None) => {}
        }

        (sql, params)
    }

    /// Evaluates everything except scope and pagination against a record.
    pub fn matches(&self, image: &Image, tags: &BTreeSet<String>) -> bool {
        if let Some(deleted) = self.deleted {
            if image.deleted != deleted {
                return false;
            }
        }

        self.expr
            .as_ref()
            .is_none_or(|expr| expr.matches(image, tags))
    }

    /// Applies `offset` and `limit` to an already filtered, ordered list.
    pub fn paginate<T>(&self, items: Vec<T>) -> Vec<T> {
        let offset = self.offset.unwrap_or(0) as usize;
        let iter = items.into_iter().skip(offset);
        match self.limit {
            Some(limit) => iter.take(limit as usize).collect(),
            None => iter.collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{CurrentDialect, Dialect, ImageQuery, ImageQueryExpr, Scope};
    use crate::model::{Image, ImageStatus, Properties, Visibility};
    use chrono::{DateTime, Utc};
    use std::{collections::BTreeSet, str::FromStr};

    #[test]
    fn test_build_query() {
        let query = ImageQuery::live()
            .with_scope(Scope::Tenant("tenant1".to_string()))
            .with_expr(
                ImageQueryExpr::tag("cat")
                    .and(ImageQueryExpr::tag("cute"))
                    .or(ImageQueryExpr::not(ImageQueryExpr::tag("dog")))
                    .and(ImageQueryExpr::created_until(
                        DateTime::from_str("2025-05-02T01:18:49.678809+00:00").unwrap(),
                    )),
            )
            .with_limit(10)
            .with_offset(20);

        let (sql, params) = query.to_sql();

        assert_eq!(
            format!(
                "WHERE {} AND {} AND ((({} AND {}) OR NOT {}) AND {}) ORDER BY images.seq LIMIT 10 OFFSET 20",
                CurrentDialect::tenant_scope_query(1, 2),
                CurrentDialect::deleted_query(false),
                CurrentDialect::exists_tag_query(3),
                CurrentDialect::exists_tag_query(4),
                CurrentDialect::exists_tag_query(5),
                CurrentDialect::created_until_query(6),
            ),
            sql
        );
        assert_eq!(
            vec![
                "tenant1",
                "tenant1",
                "cat",
                "cute",
                "dog",
                "2025-05-02T01:18:49.678809Z",
            ],
            params
        );
    }

    #[test]
    fn test_build_unrestricted_query() {
        let (sql, params) = ImageQuery::default().to_sql();

        assert_eq!(" ORDER BY images.seq", sql);
        assert!(params.is_empty());
    }

    #[test]
    fn test_matches() {
        let now = Utc::now();
        let image = Image {
            id: "image".to_string(),
            name: None,
            owner: None,
            status: ImageStatus::Active,
            visibility: Visibility::Public,
            size: None,
            checksum: None,
            created_at: now,
            updated_at: now,
            deleted: false,
            deleted_at: None,
            properties: Properties::new(),
        };
        let tags: BTreeSet<String> = ["ping".to_string()].into_iter().collect();

        let query = ImageQuery::live().with_expr(
            ImageQueryExpr::tag("ping").and(ImageQueryExpr::not(ImageQueryExpr::tag("pong"))),
        );
        assert!(query.matches(&image, &tags));

        let query = ImageQuery::live().with_expr(ImageQueryExpr::tag("pong"));
        assert!(!query.matches(&image, &tags));

        let deleted = Image {
            deleted: true,
            ..image
        };
        assert!(!ImageQuery::live().matches(&deleted, &tags));
    }

    #[test]
    fn test_paginate() {
        let query = ImageQuery::default().with_offset(1).with_limit(2);

        assert_eq!(vec![2, 3], query.paginate(vec![1, 2, 3, 4]));
        assert_eq!(vec![3, 4], ImageQuery::default().with_offset(2).paginate(vec![1, 2, 3, 4]));
    }
}
