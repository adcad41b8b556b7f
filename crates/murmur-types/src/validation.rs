use serde::Serialize;
use uuid::Uuid;

use crate::api::{CreateCommentRequest, PageQuery, UpdateCommentRequest};

pub const MAX_CONTENT_CHARS: usize = 1000;
pub const DEFAULT_PAGE_LIMIT: u32 = 10;
pub const MAX_PAGE_LIMIT: u32 = 100;

/// One problem with one input field, reported back to the client verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub path: Vec<String>,
    pub code: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, code: &'static str, message: impl Into<String>) -> Self {
        Self::at(vec![field.to_string()], code, message)
    }

    /// Error at a nested location, e.g. `["mentionedUserIds", "2"]`.
    pub fn at(path: Vec<String>, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            path,
            code,
            message: message.into(),
        }
    }

    fn required(field: &str) -> Self {
        Self::new(field, "invalid_type", "Required")
    }
}

fn check_content(content: Option<&str>, errors: &mut Vec<FieldError>) {
    let Some(content) = content else {
        errors.push(FieldError::required("content"));
        return;
    };

    let chars = content.chars().count();
    if chars < 1 {
        errors.push(FieldError::new(
            "content",
            "too_small",
            "String must contain at least 1 character(s)",
        ));
    } else if chars > MAX_CONTENT_CHARS {
        errors.push(FieldError::new(
            "content",
            "too_big",
            format!("String must contain at most {} character(s)", MAX_CONTENT_CHARS),
        ));
    }
}

impl CreateCommentRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_content(self.content.as_deref(), &mut errors);
        if let Some(parent) = self.parent_id.as_deref() {
            if Uuid::parse_str(parent).is_err() {
                errors.push(FieldError::new("parentId", "invalid_string", "Invalid uuid"));
            }
        }
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// The parent id in canonical form. Only meaningful after `validate`.
    pub fn parent(&self) -> Option<Uuid> {
        self.parent_id.as_deref().and_then(|p| Uuid::parse_str(p).ok())
    }
}

impl UpdateCommentRequest {
    pub fn validate(&self) -> Result<(), Vec<FieldError>> {
        let mut errors = Vec::new();
        check_content(self.content.as_deref(), &mut errors);
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// Validated page window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_LIMIT,
        }
    }
}

impl Pagination {
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }

    /// Number of pages needed to show `total` rows.
    pub fn pages(&self, total: u64) -> u64 {
        total.div_ceil(u64::from(self.limit))
    }
}

fn parse_number(field: &str, raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<i64> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse::<i64>() {
        Ok(n) => Some(n),
        Err(_) => {
            errors.push(FieldError::new(
                field,
                "invalid_type",
                "Expected number, received nan",
            ));
            None
        }
    }
}

impl PageQuery {
    /// Page defaults to 1 and limit to 10; a limit above 100 is clamped
    /// rather than rejected.
    pub fn pagination(&self) -> Result<Pagination, Vec<FieldError>> {
        let mut errors = Vec::new();
        let mut out = Pagination::default();

        if let Some(page) = parse_number("page", self.page.as_deref(), &mut errors) {
            if page < 1 {
                errors.push(FieldError::new(
                    "page",
                    "too_small",
                    "Number must be greater than or equal to 1",
                ));
            } else {
                out.page = u32::try_from(page).unwrap_or(u32::MAX);
            }
        }

        if let Some(limit) = parse_number("limit", self.limit.as_deref(), &mut errors) {
            if limit < 1 {
                errors.push(FieldError::new(
                    "limit",
                    "too_small",
                    "Number must be greater than or equal to 1",
                ));
            } else {
                out.limit = limit.min(i64::from(MAX_PAGE_LIMIT)) as u32;
            }
        }

        if errors.is_empty() { Ok(out) } else { Err(errors) }
    }

    pub fn parent_id(&self) -> Option<&str> {
        self.parent_id.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(page: Option<&str>, limit: Option<&str>) -> PageQuery {
        PageQuery {
            page: page.map(String::from),
            limit: limit.map(String::from),
            parent_id: None,
        }
    }

    #[test]
    fn pagination_defaults() {
        let p = query(None, None).pagination().unwrap();
        assert_eq!(p, Pagination { page: 1, limit: 10 });
        assert_eq!(p.offset(), 0);
    }

    #[test]
    fn pagination_clamps_limit() {
        let p = query(Some("3"), Some("500")).pagination().unwrap();
        assert_eq!(p.limit, 100);
        assert_eq!(p.offset(), 200);
    }

    #[test]
    fn pagination_rejects_bad_values() {
        let errors = query(Some("0"), Some("abc")).pagination().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].path, vec!["page"]);
        assert_eq!(errors[0].code, "too_small");
        assert_eq!(errors[1].path, vec!["limit"]);
        assert_eq!(errors[1].code, "invalid_type");
    }

    #[test]
    fn page_count_rounds_up() {
        let p = Pagination { page: 2, limit: 10 };
        assert_eq!(p.pages(15), 2);
        assert_eq!(p.pages(20), 2);
        assert_eq!(p.pages(0), 0);
    }

    #[test]
    fn content_bounds() {
        let req = |content: Option<&str>| CreateCommentRequest {
            content: content.map(String::from),
            parent_id: None,
            mentioned_user_ids: None,
        };

        assert!(req(Some("hi")).validate().is_ok());
        assert_eq!(req(None).validate().unwrap_err()[0].message, "Required");
        assert_eq!(req(Some("")).validate().unwrap_err()[0].code, "too_small");

        let long = "é".repeat(MAX_CONTENT_CHARS);
        assert!(req(Some(&long)).validate().is_ok());
        let too_long = "x".repeat(MAX_CONTENT_CHARS + 1);
        assert_eq!(req(Some(&too_long)).validate().unwrap_err()[0].code, "too_big");
    }

    #[test]
    fn parent_must_be_a_uuid() {
        let req = |parent: &str| CreateCommentRequest {
            content: Some("hi".to_string()),
            parent_id: Some(parent.to_string()),
            mentioned_user_ids: None,
        };

        let errors = req("abc").validate().unwrap_err();
        assert_eq!(errors, vec![FieldError::new("parentId", "invalid_string", "Invalid uuid")]);

        let id = Uuid::new_v4();
        let upper = req(&id.to_string().to_uppercase());
        assert!(upper.validate().is_ok());
        assert_eq!(upper.parent(), Some(id));
    }

    #[test]
    fn update_requires_content() {
        let req = UpdateCommentRequest { content: None };
        let errors = req.validate().unwrap_err();
        assert_eq!(errors, vec![FieldError::new("content", "invalid_type", "Required")]);
    }
}
