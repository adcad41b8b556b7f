use axum::{
    Extension, Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
    http::StatusCode,
};
use tracing::info;
use uuid::Uuid;

use murmur_types::api::{Claims, CommentPage, CommentResponse, CreateCommentRequest, PageQuery, UpdateCommentRequest};
use murmur_types::validation::FieldError;

use crate::convert::{created_comment, load_comments};
use crate::error::ApiError;
use crate::mentions::extract_mentions;
use crate::state::{AppState, with_db};

/// POST /api/comments. Mentions come from the explicit `mentionedUserIds`
/// list; the content is not scanned for `@name` tokens here.
pub async fn create_comment(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<CreateCommentRequest>, JsonRejection>,
) -> Result<Json<CommentResponse>, ApiError> {
    if !state.limiter.check(&claims.sub) {
        return Err(ApiError::RateLimited);
    }

    let Json(req) = payload?;
    req.validate().map_err(ApiError::Validation)?;

    let author_id = claims.sub.clone();
    let parent_id = req.parent().map(|p| p.to_string());
    let content = req.content.unwrap_or_default();
    let mentioned = req.mentioned_user_ids.unwrap_or_default();

    let created = with_db(&state, move |db| {
        let created = db.create_comment(&author_id, &content, parent_id.as_deref(), &mentioned)?;
        Ok(created.map(|(comment, fanout)| created_comment(&comment, &fanout)))
    })
    .await?;

    let comment = created.ok_or_else(|| {
        ApiError::Validation(vec![FieldError::new("parentId", "invalid_parent", "Parent comment not found")])
    })?;

    info!(
        comment_id = %comment.id,
        author_id = %claims.sub,
        mentions = comment.mentions.len(),
        "Comment created"
    );
    Ok(Json(comment))
}

/// GET /api/comments. Public, paginated, newest first.
pub async fn list_comments(
    State(state): State<AppState>,
    query: Result<Query<PageQuery>, QueryRejection>,
) -> Result<Json<CommentPage>, ApiError> {
    let Query(query) = query?;
    let page = query.pagination().map_err(ApiError::Validation)?;
    let parent_id = query.parent_id().map(str::to_string);

    let (comments, total) = with_db(&state, move |db| {
        let rows = db.list_comments(parent_id.as_deref(), page.limit, page.offset())?;
        let total = db.count_comments(parent_id.as_deref())?;
        Ok((load_comments(db, rows, true)?, total))
    })
    .await?;

    Ok(Json(CommentPage {
        comments,
        total,
        pages: page.pages(total),
    }))
}

/// Ids that are not UUIDs cannot name a comment.
fn comment_id(path: Result<Path<Uuid>, PathRejection>) -> Result<Uuid, ApiError> {
    path.map(|Path(id)| id).map_err(|_| ApiError::NotFound("Comment not found"))
}

pub async fn get_comment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Extension(_claims): Extension<Claims>,
) -> Result<Json<CommentResponse>, ApiError> {
    let id = comment_id(path)?;
    let comment = with_db(&state, move |db| match db.get_comment(&id.to_string())? {
        Some(row) => Ok(load_comments(db, vec![row], false)?.pop()),
        None => Ok(None),
    })
    .await?
    .ok_or(ApiError::NotFound("Comment not found"))?;

    Ok(Json(comment))
}

/// PATCH /api/comments/{id}. Each `@name` in the new content adds a mention
/// and a notification; earlier mentions are kept.
pub async fn update_comment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
    payload: Result<Json<UpdateCommentRequest>, JsonRejection>,
) -> Result<Json<CommentResponse>, ApiError> {
    let id = comment_id(path)?;
    let Json(req) = payload?;
    req.validate().map_err(ApiError::Validation)?;

    let content = req.content.unwrap_or_default();
    let mentioned = extract_mentions(&content);
    let mention_count = mentioned.len();

    let comment = with_db(&state, move |db| match db.update_comment(&id.to_string(), &content, &mentioned)? {
        Some((row, _fanout)) => Ok(load_comments(db, vec![row], false)?.pop()),
        None => Ok(None),
    })
    .await?
    .ok_or(ApiError::NotFound("Comment not found"))?;

    info!(
        comment_id = %id,
        editor_id = %claims.sub,
        mentions = mention_count,
        "Comment updated"
    );
    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    path: Result<Path<Uuid>, PathRejection>,
    Extension(claims): Extension<Claims>,
) -> Result<StatusCode, ApiError> {
    let id = comment_id(path)?;
    let removed = with_db(&state, move |db| db.delete_comment(&id.to_string()))
        .await?
        .ok_or(ApiError::NotFound("Comment not found"))?;

    info!(comment_id = %id, user_id = %claims.sub, mentions = removed, "Comment deleted");
    Ok(StatusCode::NO_CONTENT)
}
