use std::sync::Arc;

use actix_web::{web, HttpRequest, HttpResponse};

use crate::auth::{Auth, Caller, Role};
use crate::collab;
use crate::error::ApiError;
use crate::models::*;
use crate::query::{ResourceQuery, SortBy, DEFAULT_PAGE_SIZE, DEFAULT_SIMILAR_LIMIT};
use crate::rate_limit::RateLimiterFacade;
use crate::repo::Repo;

pub fn config(cfg: &mut web::ServiceConfig) {
    cfg.service(
        web::scope("/api/v1")
            // `/resources/similar` must register ahead of `/resources/{id}`.
            .service(web::resource("/resources/similar").route(web::get().to(find_similar)))
            .service(
                web::resource("/resources")
                    .route(web::get().to(list_resources))
                    .route(web::post().to(create_resource)),
            )
            .service(
                web::resource("/resources/{id}")
                    .route(web::get().to(get_resource))
                    .route(web::patch().to(update_resource))
                    .route(web::delete().to(delete_resource)),
            )
            .service(web::resource("/resources/{id}/view").route(web::post().to(track_view)))
            .service(web::resource("/resources/{id}/tried").route(web::post().to(track_tried)))
            .service(web::resource("/resources/{id}/save").route(web::post().to(toggle_save)))
            .service(web::resource("/resources/{id}/is-saved").route(web::get().to(is_saved)))
            .service(web::resource("/resources/{id}/analytics").route(web::get().to(get_analytics)))
            .service(web::resource("/resources/{id}/fork").route(web::post().to(fork_resource)))
            .service(
                web::resource("/resources/{id}/collaboration-options")
                    .route(web::get().to(collaboration_options)),
            )
            .service(
                web::resource("/resources/{id}/collaborate")
                    .route(web::post().to(request_collaboration))
                    .route(web::get().to(list_collaboration_requests)),
            )
            .service(
                web::resource("/resources/{id}/comments")
                    .route(web::get().to(list_comments))
                    .route(web::post().to(create_comment)),
            )
            .service(
                web::resource("/comments/{id}")
                    .route(web::patch().to(update_comment))
                    .route(web::delete().to(delete_comment)),
            )
            .service(web::resource("/comments/{id}/helpful").route(web::post().to(vote_comment_helpful)))
            .service(
                web::resource("/prompts")
                    .route(web::get().to(list_prompts))
                    .route(web::post().to(create_prompt)),
            )
            .service(
                web::resource("/prompts/{id}")
                    .route(web::get().to(get_prompt))
                    .route(web::patch().to(update_prompt))
                    .route(web::delete().to(delete_prompt)),
            )
            .service(web::resource("/prompts/{id}/fork").route(web::post().to(fork_prompt)))
            .service(web::resource("/prompts/{id}/use").route(web::post().to(record_prompt_use)))
            .service(web::resource("/prompts/{id}/usage").route(web::get().to(get_prompt_usage)))
            .service(
                web::resource("/collections")
                    .route(web::get().to(list_collections))
                    .route(web::post().to(create_collection)),
            )
            .service(
                web::resource("/collections/{id}")
                    .route(web::get().to(get_collection))
                    .route(web::patch().to(update_collection))
                    .route(web::delete().to(delete_collection)),
            )
            .service(web::resource("/collections/{id}/subscribe").route(web::post().to(subscribe_collection)))
            .service(web::resource("/users/me/saved-resources").route(web::get().to(saved_resources)))
            // Admin endpoints
            .service(web::resource("/admin/analytics").route(web::get().to(admin_platform_analytics)))
            .service(
                web::resource("/admin/analytics/by-discipline")
                    .route(web::get().to(admin_analytics_by_discipline)),
            )
            .service(web::resource("/admin/resources/{id}/hide").route(web::post().to(admin_hide_resource)))
            .service(web::resource("/admin/resources/{id}/unhide").route(web::post().to(admin_unhide_resource)))
            .service(web::resource("/admin/resources/{id}/verify").route(web::post().to(admin_verify_resource))),
    );
}

#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn Repo>,
    pub rate: RateLimiterFacade,
}

macro_rules! ensure_admin {
    ($auth:expr) => {
        if !$auth.0.is_admin() {
            return Err(ApiError::Forbidden);
        }
    };
}

fn ensure_staff(auth: &Auth) -> Result<Id, ApiError> {
    if !auth.0.roles.iter().any(|r| matches!(r, Role::Staff | Role::Admin)) {
        return Err(ApiError::Forbidden);
    }
    auth.0.user_id().ok_or(ApiError::Unauthorized)
}

fn client_key(req: &HttpRequest) -> String {
    req.peer_addr()
        .map(|a| a.ip().to_string())
        .unwrap_or_else(|| "unknown".into())
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::invalid(field, "must not be empty"));
    }
    Ok(())
}

/// Owner and admins may see a hidden resource; everyone else gets 404 so
/// hidden content is indistinguishable from deleted content.
fn ensure_visible(resource: &Resource, caller: &Caller) -> Result<(), ApiError> {
    if resource.is_hidden && !(caller.is_admin || caller.owns(resource.user_id)) {
        return Err(ApiError::NotFound);
    }
    Ok(())
}

// ---------------- resources -----------------------------------------

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct ListResourcesParams {
    pub discipline: Option<String>,
    /// Comma-separated list; a resource matches if it uses any of them.
    pub tools: Option<String>,
    pub collaboration_status: Option<CollaborationStatus>,
    pub min_time_saved: Option<f64>,
    pub search: Option<String>,
    pub sort_by: Option<SortBy>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

fn split_tools(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect()
    })
    .unwrap_or_default()
}

#[utoipa::path(
    get,
    path = "/api/v1/resources",
    params(ListResourcesParams),
    responses(
        (status = 200, description = "Filtered resource listing", body = [Resource])
    )
)]
pub async fn list_resources(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    params: web::Query<ListResourcesParams>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(auth.as_ref());
    let params = params.into_inner();
    let query = ResourceQuery {
        discipline: params.discipline,
        tools: split_tools(params.tools.as_deref()),
        collaboration_status: params.collaboration_status,
        min_time_saved: params.min_time_saved,
        search: params.search,
        sort_by: params.sort_by.unwrap_or_default(),
        skip: params.skip.unwrap_or(0),
        limit: params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
    }
    .normalized();
    let resources = data.repo.list_resources(&query, &caller).await?;
    Ok(HttpResponse::Ok().json(resources))
}

#[utoipa::path(
    get,
    path = "/api/v1/resources/{id}",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource detail", body = Resource),
        (status = 404, description = "Resource not found or hidden")
    )
)]
pub async fn get_resource(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(auth.as_ref());
    let resource = data.repo.get_resource(path.into_inner()).await?;
    ensure_visible(&resource, &caller)?;
    Ok(HttpResponse::Ok().json(resource))
}

#[utoipa::path(
    post,
    path = "/api/v1/resources",
    request_body = NewResource,
    responses(
        (status = 201, description = "Resource created", body = Resource),
        (status = 404, description = "Fork parent not found"),
        (status = 422, description = "Validation failure"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn create_resource(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewResource>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    if !data.rate.allow_resource(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let new = payload.into_inner();
    require_non_empty("title", &new.title)?;
    require_non_empty("content", &new.content)?;
    if new.is_fork && new.forked_from_id.is_none() {
        return Err(ApiError::invalid("forked_from_id", "required when is_fork is true"));
    }
    if matches!(new.time_saved_value, Some(v) if v < 0.0) {
        return Err(ApiError::invalid("time_saved_value", "must not be negative"));
    }
    let resource = data.repo.create_resource(user_id, new).await?;
    Ok(HttpResponse::Created().json(resource))
}

#[utoipa::path(
    patch,
    path = "/api/v1/resources/{id}",
    request_body = UpdateResource,
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Resource updated", body = Resource),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn update_resource(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateResource>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let resource = data.repo.get_resource(id).await?;
    if !(caller.is_admin || caller.owns(resource.user_id)) {
        return Err(ApiError::Forbidden);
    }
    let upd = payload.into_inner();
    if let Some(ref title) = upd.title {
        require_non_empty("title", title)?;
    }
    if let Some(ref content) = upd.content {
        require_non_empty("content", content)?;
    }
    if matches!(upd.time_saved_value, Some(v) if v < 0.0) {
        return Err(ApiError::invalid("time_saved_value", "must not be negative"));
    }
    let updated = data.repo.update_resource(id, upd).await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[utoipa::path(
    delete,
    path = "/api/v1/resources/{id}",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 204, description = "Resource deleted"),
        (status = 403, description = "Not the owner"),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn delete_resource(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let resource = data.repo.get_resource(id).await?;
    if !(caller.is_admin || caller.owns(resource.user_id)) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_resource(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[utoipa::path(
    post,
    path = "/api/v1/resources/{id}/fork",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 201, description = "Fork created", body = Resource),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn fork_resource(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let source = data.repo.get_resource(id).await?;
    ensure_visible(&source, &caller)?;
    let fork = data.repo.fork_resource(id, user_id).await?;
    Ok(HttpResponse::Created().json(fork))
}

// ---------------- engagement tracking --------------------------------

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct EngagementTracked {
    pub resource_id: Id,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub view_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tried_count: Option<i64>,
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/resources/{id}/view",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "View tracked", body = EngagementTracked),
        (status = 404, description = "Resource not found"),
        (status = 429, description = "Rate limited")
    )
)]
pub async fn track_view(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    if !data.rate.allow_view(&client_key(&req)) {
        return Err(ApiError::RateLimited);
    }
    let id = path.into_inner();
    let analytics = data.repo.record_view(id).await?;
    Ok(HttpResponse::Ok().json(EngagementTracked {
        resource_id: id,
        view_count: Some(analytics.view_count),
        tried_count: None,
        status: "tracked".into(),
    }))
}

#[utoipa::path(
    post,
    path = "/api/v1/resources/{id}/tried",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Tried tracked", body = EngagementTracked),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn track_tried(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    ensure_staff(&auth)?;
    let id = path.into_inner();
    let analytics = data.repo.record_tried(id).await?;
    Ok(HttpResponse::Ok().json(EngagementTracked {
        resource_id: id,
        view_count: None,
        tried_count: Some(analytics.tried_count),
        status: "tracked".into(),
    }))
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct SaveToggled {
    pub resource_id: Id,
    pub is_saved: bool,
    pub save_count: i64,
    pub status: String,
}

#[utoipa::path(
    post,
    path = "/api/v1/resources/{id}/save",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Save toggled", body = SaveToggled),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn toggle_save(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    let id = path.into_inner();
    let (saved, analytics) = data.repo.toggle_save(id, user_id).await?;
    Ok(HttpResponse::Ok().json(SaveToggled {
        resource_id: id,
        is_saved: saved,
        save_count: analytics.save_count,
        status: if saved { "saved".into() } else { "unsaved".into() },
    }))
}

pub async fn is_saved(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    let id = path.into_inner();
    let saved = data.repo.is_saved(id, user_id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "resource_id": id, "is_saved": saved })))
}

#[utoipa::path(
    get,
    path = "/api/v1/resources/{id}/analytics",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Per-resource counters", body = ResourceAnalytics),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn get_analytics(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let analytics = data.repo.get_analytics(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(analytics))
}

#[derive(Debug, serde::Deserialize)]
pub struct PageParams {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn saved_resources(
    auth: Auth,
    data: web::Data<AppState>,
    params: web::Query<PageParams>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    let resources = data
        .repo
        .saved_resources(user_id, params.skip.unwrap_or(0), params.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;
    Ok(HttpResponse::Ok().json(resources))
}

// ---------------- collaboration --------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/resources/{id}/collaboration-options",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Contact and collaboration metadata", body = collab::CollaborationOptions),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn collaboration_options(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(auth.as_ref());
    let resource = data.repo.get_resource(path.into_inner()).await?;
    ensure_visible(&resource, &caller)?;
    let options = collab::collaboration_options(&resource, collab::capabilities());
    Ok(HttpResponse::Ok().json(options))
}

#[derive(Debug, serde::Deserialize, utoipa::IntoParams)]
pub struct SimilarParams {
    pub discipline: Option<String>,
    /// Comma-separated tool list to overlap against.
    pub tools: Option<String>,
    pub limit: Option<i64>,
}

#[utoipa::path(
    get,
    path = "/api/v1/resources/similar",
    params(SimilarParams),
    responses(
        (status = 200, description = "Resources ranked by tool overlap", body = [Resource])
    )
)]
pub async fn find_similar(
    data: web::Data<AppState>,
    params: web::Query<SimilarParams>,
) -> Result<HttpResponse, ApiError> {
    let tools = split_tools(params.tools.as_deref());
    let resources = data
        .repo
        .find_similar(
            params.discipline.as_deref(),
            &tools,
            params.limit.unwrap_or(DEFAULT_SIMILAR_LIMIT),
        )
        .await?;
    Ok(HttpResponse::Ok().json(resources))
}

#[utoipa::path(
    post,
    path = "/api/v1/resources/{id}/collaborate",
    request_body = NewCollaborationRequest,
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 201, description = "Collaboration request recorded", body = CollaborationRequest),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn request_collaboration(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewCollaborationRequest>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let resource = data.repo.get_resource(id).await?;
    ensure_visible(&resource, &caller)?;
    let request = data
        .repo
        .create_collaboration_request(id, user_id, payload.into_inner())
        .await?;
    Ok(HttpResponse::Created().json(request))
}

pub async fn list_collaboration_requests(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let resource = data.repo.get_resource(id).await?;
    if !(caller.is_admin || caller.owns(resource.user_id)) {
        return Err(ApiError::Forbidden);
    }
    let requests = data.repo.list_collaboration_requests(id).await?;
    Ok(HttpResponse::Ok().json(requests))
}

// ---------------- comments -------------------------------------------

#[utoipa::path(
    get,
    path = "/api/v1/resources/{id}/comments",
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 200, description = "Flat comment list, oldest first", body = [Comment]),
        (status = 404, description = "Resource not found")
    )
)]
pub async fn list_comments(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let comments = data.repo.list_comments(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comments))
}

#[utoipa::path(
    post,
    path = "/api/v1/resources/{id}/comments",
    request_body = NewComment,
    params(("id" = Id, Path, description = "Resource id")),
    responses(
        (status = 201, description = "Comment created", body = Comment),
        (status = 404, description = "Resource or parent comment not found"),
        (status = 422, description = "Parent comment belongs to another resource")
    )
)]
pub async fn create_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<NewComment>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    if !data.rate.allow_comment(&auth.0.sub) {
        return Err(ApiError::RateLimited);
    }
    let resource_id = path.into_inner();
    let new = payload.into_inner();
    require_non_empty("content", &new.content)?;
    if let Some(parent_id) = new.parent_comment_id {
        let parent = data.repo.get_comment(parent_id).await?;
        if parent.resource_id != resource_id {
            return Err(ApiError::invalid(
                "parent_comment_id",
                "parent comment belongs to a different resource",
            ));
        }
    }
    let comment = data.repo.create_comment(resource_id, user_id, new).await?;
    Ok(HttpResponse::Created().json(comment))
}

pub async fn update_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateComment>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let comment = data.repo.get_comment(id).await?;
    if !(caller.is_admin || caller.owns(comment.user_id)) {
        return Err(ApiError::Forbidden);
    }
    let upd = payload.into_inner();
    require_non_empty("content", &upd.content)?;
    let updated = data.repo.update_comment(id, upd.content).await?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn delete_comment(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let comment = data.repo.get_comment(id).await?;
    if !(caller.is_admin || caller.owns(comment.user_id)) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_comment(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn vote_comment_helpful(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    ensure_staff(&auth)?;
    let comment = data.repo.vote_comment_helpful(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(comment))
}

// ---------------- prompts --------------------------------------------

#[derive(Debug, serde::Deserialize)]
pub struct ListPromptsParams {
    pub sharing_level: Option<SharingLevel>,
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

pub async fn list_prompts(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    params: web::Query<ListPromptsParams>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(auth.as_ref());
    let prompts = data
        .repo
        .list_prompts(
            &caller,
            params.sharing_level,
            params.skip.unwrap_or(0),
            params.limit.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;
    Ok(HttpResponse::Ok().json(prompts))
}

/// Sharing levels gate reads only; owner and admins always pass.
fn ensure_prompt_readable(prompt: &Prompt, caller: &Caller) -> Result<(), ApiError> {
    if caller.is_admin || caller.owns(prompt.user_id) {
        return Ok(());
    }
    match prompt.sharing_level {
        SharingLevel::Public => Ok(()),
        SharingLevel::Department | SharingLevel::School => {
            if caller.user_id.is_some() {
                Ok(())
            } else {
                Err(ApiError::Unauthorized)
            }
        }
        SharingLevel::Private => Err(ApiError::Forbidden),
    }
}

pub async fn get_prompt(
    auth: Option<Auth>,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(auth.as_ref());
    let prompt = data.repo.get_prompt(path.into_inner()).await?;
    ensure_prompt_readable(&prompt, &caller)?;
    Ok(HttpResponse::Ok().json(prompt))
}

pub async fn create_prompt(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewPrompt>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    let new = payload.into_inner();
    require_non_empty("title", &new.title)?;
    require_non_empty("prompt_text", &new.prompt_text)?;
    let prompt = data.repo.create_prompt(user_id, new).await?;
    Ok(HttpResponse::Created().json(prompt))
}

pub async fn update_prompt(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdatePrompt>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let prompt = data.repo.get_prompt(id).await?;
    // Writes are owner-only regardless of sharing level.
    if !caller.owns(prompt.user_id) {
        return Err(ApiError::Forbidden);
    }
    let upd = payload.into_inner();
    if let Some(ref title) = upd.title {
        require_non_empty("title", title)?;
    }
    if let Some(ref text) = upd.prompt_text {
        require_non_empty("prompt_text", text)?;
    }
    let updated = data.repo.update_prompt(id, upd).await?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn delete_prompt(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let prompt = data.repo.get_prompt(id).await?;
    // Owner deletes own prompts; admins may remove as moderation.
    if !(caller.is_admin || caller.owns(prompt.user_id)) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_prompt(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn fork_prompt(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let user_id = ensure_staff(&auth)?;
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let source = data.repo.get_prompt(id).await?;
    ensure_prompt_readable(&source, &caller)?;
    let fork = data.repo.fork_prompt(id, user_id).await?;
    Ok(HttpResponse::Created().json(fork))
}

pub async fn record_prompt_use(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    ensure_staff(&auth)?;
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let prompt = data.repo.get_prompt(id).await?;
    ensure_prompt_readable(&prompt, &caller)?;
    let prompt = data.repo.record_prompt_usage(id).await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": prompt.id,
        "usage_count": prompt.usage_count,
        "status": "tracked"
    })))
}

pub async fn get_prompt_usage(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let prompt = data.repo.get_prompt(path.into_inner()).await?;
    if !caller.owns(prompt.user_id) {
        return Err(ApiError::Forbidden);
    }
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "id": prompt.id,
        "title": prompt.title,
        "usage_count": prompt.usage_count,
        "fork_count": prompt.fork_count,
        "sharing_level": prompt.sharing_level,
        "created_at": prompt.created_at,
        "updated_at": prompt.updated_at,
    })))
}

// ---------------- collections ----------------------------------------

pub async fn list_collections(
    data: web::Data<AppState>,
    params: web::Query<PageParams>,
) -> Result<HttpResponse, ApiError> {
    let collections = data
        .repo
        .list_collections(params.skip.unwrap_or(0), params.limit.unwrap_or(DEFAULT_PAGE_SIZE))
        .await?;
    Ok(HttpResponse::Ok().json(collections))
}

pub async fn get_collection(
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let collection = data.repo.get_collection(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(collection))
}

pub async fn create_collection(
    auth: Auth,
    data: web::Data<AppState>,
    payload: web::Json<NewCollection>,
) -> Result<HttpResponse, ApiError> {
    let owner_id = ensure_staff(&auth)?;
    let new = payload.into_inner();
    require_non_empty("name", &new.name)?;
    let collection = data.repo.create_collection(owner_id, new).await?;
    Ok(HttpResponse::Created().json(collection))
}

pub async fn update_collection(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
    payload: web::Json<UpdateCollection>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let collection = data.repo.get_collection(id).await?;
    if !(caller.is_admin || caller.owns(collection.owner_id)) {
        return Err(ApiError::Forbidden);
    }
    let upd = payload.into_inner();
    if let Some(ref name) = upd.name {
        require_non_empty("name", name)?;
    }
    let updated = data.repo.update_collection(id, upd).await?;
    Ok(HttpResponse::Ok().json(updated))
}

pub async fn delete_collection(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    let caller = Caller::from_auth(Some(&auth));
    let id = path.into_inner();
    let collection = data.repo.get_collection(id).await?;
    if !(caller.is_admin || caller.owns(collection.owner_id)) {
        return Err(ApiError::Forbidden);
    }
    data.repo.delete_collection(id).await?;
    Ok(HttpResponse::NoContent().finish())
}

pub async fn subscribe_collection(
    auth: Auth,
    data: web::Data<AppState>,
    path: web::Path<Id>,
) -> Result<HttpResponse, ApiError> {
    ensure_staff(&auth)?;
    let collection = data.repo.subscribe_collection(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(collection))
}

// ---------------- admin -----------------------------------------------

pub async fn admin_platform_analytics(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let analytics = data.repo.platform_analytics().await?;
    Ok(HttpResponse::Ok().json(analytics))
}

pub async fn admin_analytics_by_discipline(
    auth: Auth,
    data: web::Data<AppState>,
) -> Result<HttpResponse, ApiError> {
    ensure_admin!(auth);
    let by_discipline = data.repo.analytics_by_discipline().await?;
    Ok(HttpResponse::Ok().json(serde_json::json!({ "by_discipline": by_discipline })))
}

pub async fn admin_hide_resource(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> { ensure_admin!(auth); data.repo.set_resource_hidden(path.into_inner(), true).await?; Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"}))) }
pub async fn admin_unhide_resource(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> { ensure_admin!(auth); data.repo.set_resource_hidden(path.into_inner(), false).await?; Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"}))) }
pub async fn admin_verify_resource(auth: Auth, data: web::Data<AppState>, path: web::Path<Id>) -> Result<HttpResponse, ApiError> { ensure_admin!(auth); data.repo.set_resource_verified(path.into_inner(), true).await?; Ok(HttpResponse::Ok().json(serde_json::json!({"status":"ok"}))) }
