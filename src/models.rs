use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

// Postgres-backed ids everywhere; the in-memory store hands them out itself.
pub type Id = i64;

/// What kind of thing a resource is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "resource_type", rename_all = "kebab-case")]
pub enum ResourceType {
    Request,
    UseCase,
    PromptTemplate,
    Tool,
    Policy,
    Paper,
    Project,
    Conference,
    Dataset,
    Book,
    Other,
}

/// Author's openness to joint work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "collaboration_status", rename_all = "kebab-case")]
pub enum CollaborationStatus {
    Seeking,
    Proven,
    HasMaterials,
}

/// Unit attached to `time_saved_value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "kebab-case")]
#[sqlx(type_name = "time_saved_frequency", rename_all = "kebab-case")]
pub enum TimeSavedFrequency {
    PerWeek,
    PerMonth,
    PerSemester,
}

/// Read-visibility tier for prompts. Writes are always owner-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "sharing_level", rename_all = "lowercase")]
pub enum SharingLevel {
    Private,
    Department,
    School,
    Public,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Resource {
    pub id: Id,
    pub user_id: Id,
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub title: String,
    pub content: String,
    pub is_anonymous: bool,
    pub discipline: Option<String>,
    pub department: Option<String>,
    pub author_title: Option<String>,
    #[sqlx(json)]
    pub tools_used: Vec<String>,
    pub collaboration_status: Option<CollaborationStatus>,
    #[sqlx(json)]
    pub open_to_collaborate: Vec<String>,
    pub time_saved_value: Option<f64>,
    pub time_saved_frequency: Option<TimeSavedFrequency>,
    #[sqlx(json)]
    pub evidence_of_success: Vec<String>,
    pub is_fork: bool,
    pub forked_from_id: Option<Id>,
    pub version_number: i32,
    pub quick_summary: Option<String>,
    #[sqlx(json)]
    pub workflow_steps: Vec<String>,
    pub example_prompt: Option<String>,
    pub ethics_notes: Option<String>,
    pub is_verified: bool,
    pub is_hidden: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewResource {
    #[serde(rename = "type")]
    pub resource_type: ResourceType,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub is_anonymous: bool,
    pub discipline: Option<String>,
    pub department: Option<String>,
    pub author_title: Option<String>,
    #[serde(default)]
    pub tools_used: Vec<String>,
    pub collaboration_status: Option<CollaborationStatus>,
    #[serde(default)]
    pub open_to_collaborate: Vec<String>,
    pub time_saved_value: Option<f64>,
    pub time_saved_frequency: Option<TimeSavedFrequency>,
    #[serde(default)]
    pub evidence_of_success: Vec<String>,
    #[serde(default)]
    pub is_fork: bool,
    pub forked_from_id: Option<Id>,
    pub quick_summary: Option<String>,
    #[serde(default)]
    pub workflow_steps: Vec<String>,
    pub example_prompt: Option<String>,
    pub ethics_notes: Option<String>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateResource {
    pub title: Option<String>,
    pub content: Option<String>,
    pub discipline: Option<String>,
    pub department: Option<String>,
    pub author_title: Option<String>,
    pub tools_used: Option<Vec<String>>,
    pub collaboration_status: Option<CollaborationStatus>,
    pub open_to_collaborate: Option<Vec<String>>,
    pub time_saved_value: Option<f64>,
    pub time_saved_frequency: Option<TimeSavedFrequency>,
    pub evidence_of_success: Option<Vec<String>>,
    pub quick_summary: Option<String>,
    pub workflow_steps: Option<Vec<String>>,
    pub example_prompt: Option<String>,
    pub ethics_notes: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Comment {
    pub id: Id,
    pub resource_id: Id,
    pub parent_comment_id: Option<Id>,
    pub user_id: Id,
    pub content: String,
    pub helpful_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewComment {
    pub content: String,
    pub parent_comment_id: Option<Id>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateComment {
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Prompt {
    pub id: Id,
    pub user_id: Id,
    pub title: String,
    pub prompt_text: String,
    pub description: Option<String>,
    #[sqlx(json)]
    pub variables: Vec<String>,
    pub sharing_level: SharingLevel,
    pub is_fork: bool,
    pub forked_from_id: Option<Id>,
    pub version_number: i32,
    pub usage_count: i64,
    pub fork_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewPrompt {
    pub title: String,
    pub prompt_text: String,
    pub description: Option<String>,
    #[serde(default)]
    pub variables: Vec<String>,
    pub sharing_level: SharingLevel,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdatePrompt {
    pub title: Option<String>,
    pub prompt_text: Option<String>,
    pub description: Option<String>,
    pub variables: Option<Vec<String>>,
    pub sharing_level: Option<SharingLevel>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct Collection {
    pub id: Id,
    pub name: String,
    pub description: Option<String>,
    pub owner_id: Id,
    // Id lists are not foreign-key enforced; dangling ids are tolerated.
    #[sqlx(json)]
    pub resource_ids: Vec<Id>,
    #[sqlx(json)]
    pub prompt_ids: Vec<Id>,
    pub subscriber_count: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct NewCollection {
    pub name: String,
    pub description: Option<String>,
    #[serde(default)]
    pub resource_ids: Vec<Id>,
    #[serde(default)]
    pub prompt_ids: Vec<Id>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateCollection {
    pub name: Option<String>,
    pub description: Option<String>,
    pub resource_ids: Option<Vec<Id>>,
    pub prompt_ids: Option<Vec<Id>>,
}

/// One-to-one engagement counters per resource, created on first tracked
/// interaction. Counters only move up, except `save_count` which an unsave
/// decrements (clamped at zero).
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct ResourceAnalytics {
    pub resource_id: Id,
    pub view_count: i64,
    pub unique_viewers: i64,
    pub save_count: i64,
    pub tried_count: i64,
    pub fork_count: i64,
    pub comment_count: i64,
    pub helpful_count: i64,
    pub last_viewed: Option<DateTime<Utc>>,
}

impl ResourceAnalytics {
    pub fn zeroed(resource_id: Id) -> Self {
        Self {
            resource_id,
            view_count: 0,
            unique_viewers: 0,
            save_count: 0,
            tried_count: 0,
            fork_count: 0,
            comment_count: 0,
            helpful_count: 0,
            last_viewed: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct CollaborationRequest {
    pub id: Id,
    pub resource_id: Id,
    pub from_user_id: Id,
    pub message: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct NewCollaborationRequest {
    pub message: Option<String>,
}

// ---- admin aggregate views (computed, never stored) ----

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlatformStats {
    pub total_resources: i64,
    pub total_views: i64,
    pub total_saves: i64,
    pub total_tried: i64,
    pub total_forks: i64,
    pub total_comments: i64,
    pub avg_views_per_resource: f64,
    pub avg_saves_per_resource: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, sqlx::FromRow)]
pub struct TopResource {
    pub resource_id: Id,
    pub title: String,
    pub view_count: i64,
    pub save_count: i64,
    pub tried_count: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PlatformAnalytics {
    pub platform_stats: PlatformStats,
    pub top_resources: Vec<TopResource>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DisciplineStats {
    pub count: i64,
    pub total_views: i64,
    pub total_saves: i64,
}
