use crate::collab::{CollaborationOptions, ContactOptions};
use crate::models::{
    CollaborationRequest, CollaborationStatus, Collection, Comment, NewCollaborationRequest,
    NewCollection, NewComment, NewPrompt, NewResource, Prompt, Resource, ResourceAnalytics,
    ResourceType, SharingLevel, TimeSavedFrequency, UpdateCollection, UpdateComment, UpdatePrompt,
    UpdateResource,
};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::routes::list_resources,
        crate::routes::get_resource,
        crate::routes::create_resource,
        crate::routes::update_resource,
        crate::routes::delete_resource,
        crate::routes::fork_resource,
        crate::routes::track_view,
        crate::routes::track_tried,
        crate::routes::toggle_save,
        crate::routes::get_analytics,
        crate::routes::collaboration_options,
        crate::routes::find_similar,
        crate::routes::request_collaboration,
        crate::routes::list_comments,
        crate::routes::create_comment,
    ),
    components(schemas(
        Resource, NewResource, UpdateResource, ResourceType, CollaborationStatus,
        TimeSavedFrequency, Comment, NewComment, UpdateComment, Prompt, NewPrompt, UpdatePrompt,
        SharingLevel, Collection, NewCollection, UpdateCollection, ResourceAnalytics,
        CollaborationRequest, NewCollaborationRequest, CollaborationOptions, ContactOptions,
        crate::routes::EngagementTracked, crate::routes::SaveToggled
    )),
    tags(
        (name = "resources", description = "Resource browse, CRUD and forks"),
        (name = "engagement", description = "View/save/tried tracking and counters"),
        (name = "collaboration", description = "Collaboration options and requests"),
    )
)]
pub struct ApiDoc;
