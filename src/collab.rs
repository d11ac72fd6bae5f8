//! Collaboration options: a pure projection of a resource plus platform
//! capabilities. Nothing here touches storage; persisted collaboration
//! requests go through the repository like any other entity.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::models::{CollaborationStatus, Id, Resource};

/// What the deployment can offer for contacting an author. Email is always
/// available; internal messaging depends on the platform build.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, ToSchema)]
pub struct ContactOptions {
    pub email: bool,
    pub internal_messaging: bool,
}

#[derive(Debug, Clone)]
pub struct PlatformCapabilities {
    pub internal_messaging: bool,
}

impl PlatformCapabilities {
    fn from_env() -> Self {
        let internal_messaging = std::env::var("INTERNAL_MESSAGING_ENABLED")
            .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        Self { internal_messaging }
    }
}

static CAPABILITIES: Lazy<PlatformCapabilities> = Lazy::new(PlatformCapabilities::from_env);

pub fn capabilities() -> &'static PlatformCapabilities {
    &CAPABILITIES
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CollaborationOptions {
    pub resource_id: Id,
    pub collaboration_status: Option<CollaborationStatus>,
    pub open_to_collaborate: Vec<String>,
    pub contact: ContactOptions,
}

pub fn collaboration_options(resource: &Resource, caps: &PlatformCapabilities) -> CollaborationOptions {
    CollaborationOptions {
        resource_id: resource.id,
        collaboration_status: resource.collaboration_status,
        open_to_collaborate: resource.open_to_collaborate.clone(),
        contact: ContactOptions {
            email: true,
            internal_messaging: caps.internal_messaging,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceType;
    use chrono::Utc;

    #[test]
    fn options_mirror_resource_and_capabilities() {
        let resource = Resource {
            id: 7,
            user_id: 1,
            resource_type: ResourceType::Request,
            title: "Seeking co-author".into(),
            content: "".into(),
            is_anonymous: false,
            discipline: None,
            department: None,
            author_title: None,
            tools_used: vec![],
            collaboration_status: Some(CollaborationStatus::Seeking),
            open_to_collaborate: vec!["co-teaching".into()],
            time_saved_value: None,
            time_saved_frequency: None,
            evidence_of_success: vec![],
            is_fork: false,
            forked_from_id: None,
            version_number: 1,
            quick_summary: None,
            workflow_steps: vec![],
            example_prompt: None,
            ethics_notes: None,
            is_verified: false,
            is_hidden: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let caps = PlatformCapabilities { internal_messaging: true };
        let opts = collaboration_options(&resource, &caps);
        assert_eq!(opts.resource_id, 7);
        assert_eq!(opts.collaboration_status, Some(CollaborationStatus::Seeking));
        assert_eq!(opts.open_to_collaborate, vec!["co-teaching".to_string()]);
        assert!(opts.contact.email);
        assert!(opts.contact.internal_messaging);
    }
}
