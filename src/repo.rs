use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, RwLock};

use crate::auth::Caller;
use crate::models::*;
use crate::query::{similarity_score, ResourceQuery, SortBy, DEFAULT_SIMILAR_LIMIT};

#[derive(thiserror::Error, Debug)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("internal: {0}")] Internal(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

use async_trait::async_trait;

#[async_trait]
pub trait ResourceRepo: Send + Sync {
    async fn list_resources(&self, query: &ResourceQuery, caller: &Caller) -> RepoResult<Vec<Resource>>;
    async fn get_resource(&self, id: Id) -> RepoResult<Resource>;
    async fn create_resource(&self, user_id: Id, new: NewResource) -> RepoResult<Resource>;
    async fn update_resource(&self, id: Id, upd: UpdateResource) -> RepoResult<Resource>;
    async fn delete_resource(&self, id: Id) -> RepoResult<()>;
    async fn set_resource_hidden(&self, id: Id, hidden: bool) -> RepoResult<Resource>;
    async fn set_resource_verified(&self, id: Id, verified: bool) -> RepoResult<Resource>;
    /// Copy with lineage; bumps the source's analytics fork counter.
    async fn fork_resource(&self, id: Id, user_id: Id) -> RepoResult<Resource>;
    async fn find_similar(&self, discipline: Option<&str>, tools: &[String], limit: i64) -> RepoResult<Vec<Resource>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    /// Flat list, ascending creation time; clients assemble the thread tree.
    async fn list_comments(&self, resource_id: Id) -> RepoResult<Vec<Comment>>;
    async fn get_comment(&self, id: Id) -> RepoResult<Comment>;
    async fn create_comment(&self, resource_id: Id, user_id: Id, new: NewComment) -> RepoResult<Comment>;
    async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment>;
    async fn delete_comment(&self, id: Id) -> RepoResult<()>;
    /// Bumps the comment's own counter and the resource's helpful total.
    async fn vote_comment_helpful(&self, id: Id) -> RepoResult<Comment>;
}

#[async_trait]
pub trait PromptRepo: Send + Sync {
    async fn list_prompts(&self, caller: &Caller, sharing_level: Option<SharingLevel>, skip: i64, limit: i64) -> RepoResult<Vec<Prompt>>;
    async fn get_prompt(&self, id: Id) -> RepoResult<Prompt>;
    async fn create_prompt(&self, user_id: Id, new: NewPrompt) -> RepoResult<Prompt>;
    async fn update_prompt(&self, id: Id, upd: UpdatePrompt) -> RepoResult<Prompt>;
    async fn delete_prompt(&self, id: Id) -> RepoResult<()>;
    async fn fork_prompt(&self, id: Id, user_id: Id) -> RepoResult<Prompt>;
    async fn record_prompt_usage(&self, id: Id) -> RepoResult<Prompt>;
}

#[async_trait]
pub trait CollectionRepo: Send + Sync {
    async fn list_collections(&self, skip: i64, limit: i64) -> RepoResult<Vec<Collection>>;
    async fn get_collection(&self, id: Id) -> RepoResult<Collection>;
    async fn create_collection(&self, owner_id: Id, new: NewCollection) -> RepoResult<Collection>;
    async fn update_collection(&self, id: Id, upd: UpdateCollection) -> RepoResult<Collection>;
    async fn delete_collection(&self, id: Id) -> RepoResult<()>;
    async fn subscribe_collection(&self, id: Id) -> RepoResult<Collection>;
}

#[async_trait]
pub trait EngagementRepo: Send + Sync {
    async fn record_view(&self, resource_id: Id) -> RepoResult<ResourceAnalytics>;
    async fn record_tried(&self, resource_id: Id) -> RepoResult<ResourceAnalytics>;
    /// Flips the caller's saved state; returns the new state and counters.
    async fn toggle_save(&self, resource_id: Id, user_id: Id) -> RepoResult<(bool, ResourceAnalytics)>;
    async fn is_saved(&self, resource_id: Id, user_id: Id) -> RepoResult<bool>;
    /// Newest-saved first.
    async fn saved_resources(&self, user_id: Id, skip: i64, limit: i64) -> RepoResult<Vec<Resource>>;
    /// Reading never creates the row; absent means all-zero counters.
    async fn get_analytics(&self, resource_id: Id) -> RepoResult<ResourceAnalytics>;
    async fn platform_analytics(&self) -> RepoResult<PlatformAnalytics>;
    async fn analytics_by_discipline(&self) -> RepoResult<BTreeMap<String, DisciplineStats>>;
}

#[async_trait]
pub trait CollabRepo: Send + Sync {
    async fn create_collaboration_request(&self, resource_id: Id, from_user_id: Id, new: NewCollaborationRequest) -> RepoResult<CollaborationRequest>;
    async fn list_collaboration_requests(&self, resource_id: Id) -> RepoResult<Vec<CollaborationRequest>>;
}

pub trait Repo: ResourceRepo + CommentRepo + PromptRepo + CollectionRepo + EngagementRepo + CollabRepo {}

impl<T> Repo for T where T: ResourceRepo + CommentRepo + PromptRepo + CollectionRepo + EngagementRepo + CollabRepo {}

fn sort_listing(resources: &mut [Resource], analytics: &HashMap<Id, ResourceAnalytics>, sort_by: SortBy) {
    match sort_by {
        SortBy::Newest => resources.sort_by(|a, b| b.created_at.cmp(&a.created_at)),
        SortBy::Popular => resources.sort_by(|a, b| {
            let va = analytics.get(&a.id).map(|x| x.view_count).unwrap_or(0);
            let vb = analytics.get(&b.id).map(|x| x.view_count).unwrap_or(0);
            vb.cmp(&va).then(b.created_at.cmp(&a.created_at))
        }),
        SortBy::MostTried => resources.sort_by(|a, b| {
            let ta = analytics.get(&a.id).map(|x| x.tried_count).unwrap_or(0);
            let tb = analytics.get(&b.id).map(|x| x.tried_count).unwrap_or(0);
            tb.cmp(&ta).then(b.created_at.cmp(&a.created_at))
        }),
    }
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use std::path::{Path, PathBuf};

    const SNAPSHOT_PATH: &str = "data/state.json";

    #[derive(Clone, Serialize, Deserialize)]
    struct SavedEntry {
        resource_id: Id,
        saved_at: DateTime<Utc>,
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        resources: HashMap<Id, Resource>,
        comments: HashMap<Id, Comment>,
        prompts: HashMap<Id, Prompt>,
        collections: HashMap<Id, Collection>,
        analytics: HashMap<Id, ResourceAnalytics>,
        saved: HashMap<Id, Vec<SavedEntry>>, // user id -> saved resources, oldest first
        collab_requests: HashMap<Id, CollaborationRequest>,
        next_id: Id,
    }

    impl State {
        fn alloc_id(&mut self) -> Id {
            self.next_id += 1;
            self.next_id
        }

        fn require_resource(&self, id: Id) -> RepoResult<&Resource> {
            self.resources.get(&id).ok_or(RepoError::NotFound)
        }

        fn analytics_entry(&mut self, resource_id: Id) -> &mut ResourceAnalytics {
            self.analytics
                .entry(resource_id)
                .or_insert_with(|| ResourceAnalytics::zeroed(resource_id))
        }
    }

    #[derive(Clone)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Arc<PathBuf>,
    }

    impl InMemRepo {
        fn data_dir() -> PathBuf {
            std::env::var("AIX_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data"))
        }

        fn snapshot_path() -> PathBuf {
            if std::env::var("AIX_DATA_DIR").is_ok() {
                let mut p = Self::data_dir();
                p.push("state.json");
                p
            } else {
                PathBuf::from(SNAPSHOT_PATH)
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        log::info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        log::warn!("failed to parse snapshot '{}': {e}. Starting empty.", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    log::info!("no snapshot at '{}': {e}. Starting empty.", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let path = self.snapshot_path.clone();
            if let Ok(s) = serde_json::to_vec_pretty(&*self.state.read().unwrap()) {
                if let Some(dir) = path.parent() {
                    let _ = std::fs::create_dir_all(dir);
                }
                if let Err(e) = std::fs::write(&*path, s) {
                    log::warn!("failed to write snapshot '{}': {e}", path.display());
                }
            }
        }

        pub fn new() -> Self {
            let snapshot_path = Self::snapshot_path();
            let state = Self::load_state_from(&snapshot_path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Arc::new(snapshot_path),
            }
        }
    }

    impl Default for InMemRepo {
        fn default() -> Self { Self::new() }
    }

    #[async_trait]
    impl ResourceRepo for InMemRepo {
        async fn list_resources(&self, query: &ResourceQuery, caller: &Caller) -> RepoResult<Vec<Resource>> {
            let s = self.state.read().unwrap();
            let mut page: Vec<Resource> = s
                .resources
                .values()
                .filter(|r| !r.is_hidden || caller.is_admin || caller.owns(r.user_id))
                .filter(|r| crate::query::matches(query, r))
                .cloned()
                .collect();
            sort_listing(&mut page, &s.analytics, query.sort_by);
            Ok(page
                .into_iter()
                .skip(query.skip as usize)
                .take(query.limit as usize)
                .collect())
        }

        async fn get_resource(&self, id: Id) -> RepoResult<Resource> {
            let s = self.state.read().unwrap();
            s.resources.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_resource(&self, user_id: Id, new: NewResource) -> RepoResult<Resource> {
            let mut s = self.state.write().unwrap();
            if let Some(parent_id) = new.forked_from_id {
                s.require_resource(parent_id)?;
            }
            let now = Utc::now();
            let id = s.alloc_id();
            let resource = Resource {
                id,
                user_id,
                resource_type: new.resource_type,
                title: new.title,
                content: new.content,
                is_anonymous: new.is_anonymous,
                discipline: new.discipline,
                department: new.department,
                author_title: new.author_title,
                tools_used: new.tools_used,
                collaboration_status: new.collaboration_status,
                open_to_collaborate: new.open_to_collaborate,
                time_saved_value: new.time_saved_value,
                time_saved_frequency: new.time_saved_frequency,
                evidence_of_success: new.evidence_of_success,
                is_fork: new.is_fork,
                forked_from_id: new.forked_from_id,
                version_number: 1,
                quick_summary: new.quick_summary,
                workflow_steps: new.workflow_steps,
                example_prompt: new.example_prompt,
                ethics_notes: new.ethics_notes,
                is_verified: false,
                is_hidden: false,
                created_at: now,
                updated_at: now,
            };
            s.resources.insert(id, resource.clone());
            drop(s);
            self.persist();
            Ok(resource)
        }

        async fn update_resource(&self, id: Id, upd: UpdateResource) -> RepoResult<Resource> {
            let mut s = self.state.write().unwrap();
            let resource = s.resources.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title { resource.title = title; }
            if let Some(content) = upd.content { resource.content = content; }
            if let Some(discipline) = upd.discipline { resource.discipline = Some(discipline); }
            if let Some(department) = upd.department { resource.department = Some(department); }
            if let Some(author_title) = upd.author_title { resource.author_title = Some(author_title); }
            if let Some(tools) = upd.tools_used { resource.tools_used = tools; }
            if let Some(status) = upd.collaboration_status { resource.collaboration_status = Some(status); }
            if let Some(open) = upd.open_to_collaborate { resource.open_to_collaborate = open; }
            if let Some(v) = upd.time_saved_value { resource.time_saved_value = Some(v); }
            if let Some(f) = upd.time_saved_frequency { resource.time_saved_frequency = Some(f); }
            if let Some(e) = upd.evidence_of_success { resource.evidence_of_success = e; }
            if let Some(q) = upd.quick_summary { resource.quick_summary = Some(q); }
            if let Some(w) = upd.workflow_steps { resource.workflow_steps = w; }
            if let Some(p) = upd.example_prompt { resource.example_prompt = Some(p); }
            if let Some(n) = upd.ethics_notes { resource.ethics_notes = Some(n); }
            resource.updated_at = Utc::now();
            let updated = resource.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_resource(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.resources.remove(&id).ok_or(RepoError::NotFound)?;
            s.analytics.remove(&id);
            s.comments.retain(|_, c| c.resource_id != id);
            s.collab_requests.retain(|_, r| r.resource_id != id);
            for entries in s.saved.values_mut() {
                entries.retain(|e| e.resource_id != id);
            }
            drop(s);
            self.persist();
            Ok(())
        }

        async fn set_resource_hidden(&self, id: Id, hidden: bool) -> RepoResult<Resource> {
            let mut s = self.state.write().unwrap();
            let resource = s.resources.get_mut(&id).ok_or(RepoError::NotFound)?;
            resource.is_hidden = hidden;
            resource.updated_at = Utc::now();
            let updated = resource.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn set_resource_verified(&self, id: Id, verified: bool) -> RepoResult<Resource> {
            let mut s = self.state.write().unwrap();
            let resource = s.resources.get_mut(&id).ok_or(RepoError::NotFound)?;
            resource.is_verified = verified;
            resource.updated_at = Utc::now();
            let updated = resource.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn fork_resource(&self, id: Id, user_id: Id) -> RepoResult<Resource> {
            let mut s = self.state.write().unwrap();
            let source = s.resources.get(&id).cloned().ok_or(RepoError::NotFound)?;
            let now = Utc::now();
            let fork_id = s.alloc_id();
            let fork = Resource {
                id: fork_id,
                user_id,
                is_fork: true,
                forked_from_id: Some(source.id),
                version_number: 1,
                is_verified: false,
                is_hidden: false,
                created_at: now,
                updated_at: now,
                ..source
            };
            s.resources.insert(fork_id, fork.clone());
            s.analytics_entry(id).fork_count += 1;
            drop(s);
            self.persist();
            Ok(fork)
        }

        async fn find_similar(&self, discipline: Option<&str>, tools: &[String], limit: i64) -> RepoResult<Vec<Resource>> {
            let s = self.state.read().unwrap();
            let limit = if limit <= 0 { DEFAULT_SIMILAR_LIMIT } else { limit };
            let mut scored: Vec<(usize, Resource)> = s
                .resources
                .values()
                .filter(|r| !r.is_hidden)
                .filter_map(|r| {
                    let score = similarity_score(discipline, tools, r);
                    (score > 0).then(|| (score, r.clone()))
                })
                .collect();
            scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.created_at.cmp(&a.1.created_at)));
            Ok(scored.into_iter().take(limit as usize).map(|(_, r)| r).collect())
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn list_comments(&self, resource_id: Id) -> RepoResult<Vec<Comment>> {
            let s = self.state.read().unwrap();
            s.require_resource(resource_id)?;
            let mut v: Vec<_> = s
                .comments
                .values()
                .filter(|c| c.resource_id == resource_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            Ok(v)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            let s = self.state.read().unwrap();
            s.comments.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_comment(&self, resource_id: Id, user_id: Id, new: NewComment) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            s.require_resource(resource_id)?;
            if let Some(parent_id) = new.parent_comment_id {
                if !s.comments.contains_key(&parent_id) {
                    return Err(RepoError::NotFound);
                }
            }
            let now = Utc::now();
            let id = s.alloc_id();
            let comment = Comment {
                id,
                resource_id,
                parent_comment_id: new.parent_comment_id,
                user_id,
                content: new.content,
                helpful_count: 0,
                created_at: now,
                updated_at: now,
            };
            s.comments.insert(id, comment.clone());
            s.analytics_entry(resource_id).comment_count += 1;
            drop(s);
            self.persist();
            Ok(comment)
        }

        async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            comment.content = content;
            comment.updated_at = Utc::now();
            let updated = comment.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.comments.remove(&id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn vote_comment_helpful(&self, id: Id) -> RepoResult<Comment> {
            let mut s = self.state.write().unwrap();
            let comment = s.comments.get_mut(&id).ok_or(RepoError::NotFound)?;
            comment.helpful_count += 1;
            let updated = comment.clone();
            let resource_id = updated.resource_id;
            s.analytics_entry(resource_id).helpful_count += 1;
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl PromptRepo for InMemRepo {
        async fn list_prompts(&self, caller: &Caller, sharing_level: Option<SharingLevel>, skip: i64, limit: i64) -> RepoResult<Vec<Prompt>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s
                .prompts
                .values()
                .filter(|p| prompt_visible(p, caller))
                .filter(|p| sharing_level.map(|l| p.sharing_level == l).unwrap_or(true))
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect())
        }

        async fn get_prompt(&self, id: Id) -> RepoResult<Prompt> {
            let s = self.state.read().unwrap();
            s.prompts.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_prompt(&self, user_id: Id, new: NewPrompt) -> RepoResult<Prompt> {
            let mut s = self.state.write().unwrap();
            let now = Utc::now();
            let id = s.alloc_id();
            let prompt = Prompt {
                id,
                user_id,
                title: new.title,
                prompt_text: new.prompt_text,
                description: new.description,
                variables: new.variables,
                sharing_level: new.sharing_level,
                is_fork: false,
                forked_from_id: None,
                version_number: 1,
                usage_count: 0,
                fork_count: 0,
                created_at: now,
                updated_at: now,
            };
            s.prompts.insert(id, prompt.clone());
            drop(s);
            self.persist();
            Ok(prompt)
        }

        async fn update_prompt(&self, id: Id, upd: UpdatePrompt) -> RepoResult<Prompt> {
            let mut s = self.state.write().unwrap();
            let prompt = s.prompts.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(title) = upd.title { prompt.title = title; }
            if let Some(text) = upd.prompt_text { prompt.prompt_text = text; }
            if let Some(description) = upd.description { prompt.description = Some(description); }
            if let Some(variables) = upd.variables { prompt.variables = variables; }
            if let Some(level) = upd.sharing_level { prompt.sharing_level = level; }
            prompt.updated_at = Utc::now();
            let updated = prompt.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_prompt(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.prompts.remove(&id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn fork_prompt(&self, id: Id, user_id: Id) -> RepoResult<Prompt> {
            let mut s = self.state.write().unwrap();
            let source = s.prompts.get(&id).cloned().ok_or(RepoError::NotFound)?;
            let now = Utc::now();
            let fork_id = s.alloc_id();
            let fork = Prompt {
                id: fork_id,
                user_id,
                title: format!("{} (copy)", source.title),
                sharing_level: SharingLevel::Private, // forks start private
                is_fork: true,
                forked_from_id: Some(source.id),
                version_number: 1,
                usage_count: 0,
                fork_count: 0,
                created_at: now,
                updated_at: now,
                ..source
            };
            s.prompts.insert(fork_id, fork.clone());
            if let Some(original) = s.prompts.get_mut(&id) {
                original.fork_count += 1;
            }
            drop(s);
            self.persist();
            Ok(fork)
        }

        async fn record_prompt_usage(&self, id: Id) -> RepoResult<Prompt> {
            let mut s = self.state.write().unwrap();
            let prompt = s.prompts.get_mut(&id).ok_or(RepoError::NotFound)?;
            prompt.usage_count += 1;
            let updated = prompt.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    fn prompt_visible(prompt: &Prompt, caller: &Caller) -> bool {
        match prompt.sharing_level {
            SharingLevel::Public => true,
            SharingLevel::Department | SharingLevel::School => caller.user_id.is_some() || caller.is_admin,
            SharingLevel::Private => caller.is_admin || caller.owns(prompt.user_id),
        }
    }

    #[async_trait]
    impl CollectionRepo for InMemRepo {
        async fn list_collections(&self, skip: i64, limit: i64) -> RepoResult<Vec<Collection>> {
            let s = self.state.read().unwrap();
            let mut v: Vec<_> = s.collections.values().cloned().collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v.into_iter().skip(skip.max(0) as usize).take(limit.max(0) as usize).collect())
        }

        async fn get_collection(&self, id: Id) -> RepoResult<Collection> {
            let s = self.state.read().unwrap();
            s.collections.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn create_collection(&self, owner_id: Id, new: NewCollection) -> RepoResult<Collection> {
            let mut s = self.state.write().unwrap();
            let id = s.alloc_id();
            let collection = Collection {
                id,
                name: new.name,
                description: new.description,
                owner_id,
                resource_ids: new.resource_ids,
                prompt_ids: new.prompt_ids,
                subscriber_count: 0,
                created_at: Utc::now(),
            };
            s.collections.insert(id, collection.clone());
            drop(s);
            self.persist();
            Ok(collection)
        }

        async fn update_collection(&self, id: Id, upd: UpdateCollection) -> RepoResult<Collection> {
            let mut s = self.state.write().unwrap();
            let collection = s.collections.get_mut(&id).ok_or(RepoError::NotFound)?;
            if let Some(name) = upd.name { collection.name = name; }
            if let Some(description) = upd.description { collection.description = Some(description); }
            if let Some(resource_ids) = upd.resource_ids { collection.resource_ids = resource_ids; }
            if let Some(prompt_ids) = upd.prompt_ids { collection.prompt_ids = prompt_ids; }
            let updated = collection.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }

        async fn delete_collection(&self, id: Id) -> RepoResult<()> {
            let mut s = self.state.write().unwrap();
            s.collections.remove(&id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn subscribe_collection(&self, id: Id) -> RepoResult<Collection> {
            let mut s = self.state.write().unwrap();
            let collection = s.collections.get_mut(&id).ok_or(RepoError::NotFound)?;
            collection.subscriber_count += 1;
            let updated = collection.clone();
            drop(s);
            self.persist();
            Ok(updated)
        }
    }

    #[async_trait]
    impl EngagementRepo for InMemRepo {
        async fn record_view(&self, resource_id: Id) -> RepoResult<ResourceAnalytics> {
            let mut s = self.state.write().unwrap();
            s.require_resource(resource_id)?;
            let analytics = s.analytics_entry(resource_id);
            analytics.view_count += 1;
            analytics.last_viewed = Some(Utc::now());
            let snapshot = analytics.clone();
            drop(s);
            self.persist();
            Ok(snapshot)
        }

        async fn record_tried(&self, resource_id: Id) -> RepoResult<ResourceAnalytics> {
            let mut s = self.state.write().unwrap();
            s.require_resource(resource_id)?;
            let analytics = s.analytics_entry(resource_id);
            analytics.tried_count += 1;
            let snapshot = analytics.clone();
            drop(s);
            self.persist();
            Ok(snapshot)
        }

        async fn toggle_save(&self, resource_id: Id, user_id: Id) -> RepoResult<(bool, ResourceAnalytics)> {
            let mut s = self.state.write().unwrap();
            s.require_resource(resource_id)?;
            let entries = s.saved.entry(user_id).or_default();
            let was_saved = entries.iter().any(|e| e.resource_id == resource_id);
            if was_saved {
                entries.retain(|e| e.resource_id != resource_id);
            } else {
                entries.push(SavedEntry { resource_id, saved_at: Utc::now() });
            }
            let analytics = s.analytics_entry(resource_id);
            if was_saved {
                analytics.save_count = analytics.save_count.saturating_sub(1);
            } else {
                analytics.save_count += 1;
            }
            let snapshot = analytics.clone();
            drop(s);
            self.persist();
            Ok((!was_saved, snapshot))
        }

        async fn is_saved(&self, resource_id: Id, user_id: Id) -> RepoResult<bool> {
            let s = self.state.read().unwrap();
            s.require_resource(resource_id)?;
            Ok(s.saved
                .get(&user_id)
                .map(|entries| entries.iter().any(|e| e.resource_id == resource_id))
                .unwrap_or(false))
        }

        async fn saved_resources(&self, user_id: Id, skip: i64, limit: i64) -> RepoResult<Vec<Resource>> {
            let s = self.state.read().unwrap();
            let mut entries: Vec<SavedEntry> = s.saved.get(&user_id).cloned().unwrap_or_default();
            entries.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
            Ok(entries
                .into_iter()
                .filter_map(|e| s.resources.get(&e.resource_id).cloned())
                .filter(|r| !r.is_hidden || r.user_id == user_id)
                .skip(skip.max(0) as usize)
                .take(limit.max(0) as usize)
                .collect())
        }

        async fn get_analytics(&self, resource_id: Id) -> RepoResult<ResourceAnalytics> {
            let s = self.state.read().unwrap();
            s.require_resource(resource_id)?;
            Ok(s.analytics
                .get(&resource_id)
                .cloned()
                .unwrap_or_else(|| ResourceAnalytics::zeroed(resource_id)))
        }

        async fn platform_analytics(&self) -> RepoResult<PlatformAnalytics> {
            let s = self.state.read().unwrap();
            let total_resources = s.resources.len() as i64;
            let total_views: i64 = s.analytics.values().map(|a| a.view_count).sum();
            let total_saves: i64 = s.analytics.values().map(|a| a.save_count).sum();
            let total_tried: i64 = s.analytics.values().map(|a| a.tried_count).sum();
            let total_forks: i64 = s.analytics.values().map(|a| a.fork_count).sum();
            let total_comments: i64 = s.analytics.values().map(|a| a.comment_count).sum();
            let mut top: Vec<&ResourceAnalytics> = s.analytics.values().collect();
            top.sort_by(|a, b| b.view_count.cmp(&a.view_count));
            let top_resources = top
                .into_iter()
                .take(5)
                .filter_map(|a| {
                    s.resources.get(&a.resource_id).map(|r| TopResource {
                        resource_id: a.resource_id,
                        title: r.title.clone(),
                        view_count: a.view_count,
                        save_count: a.save_count,
                        tried_count: a.tried_count,
                    })
                })
                .collect();
            let denom = total_resources.max(1) as f64;
            Ok(PlatformAnalytics {
                platform_stats: PlatformStats {
                    total_resources,
                    total_views,
                    total_saves,
                    total_tried,
                    total_forks,
                    total_comments,
                    avg_views_per_resource: if total_resources == 0 { 0.0 } else { total_views as f64 / denom },
                    avg_saves_per_resource: if total_resources == 0 { 0.0 } else { total_saves as f64 / denom },
                },
                top_resources,
            })
        }

        async fn analytics_by_discipline(&self) -> RepoResult<BTreeMap<String, DisciplineStats>> {
            let s = self.state.read().unwrap();
            let mut by_discipline: BTreeMap<String, DisciplineStats> = BTreeMap::new();
            for resource in s.resources.values() {
                let Some(ref discipline) = resource.discipline else { continue };
                let stats = by_discipline.entry(discipline.clone()).or_default();
                stats.count += 1;
                if let Some(a) = s.analytics.get(&resource.id) {
                    stats.total_views += a.view_count;
                    stats.total_saves += a.save_count;
                }
            }
            Ok(by_discipline)
        }
    }

    #[async_trait]
    impl CollabRepo for InMemRepo {
        async fn create_collaboration_request(&self, resource_id: Id, from_user_id: Id, new: NewCollaborationRequest) -> RepoResult<CollaborationRequest> {
            let mut s = self.state.write().unwrap();
            s.require_resource(resource_id)?;
            let id = s.alloc_id();
            let request = CollaborationRequest {
                id,
                resource_id,
                from_user_id,
                message: new.message,
                created_at: Utc::now(),
            };
            s.collab_requests.insert(id, request.clone());
            drop(s);
            self.persist();
            Ok(request)
        }

        async fn list_collaboration_requests(&self, resource_id: Id) -> RepoResult<Vec<CollaborationRequest>> {
            let s = self.state.read().unwrap();
            s.require_resource(resource_id)?;
            let mut v: Vec<_> = s
                .collab_requests
                .values()
                .filter(|r| r.resource_id == resource_id)
                .cloned()
                .collect();
            v.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(v)
        }
    }
}

// Postgres implementation (feature = "postgres-store")
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use crate::query::{SEMESTER_WEEKS, WEEKS_PER_MONTH};
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres, QueryBuilder, Row};

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        async fn require_resource(&self, id: Id) -> RepoResult<()> {
            let exists = sqlx::query("SELECT 1 FROM resources WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if exists.is_none() { return Err(RepoError::NotFound); }
            Ok(())
        }
    }

    fn map_sqlx(e: sqlx::Error) -> RepoError {
        match e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(ref db) if db.is_unique_violation() => RepoError::Conflict,
            other => RepoError::Internal(other.to_string()),
        }
    }

    const RESOURCE_COLUMNS: &str = "id, user_id, resource_type, title, content, is_anonymous, discipline, department, author_title, tools_used, collaboration_status, open_to_collaborate, time_saved_value, time_saved_frequency, evidence_of_success, is_fork, forked_from_id, version_number, quick_summary, workflow_steps, example_prompt, ethics_notes, is_verified, is_hidden, created_at, updated_at";

    #[async_trait]
    impl ResourceRepo for PgRepo {
        async fn list_resources(&self, query: &ResourceQuery, caller: &Caller) -> RepoResult<Vec<Resource>> {
            let mut qb = QueryBuilder::<Postgres>::new(
                "SELECT r.* FROM resources r LEFT JOIN resource_analytics a ON a.resource_id = r.id WHERE TRUE",
            );
            if !caller.is_admin {
                match caller.user_id {
                    Some(uid) => {
                        qb.push(" AND (NOT r.is_hidden OR r.user_id = ");
                        qb.push_bind(uid);
                        qb.push(")");
                    }
                    None => { qb.push(" AND NOT r.is_hidden"); }
                }
            }
            if let Some(ref discipline) = query.discipline {
                qb.push(" AND r.discipline = ");
                qb.push_bind(discipline.clone());
            }
            if !query.tools.is_empty() {
                let lowered: Vec<String> = query.tools.iter().map(|t| t.to_lowercase()).collect();
                qb.push(" AND EXISTS (SELECT 1 FROM jsonb_array_elements_text(r.tools_used) tool WHERE lower(tool) = ANY(");
                qb.push_bind(lowered);
                qb.push("))");
            }
            if let Some(status) = query.collaboration_status {
                qb.push(" AND r.collaboration_status = ");
                qb.push_bind(status);
            }
            if let Some(min) = query.min_time_saved {
                qb.push(format!(
                    " AND r.time_saved_value IS NOT NULL AND (r.time_saved_value / CASE r.time_saved_frequency \
                     WHEN 'per-month'::time_saved_frequency THEN {WEEKS_PER_MONTH} \
                     WHEN 'per-semester'::time_saved_frequency THEN {SEMESTER_WEEKS} \
                     ELSE 1.0 END) >= "
                ));
                qb.push_bind(min);
            }
            if let Some(ref search) = query.search {
                let needle = format!("%{search}%");
                qb.push(" AND (r.title ILIKE ");
                qb.push_bind(needle.clone());
                qb.push(" OR r.content ILIKE ");
                qb.push_bind(needle.clone());
                qb.push(" OR COALESCE(r.quick_summary, '') ILIKE ");
                qb.push_bind(needle);
                qb.push(")");
            }
            match query.sort_by {
                SortBy::Newest => { qb.push(" ORDER BY r.created_at DESC"); }
                SortBy::Popular => { qb.push(" ORDER BY COALESCE(a.view_count, 0) DESC, r.created_at DESC"); }
                SortBy::MostTried => { qb.push(" ORDER BY COALESCE(a.tried_count, 0) DESC, r.created_at DESC"); }
            }
            qb.push(" OFFSET ");
            qb.push_bind(query.skip);
            qb.push(" LIMIT ");
            qb.push_bind(query.limit);
            qb.build_query_as::<Resource>()
                .fetch_all(&self.pool)
                .await
                .map_err(map_sqlx)
        }

        async fn get_resource(&self, id: Id) -> RepoResult<Resource> {
            sqlx::query_as::<_, Resource>(&format!("SELECT {RESOURCE_COLUMNS} FROM resources WHERE id = $1"))
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
        }

        async fn create_resource(&self, user_id: Id, new: NewResource) -> RepoResult<Resource> {
            if let Some(parent_id) = new.forked_from_id {
                self.require_resource(parent_id).await?;
            }
            sqlx::query_as::<_, Resource>(&format!(
                "INSERT INTO resources (user_id, resource_type, title, content, is_anonymous, discipline, department, author_title, tools_used, collaboration_status, open_to_collaborate, time_saved_value, time_saved_frequency, evidence_of_success, is_fork, forked_from_id, quick_summary, workflow_steps, example_prompt, ethics_notes) \
                 VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20) \
                 RETURNING {RESOURCE_COLUMNS}"
            ))
            .bind(user_id)
            .bind(new.resource_type)
            .bind(&new.title)
            .bind(&new.content)
            .bind(new.is_anonymous)
            .bind(&new.discipline)
            .bind(&new.department)
            .bind(&new.author_title)
            .bind(Json(&new.tools_used))
            .bind(new.collaboration_status)
            .bind(Json(&new.open_to_collaborate))
            .bind(new.time_saved_value)
            .bind(new.time_saved_frequency)
            .bind(Json(&new.evidence_of_success))
            .bind(new.is_fork)
            .bind(new.forked_from_id)
            .bind(&new.quick_summary)
            .bind(Json(&new.workflow_steps))
            .bind(&new.example_prompt)
            .bind(&new.ethics_notes)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn update_resource(&self, id: Id, upd: UpdateResource) -> RepoResult<Resource> {
            // COALESCE keeps unspecified fields; clearing a field back to
            // NULL is not supported by the partial-update contract.
            sqlx::query_as::<_, Resource>(&format!(
                "UPDATE resources SET \
                 title = COALESCE($2, title), \
                 content = COALESCE($3, content), \
                 discipline = COALESCE($4, discipline), \
                 department = COALESCE($5, department), \
                 author_title = COALESCE($6, author_title), \
                 tools_used = COALESCE($7, tools_used), \
                 collaboration_status = COALESCE($8, collaboration_status), \
                 open_to_collaborate = COALESCE($9, open_to_collaborate), \
                 time_saved_value = COALESCE($10, time_saved_value), \
                 time_saved_frequency = COALESCE($11, time_saved_frequency), \
                 evidence_of_success = COALESCE($12, evidence_of_success), \
                 quick_summary = COALESCE($13, quick_summary), \
                 workflow_steps = COALESCE($14, workflow_steps), \
                 example_prompt = COALESCE($15, example_prompt), \
                 ethics_notes = COALESCE($16, ethics_notes), \
                 updated_at = now() \
                 WHERE id = $1 RETURNING {RESOURCE_COLUMNS}"
            ))
            .bind(id)
            .bind(upd.title)
            .bind(upd.content)
            .bind(upd.discipline)
            .bind(upd.department)
            .bind(upd.author_title)
            .bind(upd.tools_used.map(|v| Json(v)))
            .bind(upd.collaboration_status)
            .bind(upd.open_to_collaborate.map(|v| Json(v)))
            .bind(upd.time_saved_value)
            .bind(upd.time_saved_frequency)
            .bind(upd.evidence_of_success.map(|v| Json(v)))
            .bind(upd.quick_summary)
            .bind(upd.workflow_steps.map(|v| Json(v)))
            .bind(upd.example_prompt)
            .bind(upd.ethics_notes)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn delete_resource(&self, id: Id) -> RepoResult<()> {
            let result = sqlx::query("DELETE FROM resources WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if result.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn set_resource_hidden(&self, id: Id, hidden: bool) -> RepoResult<Resource> {
            sqlx::query_as::<_, Resource>(&format!(
                "UPDATE resources SET is_hidden = $2, updated_at = now() WHERE id = $1 RETURNING {RESOURCE_COLUMNS}"
            ))
            .bind(id)
            .bind(hidden)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn set_resource_verified(&self, id: Id, verified: bool) -> RepoResult<Resource> {
            sqlx::query_as::<_, Resource>(&format!(
                "UPDATE resources SET is_verified = $2, updated_at = now() WHERE id = $1 RETURNING {RESOURCE_COLUMNS}"
            ))
            .bind(id)
            .bind(verified)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn fork_resource(&self, id: Id, user_id: Id) -> RepoResult<Resource> {
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
            let fork = sqlx::query_as::<_, Resource>(&format!(
                "INSERT INTO resources (user_id, resource_type, title, content, is_anonymous, discipline, department, author_title, tools_used, collaboration_status, open_to_collaborate, time_saved_value, time_saved_frequency, evidence_of_success, is_fork, forked_from_id, quick_summary, workflow_steps, example_prompt, ethics_notes) \
                 SELECT $2, resource_type, title, content, is_anonymous, discipline, department, author_title, tools_used, collaboration_status, open_to_collaborate, time_saved_value, time_saved_frequency, evidence_of_success, TRUE, id, quick_summary, workflow_steps, example_prompt, ethics_notes \
                 FROM resources WHERE id = $1 RETURNING {RESOURCE_COLUMNS}"
            ))
            .bind(id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            sqlx::query(
                "INSERT INTO resource_analytics (resource_id, fork_count) VALUES ($1, 1) \
                 ON CONFLICT (resource_id) DO UPDATE SET fork_count = resource_analytics.fork_count + 1",
            )
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            tx.commit().await.map_err(map_sqlx)?;
            Ok(fork)
        }

        async fn find_similar(&self, discipline: Option<&str>, tools: &[String], limit: i64) -> RepoResult<Vec<Resource>> {
            let limit = if limit <= 0 { DEFAULT_SIMILAR_LIMIT } else { limit };
            let lowered: Vec<String> = tools.iter().map(|t| t.to_lowercase()).collect();
            sqlx::query_as::<_, Resource>(
                "SELECT * FROM ( \
                   SELECT r.*, ( \
                     (SELECT count(*) FROM jsonb_array_elements_text(r.tools_used) tool WHERE lower(tool) = ANY($1)) \
                     + CASE WHEN $2::text IS NOT NULL AND lower(COALESCE(r.discipline, '')) = lower($2) THEN 1 ELSE 0 END \
                   ) AS score \
                   FROM resources r WHERE NOT r.is_hidden \
                 ) scored \
                 WHERE scored.score > 0 \
                 ORDER BY scored.score DESC, scored.created_at DESC \
                 LIMIT $3",
            )
            .bind(lowered)
            .bind(discipline)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn list_comments(&self, resource_id: Id) -> RepoResult<Vec<Comment>> {
            self.require_resource(resource_id).await?;
            sqlx::query_as::<_, Comment>(
                "SELECT * FROM comments WHERE resource_id = $1 ORDER BY created_at ASC",
            )
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn get_comment(&self, id: Id) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>("SELECT * FROM comments WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
        }

        async fn create_comment(&self, resource_id: Id, user_id: Id, new: NewComment) -> RepoResult<Comment> {
            self.require_resource(resource_id).await?;
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
            let comment = sqlx::query_as::<_, Comment>(
                "INSERT INTO comments (resource_id, parent_comment_id, user_id, content) \
                 VALUES ($1, $2, $3, $4) RETURNING *",
            )
            .bind(resource_id)
            .bind(new.parent_comment_id)
            .bind(user_id)
            .bind(&new.content)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            sqlx::query(
                "INSERT INTO resource_analytics (resource_id, comment_count) VALUES ($1, 1) \
                 ON CONFLICT (resource_id) DO UPDATE SET comment_count = resource_analytics.comment_count + 1",
            )
            .bind(resource_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            tx.commit().await.map_err(map_sqlx)?;
            Ok(comment)
        }

        async fn update_comment(&self, id: Id, content: String) -> RepoResult<Comment> {
            sqlx::query_as::<_, Comment>(
                "UPDATE comments SET content = $2, updated_at = now() WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(content)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn delete_comment(&self, id: Id) -> RepoResult<()> {
            let result = sqlx::query("DELETE FROM comments WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if result.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn vote_comment_helpful(&self, id: Id) -> RepoResult<Comment> {
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
            let comment = sqlx::query_as::<_, Comment>(
                "UPDATE comments SET helpful_count = helpful_count + 1 WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            sqlx::query(
                "INSERT INTO resource_analytics (resource_id, helpful_count) VALUES ($1, 1) \
                 ON CONFLICT (resource_id) DO UPDATE SET helpful_count = resource_analytics.helpful_count + 1",
            )
            .bind(comment.resource_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            tx.commit().await.map_err(map_sqlx)?;
            Ok(comment)
        }
    }

    #[async_trait]
    impl PromptRepo for PgRepo {
        async fn list_prompts(&self, caller: &Caller, sharing_level: Option<SharingLevel>, skip: i64, limit: i64) -> RepoResult<Vec<Prompt>> {
            let authed = caller.user_id.is_some() || caller.is_admin;
            sqlx::query_as::<_, Prompt>(
                "SELECT * FROM prompts WHERE \
                   ($1 OR sharing_level = 'public' \
                    OR (sharing_level IN ('department', 'school') AND $2) \
                    OR (sharing_level = 'private' AND user_id = $3)) \
                   AND ($4::sharing_level IS NULL OR sharing_level = $4) \
                 ORDER BY created_at DESC OFFSET $5 LIMIT $6",
            )
            .bind(caller.is_admin)
            .bind(authed)
            .bind(caller.user_id.unwrap_or(-1))
            .bind(sharing_level)
            .bind(skip.max(0))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn get_prompt(&self, id: Id) -> RepoResult<Prompt> {
            sqlx::query_as::<_, Prompt>("SELECT * FROM prompts WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
        }

        async fn create_prompt(&self, user_id: Id, new: NewPrompt) -> RepoResult<Prompt> {
            sqlx::query_as::<_, Prompt>(
                "INSERT INTO prompts (user_id, title, prompt_text, description, variables, sharing_level) \
                 VALUES ($1, $2, $3, $4, $5, $6) RETURNING *",
            )
            .bind(user_id)
            .bind(&new.title)
            .bind(&new.prompt_text)
            .bind(&new.description)
            .bind(Json(&new.variables))
            .bind(new.sharing_level)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn update_prompt(&self, id: Id, upd: UpdatePrompt) -> RepoResult<Prompt> {
            sqlx::query_as::<_, Prompt>(
                "UPDATE prompts SET \
                 title = COALESCE($2, title), \
                 prompt_text = COALESCE($3, prompt_text), \
                 description = COALESCE($4, description), \
                 variables = COALESCE($5, variables), \
                 sharing_level = COALESCE($6, sharing_level), \
                 updated_at = now() \
                 WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(upd.title)
            .bind(upd.prompt_text)
            .bind(upd.description)
            .bind(upd.variables.map(|v| Json(v)))
            .bind(upd.sharing_level)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn delete_prompt(&self, id: Id) -> RepoResult<()> {
            let result = sqlx::query("DELETE FROM prompts WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if result.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn fork_prompt(&self, id: Id, user_id: Id) -> RepoResult<Prompt> {
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
            let fork = sqlx::query_as::<_, Prompt>(
                "INSERT INTO prompts (user_id, title, prompt_text, description, variables, sharing_level, is_fork, forked_from_id) \
                 SELECT $2, title || ' (copy)', prompt_text, description, variables, 'private', TRUE, id \
                 FROM prompts WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(user_id)
            .fetch_one(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            sqlx::query("UPDATE prompts SET fork_count = fork_count + 1 WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(map_sqlx)?;
            tx.commit().await.map_err(map_sqlx)?;
            Ok(fork)
        }

        async fn record_prompt_usage(&self, id: Id) -> RepoResult<Prompt> {
            sqlx::query_as::<_, Prompt>(
                "UPDATE prompts SET usage_count = usage_count + 1 WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }
    }

    #[async_trait]
    impl CollectionRepo for PgRepo {
        async fn list_collections(&self, skip: i64, limit: i64) -> RepoResult<Vec<Collection>> {
            sqlx::query_as::<_, Collection>(
                "SELECT * FROM collections ORDER BY created_at DESC OFFSET $1 LIMIT $2",
            )
            .bind(skip.max(0))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn get_collection(&self, id: Id) -> RepoResult<Collection> {
            sqlx::query_as::<_, Collection>("SELECT * FROM collections WHERE id = $1")
                .bind(id)
                .fetch_one(&self.pool)
                .await
                .map_err(map_sqlx)
        }

        async fn create_collection(&self, owner_id: Id, new: NewCollection) -> RepoResult<Collection> {
            sqlx::query_as::<_, Collection>(
                "INSERT INTO collections (name, description, owner_id, resource_ids, prompt_ids) \
                 VALUES ($1, $2, $3, $4, $5) RETURNING *",
            )
            .bind(&new.name)
            .bind(&new.description)
            .bind(owner_id)
            .bind(Json(&new.resource_ids))
            .bind(Json(&new.prompt_ids))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn update_collection(&self, id: Id, upd: UpdateCollection) -> RepoResult<Collection> {
            sqlx::query_as::<_, Collection>(
                "UPDATE collections SET \
                 name = COALESCE($2, name), \
                 description = COALESCE($3, description), \
                 resource_ids = COALESCE($4, resource_ids), \
                 prompt_ids = COALESCE($5, prompt_ids) \
                 WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .bind(upd.name)
            .bind(upd.description)
            .bind(upd.resource_ids.map(|v| Json(v)))
            .bind(upd.prompt_ids.map(|v| Json(v)))
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn delete_collection(&self, id: Id) -> RepoResult<()> {
            let result = sqlx::query("DELETE FROM collections WHERE id = $1")
                .bind(id)
                .execute(&self.pool)
                .await
                .map_err(map_sqlx)?;
            if result.rows_affected() == 0 { return Err(RepoError::NotFound); }
            Ok(())
        }

        async fn subscribe_collection(&self, id: Id) -> RepoResult<Collection> {
            sqlx::query_as::<_, Collection>(
                "UPDATE collections SET subscriber_count = subscriber_count + 1 WHERE id = $1 RETURNING *",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }
    }

    #[async_trait]
    impl EngagementRepo for PgRepo {
        async fn record_view(&self, resource_id: Id) -> RepoResult<ResourceAnalytics> {
            self.require_resource(resource_id).await?;
            // Upsert-increment keeps concurrent first views from racing on
            // row creation and concurrent increments from losing updates.
            sqlx::query_as::<_, ResourceAnalytics>(
                "INSERT INTO resource_analytics (resource_id, view_count, last_viewed) VALUES ($1, 1, now()) \
                 ON CONFLICT (resource_id) DO UPDATE SET view_count = resource_analytics.view_count + 1, last_viewed = now() \
                 RETURNING *",
            )
            .bind(resource_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn record_tried(&self, resource_id: Id) -> RepoResult<ResourceAnalytics> {
            self.require_resource(resource_id).await?;
            sqlx::query_as::<_, ResourceAnalytics>(
                "INSERT INTO resource_analytics (resource_id, tried_count) VALUES ($1, 1) \
                 ON CONFLICT (resource_id) DO UPDATE SET tried_count = resource_analytics.tried_count + 1 \
                 RETURNING *",
            )
            .bind(resource_id)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn toggle_save(&self, resource_id: Id, user_id: Id) -> RepoResult<(bool, ResourceAnalytics)> {
            self.require_resource(resource_id).await?;
            let mut tx = self.pool.begin().await.map_err(map_sqlx)?;
            let removed = sqlx::query(
                "DELETE FROM saved_resources WHERE user_id = $1 AND resource_id = $2",
            )
            .bind(user_id)
            .bind(resource_id)
            .execute(&mut *tx)
            .await
            .map_err(map_sqlx)?;
            let analytics = if removed.rows_affected() > 0 {
                sqlx::query_as::<_, ResourceAnalytics>(
                    "INSERT INTO resource_analytics (resource_id) VALUES ($1) \
                     ON CONFLICT (resource_id) DO UPDATE SET save_count = GREATEST(resource_analytics.save_count - 1, 0) \
                     RETURNING *",
                )
                .bind(resource_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx)?
            } else {
                sqlx::query("INSERT INTO saved_resources (user_id, resource_id) VALUES ($1, $2)")
                    .bind(user_id)
                    .bind(resource_id)
                    .execute(&mut *tx)
                    .await
                    .map_err(map_sqlx)?;
                sqlx::query_as::<_, ResourceAnalytics>(
                    "INSERT INTO resource_analytics (resource_id, save_count) VALUES ($1, 1) \
                     ON CONFLICT (resource_id) DO UPDATE SET save_count = resource_analytics.save_count + 1 \
                     RETURNING *",
                )
                .bind(resource_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(map_sqlx)?
            };
            tx.commit().await.map_err(map_sqlx)?;
            Ok((removed.rows_affected() == 0, analytics))
        }

        async fn is_saved(&self, resource_id: Id, user_id: Id) -> RepoResult<bool> {
            self.require_resource(resource_id).await?;
            let row = sqlx::query("SELECT 1 FROM saved_resources WHERE user_id = $1 AND resource_id = $2")
                .bind(user_id)
                .bind(resource_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_sqlx)?;
            Ok(row.is_some())
        }

        async fn saved_resources(&self, user_id: Id, skip: i64, limit: i64) -> RepoResult<Vec<Resource>> {
            sqlx::query_as::<_, Resource>(
                "SELECT r.* FROM saved_resources s JOIN resources r ON r.id = s.resource_id \
                 WHERE s.user_id = $1 AND (NOT r.is_hidden OR r.user_id = $1) \
                 ORDER BY s.saved_at DESC OFFSET $2 LIMIT $3",
            )
            .bind(user_id)
            .bind(skip.max(0))
            .bind(limit.max(0))
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn get_analytics(&self, resource_id: Id) -> RepoResult<ResourceAnalytics> {
            self.require_resource(resource_id).await?;
            let row = sqlx::query_as::<_, ResourceAnalytics>(
                "SELECT * FROM resource_analytics WHERE resource_id = $1",
            )
            .bind(resource_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx)?;
            Ok(row.unwrap_or_else(|| ResourceAnalytics::zeroed(resource_id)))
        }

        async fn platform_analytics(&self) -> RepoResult<PlatformAnalytics> {
            let totals = sqlx::query(
                "SELECT (SELECT count(*) FROM resources) AS total_resources, \
                 COALESCE(sum(view_count), 0)::bigint AS total_views, \
                 COALESCE(sum(save_count), 0)::bigint AS total_saves, \
                 COALESCE(sum(tried_count), 0)::bigint AS total_tried, \
                 COALESCE(sum(fork_count), 0)::bigint AS total_forks, \
                 COALESCE(sum(comment_count), 0)::bigint AS total_comments \
                 FROM resource_analytics",
            )
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)?;
            let total_resources: i64 = totals.try_get("total_resources").map_err(map_sqlx)?;
            let total_views: i64 = totals.try_get("total_views").map_err(map_sqlx)?;
            let total_saves: i64 = totals.try_get("total_saves").map_err(map_sqlx)?;
            let total_tried: i64 = totals.try_get("total_tried").map_err(map_sqlx)?;
            let total_forks: i64 = totals.try_get("total_forks").map_err(map_sqlx)?;
            let total_comments: i64 = totals.try_get("total_comments").map_err(map_sqlx)?;
            let top_resources = sqlx::query_as::<_, TopResource>(
                "SELECT a.resource_id, r.title, a.view_count, a.save_count, a.tried_count \
                 FROM resource_analytics a JOIN resources r ON r.id = a.resource_id \
                 ORDER BY a.view_count DESC LIMIT 5",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
            let denom = total_resources.max(1) as f64;
            Ok(PlatformAnalytics {
                platform_stats: PlatformStats {
                    total_resources,
                    total_views,
                    total_saves,
                    total_tried,
                    total_forks,
                    total_comments,
                    avg_views_per_resource: if total_resources == 0 { 0.0 } else { total_views as f64 / denom },
                    avg_saves_per_resource: if total_resources == 0 { 0.0 } else { total_saves as f64 / denom },
                },
                top_resources,
            })
        }

        async fn analytics_by_discipline(&self) -> RepoResult<BTreeMap<String, DisciplineStats>> {
            let rows = sqlx::query(
                "SELECT r.discipline AS discipline, count(*)::bigint AS count, \
                 COALESCE(sum(a.view_count), 0)::bigint AS total_views, \
                 COALESCE(sum(a.save_count), 0)::bigint AS total_saves \
                 FROM resources r LEFT JOIN resource_analytics a ON a.resource_id = r.id \
                 WHERE r.discipline IS NOT NULL GROUP BY r.discipline",
            )
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)?;
            let mut by_discipline = BTreeMap::new();
            for row in rows {
                let discipline: String = row.try_get("discipline").map_err(map_sqlx)?;
                by_discipline.insert(
                    discipline,
                    DisciplineStats {
                        count: row.try_get("count").map_err(map_sqlx)?,
                        total_views: row.try_get("total_views").map_err(map_sqlx)?,
                        total_saves: row.try_get("total_saves").map_err(map_sqlx)?,
                    },
                );
            }
            Ok(by_discipline)
        }
    }

    #[async_trait]
    impl CollabRepo for PgRepo {
        async fn create_collaboration_request(&self, resource_id: Id, from_user_id: Id, new: NewCollaborationRequest) -> RepoResult<CollaborationRequest> {
            self.require_resource(resource_id).await?;
            sqlx::query_as::<_, CollaborationRequest>(
                "INSERT INTO collaboration_requests (resource_id, from_user_id, message) \
                 VALUES ($1, $2, $3) RETURNING *",
            )
            .bind(resource_id)
            .bind(from_user_id)
            .bind(&new.message)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx)
        }

        async fn list_collaboration_requests(&self, resource_id: Id) -> RepoResult<Vec<CollaborationRequest>> {
            self.require_resource(resource_id).await?;
            sqlx::query_as::<_, CollaborationRequest>(
                "SELECT * FROM collaboration_requests WHERE resource_id = $1 ORDER BY created_at DESC",
            )
            .bind(resource_id)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx)
        }
    }
}
