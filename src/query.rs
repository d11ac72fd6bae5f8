//! Resource listing filters and the similar-resource scoring function.
//!
//! Both storage backends answer listing queries through the same
//! `ResourceQuery`; the in-memory store evaluates `matches` per record and
//! the Postgres store translates the same semantics to SQL.

use serde::Deserialize;
use utoipa::ToSchema;

use crate::models::{CollaborationStatus, Resource, TimeSavedFrequency};

pub const DEFAULT_PAGE_SIZE: i64 = 20;
pub const MAX_PAGE_SIZE: i64 = 100;
pub const DEFAULT_SIMILAR_LIMIT: i64 = 5;

/// Weeks-equivalent conversion for `min_time_saved`. A semester is a fixed
/// 15 teaching weeks; months use the calendar average.
pub const WEEKS_PER_MONTH: f64 = 52.0 / 12.0;
pub const SEMESTER_WEEKS: f64 = 15.0;

/// Matching the supplied discipline counts this much on top of tool overlap.
pub const DISCIPLINE_BONUS: usize = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SortBy {
    #[default]
    Newest,
    Popular,
    MostTried,
}

/// Everything the listing endpoint accepts. All filter dimensions AND
/// together; the tools list ORs within itself.
#[derive(Debug, Clone, Default)]
pub struct ResourceQuery {
    pub discipline: Option<String>,
    pub tools: Vec<String>,
    pub collaboration_status: Option<CollaborationStatus>,
    pub min_time_saved: Option<f64>,
    pub search: Option<String>,
    pub sort_by: SortBy,
    pub skip: i64,
    pub limit: i64,
}

impl ResourceQuery {
    /// Clamp pagination to sane bounds; zero/negative limits fall back to
    /// the default page size.
    pub fn normalized(mut self) -> Self {
        self.skip = self.skip.max(0);
        self.limit = if self.limit <= 0 { DEFAULT_PAGE_SIZE } else { self.limit.min(MAX_PAGE_SIZE) };
        self
    }
}

/// `time_saved_value` expressed in hours-per-week. Records without a
/// frequency are taken at face value as weekly.
pub fn weekly_time_saved(resource: &Resource) -> Option<f64> {
    let value = resource.time_saved_value?;
    let divisor = match resource.time_saved_frequency {
        Some(TimeSavedFrequency::PerWeek) | None => 1.0,
        Some(TimeSavedFrequency::PerMonth) => WEEKS_PER_MONTH,
        Some(TimeSavedFrequency::PerSemester) => SEMESTER_WEEKS,
    };
    Some(value / divisor)
}

fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

/// Does `resource` satisfy every supplied filter dimension?
/// Visibility (hidden resources) is handled separately by the caller.
pub fn matches(query: &ResourceQuery, resource: &Resource) -> bool {
    if let Some(ref discipline) = query.discipline {
        if resource.discipline.as_deref() != Some(discipline.as_str()) {
            return false;
        }
    }
    if !query.tools.is_empty() {
        let any = query.tools.iter().any(|t| {
            resource.tools_used.iter().any(|u| u.eq_ignore_ascii_case(t))
        });
        if !any {
            return false;
        }
    }
    if let Some(status) = query.collaboration_status {
        if resource.collaboration_status != Some(status) {
            return false;
        }
    }
    if let Some(min) = query.min_time_saved {
        match weekly_time_saved(resource) {
            Some(weekly) if weekly >= min => {}
            _ => return false,
        }
    }
    if let Some(ref search) = query.search {
        let needle = search.to_lowercase();
        let hit = contains_ci(&resource.title, &needle)
            || contains_ci(&resource.content, &needle)
            || resource
                .quick_summary
                .as_deref()
                .map(|s| contains_ci(s, &needle))
                .unwrap_or(false);
        if !hit {
            return false;
        }
    }
    true
}

/// Similarity score for `find_similar`: tool overlap count, plus a fixed
/// bonus when the discipline matches. Zero means unrelated.
pub fn similarity_score(
    discipline: Option<&str>,
    tools: &[String],
    resource: &Resource,
) -> usize {
    let overlap = tools
        .iter()
        .filter(|t| resource.tools_used.iter().any(|u| u.eq_ignore_ascii_case(t)))
        .count();
    let bonus = match (discipline, resource.discipline.as_deref()) {
        (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => DISCIPLINE_BONUS,
        _ => 0,
    };
    overlap + bonus
}
