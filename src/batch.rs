//! Bounded-concurrency batch scoring.
//!
//! A long work list is cut into contiguous groups, each group is one oracle
//! call, and at most `max_concurrency` calls are in flight at a time. A group
//! whose call fails degrades to placeholders without touching its neighbours;
//! the outcome always covers every input id exactly once, in input order.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::gateway::{Attribution, ChatGateway, ChatRequest};
use crate::prompts;
use crate::repair::{self, ScoreResult};

/// One unit of scoring work. Fields are caller-owned and opaque to the
/// executor; only the prompt builder inspects them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: String,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperienceEntry {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectEntry {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub technologies: Vec<String>,
}

/// The candidate profile all items in a batch are scored against.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub work_experience: Vec<ExperienceEntry>,
    #[serde(default)]
    pub internships: Vec<ExperienceEntry>,
    #[serde(default)]
    pub projects: Vec<ProjectEntry>,
    #[serde(default)]
    pub education: Vec<String>,
    #[serde(default)]
    pub certifications: Vec<String>,
}

/// Tuning knobs for a batch run. Defaults match production sizing: groups of
/// 20, three calls in flight, two minutes per call.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub group_size: usize,
    pub max_concurrency: usize,
    pub model: String,
    pub call_timeout: Duration,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            group_size: 20,
            max_concurrency: 3,
            model: "gpt-4o-mini".to_string(),
            call_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchScoreOutcome {
    pub results: Vec<ScoreResult>,
    pub total: usize,
    /// Number of groups that degraded to placeholders.
    pub degraded_groups: usize,
}

const IT_TITLE_KEYWORDS: [&str; 14] = [
    "developer",
    "engineer",
    "software",
    "programmer",
    "data",
    "devops",
    "sre",
    "qa",
    "tester",
    "architect",
    "full stack",
    "backend",
    "frontend",
    "machine learning",
];

fn is_it_role(title: &str) -> bool {
    let lower = title.to_lowercase();
    IT_TITLE_KEYWORDS.iter().any(|k| lower.contains(k))
}

/// Condense a profile into the text block the group prompt embeds.
///
/// Work experience outside the software domain is labelled so the rubric can
/// weigh it accordingly, and internships and projects are kept clearly apart
/// from employment.
pub fn profile_summary(profile: &Profile) -> String {
    let mut out = String::new();

    if !profile.skills.is_empty() {
        let mut skills = profile.skills.clone();
        skills.truncate(30);
        out.push_str("Skills: ");
        out.push_str(&skills.join(", "));
        out.push('\n');
    }

    if !profile.work_experience.is_empty() {
        out.push_str("Work experience:\n");
        for e in &profile.work_experience {
            let domain = if is_it_role(&e.title) { "" } else { " [non-IT]" };
            out.push_str(&format!(
                "- {} at {} ({}){}\n",
                e.title, e.company, e.duration, domain
            ));
        }
    } else {
        out.push_str("Work experience: none (fresher profile)\n");
    }

    if !profile.internships.is_empty() {
        out.push_str("Internships (not full-time experience):\n");
        for e in &profile.internships {
            out.push_str(&format!("- {} at {} ({})\n", e.title, e.company, e.duration));
        }
    }

    if !profile.projects.is_empty() {
        out.push_str("Projects (not professional experience):\n");
        for p in &profile.projects {
            out.push_str(&format!("- {}: {}", p.name, p.description));
            if !p.technologies.is_empty() {
                out.push_str(&format!(" [{}]", p.technologies.join(", ")));
            }
            out.push('\n');
        }
    }

    if !profile.education.is_empty() {
        out.push_str("Education: ");
        out.push_str(&profile.education.join("; "));
        out.push('\n');
    }
    if !profile.certifications.is_empty() {
        out.push_str("Certifications: ");
        out.push_str(&profile.certifications.join(", "));
        out.push('\n');
    }

    out
}

async fn score_group(
    gateway: Arc<dyn ChatGateway>,
    summary: Arc<String>,
    group: Vec<WorkItem>,
    options: BatchOptions,
    group_idx: usize,
) -> (usize, BTreeMap<String, ScoreResult>, bool) {
    let expected: Vec<String> = group.iter().map(|i| i.id.clone()).collect();
    let messages = prompts::batch_scoring(&summary, &group);
    let request = ChatRequest::new(&options.model, messages, Attribution::new("batch.score"))
        .with_json_mode()
        .with_time_budget(options.call_timeout);

    match gateway.chat(request).await {
        Ok(response) => {
            let repaired = repair::repair(&response.content, &expected);
            let degraded = repaired.values().all(ScoreResult::is_placeholder) && !expected.is_empty();
            (group_idx, repaired, degraded)
        }
        Err(e) => {
            warn!(
                group = group_idx,
                items = expected.len(),
                code = e.code(),
                "group call failed, substituting placeholders"
            );
            (group_idx, repair::placeholders(&expected), true)
        }
    }
}

/// Score every item against the profile. Infallible: failed groups come back
/// as placeholders and `results` always has one entry per input item, in
/// input order.
pub async fn score_batch(
    gateway: Arc<dyn ChatGateway>,
    profile: &Profile,
    items: Vec<WorkItem>,
    options: BatchOptions,
) -> BatchScoreOutcome {
    let total = items.len();
    if total == 0 {
        return BatchScoreOutcome {
            results: Vec::new(),
            total: 0,
            degraded_groups: 0,
        };
    }

    let group_size = options.group_size.max(1);
    let max_concurrency = options.max_concurrency.max(1);
    let summary = Arc::new(profile_summary(profile));
    let order: Vec<String> = items.iter().map(|i| i.id.clone()).collect();

    let groups: Vec<Vec<WorkItem>> = items
        .chunks(group_size)
        .map(<[WorkItem]>::to_vec)
        .collect();
    info!(
        total,
        groups = groups.len(),
        group_size,
        max_concurrency,
        "scoring batch"
    );

    let outcomes: Vec<(usize, BTreeMap<String, ScoreResult>, bool)> =
        stream::iter(groups.into_iter().enumerate().map(|(idx, group)| {
            score_group(
                Arc::clone(&gateway),
                Arc::clone(&summary),
                group,
                options.clone(),
                idx,
            )
        }))
        .buffer_unordered(max_concurrency)
        .collect()
        .await;

    let degraded_groups = outcomes.iter().filter(|(_, _, d)| *d).count();
    let mut merged: BTreeMap<String, ScoreResult> = BTreeMap::new();
    for (_, map, _) in outcomes {
        merged.extend(map);
    }

    // Group maps are keyed by id and ids are unique across groups, so this
    // walk reassembles exactly the input order.
    let results: Vec<ScoreResult> = order
        .iter()
        .map(|id| {
            merged
                .remove(id)
                .unwrap_or_else(|| ScoreResult::placeholder(id.clone()))
        })
        .collect();

    BatchScoreOutcome {
        results,
        total,
        degraded_groups,
    }
}
