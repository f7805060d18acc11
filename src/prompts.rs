//! Prompt builders for every oracle call.
//!
//! Each builder returns the full message list for one request. Wording here
//! steers the oracle but is not part of the testable contract; callers only
//! depend on the declared output shapes.

use crate::batch::WorkItem;
use crate::gateway::Message;
use crate::prep::RoleLevel;
use crate::search::SearchHit;

const SCORING_SYSTEM: &str = "\
You are a strict technical recruiter scoring job fit. Score every job from 0 \
to 100 using this rubric: skills match 40%, relevant work experience 30%, \
education 20%, overall role alignment 10%. Personal projects and internships \
are NOT professional experience; never count them toward the experience \
component. Apply a heavy penalty when the candidate's work history is in a \
different domain than the job (for example retail experience applying to a \
backend role). Respond with JSON only, in the shape \
{\"scores\": [{\"id\", \"score\", \"breakdown\": {\"skills\", \"experience\", \
\"education\", \"alignment\"}, \"strengths\": [], \"gaps\": [], \
\"recommendation\"}]}. recommendation is one of \"Highly recommended\", \
\"Recommended\", \"Consider\", \"Not recommended\". Include every job id \
exactly once and invent none.";

/// Group scoring request: one candidate summary against a group of jobs.
pub fn batch_scoring(profile_summary: &str, items: &[WorkItem]) -> Vec<Message> {
    let jobs = serde_json::to_string_pretty(items).unwrap_or_else(|_| "[]".to_string());
    vec![
        Message::system(SCORING_SYSTEM),
        Message::user(format!(
            "Candidate profile:\n{profile_summary}\nJobs to score:\n{jobs}"
        )),
    ]
}

fn render_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No search results available; answer from general knowledge.".to_string();
    }
    hits.iter()
        .map(|h| format!("- {} ({})\n  {}", h.title, h.url, h.content))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn company_research(company: &str, role: &str, hits: &[SearchHit]) -> Vec<Message> {
    vec![
        Message::system(
            "You research companies for interview candidates. Write a compact brief: \
             what the company does, engineering culture, recent news relevant to a \
             candidate, and what they look for in the given role. Plain text, under \
             250 words.",
        ),
        Message::user(format!(
            "Company: {company}\nRole: {role}\nSearch results:\n{}",
            render_hits(hits)
        )),
    ]
}

pub fn rounds_analyzer(company: &str, role: &str, level: RoleLevel) -> Vec<Message> {
    vec![
        Message::system(
            "You map out interview processes. Respond with JSON only: \
             {\"rounds\": [{\"name\", \"focus\"}]} listing the likely interview \
             rounds in order for the given company, role and seniority.",
        ),
        Message::user(format!(
            "Company: {company}\nRole: {role}\nSeniority: {}",
            level.as_str()
        )),
    ]
}

pub fn round_prep(company: &str, role: &str, level: RoleLevel, rounds_json: &str) -> Vec<Message> {
    let design_note = if level.needs_system_design() {
        "Include a thorough system design preparation plan with concrete topics \
         and two practice problems."
    } else {
        "Skip deep system design; this seniority is rarely asked it."
    };
    vec![
        Message::system(format!(
            "You build interview preparation plans. Respond with JSON only: \
             {{\"dsa_plan\", \"system_design_plan\", \"behavioral_plan\"}}, each a \
             plain-text plan. Calibrate difficulty to the stated seniority. \
             {design_note}"
        )),
        Message::user(format!(
            "Company: {company}\nRole: {role}\nSeniority: {}\nInterview rounds:\n{rounds_json}",
            level.as_str()
        )),
    ]
}

/// Single-call fallback used when the prep run blows its deadline.
pub fn quick_prep(company: &str, role: &str, level: RoleLevel) -> Vec<Message> {
    vec![
        Message::system(
            "Produce a minimal interview prep pack in one shot. Respond with JSON \
             only: {\"company_info\", \"dsa_plan\", \"system_design_plan\", \
             \"behavioral_plan\"}. Keep each field under 120 words.",
        ),
        Message::user(format!(
            "Company: {company}\nRole: {role}\nSeniority: {}",
            level.as_str()
        )),
    ]
}

pub fn ats_analysis(resume: &str, job_description: &str) -> Vec<Message> {
    vec![
        Message::system(
            "You are an ATS keyword analyzer. Compare the resume against the job \
             description. Respond with JSON only: {\"score\" (0-100), \"summary\", \
             \"missing_keywords\": []}.",
        ),
        Message::user(format!(
            "Job description:\n{job_description}\n\nResume:\n{resume}"
        )),
    ]
}

pub fn project_relevance(projects_json: &str, job_description: &str) -> Vec<Message> {
    vec![
        Message::system(
            "Rate how relevant each project is to the job. Respond with JSON only: \
             {\"projects\": [{\"name\", \"relevance_score\" (0-100), \"reason\"}], \
             \"summary\"}.",
        ),
        Message::user(format!(
            "Job description:\n{job_description}\n\nProjects:\n{projects_json}"
        )),
    ]
}

pub fn college_tier(college: &str, hits: &[SearchHit]) -> Vec<Message> {
    vec![
        Message::system(
            "Classify the college's reputation for engineering hiring. Respond with \
             JSON only: {\"tier\" (one of \"Tier 1\", \"Tier 2\", \"Tier 3\"), \
             \"notes\"}.",
        ),
        Message::user(format!(
            "College: {college}\nSearch results:\n{}",
            render_hits(hits)
        )),
    ]
}

pub fn experience_eval(profile_summary: &str, job_description: &str, years: f32) -> Vec<Message> {
    vec![
        Message::system(
            "Evaluate how well the candidate's professional experience and overall \
             profile fit the role. Internships and projects are not professional \
             experience. Respond with JSON only: {\"score\" (0-100), \"summary\"}.",
        ),
        Message::user(format!(
            "Stated experience: {years:.1} years\nJob description:\n{job_description}\n\n\
             Candidate profile:\n{profile_summary}"
        )),
    ]
}

pub fn final_decision(analysis_json: &str, job_title: &str, company: &str) -> Vec<Message> {
    vec![
        Message::system(
            "You make the final hiring recommendation from the stage analyses. Weigh \
             all factors holistically; one weak factor alone must not force a Reject \
             when the rest of the profile compensates. Respond with JSON only: \
             {\"recommendation\" (one of \"Strong Accept\", \"Accept\", \
             \"Consider\", \"Reject\"), \"confidence\" (0-100), \"reasoning\", \
             \"key_factors\": [], \"strengths\": [], \"concerns\": [], \
             \"suggestion\"}.",
        ),
        Message::user(format!(
            "Position: {job_title} at {company}\nStage analyses:\n{analysis_json}"
        )),
    ]
}

/// Decision fallback: one shot straight to the record, used on deadline expiry.
pub fn quick_decision(analysis_json: &str, job_title: &str) -> Vec<Message> {
    vec![
        Message::system(
            "Give a fast hiring recommendation from whatever analysis is available. \
             Respond with JSON only: {\"recommendation\" (one of \"Strong Accept\", \
             \"Accept\", \"Consider\", \"Reject\"), \"confidence\" (0-100), \
             \"reasoning\", \"key_factors\": [], \"strengths\": [], \"concerns\": [], \
             \"suggestion\"}.",
        ),
        Message::user(format!(
            "Position: {job_title}\nAvailable analysis:\n{analysis_json}"
        )),
    ]
}
