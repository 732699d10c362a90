//! Candidate scoring: who should take a task.
//!
//! Pure functions over a [`TaskRequirements`] and a pool of
//! [`StaffCandidate`] views. Candidates that fail the eligibility filter
//! (wrong restaurant, inactive, under-ranked, none of the required skills,
//! or off shift at the target time) are dropped before scoring. Everyone else gets four sub-scores in
//! 0..=100, combined with [`ScoringWeights`] into a total in the same range.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{RestaurantId, Role, StaffCandidate, StaffId, Task};

/// Sub-score for a candidate whose shift covers the task's start but ends
/// before its estimated finish.
const PARTIAL_SHIFT_SCORE: f64 = 70.0;

/// Sub-score when the candidate and the task share a zone but not a station.
const SAME_ZONE_SCORE: f64 = 60.0;

/// Sub-score when either side has no location.
const NEUTRAL_LOCATION_SCORE: f64 = 50.0;

// ---------------------------------------------------------------------------
// Weights
// ---------------------------------------------------------------------------

/// Relative weights of the four sub-scores. Normalised before use, so only
/// their ratios matter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub skill: f64,
    pub availability: f64,
    pub workload: f64,
    pub location: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            skill: 0.4,
            availability: 0.3,
            workload: 0.2,
            location: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<()> {
        let all = [self.skill, self.availability, self.workload, self.location];
        if all.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(Error::Validation(
                "scoring weights must be finite and non-negative".to_string(),
            ));
        }
        if all.iter().sum::<f64>() <= 0.0 {
            return Err(Error::Validation(
                "scoring weights must not all be zero".to_string(),
            ));
        }
        Ok(())
    }

    fn normalized(&self) -> Self {
        let sum = self.skill + self.availability + self.workload + self.location;
        if sum <= 0.0 || !sum.is_finite() {
            return Self::default();
        }
        Self {
            skill: self.skill / sum,
            availability: self.availability / sum,
            workload: self.workload / sum,
            location: self.location / sum,
        }
    }
}

// ---------------------------------------------------------------------------
// Inputs and outputs
// ---------------------------------------------------------------------------

/// What a task asks of its assignee.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequirements {
    pub restaurant_id: RestaurantId,
    pub required_skills: BTreeSet<String>,
    pub required_role: Role,
    pub location: Option<String>,
    /// When the work happens. `None` means availability is not checked.
    pub target: Option<DateTime<Utc>>,
    pub estimated_duration: Duration,
}

impl From<&Task> for TaskRequirements {
    fn from(task: &Task) -> Self {
        Self {
            restaurant_id: task.restaurant_id,
            required_skills: task.required_skills.clone(),
            required_role: task.required_role,
            location: task.location.clone(),
            target: task.target_time(),
            estimated_duration: task.estimated_duration(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SubScores {
    pub skill: f64,
    pub availability: f64,
    pub workload: f64,
    pub location: f64,
}

/// Coarse bucket over the numeric score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    pub fn from_score(score: f64) -> Self {
        if score >= 80.0 {
            Confidence::High
        } else if score >= 60.0 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

impl std::fmt::Display for Confidence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        };
        write!(f, "{s}")
    }
}

/// A scored candidate, as returned to callers for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub staff_id: StaffId,
    pub name: String,
    pub role: Role,
    pub score: f64,
    pub subscores: SubScores,
    pub workload: u32,
    pub confidence: Confidence,
}

// ---------------------------------------------------------------------------
// Eligibility
// ---------------------------------------------------------------------------

/// Hard pass/fail checks applied before any scoring.
///
/// A task that lists skills only admits candidates holding at least one of
/// them; partial matches stay eligible and are scored by share.
pub fn is_eligible(req: &TaskRequirements, candidate: &StaffCandidate) -> bool {
    candidate.restaurant_id == req.restaurant_id
        && candidate.active
        && candidate.role.satisfies(req.required_role)
        && holds_any_required_skill(&req.required_skills, &candidate.skills)
}

fn holds_any_required_skill(required: &BTreeSet<String>, held: &BTreeSet<String>) -> bool {
    let required: BTreeSet<String> = required.iter().map(|s| normalize(s)).collect();
    if required.is_empty() {
        return true;
    }
    held.iter().any(|s| required.contains(&normalize(s)))
}

// ---------------------------------------------------------------------------
// Sub-scores
// ---------------------------------------------------------------------------

/// Share of required skills the candidate holds, 0..=100.
pub fn skill_score(required: &BTreeSet<String>, held: &BTreeSet<String>) -> f64 {
    let required: BTreeSet<String> = required.iter().map(|s| normalize(s)).collect();
    if required.is_empty() {
        return 100.0;
    }
    let held: BTreeSet<String> = held.iter().map(|s| normalize(s)).collect();
    let matched = required.intersection(&held).count();
    100.0 * matched as f64 / required.len() as f64
}

/// `None` when the candidate is not on shift at the task's target time.
pub fn availability_score(req: &TaskRequirements, candidate: &StaffCandidate) -> Option<f64> {
    let Some(target) = req.target else {
        return Some(100.0);
    };
    let finish = target + req.estimated_duration;

    candidate
        .availability
        .iter()
        .filter(|shift| shift.contains(target))
        .map(|shift| {
            if shift.ends_at >= finish {
                100.0
            } else {
                PARTIAL_SHIFT_SCORE
            }
        })
        .reduce(f64::max)
}

/// Strictly decreasing in the number of open tasks.
pub fn workload_score(open_tasks: u32) -> f64 {
    100.0 / (1.0 + f64::from(open_tasks))
}

pub fn location_score(task_location: Option<&str>, staff_location: Option<&str>) -> f64 {
    let (Some(task), Some(staff)) = (task_location, staff_location) else {
        return NEUTRAL_LOCATION_SCORE;
    };
    let (task, staff) = (normalize(task), normalize(staff));
    if task.is_empty() || staff.is_empty() {
        NEUTRAL_LOCATION_SCORE
    } else if task == staff {
        100.0
    } else if zone(&task) == zone(&staff) {
        SAME_ZONE_SCORE
    } else {
        0.0
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Leading segment of a location path: "kitchen/line-2" → "kitchen".
fn zone(location: &str) -> &str {
    location
        .split(['/', ':'])
        .next()
        .map(str::trim)
        .unwrap_or(location)
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ---------------------------------------------------------------------------
// Ranking
// ---------------------------------------------------------------------------

/// Score one candidate. `None` when the candidate is filtered out.
pub fn score_candidate(
    req: &TaskRequirements,
    candidate: &StaffCandidate,
    weights: &ScoringWeights,
) -> Option<RankedCandidate> {
    if !is_eligible(req, candidate) {
        return None;
    }
    let availability = availability_score(req, candidate)?;

    let subscores = SubScores {
        skill: round2(skill_score(&req.required_skills, &candidate.skills)),
        availability,
        workload: round2(workload_score(candidate.workload)),
        location: location_score(req.location.as_deref(), candidate.location.as_deref()),
    };

    let w = weights.normalized();
    let score = round2(
        (subscores.skill * w.skill
            + subscores.availability * w.availability
            + subscores.workload * w.workload
            + subscores.location * w.location)
            .clamp(0.0, 100.0),
    );

    Some(RankedCandidate {
        staff_id: candidate.staff_id,
        name: candidate.name.clone(),
        role: candidate.role,
        score,
        subscores,
        workload: candidate.workload,
        confidence: Confidence::from_score(score),
    })
}

/// Rank a pool: best score first, then lightest workload, then staff ID.
/// Returns at most `max_candidates` entries; an empty result is not an error.
pub fn rank_candidates(
    req: &TaskRequirements,
    pool: &[StaffCandidate],
    weights: &ScoringWeights,
    max_candidates: usize,
) -> Vec<RankedCandidate> {
    let mut ranked: Vec<RankedCandidate> = pool
        .iter()
        .filter_map(|c| score_candidate(req, c, weights))
        .collect();

    ranked.sort_by(compare_ranked);
    ranked.truncate(max_candidates);
    ranked
}

fn compare_ranked(a: &RankedCandidate, b: &RankedCandidate) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then_with(|| a.workload.cmp(&b.workload))
        .then_with(|| a.staff_id.cmp(&b.staff_id))
}
