use serde::{Deserialize, Serialize};
use std::fmt;

/// The five fixed learning pillars XP and badges are bucketed into.
///
/// Pillar keys are stored as lowercase strings in the database; older
/// clients and imported records may still carry legacy names, which
/// [`Pillar::parse`] normalizes onto the canonical set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pillar {
    Stem,
    Wellness,
    Communication,
    Civics,
    Art,
}

pub const ALL_PILLARS: [Pillar; 5] = [
    Pillar::Stem,
    Pillar::Wellness,
    Pillar::Communication,
    Pillar::Civics,
    Pillar::Art,
];

impl Pillar {
    /// Canonical database key for this pillar.
    pub fn as_str(&self) -> &'static str {
        match self {
            Pillar::Stem => "stem",
            Pillar::Wellness => "wellness",
            Pillar::Communication => "communication",
            Pillar::Civics => "civics",
            Pillar::Art => "art",
        }
    }

    /// Human-facing pillar name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Pillar::Stem => "STEM & Logic",
            Pillar::Wellness => "Life & Wellness",
            Pillar::Communication => "Language & Communication",
            Pillar::Civics => "Society & Culture",
            Pillar::Art => "Arts & Creativity",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Pillar::Stem => "Science, technology, engineering and mathematical reasoning",
            Pillar::Wellness => "Physical and mental health, habits and self-direction",
            Pillar::Communication => "Reading, writing, speaking and listening",
            Pillar::Civics => "Community, history, citizenship and culture",
            Pillar::Art => "Visual arts, music, performance and creative making",
        }
    }

    /// Parses a pillar key, accepting legacy names from older records.
    ///
    /// Returns `None` for anything outside the known vocabulary; callers
    /// treat that as a validation failure.
    pub fn parse(raw: &str) -> Option<Pillar> {
        match raw.trim().to_lowercase().as_str() {
            "stem" | "stem_logic" | "science" | "math" => Some(Pillar::Stem),
            "wellness" | "life_wellness" | "health" => Some(Pillar::Wellness),
            "communication" | "language_communication" | "speaking" => Some(Pillar::Communication),
            "civics" | "society_culture" | "community" => Some(Pillar::Civics),
            "art" | "arts_creativity" | "creativity" => Some(Pillar::Art),
            _ => None,
        }
    }
}

impl fmt::Display for Pillar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Quest catalogue type: platform-authored vs. structured course quests.
/// Course quests copy their template tasks per user on first pickup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestType {
    Optio,
    Course,
}

impl QuestType {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestType::Optio => "optio",
            QuestType::Course => "course",
        }
    }

    pub fn parse(raw: &str) -> Option<QuestType> {
        match raw {
            "optio" => Some(QuestType::Optio),
            "course" => Some(QuestType::Course),
            _ => None,
        }
    }
}

/// Lifecycle state of a user's enrollment in a quest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuestStatus {
    PickedUp,
    SetDown,
    Completed,
    Inactive,
}

impl QuestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QuestStatus::PickedUp => "picked_up",
            QuestStatus::SetDown => "set_down",
            QuestStatus::Completed => "completed",
            QuestStatus::Inactive => "inactive",
        }
    }

    pub fn parse(raw: &str) -> Option<QuestStatus> {
        match raw {
            "picked_up" => Some(QuestStatus::PickedUp),
            "set_down" => Some(QuestStatus::SetDown),
            "completed" => Some(QuestStatus::Completed),
            "inactive" => Some(QuestStatus::Inactive),
            _ => None,
        }
    }
}

/// Moderation state of a task definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

impl ApprovalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApprovalStatus::Pending => "pending",
            ApprovalStatus::Approved => "approved",
            ApprovalStatus::Rejected => "rejected",
        }
    }

    pub fn parse(raw: &str) -> Option<ApprovalStatus> {
        match raw {
            "pending" => Some(ApprovalStatus::Pending),
            "approved" => Some(ApprovalStatus::Approved),
            "rejected" => Some(ApprovalStatus::Rejected),
            _ => None,
        }
    }
}

/// State of a two-student collaboration on a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollaborationStatus {
    Pending,
    Active,
    Completed,
}

impl CollaborationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CollaborationStatus::Pending => "pending",
            CollaborationStatus::Active => "active",
            CollaborationStatus::Completed => "completed",
        }
    }

    pub fn parse(raw: &str) -> Option<CollaborationStatus> {
        match raw {
            "pending" => Some(CollaborationStatus::Pending),
            "active" => Some(CollaborationStatus::Active),
            "completed" => Some(CollaborationStatus::Completed),
            _ => None,
        }
    }
}

/// Account roles accepted at registration.
pub const USER_ROLES: [&str; 6] = [
    "student",
    "parent",
    "advisor",
    "admin",
    "superadmin",
    "org_admin",
];

/// Roles allowed to author quests/badges and read student progress.
pub const ADVISOR_ROLES: [&str; 4] = ["advisor", "admin", "superadmin", "org_admin"];

pub fn is_valid_role(role: &str) -> bool {
    USER_ROLES.contains(&role)
}

pub fn is_advisor_role(role: &str) -> bool {
    ADVISOR_ROLES.contains(&role)
}
