use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Student,
    Instructor,
    TeachingAssistant,
    AcademicLead,
    Administrator,
}

impl Role {
    pub const ALL: [Role; 5] = [
        Role::Student,
        Role::Instructor,
        Role::TeachingAssistant,
        Role::AcademicLead,
        Role::Administrator,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Instructor => "instructor",
            Role::TeachingAssistant => "teaching_assistant",
            Role::AcademicLead => "academic_lead",
            Role::Administrator => "administrator",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Role::Student => "Student",
            Role::Instructor => "Instructor",
            Role::TeachingAssistant => "Teaching assistant",
            Role::AcademicLead => "Academic lead",
            Role::Administrator => "Administrator",
        }
    }

    pub fn features(self) -> &'static [Feature] {
        capabilities(self)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    // Navigation
    Dashboard,
    Planning,
    Documents,
    Notes,
    Messages,
    Admin,
    // Business
    NotesConsultation,
    NotesEntry,
    NotesValidation,
    NotesLateAmendment,
    CourseConsultation,
    CourseManagement,
    DocumentSubmission,
    DocumentValidation,
    Messaging,
    PlanningManagement,
    AbsenceManagement,
    UserManagement,
    SchoolManagement,
}

impl Feature {
    pub const ALL: [Feature; 19] = [
        Feature::Dashboard,
        Feature::Planning,
        Feature::Documents,
        Feature::Notes,
        Feature::Messages,
        Feature::Admin,
        Feature::NotesConsultation,
        Feature::NotesEntry,
        Feature::NotesValidation,
        Feature::NotesLateAmendment,
        Feature::CourseConsultation,
        Feature::CourseManagement,
        Feature::DocumentSubmission,
        Feature::DocumentValidation,
        Feature::Messaging,
        Feature::PlanningManagement,
        Feature::AbsenceManagement,
        Feature::UserManagement,
        Feature::SchoolManagement,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Feature::Dashboard => "dashboard",
            Feature::Planning => "planning",
            Feature::Documents => "documents",
            Feature::Notes => "notes",
            Feature::Messages => "messages",
            Feature::Admin => "admin",
            Feature::NotesConsultation => "notes_consultation",
            Feature::NotesEntry => "notes_entry",
            Feature::NotesValidation => "notes_validation",
            Feature::NotesLateAmendment => "notes_late_amendment",
            Feature::CourseConsultation => "course_consultation",
            Feature::CourseManagement => "course_management",
            Feature::DocumentSubmission => "document_submission",
            Feature::DocumentValidation => "document_validation",
            Feature::Messaging => "messaging",
            Feature::PlanningManagement => "planning_management",
            Feature::AbsenceManagement => "absence_management",
            Feature::UserManagement => "user_management",
            Feature::SchoolManagement => "school_management",
        }
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Feature {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .into_iter()
            .find(|feature| feature.as_str() == value)
            .ok_or(())
    }
}

const STUDENT: &[Feature] = &[
    Feature::Dashboard,
    Feature::Planning,
    Feature::Documents,
    Feature::Notes,
    Feature::Messages,
    Feature::NotesConsultation,
    Feature::CourseConsultation,
    Feature::DocumentSubmission,
    Feature::Messaging,
];

const INSTRUCTOR: &[Feature] = &[
    Feature::Dashboard,
    Feature::Planning,
    Feature::Documents,
    Feature::Notes,
    Feature::Messages,
    Feature::CourseConsultation,
    Feature::DocumentSubmission,
    Feature::NotesEntry,
    Feature::Messaging,
];

const TEACHING_ASSISTANT: &[Feature] = &[
    Feature::Dashboard,
    Feature::Planning,
    Feature::Documents,
    Feature::Notes,
    Feature::Messages,
    Feature::NotesLateAmendment,
    Feature::DocumentValidation,
    Feature::Messaging,
];

const ACADEMIC_LEAD: &[Feature] = &[
    Feature::Dashboard,
    Feature::Planning,
    Feature::Documents,
    Feature::Notes,
    Feature::Messages,
    Feature::CourseConsultation,
    Feature::CourseManagement,
    Feature::DocumentSubmission,
    Feature::AbsenceManagement,
    Feature::NotesValidation,
    Feature::Messaging,
];

// Operational oversight. Planning management is granted to nobody yet.
const ADMINISTRATOR: &[Feature] = &[
    Feature::Dashboard,
    Feature::Planning,
    Feature::Documents,
    Feature::Notes,
    Feature::Messages,
    Feature::Admin,
    Feature::CourseConsultation,
    Feature::CourseManagement,
    Feature::DocumentSubmission,
    Feature::DocumentValidation,
    Feature::NotesConsultation,
    Feature::NotesEntry,
    Feature::NotesValidation,
    Feature::NotesLateAmendment,
    Feature::AbsenceManagement,
    Feature::UserManagement,
    Feature::SchoolManagement,
    Feature::Messaging,
];

/// Static capability matrix entry for a role.
pub fn capabilities(role: Role) -> &'static [Feature] {
    match role {
        Role::Student => STUDENT,
        Role::Instructor => INSTRUCTOR,
        Role::TeachingAssistant => TEACHING_ASSISTANT,
        Role::AcademicLead => ACADEMIC_LEAD,
        Role::Administrator => ADMINISTRATOR,
    }
}

/// Maps a role token emitted by the credential service onto a canonical role.
///
/// The upstream service has used French role names (`etudiant`,
/// `intervenant`) and later English ones (`student`, `teacher`); both are
/// accepted along with the internal keys. Anything else falls back to the
/// least privileged role.
pub fn normalize_role(token: &str) -> Role {
    let token = token.trim().to_ascii_lowercase();
    match token.as_str() {
        "student" | "etudiant" => Role::Student,
        "teacher" | "intervenant" | "instructor" => Role::Instructor,
        "assistant_pedagogique" | "teaching_assistant" => Role::TeachingAssistant,
        "responsable_pedagogique" | "academic_lead" => Role::AcademicLead,
        "admin" | "administrator" => Role::Administrator,
        other => {
            tracing::warn!(role = other, "unknown role token, defaulting to student");
            Role::Student
        }
    }
}
