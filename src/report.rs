use std::fmt::Write;

use chrono::NaiveDate;

use crate::dashboard::{DashboardState, FetchPlan, PlanningScope};
use crate::guard::navigation;
use crate::models::{Identity, PlanningSlot};

const UPCOMING_LIMIT: usize = 5;

fn clock(time: &str) -> &str {
    time.get(..5).unwrap_or(time)
}

fn display_date(slot: &PlanningSlot) -> String {
    NaiveDate::parse_from_str(slot.day(), "%Y-%m-%d")
        .map(|date| date.format("%d/%m/%Y").to_string())
        .unwrap_or_else(|_| slot.day().to_string())
}

pub fn build_profile(identity: &Identity) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Signed in as {} ({})", identity.email, identity.role.label());
    if let Some(id) = &identity.id {
        let _ = writeln!(output, "User id: {id}");
    }
    let _ = writeln!(output);
    let _ = writeln!(output, "Navigation:");
    for entry in navigation(Some(identity.role)) {
        let _ = writeln!(output, "- {} ({})", entry.label, entry.path);
    }
    output
}

pub fn build_report(identity: &Identity, state: &DashboardState, today: NaiveDate) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "# Dashboard: {}", identity.role.label());
    let _ = writeln!(output, "{}", identity.email);
    let _ = writeln!(output);

    let result = match state {
        DashboardState::Idle => {
            let _ = writeln!(output, "Not signed in.");
            return output;
        }
        DashboardState::Loading => {
            let _ = writeln!(output, "Loading your dashboard...");
            return output;
        }
        DashboardState::Failed(message) => {
            let _ = writeln!(output, "{message}");
            return output;
        }
        DashboardState::Ready(result) => result,
    };
    let plan = FetchPlan::for_identity(identity);

    let _ = writeln!(output, "## Today's Schedule");
    let slots = result.today_slots(today);
    if slots.is_empty() {
        let _ = writeln!(output, "No slots scheduled for today.");
    } else {
        for slot in slots {
            let _ = writeln!(
                output,
                "- {}-{} {} ({}) - {}",
                clock(&slot.start_time),
                clock(&slot.end_time),
                slot.course_label,
                slot.room,
                slot.class_label
            );
        }
    }

    if matches!(plan.planning, Some(PlanningScope::Teacher(_))) {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Upcoming Slots");
        if result.planning.is_empty() {
            let _ = writeln!(output, "No upcoming slots.");
        } else {
            for slot in result.planning.iter().take(UPCOMING_LIMIT) {
                let _ = writeln!(
                    output,
                    "- {} {}-{} {} ({}) - {}",
                    display_date(slot),
                    clock(&slot.start_time),
                    clock(&slot.end_time),
                    slot.course_label,
                    slot.room,
                    slot.class_label
                );
            }
        }
    }

    if plan.notes.is_some() {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Latest Notes");
        if result.notes.is_empty() {
            let _ = writeln!(output, "No notes recorded yet.");
        } else {
            for note in result.notes.iter() {
                let _ = writeln!(
                    output,
                    "- {}: {:.2}/20 ({} ECTS)",
                    note.class_label, note.value, note.ects
                );
            }
        }
    }

    if plan.pending_documents {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Oversight");
        let _ = writeln!(
            output,
            "Documents awaiting validation: {}",
            result.pending_document_count
        );
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::AggregationResult;
    use crate::models::{NoteView, UserId};
    use crate::roles::Role;

    fn slot(slot_id: i64, date: &str) -> PlanningSlot {
        PlanningSlot {
            slot_id,
            course_label: format!("Course {slot_id}"),
            room: "D101".to_string(),
            date: date.to_string(),
            start_time: "08:30:00".to_string(),
            end_time: "10:00:00".to_string(),
            class_id: 1,
            class_label: "A2".to_string(),
            teacher_id: 4,
            teacher_name: "Mme Martin".to_string(),
        }
    }

    fn identity(role: Role) -> Identity {
        Identity {
            id: Some(UserId::new("8")),
            email: "someone@campus.test".to_string(),
            role,
        }
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 12, 5).unwrap()
    }

    #[test]
    fn student_report_lists_today_and_notes() {
        let state = DashboardState::Ready(AggregationResult {
            planning: vec![slot(1, "2025-12-05"), slot(2, "2025-12-06")],
            notes: vec![NoteView {
                class_label: "Dev Web".to_string(),
                value: 16.0,
                ects: 6.0,
            }],
            ..AggregationResult::default()
        });

        let report = build_report(&identity(Role::Student), &state, today());
        assert!(report.contains("- 08:30-10:00 Course 1 (D101) - A2"));
        assert!(!report.contains("Course 2"));
        assert!(report.contains("- Dev Web: 16.00/20 (6 ECTS)"));
        assert!(!report.contains("Oversight"));
    }

    #[test]
    fn instructor_report_lists_upcoming_slots() {
        let state = DashboardState::Ready(AggregationResult {
            planning: vec![slot(2, "2025-12-06T00:00:00.000Z")],
            ..AggregationResult::default()
        });
        let report = build_report(&identity(Role::Instructor), &state, today());
        assert!(report.contains("No slots scheduled for today."));
        assert!(report.contains("- 06/12/2025 08:30-10:00 Course 2"));
        assert!(!report.contains("Latest Notes"));
    }

    #[test]
    fn administrator_report_shows_pending_count() {
        let state = DashboardState::Ready(AggregationResult {
            pending_document_count: 4,
            ..AggregationResult::default()
        });
        let report = build_report(&identity(Role::Administrator), &state, today());
        assert!(report.contains("Documents awaiting validation: 4"));
    }

    #[test]
    fn failed_report_shows_only_the_message() {
        let state = DashboardState::Failed("try later".to_string());
        let report = build_report(&identity(Role::Student), &state, today());
        assert!(report.ends_with("try later\n"));
        assert!(!report.contains("Today's Schedule"));
    }

    #[test]
    fn profile_lists_visible_navigation() {
        let profile = build_profile(&identity(Role::Administrator));
        assert!(profile.contains("Administrator"));
        assert!(profile.contains("- Admin (/admin)"));
    }
}
