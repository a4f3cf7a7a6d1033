//! Role-driven dashboard aggregation.
//!
//! One aggregation cycle runs per active identity: the fetches the role
//! needs are issued concurrently, all of them settle, and the merged result
//! is committed only if the identity is still the one the cycle started
//! for. A cycle left behind by an identity switch finishes its round trip
//! but its result is dropped.
use std::collections::HashMap;

use anyhow::Context;
use chrono::NaiveDate;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::watch;

use crate::api::PortalApi;
use crate::guard::can_access;
use crate::models::{ClassLabel, Identity, NoteView, PlanningSlot, RawNote, UserId};
use crate::roles::{Feature, Role};

pub const UNAVAILABLE_MESSAGE: &str =
    "Unable to load your data right now. Please try again later.";

const NOTES_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningScope {
    Student(UserId),
    Teacher(UserId),
    Global,
}

/// Which fetches a cycle issues for an identity. Access is decided by the
/// capability guard; the role only narrows the data scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchPlan {
    pub planning: Option<PlanningScope>,
    pub notes: Option<UserId>,
    pub pending_documents: bool,
}

impl FetchPlan {
    pub fn for_identity(identity: &Identity) -> Self {
        let role = Some(identity.role);

        // Scoped fetches need the caller's id; without one they are skipped.
        let planning = if can_access(role, Feature::Planning) {
            match identity.role {
                Role::Student => identity.id.clone().map(PlanningScope::Student),
                Role::Instructor => identity.id.clone().map(PlanningScope::Teacher),
                _ => Some(PlanningScope::Global),
            }
        } else {
            None
        };
        let notes = if identity.role == Role::Student
            && can_access(role, Feature::NotesConsultation)
        {
            identity.id.clone()
        } else {
            None
        };
        let pending_documents = matches!(identity.role, Role::AcademicLead | Role::Administrator)
            && can_access(role, Feature::Documents);

        Self {
            planning,
            notes,
            pending_documents,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct AggregationResult {
    pub planning: Vec<PlanningSlot>,
    /// At most five, in the order the service returned them.
    pub notes: Vec<NoteView>,
    pub pending_document_count: usize,
    pub is_loading: bool,
    pub error: Option<String>,
}

impl AggregationResult {
    pub fn today_slots(&self, today: NaiveDate) -> Vec<&PlanningSlot> {
        today_slots(&self.planning, today)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DashboardState {
    Idle,
    Loading,
    Ready(AggregationResult),
    Failed(String),
}

impl DashboardState {
    /// Flattened view for the presentation layer.
    pub fn result(&self) -> AggregationResult {
        match self {
            DashboardState::Idle => AggregationResult::default(),
            DashboardState::Loading => AggregationResult {
                is_loading: true,
                ..AggregationResult::default()
            },
            DashboardState::Ready(result) => result.clone(),
            DashboardState::Failed(message) => AggregationResult {
                error: Some(message.clone()),
                ..AggregationResult::default()
            },
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, DashboardState::Ready(_) | DashboardState::Failed(_))
    }
}

/// A published state paired with the identity it was computed for.
#[derive(Debug, Clone, PartialEq)]
pub struct DashboardSnapshot {
    pub identity: Option<Identity>,
    pub state: DashboardState,
}

/// Identifies the cycle that produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleToken(u64);

struct Current {
    generation: u64,
    identity: Option<Identity>,
}

pub struct DashboardAggregator<A> {
    api: A,
    current: Mutex<Current>,
    state: watch::Sender<DashboardSnapshot>,
}

impl<A: PortalApi> DashboardAggregator<A> {
    pub fn new(api: A) -> Self {
        let (state, _) = watch::channel(DashboardSnapshot {
            identity: None,
            state: DashboardState::Idle,
        });
        Self {
            api,
            current: Mutex::new(Current {
                generation: 0,
                identity: None,
            }),
            state,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.state.subscribe()
    }

    pub fn state(&self) -> DashboardState {
        self.state.borrow().state.clone()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        self.state.borrow().clone()
    }

    /// Makes `identity` the active one. Any cycle started earlier becomes
    /// stale. Enters `Loading`, or `Idle` when signed out.
    pub fn activate(&self, identity: Option<Identity>) -> CycleToken {
        let mut current = self.current.lock();
        current.generation += 1;
        let next = if identity.is_some() {
            DashboardState::Loading
        } else {
            DashboardState::Idle
        };
        current.identity = identity.clone();
        self.state.send_replace(DashboardSnapshot {
            identity,
            state: next,
        });
        CycleToken(current.generation)
    }

    /// Runs the cycle for `token`. Returns whether its outcome was committed.
    pub async fn run(&self, token: CycleToken) -> bool {
        let Some(identity) = self.identity_for(token) else {
            return false;
        };

        let plan = FetchPlan::for_identity(&identity);
        let next = match self.fetch(&plan).await {
            Ok(result) => DashboardState::Ready(result),
            Err(err) => {
                tracing::error!(error = ?err, role = %identity.role, "dashboard aggregation failed");
                DashboardState::Failed(UNAVAILABLE_MESSAGE.to_string())
            }
        };
        self.commit(token, next)
    }

    pub async fn refresh(&self, identity: Option<Identity>) -> bool {
        let token = self.activate(identity);
        self.run(token).await
    }

    fn identity_for(&self, token: CycleToken) -> Option<Identity> {
        let current = self.current.lock();
        if current.generation != token.0 {
            return None;
        }
        current.identity.clone()
    }

    fn commit(&self, token: CycleToken, next: DashboardState) -> bool {
        let current = self.current.lock();
        if current.generation != token.0 {
            tracing::debug!(
                cycle = token.0,
                current = current.generation,
                "discarding stale dashboard cycle"
            );
            return false;
        }
        self.state.send_replace(DashboardSnapshot {
            identity: current.identity.clone(),
            state: next,
        });
        true
    }

    async fn fetch(&self, plan: &FetchPlan) -> anyhow::Result<AggregationResult> {
        let api = &self.api;

        let planning = async {
            match &plan.planning {
                Some(PlanningScope::Student(id)) => {
                    api.student_planning(id).await.context("student planning")
                }
                Some(PlanningScope::Teacher(id)) => {
                    api.teacher_planning(id).await.context("teacher planning")
                }
                Some(PlanningScope::Global) => api.all_planning().await.context("planning"),
                None => Ok(Vec::new()),
            }
        };
        let notes = async {
            let Some(id) = &plan.notes else {
                return Ok::<_, anyhow::Error>(Vec::new());
            };
            let (notes, classes) = tokio::join!(api.student_notes(id), api.classes());
            let notes = notes.context("notes")?;
            let classes = classes.context("classes")?;
            Ok(join_notes(notes, &classes))
        };
        let pending = async {
            if !plan.pending_documents {
                return Ok::<_, anyhow::Error>(0);
            }
            api.pending_documents()
                .await
                .map(|documents| documents.len())
                .context("pending documents")
        };

        // Every fetch settles before the cycle leaves Loading.
        let (planning, notes, pending) = tokio::join!(planning, notes, pending);
        Ok(AggregationResult {
            planning: planning?,
            notes: notes?,
            pending_document_count: pending?,
            is_loading: false,
            error: None,
        })
    }
}

/// Joins raw notes with class labels, keeping the first five.
pub fn join_notes(notes: Vec<RawNote>, classes: &[ClassLabel]) -> Vec<NoteView> {
    let labels: HashMap<i64, &str> = classes
        .iter()
        .map(|class| (class.id, class.label.as_str()))
        .collect();

    notes
        .into_iter()
        .take(NOTES_LIMIT)
        .map(|note| {
            let class_label = match note.class_id {
                Some(id) => labels
                    .get(&id)
                    .map(|label| label.to_string())
                    .unwrap_or_else(|| format!("Class #{id}")),
                None => "Unknown class".to_string(),
            };
            NoteView {
                class_label,
                value: note.value,
                ects: note.ects,
            }
        })
        .collect()
}

/// Slots whose calendar date is `today`.
pub fn today_slots(planning: &[PlanningSlot], today: NaiveDate) -> Vec<&PlanningSlot> {
    let today = today.format("%Y-%m-%d").to_string();
    planning.iter().filter(|slot| slot.day() == today).collect()
}

pub fn local_today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
