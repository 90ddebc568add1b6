//! Turn Runner (SPEC_FULL.md §4.1).
//!
//! The single public entry point into the kernel: load the tenant's locked
//! state document, classify the inbound message, run it through the
//! dispatcher, persist, release the lock. Never propagates a step-handler
//! panic to the caller — it is caught and turned into a manager-review
//! escalation instead.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde_json::json;
use uuid::Uuid;

use crate::catalog::DomainCatalog;
use crate::classify::{self, Detection, LlmAdapter};
use crate::config::KernelConfig;
use crate::dispatcher;
use crate::error::ApiError;
use crate::persistence;
use crate::steps::step1_intake;
use crate::types::{Database, InboundMessage, Task, TaskStatus, TaskType, ThreadState, TurnResult};
use crate::util;

/// Serializes turns for the same tenant within this process, ahead of the
/// cross-process file lock in `persistence`. Without this, N concurrent
/// requests for one tenant in the same server process all spin through the
/// file lock's retry loop instead of just queuing in-process. A non-poisoning
/// mutex: a step-handler panic on one turn must not wedge every other
/// tenant's queue behind a poisoned lock.
pub struct TurnRunner {
    config: KernelConfig,
    catalog: Arc<dyn DomainCatalog>,
    llm: Arc<dyn LlmAdapter>,
    tenant_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl TurnRunner {
    pub fn new(config: KernelConfig, catalog: Arc<dyn DomainCatalog>, llm: Arc<dyn LlmAdapter>) -> Self {
        TurnRunner { config, catalog, llm, tenant_locks: DashMap::new() }
    }

    fn tenant_lock(&self, team_id: &str) -> Arc<Mutex<()>> {
        self.tenant_locks.entry(team_id.to_string()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Read-only catalog handle for callers outside the turn loop (the
    /// `/api/qna` responder, which never mutates tenant state).
    pub fn catalog(&self) -> &Arc<dyn DomainCatalog> {
        &self.catalog
    }

    /// Process one inbound message for `team_id` (or the configured default
    /// tenant when `None`) end to end.
    pub async fn run_turn(&self, team_id: Option<&str>, message: InboundMessage) -> TurnResult {
        let resolved_team = team_id.filter(|s| !s.is_empty()).or(Some(self.config.default_team_id.as_str()));

        let tenant_lock = self.tenant_lock(resolved_team.unwrap_or("default"));
        let _tenant_guard = tenant_lock.lock();

        let (lock, mut db) = {
            let state_dir = self.config.state_dir.clone();
            let team_id_owned = resolved_team.map(str::to_string);
            let load_result = tokio::task::spawn_blocking(move || {
                persistence::load_locked(&state_dir, team_id_owned.as_deref())
            })
            .await
            .expect("load_locked blocking task panicked");

            match load_result {
                Ok(v) => v,
                Err(e) => {
                    log::warn!("turn runner could not acquire state lock: {e}");
                    let mut result = TurnResult::silent("lock_unavailable");
                    result.payload = json!(ApiError::from(&e));
                    return result;
                }
            }
        };

        let context = json!({ "subject": message.subject });
        let (label, confidence, extracted) = self.llm.classify(&message.body, &context).await;

        if classify::nonsense_gate(&message.body, confidence).is_some() {
            log::info!("ignoring nonsense message from {}", message.from_email);
            drop(lock);
            return TurnResult::silent("ignored_nonsense");
        }

        let (_statements, questions) = classify::split_statements_and_questions(&message.body);
        let detection = Detection {
            is_question: !questions.is_empty(),
            is_general_qna: label == "general_qna",
            label,
            confidence,
            step_anchor: None,
            extracted,
        };

        let mentions_new_date = classify::contains_iso_date(&message.body);
        let thread_id = message.thread_id.clone().unwrap_or_else(|| message.from_email.clone());

        // A caller that already knows which event it means (e.g. the
        // pay-deposit endpoint, keyed by URL path rather than thread) names
        // it directly instead of going through thread/email matching, which
        // could otherwise resolve to a different open event for that client.
        let event_id = match message.extras.event_id.as_deref() {
            Some(id) if db.find_event(id).is_some_and(|e| e.client_email == message.from_email) => id.to_string(),
            _ => step1_intake::find_or_create_event(&mut db, &message.from_email, &thread_id, mentions_new_date),
        };

        let catalog = self.catalog.clone();
        let debug = self.config.debug;
        let state_dir = self.config.state_dir.clone();
        let dispatch_result = {
            let db_ref = &mut db;
            let event_id_ref = event_id.as_str();
            panic::catch_unwind(AssertUnwindSafe(|| {
                dispatcher::run_dispatch(db_ref, event_id_ref, catalog.as_ref(), &message, &detection, debug, &state_dir)
            }))
        };

        let (action, drafts) = match dispatch_result {
            Ok(drafts) => ("processed".to_string(), drafts),
            Err(payload) => {
                let reason = panic_message(&payload);
                log::error!("step handler panicked for event {event_id}: {reason}");
                escalate_to_manager_review(&mut db, &event_id, &reason);
                ("manual_review_escalated".to_string(), Vec::new())
            }
        };

        let db = {
            let state_dir = self.config.state_dir.clone();
            let team_id_owned = resolved_team.map(str::to_string);
            let debug = self.config.debug;
            tokio::task::spawn_blocking(move || {
                if let Err(e) = persistence::save(&state_dir, team_id_owned.as_deref(), &db, debug) {
                    log::error!("failed to persist state after turn: {e}");
                }
                db
            })
            .await
            .expect("save blocking task panicked")
        };
        drop(lock);

        let thread_state = db.find_event(&event_id).map(|e| e.thread_state);
        TurnResult {
            action,
            event_id: Some(event_id),
            thread_state,
            draft_messages: drafts,
            payload: serde_json::Value::Null,
        }
    }
}

fn panic_message(payload: &Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

fn escalate_to_manager_review(db: &mut Database, event_id: &str, reason: &str) {
    let client_id = db
        .find_event(event_id)
        .map(|e| util::person_id_from_email(&e.client_email))
        .unwrap_or_default();

    if let Some(event) = db.find_event_mut(event_id) {
        event.thread_state = ThreadState::AwaitingManagerReview;
    }

    let now = Utc::now();
    db.tasks.push(Task {
        task_id: Uuid::new_v4().to_string(),
        task_type: TaskType::ManualReview,
        status: TaskStatus::Pending,
        client_id,
        event_id: event_id.to_string(),
        payload: json!({ "reason": reason }),
        notes: None,
        created_at: now,
        updated_at: now,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::classify::NullLlmAdapter;
    use crate::types::MessageExtras;

    fn test_config(dir: &std::path::Path) -> KernelConfig {
        KernelConfig {
            env: "test".to_string(),
            auth_enabled: false,
            auth_mode: crate::config::AuthMode::Bearer,
            api_key: None,
            tenant_header_enabled: false,
            allowed_origins: Vec::new(),
            debug: false,
            state_dir: dir.to_path_buf(),
            default_team_id: "acme".to_string(),
        }
    }

    fn msg(body: &str) -> InboundMessage {
        InboundMessage {
            msg_id: Some("m1".into()),
            from_email: "client@example.com".into(),
            from_name: None,
            subject: None,
            body: body.to_string(),
            ts: None,
            thread_id: Some("thread-1".into()),
            session_id: None,
            extras: MessageExtras::default(),
        }
    }

    #[tokio::test]
    async fn test_nonsense_message_is_ignored_without_creating_event() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TurnRunner::new(
            test_config(dir.path()),
            Arc::new(InMemoryCatalog::new(vec![], vec![])),
            Arc::new(NullLlmAdapter),
        );
        let result = runner.run_turn(None, msg("asdkjf;lqwjelkqwje")).await;
        assert_eq!(result.action, "ignored_nonsense");
        assert!(result.event_id.is_none());
    }

    #[tokio::test]
    async fn test_workflow_message_creates_event_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let runner = TurnRunner::new(
            test_config(dir.path()),
            Arc::new(InMemoryCatalog::new(vec![], vec![])),
            Arc::new(NullLlmAdapter),
        );
        let result = runner
            .run_turn(None, msg("We'd like to book a room for 2026-06-01 at 14:00"))
            .await;
        assert_eq!(result.action, "processed");
        assert!(result.event_id.is_some());

        let (_lock, db) = persistence::load_locked(dir.path(), Some("acme")).unwrap();
        assert_eq!(db.events.len(), 1);
    }
}
