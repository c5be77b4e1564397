//! Agent view controller: applies stage events to the document.
//!
//! Events are handled one at a time. Each agent owns at most one opacity
//! transition and one letter animation; a newer event for the same agent
//! cancels the superseded handle before starting its own, so animations from
//! stale events never touch the document again.

use std::collections::HashMap;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, info};

use agent_stage_core::config::{AnimationConfig, Config, DocumentConfig};
use agent_stage_core::protocol::{Delivery, StageEvent};
use agent_stage_core::types::{AgentId, Visibility};
use agent_stage_core::Ack;

use crate::animator::{AnimationHandle, Animator, TokioAnimator};
use crate::dom::{Document, SharedDocument};
use crate::splitter::{LetterSplitter, TextSplitter};
use crate::timeline::{Easing, Timeline};
use crate::words::{group_words, segments_to_nodes};

#[derive(Default)]
struct AgentSlot {
    generation: u64,
    visibility: Visibility,
    fade: Option<AnimationHandle>,
    letters: Option<AnimationHandle>,
}

/// Summary of one agent's view state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AgentSnapshot {
    pub agent_id: AgentId,
    pub visibility: Visibility,
    /// Number of events handled for this agent.
    pub generation: u64,
    /// Whether a letter animation is running.
    pub animating: bool,
}

/// Reacts to `start_agent`, `agent_message`, and `clear_agent`.
pub struct AgentViewController<D, S = LetterSplitter, A = TokioAnimator<D>> {
    document: SharedDocument<D>,
    splitter: S,
    animator: A,
    names: DocumentConfig,
    animation: AnimationConfig,
    agents: HashMap<AgentId, AgentSlot>,
}

impl<D: Document> AgentViewController<D> {
    /// A controller with the built-in splitter and tokio animator.
    pub fn with_defaults(document: SharedDocument<D>, config: &Config) -> Self {
        let frame = Duration::from_millis(config.animation().frame_ms);
        let animator = TokioAnimator::new(document.clone(), frame);
        Self::new(document, LetterSplitter, animator, config)
    }
}

impl<D, S, A> AgentViewController<D, S, A>
where
    D: Document,
    S: TextSplitter,
    A: Animator,
{
    pub fn new(document: SharedDocument<D>, splitter: S, animator: A, config: &Config) -> Self {
        Self {
            document,
            splitter,
            animator,
            names: config.document(),
            animation: config.animation(),
            agents: HashMap::new(),
        }
    }

    pub fn document(&self) -> &SharedDocument<D> {
        &self.document
    }

    /// Handle one delivery.
    pub async fn handle(&mut self, delivery: Delivery) {
        let Delivery { event, ack } = delivery;
        debug!(event = event.name(), agent_id = %event.agent_id(), "Handling stage event");
        match event {
            StageEvent::StartAgent { agent_id } => self.start_agent(&agent_id, ack).await,
            StageEvent::AgentMessage { agent_id, text } => {
                self.agent_message(&agent_id, &text, ack).await
            }
            StageEvent::ClearAgent { agent_id } => self.clear_agent(&agent_id, ack).await,
        }
    }

    /// Handle deliveries until the source closes.
    pub async fn run(&mut self, mut rx: mpsc::UnboundedReceiver<Delivery>) {
        while let Some(delivery) = rx.recv().await {
            self.handle(delivery).await;
        }
        info!("Event source closed");
    }

    /// Fade an agent's container in.
    pub async fn start_agent(&mut self, agent_id: &AgentId, ack: Option<Ack>) {
        self.transition(agent_id, Visibility::Visible).await;
        fire(ack);
    }

    /// Fade an agent's container out.
    ///
    /// A running letter animation keeps going underneath the fade.
    pub async fn clear_agent(&mut self, agent_id: &AgentId, ack: Option<Ack>) {
        self.transition(agent_id, Visibility::Hidden).await;
        fire(ack);
    }

    async fn transition(&mut self, agent_id: &AgentId, visibility: Visibility) {
        let container_id = self.names.container_id(agent_id);
        let slot = self.agents.entry(agent_id.clone()).or_default();
        slot.generation += 1;
        if let Some(prev) = slot.fade.take() {
            prev.cancel();
        }

        if !self.document.lock().await.contains(&container_id) {
            debug!(agent_id = %agent_id, container_id = %container_id, "No container for agent");
            return;
        }
        slot.visibility = visibility;

        let duration = Duration::from_millis(self.animation.fade_ms);
        slot.fade = Some(
            self.animator
                .fade(&container_id, visibility.opacity(), duration, Easing::Swing),
        );
        debug!(agent_id = %agent_id, ?visibility, generation = slot.generation, "Container transition started");
    }

    /// Show `text` for an agent and start the letter bob.
    ///
    /// The letter/word structure is rebuilt before the animation is attached,
    /// and any previous letter animation for the agent is cancelled first.
    pub async fn agent_message(&mut self, agent_id: &AgentId, text: &str, ack: Option<Ack>) {
        let text_id = self.names.text_id(agent_id);
        let slot = self.agents.entry(agent_id.clone()).or_default();
        slot.generation += 1;
        if let Some(prev) = slot.letters.take() {
            prev.cancel();
        }

        let letters = self.splitter.split(text);
        let nodes = segments_to_nodes(&group_words(&letters), &self.names);
        {
            let mut doc = self.document.lock().await;
            if !doc.set_text(&text_id, text) {
                debug!(agent_id = %agent_id, text_id = %text_id, "No text element for agent");
                drop(doc);
                fire(ack);
                return;
            }
            doc.replace_children(&text_id, nodes);
        }

        if !letters.is_empty() {
            let timeline = Timeline::letter_bob(&self.animation);
            slot.letters = Some(self.animator.play(
                &text_id,
                &self.names.letter_class,
                letters.len(),
                timeline,
            ));
        }
        debug!(
            agent_id = %agent_id,
            letters = letters.len(),
            generation = slot.generation,
            "Agent text rebuilt"
        );
        fire(ack);
    }

    /// Cancel every animation for one agent. Document state stays as is.
    pub fn reset_agent(&mut self, agent_id: &AgentId) {
        if let Some(slot) = self.agents.get_mut(agent_id) {
            slot.generation += 1;
            slot.fade.take();
            slot.letters.take();
        }
    }

    /// Last visibility applied to an agent's container (hidden if it was
    /// never shown or has no container).
    pub fn visibility(&self, agent_id: &AgentId) -> Visibility {
        self.agents
            .get(agent_id)
            .map(|slot| slot.visibility)
            .unwrap_or_default()
    }

    /// Per-agent view state, ordered by agent id.
    pub fn snapshot(&self) -> Vec<AgentSnapshot> {
        let mut out: Vec<AgentSnapshot> = self
            .agents
            .iter()
            .map(|(agent_id, slot)| AgentSnapshot {
                agent_id: agent_id.clone(),
                visibility: slot.visibility,
                generation: slot.generation,
                animating: slot.letters.as_ref().is_some_and(AnimationHandle::is_active),
            })
            .collect();
        out.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        out
    }

    /// Cancel all running animations.
    pub fn shutdown(&mut self) {
        for slot in self.agents.values_mut() {
            slot.fade.take();
            slot.letters.take();
        }
        debug!(agents = self.agents.len(), "Controller animations cancelled");
    }
}

fn fire(ack: Option<Ack>) {
    if let Some(ack) = ack {
        ack.fire();
    }
}
