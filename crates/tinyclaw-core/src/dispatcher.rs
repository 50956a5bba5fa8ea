use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use tinyclaw_assembler::finalize as assemble_response;
use tinyclaw_bus::{chrono_compat::Timestamp, BusEvent, EventBus, Topic};
use tinyclaw_conversation::ConversationRegistry;
use tinyclaw_invoker::{AgentProvider, InvocationRequest};
use tinyclaw_memory::{self, LlmGate, MemoryStore, RuleGate};
use tinyclaw_plugins::{Hook, HookContext, HookRegistry};
use tinyclaw_queue::{ClaimedMessage, FileQueue};
use tinyclaw_router::{self, RoutingConfig};
use tinyclaw_scheduler::AgentScheduler;
use tinyclaw_schema::{
    ConversationResponse, IncomingMessage, OutgoingResponse, PluginState, RejectionReason, RoutingDecision, Settings,
};

use crate::error::DispatchError;

const SHUTDOWN_DRAIN_BUDGET: Duration = Duration::from_secs(30);
const TICK_INTERVAL: Duration = Duration::from_secs(1);

const REJECTED_MULTI_MENTION_REPLY: &str =
    "I can only act on one top-level mention at a time — please address a single agent or team.";
const UNKNOWN_MENTION_REPLY_PREFIX: &str = "I don't recognize that agent or team:";
const SENDER_NOT_ALLOWED_REPLY: &str = "Sorry, this sender is not authorized to use this assistant.";

/// Everything one dispatch tick needs, built once from whatever `run`
/// observes in the loaded `Settings` snapshot for that tick. Every field is
/// cheap to clone so a `Dispatcher` can be handed, whole, into every
/// scheduler job it spawns.
#[derive(Clone)]
pub struct Dispatcher {
    queue: Arc<FileQueue>,
    config_store: tinyclaw_config::ConfigStore,
    scheduler: AgentScheduler,
    conversations: ConversationRegistry,
    bus: EventBus,
    hooks: Vec<Arc<dyn Hook>>,
    invoker: Arc<dyn AgentProvider>,
    memory_store: Arc<dyn MemoryStore>,
    llm_gate: Option<Arc<dyn LlmGate>>,
}

impl Dispatcher {
    pub fn new(
        queue: FileQueue,
        config_store: tinyclaw_config::ConfigStore,
        hooks: Vec<Arc<dyn Hook>>,
        invoker: Arc<dyn AgentProvider>,
        memory_store: Arc<dyn MemoryStore>,
        llm_gate: Option<Arc<dyn LlmGate>>,
    ) -> Self {
        Self {
            queue: Arc::new(queue),
            config_store,
            scheduler: AgentScheduler::new(),
            conversations: ConversationRegistry::new(),
            bus: EventBus::new(),
            hooks,
            invoker,
            memory_store,
            llm_gate,
        }
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    /// Move any message stranded in `processing/` back into `incoming/`.
    /// Must be called once before the first tick, after a restart.
    pub async fn recover(&self) -> Result<usize, DispatchError> {
        Ok(self.queue.recover().await?)
    }

    /// Run the dispatch loop until `shutdown` is set to `true`, then drain
    /// every in-flight agent chain (bounded by `SHUTDOWN_DRAIN_BUDGET`)
    /// before returning.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(TICK_INTERVAL);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick().await {
                        warn!(error = %e, "dispatch tick failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("shutting down, draining agent chains");
        self.scheduler.shutdown(SHUTDOWN_DRAIN_BUDGET).await;
    }

    /// Drain the entire `incoming/` backlog once, claiming and dispatching
    /// every waiting message.
    async fn tick(&self) -> Result<(), DispatchError> {
        let settings = Arc::new(self.config_store.load().await?);

        loop {
            let Some(claimed) = self.queue.claim().await? else {
                break;
            };

            let dispatcher = self.clone();
            let settings = settings.clone();
            tokio::spawn(async move {
                dispatcher.handle_claimed(settings, claimed).await;
            });
        }

        Ok(())
    }

    async fn handle_claimed(&self, settings: Arc<Settings>, claimed: ClaimedMessage) {
        let message = claimed.message.clone();

        if !settings.security.sender_allowed(message.sender_id.as_deref()) {
            warn!(sender_id = ?message.sender_id, "rejecting message from disallowed sender");
            self.publish(Topic::MessageReceived, None, None, "sender not allowed").await;
            self.reply_and_ack(&settings, &claimed, SENDER_NOT_ALLOWED_REPLY, "default", &message.message)
                .await;
            return;
        }

        self.publish(Topic::MessageReceived, message.conversation_id.clone(), message.agent.clone(), &message.message_id)
            .await;

        if message.is_internal() {
            let agent_id = message.agent.clone().expect("checked by is_internal");
            let conversation_id = message.conversation_id.clone().expect("checked by is_internal");
            let body = message.message.clone();
            self.dispatch_to_agent(settings, claimed, agent_id, Some(conversation_id), body).await;
            return;
        }

        let routing_config = RoutingConfig {
            agents: settings.agents.values().cloned().collect(),
            teams: settings.teams.values().cloned().collect(),
            default_agent: settings.default_agent.clone(),
        };

        let ctx = HookContext::new("router");
        let hooks = HookRegistry::new(self.hooks.clone(), Duration::from_millis(settings.plugins.hook_timeout_ms));
        let transformed = hooks.run_transform_incoming(&ctx, &message.message).await;

        match tinyclaw_router::route(&routing_config, &transformed) {
            RoutingDecision::Agent { agent_id, body } => {
                self.publish(Topic::MessageRouted, None, Some(agent_id.clone()), "routed to agent").await;
                self.dispatch_to_agent(settings, claimed, agent_id, None, body).await;
            }
            RoutingDecision::Team { team_id, body } => {
                let Some(team) = settings.teams.get(&team_id).cloned() else {
                    warn!(team_id, "routed team vanished from settings between route and dispatch");
                    return;
                };
                self.publish(Topic::MessageRouted, None, Some(team.leader.clone()), "routed to team leader").await;
                self.dispatch_to_agent(settings, claimed, team.leader.clone(), None, body).await;
            }
            RoutingDecision::Rejected { reason } => {
                let reply = match &reason {
                    RejectionReason::MultipleTopLevelMentions => REJECTED_MULTI_MENTION_REPLY.to_string(),
                    RejectionReason::UnknownMention { mentioned } => {
                        format!("{UNKNOWN_MENTION_REPLY_PREFIX} @{mentioned}")
                    }
                    RejectionReason::SenderNotAllowed => SENDER_NOT_ALLOWED_REPLY.to_string(),
                };
                self.reply_and_ack(&settings, &claimed, &reply, &settings.default_agent, &message.message).await;
            }
        }
    }

    /// Hand one message off to a specific agent's FIFO chain. `conversation_id`
    /// is `Some` for an internal (already fanned-out) branch and `None` for a
    /// brand new top-level conversation. `body` is the text to actually send
    /// the model — any routing `@mention` prefix already stripped.
    async fn dispatch_to_agent(
        &self,
        settings: Arc<Settings>,
        claimed: ClaimedMessage,
        agent_id: String,
        conversation_id: Option<String>,
        body: String,
    ) {
        let dispatcher = self.clone();
        self.scheduler
            .submit(&agent_id, async move {
                dispatcher.run_agent_turn(settings, claimed, agent_id, conversation_id, body).await;
            })
            .await;
    }

    async fn run_agent_turn(
        &self,
        settings: Arc<Settings>,
        claimed: ClaimedMessage,
        agent_id: String,
        conversation_id: Option<String>,
        body: String,
    ) {
        let Some(agent_config) = settings.agents.get(&agent_id).cloned() else {
            warn!(agent_id, "agent not found in settings, dropping message");
            let _ = self.queue.ack(&claimed).await;
            return;
        };

        // Memory enrichment is scoped to non-internal user messages: a
        // top-level dispatch arrives here with `conversation_id == None`,
        // while a fanned-out teammate branch always carries one already.
        let is_top_level = conversation_id.is_none();

        let team_id = settings
            .teams
            .values()
            .find(|t| t.leader == agent_id)
            .map(|t| t.id.clone());

        let conversation_id = match conversation_id {
            Some(id) => id,
            None => {
                let budget = team_id
                    .as_ref()
                    .and_then(|id| settings.teams.get(id))
                    .map(|t| t.message_budget)
                    .unwrap_or(50);
                self.conversations.start(team_id.clone(), budget, claimed.message.message.clone()).await
            }
        };

        self.publish(Topic::AgentInvoked, Some(conversation_id.clone()), Some(agent_id.clone()), "invoking agent").await;

        let ctx = HookContext::new(agent_id.clone()).with_conversation(conversation_id.clone());
        let hooks = HookRegistry::new(self.hooks.clone(), Duration::from_millis(settings.plugins.hook_timeout_ms));

        let memory_context = if is_top_level {
            let rule_gate = RuleGate::new(
                settings.memory.force_patterns.clone(),
                settings.memory.skip_patterns.clone(),
            );
            tinyclaw_memory::prefetch(
                &settings.memory,
                &rule_gate,
                self.llm_gate.as_deref(),
                &*self.memory_store,
                &claimed.message.channel,
                claimed.message.sender_id.as_deref().unwrap_or(""),
                &agent_id,
                &body,
            )
            .await
        } else {
            None
        };

        let before = hooks.run_before_model(&ctx, &PluginState::default()).await;
        if before.skip_invocation {
            debug!(agent_id, "beforeModel hook requested skipping this invocation");
            let _ = self.queue.ack(&claimed).await;
            return;
        }

        let mut prompt = String::new();
        if let Some(context) = memory_context {
            prompt.push_str(&context);
            prompt.push_str("\n\n");
        }
        if let Some(context) = before.prepend_context {
            prompt.push_str(&context);
            prompt.push_str("\n\n");
        }
        prompt.push_str(&body);

        let invocation = self
            .invoker
            .invoke(InvocationRequest {
                agent: &agent_config,
                prompt,
                session_id: None,
            })
            .await;

        let raw_text = match invocation {
            Ok(outcome) => outcome.text,
            Err(e) => {
                warn!(agent_id, error = %e, "agent invocation failed");
                self.publish(Topic::PluginHookFailed, Some(conversation_id.clone()), Some(agent_id.clone()), &e.to_string())
                    .await;
                format!("Sorry, {agent_id} couldn't process that request right now.")
            }
        };

        let after = hooks.run_after_model(&ctx, &raw_text).await;
        let final_text = after.override_text.unwrap_or(raw_text);

        self.publish(Topic::AgentCompleted, Some(conversation_id.clone()), Some(agent_id.clone()), "agent turn complete")
            .await;

        for mention in tinyclaw_schema::find_mention_tags(&final_text) {
            for target in &mention.targets {
                self.conversations
                    .record_mention(&conversation_id, &agent_id, target)
                    .await;
                self.enqueue_internal_branch(&claimed.message, &conversation_id, target, &mention.body)
                    .await;
            }
        }

        let response = ConversationResponse {
            agent_id: agent_id.clone(),
            body: final_text,
            completed_at: Utc::now(),
        };

        if let Some((aggregate, original_message)) = self.conversations.complete_branch(&conversation_id, response).await {
            self.publish(Topic::ConversationCompleted, Some(conversation_id.clone()), None, "conversation aggregated")
                .await;
            let transformed = hooks.run_transform_outgoing(&ctx, &aggregate).await;
            self.reply_and_ack(&settings, &claimed, &transformed, &agent_id, &original_message).await;
        } else {
            let _ = self.queue.ack(&claimed).await;
        }
    }

    /// Write a synthetic internal message into `incoming/` so a mentioned
    /// teammate's branch is picked up on a future tick, exactly like any
    /// other queued message.
    async fn enqueue_internal_branch(
        &self,
        original: &IncomingMessage,
        conversation_id: &str,
        target_agent: &str,
        body: &str,
    ) {
        let internal = IncomingMessage {
            channel: "internal".to_string(),
            sender: original.sender.clone(),
            sender_id: original.sender_id.clone(),
            message_id: uuid::Uuid::new_v4().to_string(),
            message: body.to_string(),
            timestamp: Utc::now(),
            agent: Some(target_agent.to_string()),
            conversation_id: Some(conversation_id.to_string()),
            from_agent: None,
            files: vec![],
            metadata: Default::default(),
        };
        let file_name = format!("internal_{}.json", internal.message_id);
        if let Err(e) = self.queue.submit_incoming(&internal, &file_name).await {
            warn!(error = %e, target_agent, "failed to enqueue internal branch message");
        }
    }

    async fn reply_and_ack(
        &self,
        settings: &Settings,
        claimed: &ClaimedMessage,
        text: &str,
        from_agent: &str,
        original_message: &str,
    ) {
        let assembled = match assemble_response(
            text,
            self.queue.files_dir(),
            &settings.security,
            &claimed.message.message_id,
        )
        .await
        {
            Ok(a) => a,
            Err(e) => {
                warn!(error = %e, "failed to assemble final response");
                return;
            }
        };

        let response = OutgoingResponse {
            channel: claimed.message.channel.clone(),
            sender: claimed.message.sender.clone(),
            message: assembled.message,
            original_message: original_message.to_string(),
            timestamp: Utc::now(),
            message_id: claimed.message.message_id.clone(),
            agent: Some(from_agent.to_string()),
            files: assembled.files,
        };

        if let Err(e) = self.queue.commit_out(&response).await {
            warn!(error = %e, "failed to commit outgoing response");
            return;
        }
        self.publish(
            Topic::ResponseCommitted,
            claimed.message.conversation_id.clone(),
            Some(from_agent.to_string()),
            "response committed",
        )
        .await;
        if let Err(e) = self.queue.ack(claimed).await {
            warn!(error = %e, "failed to ack claimed message after commit");
        }
    }

    async fn publish(&self, topic: Topic, conversation_id: Option<String>, agent_id: Option<String>, detail: &str) {
        self.bus
            .publish(BusEvent {
                topic,
                conversation_id,
                agent_id,
                detail: detail.to_string(),
                at: Timestamp(Utc::now().timestamp_millis()),
            })
            .await;
    }
}
