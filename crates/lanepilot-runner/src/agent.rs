//! The agent loop: cadence-driven observe, decide, act.
//!
//! One [`AgentLoop`] drives one controlled character. While running it
//! performs ticks back to back:
//!
//! 1. Clear the commentary and ask the cadence for the tick's mode.
//! 2. `Continue`: send a bare step.
//! 3. `Think`: observe, render the prompt, stream a decision, then step
//!    with the chosen action (or bare when there is none).
//! 4. Advance the tick counter and go again.
//!
//! Every failure inside a think tick (observe, backend, decode, timeout,
//! action dispatch) degrades that tick to a bare step. The loop never stops
//! itself because of a bad tick; a step that cannot be delivered at all is
//! followed by a short back-off.
//!
//! # Concurrency
//!
//! - The tick counter lives behind an async mutex that doubles as the tick
//!   gate: loop ticks and manual continue ticks hold it for their whole
//!   duration, so `/step` calls never overlap.
//! - `stop()` only clears the running flag; the in-flight tick finishes.
//!   Each `start()` bumps a run epoch, and a task from an earlier run exits
//!   as soon as it sees a newer epoch.
//! - Observable state is published through a `watch` channel; the loop is
//!   its only writer.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use lanepilot_core::{ThinkInterval, TickClock, codec};
use lanepilot_types::{
    Action, AgentId, LoopSettings, LoopSnapshot, TickMode, TickOutcome, TickRecord,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::RunnerError;
use crate::game::GameApi;
use crate::llm::ChatBackend;
use crate::policy::{Decision, PolicyClient};
use crate::prompt::PromptEngine;
use crate::settings::SettingsStore;

/// Default pause after a tick whose step could not be delivered.
pub const DEFAULT_ERROR_BACKOFF: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
struct RunState {
    running: bool,
    epoch: u64,
}

/// A cooperative, cadence-driven agent loop.
pub struct AgentLoop<G, B> {
    id: AgentId,
    game: G,
    policy: PolicyClient<B>,
    prompts: PromptEngine,
    store: SettingsStore,
    error_backoff: Duration,
    run: Mutex<RunState>,
    /// Tick gate. Holding it is the right to call `/step`.
    clock: tokio::sync::Mutex<TickClock>,
    state: watch::Sender<LoopSnapshot>,
    /// Serializes `configure` calls.
    config_gate: tokio::sync::Mutex<()>,
}

impl<G, B> AgentLoop<G, B>
where
    G: GameApi + 'static,
    B: ChatBackend + 'static,
{
    /// Create an idle loop at tick 0.
    ///
    /// Settings are restored from `store` when it holds any, otherwise
    /// `defaults` apply.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] if the effective think interval is
    /// zero.
    pub fn new(
        game: G,
        policy: PolicyClient<B>,
        prompts: PromptEngine,
        store: SettingsStore,
        defaults: &LoopSettings,
    ) -> Result<Self, RunnerError> {
        let settings = store.load(defaults);
        let interval = ThinkInterval::new(settings.think_interval)?;
        let id = AgentId::new();
        let (state, _) = watch::channel(LoopSnapshot::new(id, &settings));

        Ok(Self {
            id,
            game,
            policy,
            prompts,
            store,
            error_backoff: DEFAULT_ERROR_BACKOFF,
            run: Mutex::new(RunState::default()),
            clock: tokio::sync::Mutex::new(TickClock::new(interval)),
            state,
            config_gate: tokio::sync::Mutex::new(()),
        })
    }

    /// Override the pause after an undeliverable step.
    #[must_use]
    pub const fn with_error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = backoff;
        self
    }

    /// This loop's identifier.
    pub const fn id(&self) -> AgentId {
        self.id
    }

    /// Whether the loop is scheduled to keep ticking.
    pub fn is_running(&self) -> bool {
        self.run_state().running
    }

    /// A copy of the current observable state.
    pub fn snapshot(&self) -> LoopSnapshot {
        self.state.borrow().clone()
    }

    /// A receiver notified on every state change.
    pub fn subscribe(&self) -> watch::Receiver<LoopSnapshot> {
        self.state.subscribe()
    }

    /// Current think interval and directive.
    pub fn settings(&self) -> LoopSettings {
        self.state.borrow().settings()
    }

    /// Begin ticking. Returns `false` if already running.
    ///
    /// Resumes from the current tick counter.
    pub fn start(self: &Arc<Self>) -> bool {
        let epoch = {
            let mut run = self.run_state();
            if run.running {
                return false;
            }
            run.running = true;
            run.epoch = run.epoch.wrapping_add(1);
            self.state.send_modify(|s| {
                s.running = true;
                s.updated_at = Utc::now();
            });
            run.epoch
        };

        info!(agent_id = %self.id, epoch, "agent loop starting");
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.run_ticks(epoch).await;
        });
        true
    }

    /// Stop scheduling ticks. Returns `false` if not running.
    ///
    /// A tick already in flight completes, including its dispatch.
    pub fn stop(&self) -> bool {
        let mut run = self.run_state();
        if !run.running {
            return false;
        }
        run.running = false;
        self.state.send_modify(|s| {
            s.running = false;
            s.updated_at = Utc::now();
        });
        info!(agent_id = %self.id, "agent loop stopping");
        true
    }

    /// Send one bare step outside the cadence.
    ///
    /// Waits for any in-flight tick, clears the commentary, and does not
    /// advance the tick counter.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Transport`] if the step cannot be delivered.
    pub async fn dispatch_continue_only(&self) -> Result<(), RunnerError> {
        let clock = self.clock.lock().await;
        let tick = clock.tick();
        let started = Instant::now();
        self.begin_tick(TickMode::Continue);

        let result = self.game.step(None).await;
        let outcome = match &result {
            Ok(()) => TickOutcome::Continued,
            Err(e) => TickOutcome::DispatchFailed { reason: e.to_string() },
        };
        let record = completed(tick, TickMode::Continue, outcome, None, started);
        info!(agent_id = %self.id, tick, outcome = record.outcome.label(), "manual continue");
        self.state.send_modify(|s| {
            s.last_outcome = Some(record.outcome.clone());
            s.record(record);
            s.updated_at = Utc::now();
        });
        drop(clock);
        result
    }

    /// Wait until no tick is in flight.
    ///
    /// After [`Self::stop`] this returns once the last tick has dispatched.
    pub async fn wait_idle(&self) {
        drop(self.clock.lock().await);
    }

    /// Validate, persist, and apply new settings.
    ///
    /// The new interval takes effect from the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Config`] for a zero think interval, or
    /// [`RunnerError::Settings`] if persisting fails (nothing is applied).
    pub async fn configure(&self, settings: LoopSettings) -> Result<LoopSettings, RunnerError> {
        self.configure_with(|_| settings).await
    }

    /// Derive new settings from the current ones, then validate, persist
    /// and apply them.
    ///
    /// Configuration changes are serialized: `update` sees the result of
    /// every earlier call, and the stored file always matches the applied
    /// settings.
    ///
    /// # Errors
    ///
    /// Same as [`Self::configure`].
    pub async fn configure_with<F>(&self, update: F) -> Result<LoopSettings, RunnerError>
    where
        F: FnOnce(LoopSettings) -> LoopSettings + Send,
    {
        let _config = self.config_gate.lock().await;
        let settings = update(self.settings());
        ThinkInterval::new(settings.think_interval)?;
        self.store.save(&settings).await?;

        self.state.send_modify(|s| {
            s.think_interval = settings.think_interval;
            s.prompt.clone_from(&settings.prompt);
            s.updated_at = Utc::now();
        });
        info!(
            agent_id = %self.id,
            think_interval = settings.think_interval,
            prompt_len = settings.prompt.len(),
            "loop settings updated"
        );
        Ok(settings)
    }

    // -----------------------------------------------------------------------
    // Tick machinery
    // -----------------------------------------------------------------------

    fn run_state(&self) -> MutexGuard<'_, RunState> {
        self.run.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_current(&self, epoch: u64) -> bool {
        let run = self.run_state();
        run.running && run.epoch == epoch
    }

    async fn run_ticks(self: Arc<Self>, epoch: u64) {
        while self.is_current(epoch) {
            let Some(record) = self.tick(Some(epoch)).await else {
                break;
            };
            if matches!(record.outcome, TickOutcome::DispatchFailed { .. }) && !self.error_backoff.is_zero() {
                tokio::time::sleep(self.error_backoff).await;
            }
            // Let the control API and other loops in.
            tokio::task::yield_now().await;
        }
        debug!(agent_id = %self.id, epoch, "agent loop task exited");
    }

    /// Run one tick. With `Some(epoch)`, the tick is skipped if that run has
    /// been superseded or stopped while waiting for the gate.
    async fn tick(&self, epoch: Option<u64>) -> Option<TickRecord> {
        let mut clock = self.clock.lock().await;
        if epoch.is_some_and(|e| !self.is_current(e)) {
            return None;
        }

        let settings = self.settings();
        // configure() rejects zero, so the fallback is unreachable in practice.
        clock.set_interval(ThinkInterval::new(settings.think_interval).unwrap_or_default());
        let tick = clock.tick();
        let mode = clock.mode();
        let started = Instant::now();
        self.begin_tick(mode);

        let (outcome, action) = match mode {
            TickMode::Continue => (self.advance_only().await, None),
            TickMode::Think => self.think(&settings.prompt).await,
        };

        let next = match clock.advance() {
            Ok(next) => Some(next),
            Err(e) => {
                error!(agent_id = %self.id, tick, error = %e, "tick counter exhausted, stopping");
                None
            }
        };
        drop(clock);

        let record = completed(tick, mode, outcome, action, started);
        if mode == TickMode::Think {
            info!(
                agent_id = %self.id,
                tick,
                mode = %mode,
                outcome = record.outcome.label(),
                action = ?record.action,
                latency_ms = record.latency_ms,
                "tick complete"
            );
        } else {
            debug!(agent_id = %self.id, tick, outcome = record.outcome.label(), "tick complete");
        }

        if next.is_none() {
            self.stop();
        }
        self.state.send_modify(|s| {
            if let Some(next) = next {
                s.tick = next;
            }
            if mode == TickMode::Think {
                s.action = record.action;
            }
            s.last_outcome = Some(record.outcome.clone());
            s.record(record.clone());
            s.updated_at = Utc::now();
        });
        Some(record)
    }

    fn begin_tick(&self, mode: TickMode) {
        self.state.send_modify(|s| {
            s.commentary.clear();
            s.mode = Some(mode);
            s.updated_at = Utc::now();
        });
    }

    async fn advance_only(&self) -> TickOutcome {
        match self.game.step(None).await {
            Ok(()) => TickOutcome::Continued,
            Err(e) => {
                warn!(agent_id = %self.id, error = %e, "bare step failed");
                TickOutcome::DispatchFailed { reason: e.to_string() }
            }
        }
    }

    async fn think(&self, directive: &str) -> (TickOutcome, Option<Action>) {
        let decision = match self.decide(directive).await {
            Ok(decision) => decision,
            Err(e) => {
                warn!(agent_id = %self.id, error = %e, "think failed, advancing without action");
                return (self.fall_back(e.to_string()).await, None);
            }
        };

        if decision.ignored_tool_calls > 0 {
            debug!(agent_id = %self.id, ignored = decision.ignored_tool_calls, "extra tool calls ignored");
        }
        if let Some(err) = decision.decode_error {
            return (self.fall_back(format!("decode failure: {err}")).await, None);
        }

        match decision.action {
            Some(action) => match self.game.step(Some(&action)).await {
                Ok(()) => (TickOutcome::Acted, Some(action)),
                Err(e) => {
                    warn!(agent_id = %self.id, %action, error = %e, "action dispatch failed");
                    (self.fall_back(format!("action dispatch failed: {e}")).await, None)
                }
            },
            None => match self.game.step(None).await {
                Ok(()) => (TickOutcome::Idled, None),
                Err(e) => {
                    warn!(agent_id = %self.id, error = %e, "bare step failed");
                    (TickOutcome::DispatchFailed { reason: e.to_string() }, None)
                }
            },
        }
    }

    async fn decide(&self, directive: &str) -> Result<Decision, RunnerError> {
        let observation = self.game.observe().await?;
        let prompt = self.prompts.render(&observation, directive)?;
        self.state.send_modify(|s| s.observation = Some(observation));

        let state = &self.state;
        let decision = self
            .policy
            .decide(&prompt, |fragment| state.send_modify(|s| s.commentary.push(fragment)))
            .await?;

        self.state.send_modify(|s| s.action = decision.action);
        Ok(decision)
    }

    /// Bare step after an abandoned think branch.
    async fn fall_back(&self, reason: String) -> TickOutcome {
        match self.game.step(None).await {
            Ok(()) => TickOutcome::FellBack { reason },
            Err(e) => {
                warn!(agent_id = %self.id, error = %e, "fallback step failed");
                TickOutcome::DispatchFailed { reason: e.to_string() }
            }
        }
    }
}

fn completed(
    tick: u64,
    mode: TickMode,
    outcome: TickOutcome,
    action: Option<Action>,
    started: Instant,
) -> TickRecord {
    TickRecord {
        tick,
        mode,
        outcome,
        action,
        tool_call: action.as_ref().map(codec::encode),
        latency_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        completed_at: Utc::now(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use lanepilot_types::{Entity, FragmentKind, Minion, Observation, Position, ToolCall};
    use serde_json::json;

    use super::*;
    use crate::llm::ChatChunk;
    use crate::policy::tests::ScriptedBackend;

    #[derive(Default)]
    struct FakeGame {
        /// `None` makes `observe` fail.
        observation: Option<Observation>,
        fail_step: AtomicBool,
        step_delay: Option<Duration>,
        steps: Mutex<Vec<Option<Action>>>,
        observes: AtomicUsize,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl FakeGame {
        fn with_observation() -> Self {
            Self {
                observation: Some(Observation {
                    position: Position::new(0.0, 0.0),
                    minions: vec![Minion {
                        entity: Entity(1),
                        position: Position::new(90.0, 0.0),
                        health: 50.0,
                    }],
                }),
                ..Self::default()
            }
        }

        fn steps(&self) -> Vec<Option<Action>> {
            self.steps.lock().unwrap().clone()
        }
    }

    impl GameApi for FakeGame {
        async fn observe(&self) -> Result<Observation, RunnerError> {
            self.observes.fetch_add(1, Ordering::SeqCst);
            self.observation
                .clone()
                .ok_or_else(|| RunnerError::Transport("observe refused".to_owned()))
        }

        async fn step(&self, action: Option<&Action>) -> Result<(), RunnerError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst).saturating_add(1);
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            if let Some(delay) = self.step_delay {
                tokio::time::sleep(delay).await;
            }
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            if self.fail_step.load(Ordering::SeqCst) {
                return Err(RunnerError::Transport("server down".to_owned()));
            }
            self.steps.lock().unwrap().push(action.copied());
            Ok(())
        }
    }

    type TestLoop = AgentLoop<FakeGame, ScriptedBackend>;

    fn build(game: FakeGame, backend: ScriptedBackend, interval: u64) -> Arc<TestLoop> {
        let defaults = LoopSettings {
            think_interval: interval,
            prompt: "attack range 100".to_owned(),
        };
        let agent = AgentLoop::new(
            game,
            PolicyClient::new(backend, Duration::from_secs(5)),
            PromptEngine::new().unwrap(),
            SettingsStore::ephemeral(),
            &defaults,
        )
        .unwrap()
        .with_error_backoff(Duration::ZERO);
        Arc::new(agent)
    }

    fn attack_script() -> ScriptedBackend {
        ScriptedBackend::replying(vec![
            ChatChunk::reasoning("minion 1 is 90 away, in range"),
            ChatChunk::tool_call(ToolCall::named("Attack").with_argument("entity", json!(1))),
        ])
    }

    async fn wait_until(mut condition: impl FnMut() -> bool) {
        for _ in 0..400 {
            if condition() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn think_tick_dispatches_the_chosen_attack() {
        let agent = build(FakeGame::with_observation(), attack_script(), 10);

        let record = agent.tick(None).await.unwrap();

        assert_eq!(record.tick, 0);
        assert_eq!(record.mode, TickMode::Think);
        assert_eq!(record.outcome, TickOutcome::Acted);
        assert_eq!(agent.game.steps(), vec![Some(Action::Attack(Entity(1)))]);

        let snap = agent.snapshot();
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.action, Some(Action::Attack(Entity(1))));
        assert!(snap.observation.is_some());
        assert_eq!(
            snap.commentary.text_of(FragmentKind::Reasoning),
            "minion 1 is 90 away, in range"
        );

        assert_eq!(
            record.tool_call,
            Some(ToolCall::named("Attack").with_argument("entity", json!(1)))
        );

        let observation_json = serde_json::to_string(&agent.game.observation).unwrap();
        let prompts = agent.policy.backend().prompts.lock().unwrap().clone();
        assert_eq!(prompts, vec![format!("{observation_json} attack range 100")]);
    }

    #[tokio::test]
    async fn policy_failure_degrades_to_one_bare_step() {
        let agent = build(
            FakeGame::with_observation(),
            ScriptedBackend::failing("connection refused"),
            10,
        );

        let record = agent.tick(None).await.unwrap();

        assert!(matches!(record.outcome, TickOutcome::FellBack { .. }));
        assert_eq!(agent.game.steps(), vec![None]);
        assert_eq!(agent.snapshot().tick, 1);
        assert_eq!(agent.snapshot().action, None);
    }

    #[tokio::test]
    async fn observe_failure_skips_the_policy() {
        let agent = build(FakeGame::default(), attack_script(), 10);

        let record = agent.tick(None).await.unwrap();

        assert!(matches!(record.outcome, TickOutcome::FellBack { reason } if reason.contains("observe")));
        assert_eq!(agent.policy.backend().call_count(), 0);
        assert_eq!(agent.game.steps(), vec![None]);
    }

    #[tokio::test]
    async fn undecodable_tool_call_degrades_to_bare_step() {
        let agent = build(
            FakeGame::with_observation(),
            ScriptedBackend::replying(vec![ChatChunk::tool_call(ToolCall::named("Attack"))]),
            10,
        );

        let record = agent.tick(None).await.unwrap();

        assert!(matches!(record.outcome, TickOutcome::FellBack { reason } if reason.contains("decode")));
        assert_eq!(agent.game.steps(), vec![None]);
    }

    #[tokio::test]
    async fn nothing_is_an_idle_tick() {
        let agent = build(
            FakeGame::with_observation(),
            ScriptedBackend::replying(vec![ChatChunk::tool_call(ToolCall::named("Nothing"))]),
            10,
        );

        let record = agent.tick(None).await.unwrap();

        assert_eq!(record.outcome, TickOutcome::Idled);
        assert_eq!(agent.game.steps(), vec![None]);
    }

    #[tokio::test]
    async fn only_multiples_of_the_interval_think() {
        let agent = build(FakeGame::with_observation(), attack_script(), 10);

        for _ in 0..20 {
            agent.tick(None).await.unwrap();
        }

        assert_eq!(agent.policy.backend().call_count(), 2);
        let modes: Vec<(u64, TickMode)> = agent
            .snapshot()
            .history
            .iter()
            .filter(|r| r.mode == TickMode::Think)
            .map(|r| (r.tick, r.mode))
            .collect();
        assert_eq!(modes, vec![(0, TickMode::Think), (10, TickMode::Think)]);
        assert_eq!(agent.game.steps().len(), 20);
    }

    #[tokio::test]
    async fn undeliverable_step_still_advances_the_counter() {
        let game = FakeGame::with_observation();
        game.fail_step.store(true, Ordering::SeqCst);
        let agent = build(game, attack_script(), 10);

        let record = agent.tick(None).await.unwrap();

        assert!(matches!(record.outcome, TickOutcome::DispatchFailed { .. }));
        assert_eq!(agent.snapshot().tick, 1);
    }

    #[tokio::test]
    async fn manual_continue_does_not_advance_the_counter() {
        let agent = build(FakeGame::with_observation(), attack_script(), 10);

        agent.dispatch_continue_only().await.unwrap();
        agent.dispatch_continue_only().await.unwrap();

        let snap = agent.snapshot();
        assert_eq!(snap.tick, 0);
        assert_eq!(snap.mode, Some(TickMode::Continue));
        assert_eq!(agent.game.steps(), vec![None, None]);
        assert_eq!(agent.policy.backend().call_count(), 0);
    }

    #[tokio::test]
    async fn manual_continue_reports_transport_failure() {
        let game = FakeGame::default();
        game.fail_step.store(true, Ordering::SeqCst);
        let agent = build(game, attack_script(), 10);

        let err = agent.dispatch_continue_only().await.unwrap_err();
        assert!(matches!(err, RunnerError::Transport(_)));
    }

    #[tokio::test]
    async fn configure_validates_before_applying() {
        let agent = build(FakeGame::with_observation(), attack_script(), 10);

        let rejected = agent
            .configure(LoopSettings {
                think_interval: 0,
                prompt: "x".to_owned(),
            })
            .await;
        assert!(matches!(rejected, Err(RunnerError::Config(_))));
        assert_eq!(agent.settings().think_interval, 10);

        agent
            .configure(LoopSettings {
                think_interval: 1,
                prompt: "kite".to_owned(),
            })
            .await
            .unwrap();
        assert_eq!(agent.settings().prompt, "kite");

        // Tick 0 thinks anyway; with interval 1, tick 1 thinks too.
        agent.tick(None).await.unwrap();
        let record = agent.tick(None).await.unwrap();
        assert_eq!(record.mode, TickMode::Think);
        assert_eq!(agent.policy.backend().call_count(), 2);
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_lets_the_tick_finish() {
        let backend = ScriptedBackend {
            delay: Some(Duration::from_millis(30)),
            ..attack_script()
        };
        let agent = build(FakeGame::with_observation(), backend, 1);

        assert!(agent.start());
        assert!(!agent.start());
        assert!(agent.is_running());

        // Stop while the first decision is in flight.
        wait_until(|| agent.policy.backend().call_count() >= 1).await;
        assert!(agent.stop());
        assert!(!agent.stop());

        // The in-flight tick still dispatches its action.
        wait_until(|| agent.snapshot().tick >= 1).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stopped_at = agent.snapshot().tick;
        assert_eq!(agent.game.steps().len(), usize::try_from(stopped_at).unwrap());
        assert_eq!(agent.game.steps().first(), Some(&Some(Action::Attack(Entity(1)))));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(agent.snapshot().tick, stopped_at, "no ticks after stop");
        assert!(!agent.snapshot().running);

        // Resume from the counter.
        assert!(agent.start());
        wait_until(|| agent.snapshot().tick > stopped_at).await;
        agent.stop();

        let history = agent.snapshot().history;
        let ticks: Vec<u64> = history.iter().map(|r| r.tick).collect();
        let expected: Vec<u64> = (0..).take(ticks.len()).collect();
        assert_eq!(ticks, expected, "ticks are contiguous across stop/start");
    }

    #[tokio::test]
    async fn loop_and_manual_continues_never_overlap() {
        let game = FakeGame {
            step_delay: Some(Duration::from_millis(5)),
            ..FakeGame::with_observation()
        };
        let agent = build(
            game,
            ScriptedBackend::replying(vec![ChatChunk::tool_call(ToolCall::named("Nothing"))]),
            1000,
        );

        assert!(agent.start());
        let manual = (0..5).map(|_| agent.dispatch_continue_only());
        let results = futures::future::join_all(manual).await;
        assert!(results.iter().all(Result::is_ok));

        wait_until(|| agent.snapshot().tick >= 5).await;
        agent.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(agent.game.max_in_flight.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_see_tick_progress() {
        let agent = build(FakeGame::with_observation(), attack_script(), 10);
        let mut rx = agent.subscribe();

        agent.tick(None).await.unwrap();

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.tick, 1);
        assert_eq!(snap.last_outcome, Some(TickOutcome::Acted));
    }

    #[tokio::test]
    async fn wait_idle_returns_after_the_in_flight_tick_dispatches() {
        let backend = ScriptedBackend {
            delay: Some(Duration::from_millis(50)),
            ..attack_script()
        };
        let agent = build(FakeGame::with_observation(), backend, 1);

        agent.start();
        wait_until(|| agent.policy.backend().call_count() >= 1).await;
        agent.stop();
        agent.wait_idle().await;

        assert_eq!(agent.game.steps(), vec![Some(Action::Attack(Entity(1)))]);
        assert_eq!(agent.snapshot().tick, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_backend_times_out_into_one_bare_step() {
        let backend = ScriptedBackend {
            delay: Some(Duration::from_secs(60)),
            ..attack_script()
        };
        let agent = build(FakeGame::with_observation(), backend, 10);

        let record = agent.tick(None).await.unwrap();

        assert!(matches!(
            &record.outcome,
            TickOutcome::FellBack { reason } if reason.contains("timeout")
        ));
        assert_eq!(record.action, None);
        assert_eq!(record.tool_call, None);
        assert_eq!(agent.game.steps(), vec![None]);
        assert_eq!(agent.snapshot().tick, 1);
    }

    #[tokio::test]
    async fn concurrent_partial_updates_are_not_lost() {
        let path = std::env::temp_dir().join(format!(
            "lanepilot_agent_configure_{}_{:?}.json",
            std::process::id(),
            std::thread::current().id(),
        ));
        let store = SettingsStore::new(&path);
        let defaults = LoopSettings {
            think_interval: 10,
            prompt: "attack range 100".to_owned(),
        };
        let agent = AgentLoop::new(
            FakeGame::with_observation(),
            PolicyClient::new(attack_script(), Duration::from_secs(5)),
            PromptEngine::new().unwrap(),
            store.clone(),
            &defaults,
        )
        .unwrap();

        let interval = agent.configure_with(|current| LoopSettings {
            think_interval: 4,
            ..current
        });
        let prompt = agent.configure_with(|current| LoopSettings {
            prompt: "push the wave".to_owned(),
            ..current
        });
        let (a, b) = tokio::join!(interval, prompt);
        a.unwrap();
        b.unwrap();

        let settings = agent.settings();
        assert_eq!(settings.think_interval, 4);
        assert_eq!(settings.prompt, "push the wave");
        assert_eq!(store.load(&defaults), settings, "stored file matches applied settings");

        std::fs::remove_file(&path).ok();
    }
}
