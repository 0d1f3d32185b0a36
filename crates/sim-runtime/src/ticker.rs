//! Drives a [`Game`] from a tokio interval and publishes snapshots.
//!
//! The game is owned by a single task: ticks and player actions are
//! serialized through one `select!` loop, so there is never concurrent
//! access to simulation state.

use crate::clock::TimeSource;
use crate::game::{Action, Game, GameSnapshot};
use sim_core::{GameError, GameResult};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Time source on the tokio clock, so paused test runtimes control it.
#[derive(Clone, Debug)]
pub struct TokioTimeSource {
    origin: Instant,
}

impl TokioTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for TokioTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for TokioTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Channels to a running game.
pub struct TickerHandle {
    /// Latest snapshot, replaced after every tick or action.
    pub snapshots: watch::Receiver<GameSnapshot>,
    /// Player intents. Dropping every sender stops the loop.
    pub actions: mpsc::Sender<Action>,
    /// Rejected intents.
    pub errors: mpsc::UnboundedReceiver<GameError>,
    /// Resolves with the final result, or `None` if stopped early.
    pub task: JoinHandle<Option<GameResult>>,
}

/// Spawn the game loop, ticking every `period` until game over.
pub fn spawn(mut game: Game, period: Duration) -> TickerHandle {
    let (snap_tx, snap_rx) = watch::channel(game.snapshot());
    let (action_tx, mut action_rx) = mpsc::channel::<Action>(64);
    let (err_tx, err_rx) = mpsc::unbounded_channel();

    let task = tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = period.as_millis() as u64, "ticker started");
        loop {
            tokio::select! {
                _ = interval.tick() => game.advance_tick(),
                action = action_rx.recv() => match action {
                    Some(action) => {
                        if let Err(e) = game.dispatch(action) {
                            warn!(error = %e, "action rejected");
                            let _ = err_tx.send(e);
                        }
                    }
                    None => {
                        debug!("action channel closed");
                        break;
                    }
                },
            }
            snap_tx.send_replace(game.snapshot());
            if game.is_game_over() {
                break;
            }
        }
        info!(finished = game.is_game_over(), "ticker stopped");
        game.result()
    });

    TickerHandle {
        snapshots: snap_rx,
        actions: action_tx,
        errors: err_rx,
        task,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use sim_core::{EventCadence, FixedAsset, GameConfig, Outcome};
    use sim_econ::ScriptedRandom;

    fn d(v: i64) -> Decimal {
        Decimal::new(v, 0)
    }

    fn game() -> Game {
        let cfg = GameConfig {
            starting_cash: d(100_000),
            real_ms_per_year: 1_200,
            monthly_income: Decimal::ZERO,
            monthly_expenses: Decimal::ZERO,
            events: EventCadence::disabled(),
            ..GameConfig::default()
        };
        Game::new(cfg, TokioTimeSource::new(), ScriptedRandom::neutral()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn runs_until_game_over() {
        let handle = spawn(game(), Duration::from_millis(100));
        let result = handle.task.await.unwrap().expect("finished");
        assert_eq!(result.player_score, d(100_000));
        assert_eq!(result.outcome, Outcome::Loss);
        let last = handle.snapshots.borrow().clone();
        assert!(last.game_over);
        assert_eq!(last.year, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn actions_apply_and_rejections_surface() {
        let mut handle = spawn(game(), Duration::from_millis(100));
        handle
            .actions
            .send(Action::Invest {
                asset: FixedAsset::Savings,
                amount: d(50_000),
            })
            .await
            .unwrap();
        handle.actions.send(Action::PayExpenseWithCash).await.unwrap();
        assert_eq!(handle.errors.recv().await, Some(GameError::NoPendingEvent));
        assert_eq!(handle.snapshots.borrow().cash, d(50_000));
    }

    #[tokio::test(start_paused = true)]
    async fn paused_game_holds_its_date() {
        let handle = spawn(game(), Duration::from_millis(50));
        handle.actions.send(Action::SetPaused(true)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        let at = handle.snapshots.borrow().elapsed_ms;
        tokio::time::sleep(Duration::from_secs(5)).await;
        let snap = handle.snapshots.borrow().clone();
        assert!(snap.paused);
        assert_eq!(snap.elapsed_ms, at);
        assert!(!snap.game_over);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_the_sender_stops_the_loop() {
        let TickerHandle { actions, task, .. } = spawn(game(), Duration::from_millis(100));
        drop(actions);
        assert_eq!(task.await.unwrap(), None);
    }
}
