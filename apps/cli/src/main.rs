#![deny(warnings)]

//! Headless driver: plays a full game with a simple allocation strategy and
//! prints the final result as JSON.

use anyhow::{bail, Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sim_core::{
    AssetId, Difficulty, EventKind, FixedAsset, GameConfig, GameEvent, GameResult, InstrumentKind,
};
use sim_runtime::{Action, Game, GameSnapshot, ManualTimeSource, TokioTimeSource};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

struct Args {
    config: Option<String>,
    difficulty: Option<Difficulty>,
    seed: Option<u64>,
    tick_ms: u64,
    realtime: bool,
}

fn parse_args() -> Result<Args> {
    let mut args = Args {
        config: None,
        difficulty: None,
        seed: None,
        tick_ms: 100,
        realtime: false,
    };
    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--config" => args.config = it.next(),
            "--difficulty" => {
                let v = it.next().context("--difficulty needs a value")?;
                args.difficulty = Some(v.parse()?);
            }
            "--seed" => args.seed = it.next().and_then(|s| s.parse().ok()),
            "--tick-ms" => {
                args.tick_ms = it
                    .next()
                    .and_then(|s| s.parse().ok())
                    .context("--tick-ms needs a number")?
            }
            "--realtime" => args.realtime = true,
            "--version" => {
                println!("investor-cli {} ({})", env!("CARGO_PKG_VERSION"), env!("GIT_SHA"));
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    if args.tick_ms == 0 {
        bail!("--tick-ms must be positive");
    }
    Ok(args)
}

fn load_config(args: &Args) -> Result<GameConfig> {
    let mut cfg = match &args.config {
        Some(path) => {
            let text =
                std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?;
            GameConfig::from_yaml_str(&text).with_context(|| format!("parsing {path}"))?
        }
        None => GameConfig::for_difficulty(args.difficulty.unwrap_or_default()),
    };
    if let Some(seed) = args.seed {
        cfg.rng_seed = seed;
    }
    Ok(cfg)
}

/// Allocates spare cash once per simulated month and resolves events as
/// they arrive.
struct Planner {
    reserve: Decimal,
    last_period: Option<u32>,
    handled_event: Option<u64>,
}

impl Planner {
    fn new(cfg: &GameConfig) -> Self {
        Self {
            // six months of expenses stay liquid
            reserve: cfg.monthly_expenses * Decimal::from(6),
            last_period: None,
            handled_event: None,
        }
    }

    fn next(&mut self, snap: &GameSnapshot) -> Vec<Action> {
        if snap.game_over {
            return Vec::new();
        }
        if let Some(event) = &snap.pending_event {
            if self.handled_event == Some(event.id) {
                return Vec::new();
            }
            self.handled_event = Some(event.id);
            return resolve(snap, event);
        }
        let period = snap.year * 12 + snap.month;
        if self.last_period == Some(period) {
            return Vec::new();
        }
        self.last_period = Some(period);
        allocate(snap, self.reserve)
    }
}

fn resolve(snap: &GameSnapshot, event: &GameEvent) -> Vec<Action> {
    if event.kind == EventKind::Income {
        return vec![Action::AcknowledgeIncome];
    }
    let shortfall = event.cost - snap.cash.max(Decimal::ZERO);
    if shortfall <= Decimal::ZERO {
        return vec![Action::PayExpenseWithCash];
    }
    let mut actions = Vec::new();
    let largest = snap
        .positions
        .iter()
        .filter(|p| p.total > Decimal::ZERO)
        .max_by_key(|p| p.total);
    if let Some(p) = largest {
        let amount = shortfall.min(p.total);
        actions.push(Action::PayExpenseBySelling {
            asset: AssetId::Fixed(p.asset),
            amount,
        });
        if amount >= shortfall {
            return actions;
        }
    }
    // whatever selling could not cover becomes debt
    actions.push(Action::PayExpenseWithCash);
    actions
}

/// Half of the spare cash to the index fund, a quarter to deposits and the
/// rest into the cheapest stock.
fn allocate(snap: &GameSnapshot, reserve: Decimal) -> Vec<Action> {
    let spare = snap.cash - reserve;
    if spare < Decimal::ONE_HUNDRED {
        return Vec::new();
    }
    let half = (spare / Decimal::from(2)).round_dp(2);
    let quarter = (spare / Decimal::from(4)).round_dp(2);
    let mut actions = vec![
        Action::Invest {
            asset: FixedAsset::IndexFund,
            amount: half,
        },
        Action::Invest {
            asset: FixedAsset::FixedDeposit,
            amount: quarter,
        },
    ];
    let cheapest = snap
        .instruments
        .iter()
        .filter(|i| i.kind == InstrumentKind::Stock)
        .min_by_key(|i| i.price);
    if let Some(stock) = cheapest {
        let units = (quarter / stock.price).floor().to_u64().unwrap_or(0);
        if units > 0 {
            actions.push(Action::Buy {
                symbol: stock.symbol.clone(),
                quantity: units,
            });
        }
    }
    actions
}

/// Simulated clock: runs as fast as the machine allows.
fn run_headless(cfg: GameConfig, tick: Duration) -> Result<GameResult> {
    let mut planner = Planner::new(&cfg);
    let time = ManualTimeSource::new();
    let mut game = Game::seeded(cfg, time.clone())?;
    let mut ticks = 0u64;
    while !game.is_game_over() {
        for action in planner.next(&game.snapshot()) {
            if let Err(e) = game.dispatch(action) {
                warn!(error = %e, "action rejected");
            }
        }
        if game.pending_event().is_some() {
            // never leave the clock held by an event the planner could not settle
            let _ = game
                .pay_expense_with_cash()
                .or_else(|_| game.acknowledge_income());
        }
        time.advance(tick);
        game.advance_tick();
        ticks += 1;
    }
    info!(ticks, "game finished");
    game.result().context("game ended without a result")
}

/// Wall clock through the async ticker.
async fn run_realtime(cfg: GameConfig, tick: Duration) -> Result<GameResult> {
    let mut planner = Planner::new(&cfg);
    let game = Game::seeded(cfg, TokioTimeSource::new())?;
    let mut handle = sim_runtime::spawn(game, tick);
    let mut last_year = 0;
    loop {
        tokio::select! {
            changed = handle.snapshots.changed() => {
                if changed.is_err() {
                    break;
                }
                let snap = handle.snapshots.borrow_and_update().clone();
                if snap.year != last_year {
                    last_year = snap.year;
                    info!(year = snap.year, net_worth = %snap.net_worth, ai = %snap.ai_net_worth, "year");
                }
                if snap.game_over {
                    break;
                }
                for action in planner.next(&snap) {
                    handle.actions.send(action).await?;
                }
            }
            Some(e) = handle.errors.recv() => debug!(error = %e, "action rejected"),
        }
    }
    handle.task.await?.context("game ended without a result")
}

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let args = parse_args()?;
    let cfg = load_config(&args)?;
    let tick = Duration::from_millis(args.tick_ms);
    info!(
        difficulty = %cfg.difficulty,
        seed = cfg.rng_seed,
        realtime = args.realtime,
        build = env!("GIT_SHA"),
        "starting game"
    );

    let result = if args.realtime {
        tokio::runtime::Runtime::new()?.block_on(run_realtime(cfg, tick))?
    } else {
        run_headless(cfg, tick)?
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
