//! Game controller: owns all simulation state and exposes the action and
//! snapshot surface used by the presentation layer.
//!
//! State lives as resources in a `bevy_ecs` [`World`]. Each tick runs one
//! chained schedule, so year-boundary rate updates and price moves always
//! happen before event generation and net-worth recomputation.

use crate::clock::{Clock, TimeSource};
use crate::events::{EventGenerator, PendingEvent};
use crate::ledger::Ledger;
use crate::settlement::{self, Settlement};
use bevy_ecs::prelude::*;
use bevy_ecs::schedule::ExecutorKind;
use chrono::Utc;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sim_ai::Competitor;
use sim_core::{
    validate_config, AssetId, ConfigError, Difficulty, EventKind, FixedAsset, GameConfig,
    GameError, GameEvent, GameResult, InstrumentKind, Symbol,
};
use sim_econ::{Market, RandomSource, SeededRandom};
use std::ops::Range;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Rates and quotes.
#[derive(Resource)]
pub struct MarketState(pub Market);

/// The AI baseline.
#[derive(Resource)]
pub struct CompetitorState(pub Competitor);

/// Random source shared by every stochastic system.
#[derive(Resource)]
pub struct Rng(pub Box<dyn RandomSource>);

/// Boundaries crossed and simulated time covered by the current tick.
#[derive(Resource, Clone, Debug, Default)]
pub struct TickWindow {
    pub years: Range<u32>,
    pub months: Range<u32>,
    pub dt_years: f64,
}

/// Game-level bookkeeping.
#[derive(Resource, Clone, Debug)]
pub struct Status {
    pub difficulty: Difficulty,
    pub net_worth: Decimal,
    pub monthly_net_income: Decimal,
    pub user_paused: bool,
    pub game_over: bool,
    pub result: Option<GameResult>,
}

/// Coarse game state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GamePhase {
    Running,
    Paused,
    EventPending,
    GameOver,
}

/// Intents accepted from the presentation layer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum Action {
    /// Start a fresh game; accepted even after game over.
    Initialize(Box<GameConfig>),
    AdvanceTick,
    Invest { asset: FixedAsset, amount: Decimal },
    Withdraw { asset: FixedAsset, amount: Decimal },
    Buy { symbol: Symbol, quantity: u64 },
    Sell { symbol: Symbol, quantity: u64 },
    AcknowledgeIncome,
    PayExpenseWithCash,
    PayExpenseBySelling { asset: AssetId, amount: Decimal },
    SetPaused(bool),
    RecomputeNetWorth,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PositionView {
    pub asset: FixedAsset,
    pub principal: Decimal,
    pub profit: Decimal,
    pub total: Decimal,
    /// Current annual rate in percent.
    pub rate: Decimal,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentView {
    pub symbol: Symbol,
    pub name: String,
    pub kind: InstrumentKind,
    pub price: Decimal,
    pub change_24h: Decimal,
    pub quantity: u64,
    pub avg_cost: Option<Decimal>,
    pub profit: Decimal,
}

/// Read-only view of the whole game for rendering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub elapsed_ms: u64,
    pub year: u32,
    pub month: u32,
    pub phase: GamePhase,
    pub cash: Decimal,
    pub net_worth: Decimal,
    pub ai_net_worth: Decimal,
    pub monthly_net_income: Decimal,
    pub positions: Vec<PositionView>,
    pub instruments: Vec<InstrumentView>,
    pub pending_event: Option<GameEvent>,
    pub paused: bool,
    pub game_over: bool,
    pub result: Option<GameResult>,
}

fn year_boundary_system(
    window: Res<TickWindow>,
    mut ledger: ResMut<Ledger>,
    mut market: ResMut<MarketState>,
    mut rng: ResMut<Rng>,
) {
    for year in window.years.clone() {
        // accrue at the rate that held during the finished year, then move it
        let accrued = ledger.accrue_year(&market.0);
        if let Err(e) = market.0.perturb_rates(&mut *rng.0) {
            warn!(year, error = %e, "rate perturbation failed");
        }
        info!(year, %accrued, "year closed");
    }
}

fn month_boundary_system(
    window: Res<TickWindow>,
    status: Res<Status>,
    mut ledger: ResMut<Ledger>,
    mut market: ResMut<MarketState>,
    mut competitor: ResMut<CompetitorState>,
    mut rng: ResMut<Rng>,
) {
    for month in window.months.clone() {
        ledger.adjust_cash(status.monthly_net_income);
        competitor.0.step_month(&mut *rng.0);
        debug!(month, change = market.0.mean_change_pct(), "month closed");
        market.0.roll_reference_prices();
    }
}

fn price_system(window: Res<TickWindow>, mut market: ResMut<MarketState>, mut rng: ResMut<Rng>) {
    if let Err(e) = market.0.step_prices(window.dt_years, &mut *rng.0) {
        warn!(error = %e, "price step failed");
    }
}

fn event_system(
    window: Res<TickWindow>,
    clock: Res<Clock>,
    mut generator: ResMut<EventGenerator>,
    mut pending: ResMut<PendingEvent>,
    mut ledger: ResMut<Ledger>,
    mut rng: ResMut<Rng>,
) {
    if pending.is_pending() || clock.is_finished() {
        return;
    }
    for _ in window.months.clone() {
        if let Some(event) = generator.on_month(&mut *rng.0) {
            open_event(&mut ledger, &mut pending, event);
            break;
        }
    }
}

fn net_worth_system(ledger: Res<Ledger>, market: Res<MarketState>, mut status: ResMut<Status>) {
    status.net_worth = ledger.net_worth(&market.0);
}

fn game_over_system(clock: Res<Clock>, competitor: Res<CompetitorState>, mut status: ResMut<Status>) {
    if status.game_over || !clock.is_finished() {
        return;
    }
    let ai = competitor.0.net_worth();
    let result = GameResult {
        player_score: status.net_worth,
        ai_score: ai,
        outcome: competitor.0.judge(status.net_worth),
        difficulty: status.difficulty,
        timestamp: Utc::now(),
    };
    info!(player = %result.player_score, ai = %ai, outcome = ?result.outcome, "game over");
    status.game_over = true;
    status.result = Some(result);
}

/// Make `event` outstanding; income is credited right away.
fn open_event(ledger: &mut Ledger, pending: &mut PendingEvent, event: GameEvent) {
    if event.kind == EventKind::Income {
        ledger.adjust_cash(event.cost);
    }
    info!(id = event.id, kind = ?event.kind, title = %event.title, cost = %event.cost, "event");
    pending.0 = Some(event);
}

fn tick_schedule() -> Schedule {
    let mut schedule = Schedule::default();
    schedule.set_executor_kind(ExecutorKind::SingleThreaded);
    schedule.add_systems(
        (
            year_boundary_system,
            month_boundary_system,
            price_system,
            event_system,
            net_worth_system,
            game_over_system,
        )
            .chain(),
    );
    schedule
}

fn build_world(cfg: &GameConfig, rng: Box<dyn RandomSource>, now: Duration) -> World {
    let mut clock = Clock::new(Duration::from_millis(cfg.real_ms_per_year), cfg.years);
    clock.start(now);
    let market = Market::from_config(cfg);
    let ledger = Ledger::new(cfg.starting_cash);
    let net_worth = ledger.net_worth(&market);

    let mut world = World::new();
    world.insert_resource(clock);
    world.insert_resource(ledger);
    world.insert_resource(MarketState(market));
    world.insert_resource(CompetitorState(Competitor::new(
        cfg.starting_cash,
        &cfg.competitor,
    )));
    world.insert_resource(EventGenerator::from_config(cfg));
    world.insert_resource(PendingEvent::default());
    world.insert_resource(Rng(rng));
    world.insert_resource(TickWindow::default());
    world.insert_resource(Status {
        difficulty: cfg.difficulty,
        net_worth,
        monthly_net_income: cfg.monthly_income - cfg.monthly_expenses,
        user_paused: false,
        game_over: false,
        result: None,
    });
    world
}

/// Builds the random source for a freshly (re)initialized game.
type RngFactory = Box<dyn Fn(&GameConfig) -> Box<dyn RandomSource> + Send + Sync>;

/// Single owner of the simulation.
pub struct Game {
    world: World,
    schedule: Schedule,
    time: Box<dyn TimeSource>,
    rng: RngFactory,
    config: GameConfig,
}

impl Game {
    /// New game with an explicit random source. Re-initializing starts again
    /// from a copy of `rng` as given here.
    pub fn new<T, R>(config: GameConfig, time: T, rng: R) -> Result<Self, ConfigError>
    where
        T: TimeSource + 'static,
        R: RandomSource + Clone + 'static,
    {
        let factory: RngFactory =
            Box::new(move |_: &GameConfig| -> Box<dyn RandomSource> { Box::new(rng.clone()) });
        Self::with_factory(config, Box::new(time), factory)
    }

    /// New game seeded from `config.rng_seed`; re-initializing reseeds from
    /// the new configuration.
    pub fn seeded<T: TimeSource + 'static>(config: GameConfig, time: T) -> Result<Self, ConfigError> {
        let factory: RngFactory = Box::new(|cfg: &GameConfig| -> Box<dyn RandomSource> {
            Box::new(SeededRandom::new(cfg.rng_seed))
        });
        Self::with_factory(config, Box::new(time), factory)
    }

    fn with_factory(
        config: GameConfig,
        time: Box<dyn TimeSource>,
        rng: RngFactory,
    ) -> Result<Self, ConfigError> {
        validate_config(&config)?;
        let world = build_world(&config, rng(&config), time.now());
        info!(difficulty = %config.difficulty, cash = %config.starting_cash, "game initialized");
        Ok(Self {
            world,
            schedule: tick_schedule(),
            time,
            rng,
            config,
        })
    }

    /// Restart with a new configuration, keeping the time source and the
    /// random-source strategy.
    pub fn initialize(&mut self, config: GameConfig) -> Result<(), ConfigError> {
        validate_config(&config)?;
        let rng = (self.rng)(&config);
        self.world = build_world(&config, rng, self.time.now());
        self.config = config;
        info!(difficulty = %self.config.difficulty, "game re-initialized");
        Ok(())
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Bank the real time since the last call and apply it one month boundary
    /// at a time, running the tick pipeline for each step. Processing stops
    /// at the boundary that opens an event (or ends the game) and the time
    /// past it is dropped. A no-op once the game is over.
    pub fn advance_tick(&mut self) {
        if self.is_game_over() {
            return;
        }
        let now = self.time.now();
        self.world.resource_mut::<Clock>().advance(now);
        loop {
            let held = self.world.resource::<PendingEvent>().is_pending();
            let window = {
                let mut clock = self.world.resource_mut::<Clock>();
                if held {
                    clock.discard_pending();
                }
                let gap = clock.until_next_month();
                let moved = clock.step(gap);
                TickWindow {
                    years: clock.take_year_crossings(),
                    months: clock.take_month_crossings(),
                    dt_years: clock.to_years(moved),
                }
            };
            self.world.insert_resource(window);
            self.schedule.run(&mut self.world);
            if self.pending_event().is_some() || self.is_game_over() {
                let dropped = self.world.resource_mut::<Clock>().discard_pending();
                if !dropped.is_zero() {
                    debug!(dropped_ms = dropped.as_millis() as u64, "tick cut short");
                }
                break;
            }
            if self.world.resource::<Clock>().pending().is_zero() {
                break;
            }
        }
        self.sync_pause(now);
    }

    pub fn invest(&mut self, asset: FixedAsset, amount: Decimal) -> Result<(), GameError> {
        if self.is_game_over() {
            return Ok(());
        }
        self.world.resource_mut::<Ledger>().invest(asset, amount)?;
        self.recompute_net_worth();
        Ok(())
    }

    pub fn withdraw(&mut self, asset: FixedAsset, amount: Decimal) -> Result<(), GameError> {
        if self.is_game_over() {
            return Ok(());
        }
        self.world.resource_mut::<Ledger>().withdraw(asset, amount)?;
        self.recompute_net_worth();
        Ok(())
    }

    pub fn buy(&mut self, symbol: &Symbol, quantity: u64) -> Result<(), GameError> {
        if self.is_game_over() {
            return Ok(());
        }
        self.world.resource_scope(|world, mut ledger: Mut<Ledger>| {
            let market = &world.resource::<MarketState>().0;
            ledger.buy(market, symbol, quantity)
        })?;
        self.recompute_net_worth();
        Ok(())
    }

    pub fn sell(&mut self, symbol: &Symbol, quantity: u64) -> Result<(), GameError> {
        if self.is_game_over() {
            return Ok(());
        }
        self.world.resource_scope(|world, mut ledger: Mut<Ledger>| {
            let market = &world.resource::<MarketState>().0;
            ledger.sell(market, symbol, quantity)
        })?;
        self.recompute_net_worth();
        Ok(())
    }

    pub fn acknowledge_income(&mut self) -> Result<(), GameError> {
        if self.is_game_over() {
            return Ok(());
        }
        settlement::acknowledge_income(&mut self.world.resource_mut::<PendingEvent>())?;
        self.after_settlement();
        Ok(())
    }

    pub fn pay_expense_with_cash(&mut self) -> Result<(), GameError> {
        if self.is_game_over() {
            return Ok(());
        }
        self.world.resource_scope(|world, mut ledger: Mut<Ledger>| {
            let mut pending = world.resource_mut::<PendingEvent>();
            settlement::pay_with_cash(&mut ledger, &mut pending)
        })?;
        self.after_settlement();
        Ok(())
    }

    /// Liquidate part of an asset toward the outstanding expense.
    pub fn pay_expense_by_selling(
        &mut self,
        asset: &AssetId,
        amount: Decimal,
    ) -> Result<Option<Settlement>, GameError> {
        if self.is_game_over() {
            return Ok(None);
        }
        let outcome = self.world.resource_scope(|world, mut pending: Mut<PendingEvent>| {
            world.resource_scope(|world, mut ledger: Mut<Ledger>| {
                let market = &world.resource::<MarketState>().0;
                settlement::sell_and_pay(&mut ledger, market, &mut pending, asset, amount)
            })
        })?;
        self.after_settlement();
        Ok(Some(outcome))
    }

    /// Player pause toggle. An outstanding event keeps the clock stopped
    /// regardless.
    pub fn set_paused(&mut self, paused: bool) {
        if self.is_game_over() {
            return;
        }
        self.world.resource_mut::<Status>().user_paused = paused;
        let now = self.time.now();
        self.sync_pause(now);
    }

    pub fn recompute_net_worth(&mut self) {
        self.world.resource_scope(|world, mut status: Mut<Status>| {
            let ledger = world.resource::<Ledger>();
            let market = &world.resource::<MarketState>().0;
            status.net_worth = ledger.net_worth(market);
        });
    }

    /// Put an event in front of the player outside the random schedule.
    /// Ignored while another event is outstanding or after game over.
    pub fn trigger_event(
        &mut self,
        kind: EventKind,
        title: &str,
        description: &str,
        cost: Decimal,
    ) -> Result<(), GameError> {
        if self.is_game_over() || self.pending_event().is_some() {
            return Ok(());
        }
        if cost <= Decimal::ZERO {
            return Err(GameError::InvalidAmount(cost));
        }
        // apply the time banked so far; the event opens at the present instant
        self.advance_tick();
        if self.is_game_over() || self.pending_event().is_some() {
            return Ok(());
        }
        let id = self.world.resource_mut::<EventGenerator>().next_id();
        let event = GameEvent {
            id,
            kind,
            title: title.to_string(),
            description: description.to_string(),
            cost,
        };
        self.world.resource_scope(|world, mut ledger: Mut<Ledger>| {
            let mut pending = world.resource_mut::<PendingEvent>();
            open_event(&mut ledger, &mut pending, event);
        });
        let now = self.time.now();
        self.sync_pause(now);
        self.recompute_net_worth();
        Ok(())
    }

    /// Override an instrument price (scenarios and tests).
    pub fn set_price(&mut self, symbol: &Symbol, price: Decimal) -> Result<(), GameError> {
        self.world
            .resource_mut::<MarketState>()
            .0
            .set_price(symbol, price)
            .map_err(|_| GameError::InvalidSymbol(symbol.clone()))?;
        self.recompute_net_worth();
        Ok(())
    }

    /// Apply an intent. `AdvanceTick` and the other state-changing intents
    /// are silently ignored after game over.
    pub fn dispatch(&mut self, action: Action) -> Result<(), GameError> {
        debug!(?action, "dispatch");
        match action {
            Action::Initialize(cfg) => self
                .initialize(*cfg)
                .map_err(|e| GameError::InvalidConfig(e.to_string())),
            Action::AdvanceTick => {
                self.advance_tick();
                Ok(())
            }
            Action::Invest { asset, amount } => self.invest(asset, amount),
            Action::Withdraw { asset, amount } => self.withdraw(asset, amount),
            Action::Buy { symbol, quantity } => self.buy(&symbol, quantity),
            Action::Sell { symbol, quantity } => self.sell(&symbol, quantity),
            Action::AcknowledgeIncome => self.acknowledge_income(),
            Action::PayExpenseWithCash => self.pay_expense_with_cash(),
            Action::PayExpenseBySelling { asset, amount } => {
                self.pay_expense_by_selling(&asset, amount).map(|_| ())
            }
            Action::SetPaused(p) => {
                self.set_paused(p);
                Ok(())
            }
            Action::RecomputeNetWorth => {
                self.recompute_net_worth();
                Ok(())
            }
        }
    }

    fn after_settlement(&mut self) {
        let now = self.time.now();
        self.sync_pause(now);
        self.recompute_net_worth();
    }

    /// Clock runs only when neither the player nor an event holds it.
    fn sync_pause(&mut self, now: Duration) {
        let hold = self.world.resource::<Status>().user_paused
            || self.world.resource::<PendingEvent>().is_pending();
        let mut clock = self.world.resource_mut::<Clock>();
        if hold {
            clock.pause(now);
        } else {
            clock.resume(now);
        }
    }

    pub fn is_game_over(&self) -> bool {
        self.world.resource::<Status>().game_over
    }

    pub fn result(&self) -> Option<GameResult> {
        self.world.resource::<Status>().result.clone()
    }

    pub fn cash(&self) -> Decimal {
        self.world.resource::<Ledger>().cash()
    }

    /// Net worth as of the last recomputation.
    pub fn net_worth(&self) -> Decimal {
        self.world.resource::<Status>().net_worth
    }

    pub fn ai_net_worth(&self) -> Decimal {
        self.world.resource::<CompetitorState>().0.net_worth()
    }

    pub fn ledger(&self) -> &Ledger {
        self.world.resource::<Ledger>()
    }

    pub fn market(&self) -> &Market {
        &self.world.resource::<MarketState>().0
    }

    pub fn clock(&self) -> &Clock {
        self.world.resource::<Clock>()
    }

    pub fn pending_event(&self) -> Option<&GameEvent> {
        self.world.resource::<PendingEvent>().0.as_ref()
    }

    pub fn phase(&self) -> GamePhase {
        let status = self.world.resource::<Status>();
        if status.game_over {
            GamePhase::GameOver
        } else if self.pending_event().is_some() {
            GamePhase::EventPending
        } else if status.user_paused {
            GamePhase::Paused
        } else {
            GamePhase::Running
        }
    }

    pub fn snapshot(&self) -> GameSnapshot {
        let clock = self.clock();
        let ledger = self.ledger();
        let market = self.market();
        let status = self.world.resource::<Status>();
        let positions = FixedAsset::ALL
            .iter()
            .map(|&asset| {
                let p = ledger.position(asset);
                PositionView {
                    asset,
                    principal: p.principal,
                    profit: p.profit,
                    total: p.total(),
                    rate: market.rate(asset),
                }
            })
            .collect();
        let instruments = market
            .quotes()
            .map(|q| {
                let holding = ledger.holding(q.symbol());
                InstrumentView {
                    symbol: q.symbol().clone(),
                    name: q.spec.name.clone(),
                    kind: q.kind(),
                    price: q.price,
                    change_24h: q.change_24h(),
                    quantity: holding.map_or(0, |h| h.quantity),
                    avg_cost: holding.map(|h| h.avg_cost),
                    profit: ledger.holding_profit(market, q.symbol()),
                }
            })
            .collect();
        GameSnapshot {
            elapsed_ms: clock.elapsed().as_millis() as u64,
            year: clock.year(),
            month: clock.month(),
            phase: self.phase(),
            cash: ledger.cash(),
            net_worth: status.net_worth,
            ai_net_worth: self.ai_net_worth(),
            monthly_net_income: status.monthly_net_income,
            positions,
            instruments,
            pending_event: self.pending_event().cloned(),
            paused: clock.is_paused(),
            game_over: status.game_over,
            result: status.result.clone(),
        }
    }
}
