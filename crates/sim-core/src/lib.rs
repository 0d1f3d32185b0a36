#![deny(warnings)]

//! Core domain models and invariants for Decade Investor.
//!
//! This crate defines the serializable types shared by the simulation crates:
//! asset identifiers, game events, configuration and results, plus the error
//! taxonomy reported back to the presentation layer.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Fixed-rate asset classes: principal plus accrued profit at an annual rate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FixedAsset {
    /// Bank savings account.
    Savings,
    /// Term deposit.
    FixedDeposit,
    /// Broad-market index fund.
    IndexFund,
    /// Physical or paper gold.
    Gold,
}

impl FixedAsset {
    /// Every fixed-rate class in display order.
    pub const ALL: [FixedAsset; 4] = [
        FixedAsset::Savings,
        FixedAsset::FixedDeposit,
        FixedAsset::IndexFund,
        FixedAsset::Gold,
    ];

    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            FixedAsset::Savings => "Savings",
            FixedAsset::FixedDeposit => "Fixed Deposit",
            FixedAsset::IndexFund => "Index Fund",
            FixedAsset::Gold => "Gold",
        }
    }
}

impl fmt::Display for FixedAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for FixedAsset {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace(['-', '_', ' '], "").as_str() {
            "savings" => Ok(FixedAsset::Savings),
            "fixeddeposit" | "fd" => Ok(FixedAsset::FixedDeposit),
            "indexfund" | "index" => Ok(FixedAsset::IndexFund),
            "gold" => Ok(FixedAsset::Gold),
            _ => Err(GameError::InvalidAsset(s.to_string())),
        }
    }
}

/// Ticker symbol of a priced instrument, e.g. "BTC".
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(pub String);

impl Symbol {
    pub fn new(s: impl Into<String>) -> Self {
        Symbol(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Symbol {
    fn from(s: &str) -> Self {
        Symbol(s.to_string())
    }
}

/// Market category of a priced instrument.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentKind {
    Stock,
    Crypto,
    RealEstate,
}

/// Identifier of anything the player can hold.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AssetId {
    /// A fixed-rate class.
    Fixed(FixedAsset),
    /// A priced instrument, keyed by symbol.
    Instrument(Symbol),
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AssetId::Fixed(a) => write!(f, "{a}"),
            AssetId::Instrument(s) => write!(f, "{s}"),
        }
    }
}

impl From<FixedAsset> for AssetId {
    fn from(a: FixedAsset) -> Self {
        AssetId::Fixed(a)
    }
}

impl From<Symbol> for AssetId {
    fn from(s: Symbol) -> Self {
        AssetId::Instrument(s)
    }
}

/// Static description of a priced instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InstrumentSpec {
    pub symbol: Symbol,
    /// Display name.
    pub name: String,
    pub kind: InstrumentKind,
    /// Opening price in cash units (> 0).
    pub initial_price: Decimal,
    /// Annual log drift (e.g., 0.08).
    pub drift: f64,
    /// Annual log volatility (>= 0).
    pub volatility: f64,
}

/// Direction of a game event's cash effect.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Income,
    Expense,
}

/// A discrete income or expense occurrence. `cost` is always a positive
/// magnitude; the sign comes from `kind`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameEvent {
    pub id: u64,
    pub kind: EventKind,
    pub title: String,
    pub description: String,
    pub cost: Decimal,
}

/// Template the event generator draws from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventTemplate {
    pub kind: EventKind,
    pub title: String,
    pub description: String,
    /// Lower bound of the drawn cost (> 0).
    pub min_cost: Decimal,
    /// Upper bound of the drawn cost (>= min_cost).
    pub max_cost: Decimal,
}

/// Game difficulty preset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        };
        f.write_str(s)
    }
}

impl FromStr for Difficulty {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" | "normal" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ConfigError::UnknownDifficulty(other.to_string())),
        }
    }
}

/// Annual base return rates in percent for the fixed-rate classes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BaseRates {
    pub savings: Decimal,
    pub fixed_deposit: Decimal,
    pub index_fund: Decimal,
    pub gold: Decimal,
}

impl BaseRates {
    pub fn get(&self, asset: FixedAsset) -> Decimal {
        match asset {
            FixedAsset::Savings => self.savings,
            FixedAsset::FixedDeposit => self.fixed_deposit,
            FixedAsset::IndexFund => self.index_fund,
            FixedAsset::Gold => self.gold,
        }
    }
}

impl Default for BaseRates {
    fn default() -> Self {
        Self {
            savings: Decimal::new(4, 0),
            fixed_deposit: Decimal::new(65, 1),
            index_fund: Decimal::new(12, 0),
            gold: Decimal::new(8, 0),
        }
    }
}

/// How often random events are rolled.
///
/// The roll happens once per simulated month boundary, only after
/// `min_interval_months` have passed since the previous event.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventCadence {
    /// Probability of an event per eligible month in [0, 1].
    pub probability_per_month: f64,
    /// Minimum months between two events.
    pub min_interval_months: u32,
    /// Multiplier applied to template costs.
    pub cost_scale: Decimal,
}

impl EventCadence {
    /// Cadence that never produces an event.
    pub fn disabled() -> Self {
        Self {
            probability_per_month: 0.0,
            min_interval_months: 0,
            cost_scale: Decimal::ONE,
        }
    }
}

impl Default for EventCadence {
    fn default() -> Self {
        Self {
            probability_per_month: 0.2,
            min_interval_months: 2,
            cost_scale: Decimal::ONE,
        }
    }
}

/// Parameters of the AI competitor's net-worth trajectory.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CompetitorConfig {
    /// Mean annual growth (e.g., 0.11 = 11%).
    pub annual_growth: f64,
    /// Relative jitter on each monthly step in [0, 1).
    pub jitter: f64,
}

impl Default for CompetitorConfig {
    fn default() -> Self {
        Self {
            annual_growth: 0.11,
            jitter: 0.5,
        }
    }
}

/// Full game configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub difficulty: Difficulty,
    /// Cash at game start.
    pub starting_cash: Decimal,
    /// Length of the game in simulated years.
    pub years: u32,
    /// Real milliseconds that make up one simulated year.
    pub real_ms_per_year: u64,
    /// Salary credited at each month boundary.
    pub monthly_income: Decimal,
    /// Living costs debited at each month boundary.
    pub monthly_expenses: Decimal,
    pub base_rates: BaseRates,
    /// Relative bound of the yearly rate perturbation (0.10 = ±10%).
    pub rate_jitter: f64,
    /// Bound on a single tick's log return.
    pub max_price_move: f64,
    pub instruments: Vec<InstrumentSpec>,
    pub events: EventCadence,
    pub event_templates: Vec<EventTemplate>,
    pub competitor: CompetitorConfig,
    /// Seed for the default random source.
    pub rng_seed: u64,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self::for_difficulty(Difficulty::Medium)
    }
}

impl GameConfig {
    /// Preset configuration for a difficulty.
    pub fn for_difficulty(difficulty: Difficulty) -> Self {
        let (cash, income, expenses, cadence, growth) = match difficulty {
            Difficulty::Easy => (
                150_000,
                6_000,
                3_500,
                EventCadence {
                    probability_per_month: 0.15,
                    min_interval_months: 3,
                    cost_scale: Decimal::new(75, 2),
                },
                0.08,
            ),
            Difficulty::Medium => (100_000, 5_000, 3_500, EventCadence::default(), 0.11),
            Difficulty::Hard => (
                75_000,
                4_500,
                3_800,
                EventCadence {
                    probability_per_month: 0.3,
                    min_interval_months: 1,
                    cost_scale: Decimal::new(14, 1),
                },
                0.14,
            ),
        };
        Self {
            difficulty,
            starting_cash: Decimal::from(cash),
            years: 10,
            real_ms_per_year: 60_000,
            monthly_income: Decimal::from(income),
            monthly_expenses: Decimal::from(expenses),
            base_rates: BaseRates::default(),
            rate_jitter: 0.10,
            max_price_move: 0.25,
            instruments: default_instruments(),
            events: cadence,
            event_templates: default_event_templates(),
            competitor: CompetitorConfig {
                annual_growth: growth,
                ..CompetitorConfig::default()
            },
            rng_seed: 42,
        }
    }

    /// Parse a YAML document; missing fields fall back to the Medium preset.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let cfg: GameConfig =
            serde_yaml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate_config(&cfg)?;
        Ok(cfg)
    }

    /// Look up an instrument spec by symbol.
    pub fn instrument(&self, symbol: &Symbol) -> Option<&InstrumentSpec> {
        self.instruments.iter().find(|i| &i.symbol == symbol)
    }
}

fn instrument(
    symbol: &str,
    name: &str,
    kind: InstrumentKind,
    price: i64,
    drift: f64,
    volatility: f64,
) -> InstrumentSpec {
    InstrumentSpec {
        symbol: Symbol::from(symbol),
        name: name.to_string(),
        kind,
        initial_price: Decimal::from(price),
        drift,
        volatility,
    }
}

/// Default tradable universe.
pub fn default_instruments() -> Vec<InstrumentSpec> {
    use InstrumentKind::*;
    vec![
        instrument("TECH", "Nimbus Technologies", Stock, 250, 0.10, 0.30),
        instrument("BANK", "Harbor Bank", Stock, 120, 0.07, 0.20),
        instrument("PHARMA", "Vitalis Pharma", Stock, 180, 0.08, 0.25),
        instrument("ENERGY", "Solaris Energy", Stock, 90, 0.06, 0.35),
        instrument("BTC", "Bitcoin", Crypto, 30_000, 0.25, 0.80),
        instrument("ETH", "Ethereum", Crypto, 2_000, 0.25, 0.90),
        instrument("SOL", "Solana", Crypto, 50, 0.30, 1.10),
        instrument("CONDO", "City Condo", RealEstate, 150_000, 0.05, 0.08),
        instrument("OFFICE", "Office Unit", RealEstate, 400_000, 0.05, 0.10),
        instrument("VILLA", "Coastal Villa", RealEstate, 900_000, 0.06, 0.12),
    ]
}

fn template(kind: EventKind, title: &str, description: &str, min: i64, max: i64) -> EventTemplate {
    EventTemplate {
        kind,
        title: title.to_string(),
        description: description.to_string(),
        min_cost: Decimal::from(min),
        max_cost: Decimal::from(max),
    }
}

/// Default event catalog.
pub fn default_event_templates() -> Vec<EventTemplate> {
    use EventKind::*;
    vec![
        template(Income, "Performance bonus", "Your manager rewarded a strong year.", 5_000, 20_000),
        template(Income, "Tax refund", "You overpaid last year and got money back.", 2_000, 8_000),
        template(Income, "Freelance contract", "A side project paid off.", 3_000, 15_000),
        template(Income, "Inheritance", "A distant relative left you something.", 20_000, 60_000),
        template(Expense, "Medical emergency", "An unexpected hospital stay.", 5_000, 30_000),
        template(Expense, "Car breakdown", "The engine needs replacing.", 2_000, 12_000),
        template(Expense, "Home repairs", "The roof started leaking.", 5_000, 25_000),
        template(Expense, "Family wedding", "You are covering part of the celebration.", 10_000, 40_000),
        template(Expense, "Stolen laptop", "Your work laptop needs replacing.", 1_500, 4_000),
    ]
}

/// Final outcome of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    Win,
    Loss,
}

impl Outcome {
    /// The player wins only by strictly beating the competitor.
    pub fn decide(player: Decimal, ai: Decimal) -> Self {
        if player > ai {
            Outcome::Win
        } else {
            Outcome::Loss
        }
    }
}

/// Terminal record handed to the presentation layer at game over.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub player_score: Decimal,
    pub ai_score: Decimal,
    pub outcome: Outcome,
    pub difficulty: Difficulty,
    pub timestamp: DateTime<Utc>,
}

/// Recoverable errors reported for player actions.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GameError {
    /// Amount is non-positive or exceeds the available balance.
    #[error("invalid amount: {0}")]
    InvalidAmount(Decimal),
    /// Not enough cash or holdings value for the request.
    #[error("insufficient funds: need {needed}, have {available}")]
    InsufficientFunds { needed: Decimal, available: Decimal },
    /// Selling more units than owned.
    #[error("insufficient holdings of {symbol}: want {requested}, own {owned}")]
    InsufficientHoldings {
        symbol: Symbol,
        requested: u64,
        owned: u64,
    },
    #[error("unknown asset: {0}")]
    InvalidAsset(String),
    #[error("unknown symbol: {0}")]
    InvalidSymbol(Symbol),
    /// No event is outstanding.
    #[error("no pending event")]
    NoPendingEvent,
    /// The outstanding event is of the other kind.
    #[error("pending event is {actual:?}, expected {expected:?}")]
    EventKindMismatch {
        expected: EventKind,
        actual: EventKind,
    },
    /// A replacement configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Configuration errors.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("config parse error: {0}")]
    Parse(String),
    #[error("unknown difficulty: {0}")]
    UnknownDifficulty(String),
    /// Monetary value must be non-negative.
    #[error("negative monetary value for {0}")]
    NegativeMoney(&'static str),
    #[error("{0} must be > 0")]
    NonPositive(&'static str),
    /// Numeric field must be finite and within its range.
    #[error("{0} out of range")]
    OutOfRange(&'static str),
    #[error("duplicate symbol: {0}")]
    DuplicateSymbol(Symbol),
    #[error("invalid event template: {0}")]
    InvalidTemplate(String),
}

fn check_fraction(v: f64, name: &'static str) -> Result<(), ConfigError> {
    if !v.is_finite() || !(0.0..1.0).contains(&v) {
        return Err(ConfigError::OutOfRange(name));
    }
    Ok(())
}

/// Validate a game configuration.
pub fn validate_config(cfg: &GameConfig) -> Result<(), ConfigError> {
    if cfg.starting_cash < Decimal::ZERO {
        return Err(ConfigError::NegativeMoney("starting_cash"));
    }
    if cfg.monthly_income < Decimal::ZERO || cfg.monthly_expenses < Decimal::ZERO {
        return Err(ConfigError::NegativeMoney("monthly cashflow"));
    }
    if cfg.years == 0 {
        return Err(ConfigError::NonPositive("years"));
    }
    if cfg.real_ms_per_year == 0 {
        return Err(ConfigError::NonPositive("real_ms_per_year"));
    }
    for asset in FixedAsset::ALL {
        if cfg.base_rates.get(asset) < Decimal::ZERO {
            return Err(ConfigError::OutOfRange("base_rates"));
        }
    }
    check_fraction(cfg.rate_jitter, "rate_jitter")?;
    if !cfg.max_price_move.is_finite() || cfg.max_price_move <= 0.0 {
        return Err(ConfigError::NonPositive("max_price_move"));
    }
    let mut seen = BTreeSet::new();
    for i in &cfg.instruments {
        if !seen.insert(&i.symbol) {
            return Err(ConfigError::DuplicateSymbol(i.symbol.clone()));
        }
        if i.initial_price <= Decimal::ZERO {
            return Err(ConfigError::NonPositive("initial_price"));
        }
        if !i.drift.is_finite() || !i.volatility.is_finite() || i.volatility < 0.0 {
            return Err(ConfigError::OutOfRange("instrument volatility"));
        }
    }
    let p = cfg.events.probability_per_month;
    if !p.is_finite() || !(0.0..=1.0).contains(&p) {
        return Err(ConfigError::OutOfRange("probability_per_month"));
    }
    if cfg.events.cost_scale <= Decimal::ZERO {
        return Err(ConfigError::NonPositive("cost_scale"));
    }
    for t in &cfg.event_templates {
        if t.min_cost <= Decimal::ZERO || t.max_cost < t.min_cost {
            return Err(ConfigError::InvalidTemplate(t.title.clone()));
        }
    }
    if !cfg.competitor.annual_growth.is_finite() {
        return Err(ConfigError::OutOfRange("annual_growth"));
    }
    check_fraction(cfg.competitor.jitter, "competitor jitter")?;
    Ok(())
}
