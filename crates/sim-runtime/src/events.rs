//! Random income/expense events rolled at month boundaries.

use bevy_ecs::prelude::Resource;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use sim_core::{EventCadence, EventKind, EventTemplate, GameConfig, GameEvent};
use sim_econ::RandomSource;
use tracing::debug;

/// The event awaiting acknowledgment or settlement, if any.
#[derive(Resource, Clone, Debug, Default)]
pub struct PendingEvent(pub Option<GameEvent>);

impl PendingEvent {
    pub fn is_pending(&self) -> bool {
        self.0.is_some()
    }

    pub fn kind(&self) -> Option<EventKind> {
        self.0.as_ref().map(|e| e.kind)
    }
}

/// Draws events from a template catalog on a Bernoulli-per-month schedule.
#[derive(Resource, Clone, Debug)]
pub struct EventGenerator {
    cadence: EventCadence,
    templates: Vec<EventTemplate>,
    next_id: u64,
    months_since_last: u32,
}

impl EventGenerator {
    pub fn new(cadence: EventCadence, templates: Vec<EventTemplate>) -> Self {
        Self {
            cadence,
            templates,
            next_id: 1,
            months_since_last: 0,
        }
    }

    pub fn from_config(cfg: &GameConfig) -> Self {
        Self::new(cfg.events.clone(), cfg.event_templates.clone())
    }

    /// Roll for one month boundary.
    pub fn on_month(&mut self, rng: &mut dyn RandomSource) -> Option<GameEvent> {
        self.months_since_last = self.months_since_last.saturating_add(1);
        if self.templates.is_empty() || self.months_since_last < self.cadence.min_interval_months {
            return None;
        }
        if !rng.chance(self.cadence.probability_per_month) {
            return None;
        }
        let event = self.draw(rng);
        self.months_since_last = 0;
        Some(event)
    }

    /// Build an event from a random template, ignoring the schedule.
    pub fn draw(&mut self, rng: &mut dyn RandomSource) -> GameEvent {
        let idx = rng.pick(self.templates.len());
        let t = &self.templates[idx];
        let cost = draw_cost(rng, t.min_cost, t.max_cost, self.cadence.cost_scale);
        let event = GameEvent {
            id: self.next_id,
            kind: t.kind,
            title: t.title.clone(),
            description: t.description.clone(),
            cost,
        };
        self.next_id += 1;
        debug!(id = event.id, title = %event.title, cost = %event.cost, "event drawn");
        event
    }

    /// Allocate an id for an externally supplied event.
    pub fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

/// Uniform cost in `[min, max]`, scaled and rounded to the nearest hundred
/// (never below one hundred).
fn draw_cost(rng: &mut dyn RandomSource, min: Decimal, max: Decimal, scale: Decimal) -> Decimal {
    let lo = min.to_f64().unwrap_or(0.0);
    let hi = max.to_f64().unwrap_or(lo);
    let raw = Decimal::from_f64(rng.uniform(lo, hi)).unwrap_or(min) * scale;
    let hundred = Decimal::ONE_HUNDRED;
    ((raw / hundred).round() * hundred).max(hundred)
}
