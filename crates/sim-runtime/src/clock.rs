//! Compressed game clock and the time sources that drive it.

use bevy_ecs::prelude::Resource;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time as an offset from an arbitrary origin.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Wall-clock source backed by [`Instant`].
#[derive(Clone, Debug)]
pub struct SystemTimeSource {
    origin: Instant,
}

impl SystemTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Hand-driven source. Clones share the same reading, so a test can keep a
/// handle while the game owns another.
#[derive(Clone, Debug, Default)]
pub struct ManualTimeSource {
    now_ms: Arc<AtomicU64>,
}

impl ManualTimeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, at: Duration) {
        self.now_ms.store(at.as_millis() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_millis(self.now_ms.load(Ordering::SeqCst))
    }
}

/// Game clock: real time elapsed while running, compressed so that
/// `year_len` of real time is one simulated year.
///
/// Real time is banked by [`advance`](Clock::advance) and [`pause`](Clock::pause)
/// as pending credit; the game applies it with [`step`](Clock::step), at most
/// one month boundary at a time.
#[derive(Resource, Clone, Debug)]
pub struct Clock {
    elapsed: Duration,
    pending: Duration,
    year_len: Duration,
    total_years: u32,
    last: Option<Duration>,
    paused: bool,
    years_seen: u32,
    months_seen: u32,
}

impl Clock {
    pub fn new(year_len: Duration, total_years: u32) -> Self {
        Self {
            elapsed: Duration::ZERO,
            pending: Duration::ZERO,
            year_len: year_len.max(Duration::from_millis(1)),
            total_years,
            last: None,
            paused: false,
            years_seen: 0,
            months_seen: 0,
        }
    }

    /// Set the measurement origin without crediting any time.
    pub fn start(&mut self, now: Duration) {
        self.last = Some(now);
    }

    /// Bank the real time since the previous call; no-op while paused.
    /// Returns the time banked (clamped at the end of the game).
    pub fn advance(&mut self, now: Duration) -> Duration {
        if self.paused {
            return Duration::ZERO;
        }
        let Some(last) = self.last.replace(now) else {
            return Duration::ZERO;
        };
        let room = self
            .game_length()
            .saturating_sub(self.elapsed + self.pending);
        let banked = now.saturating_sub(last).min(room);
        self.pending += banked;
        banked
    }

    /// Bank time up to `now`, then stop. Pausing twice is harmless.
    pub fn pause(&mut self, now: Duration) {
        if self.paused {
            return;
        }
        self.advance(now);
        self.paused = true;
    }

    /// Restart measurement at `now`; time spent paused is never credited.
    pub fn resume(&mut self, now: Duration) {
        if !self.paused {
            return;
        }
        self.paused = false;
        self.last = Some(now);
    }

    /// Apply up to `max` of the banked time. Returns the time applied.
    pub fn step(&mut self, max: Duration) -> Duration {
        let moved = self.pending.min(max);
        self.pending -= moved;
        self.elapsed += moved;
        moved
    }

    /// Banked time not yet applied.
    pub fn pending(&self) -> Duration {
        self.pending
    }

    /// Drop banked time; the clock stays at the last applied instant.
    pub fn discard_pending(&mut self) -> Duration {
        std::mem::take(&mut self.pending)
    }

    /// Real time from `elapsed` to the next month boundary.
    pub fn until_next_month(&self) -> Duration {
        let year = self.year_len.as_nanos();
        let next = u128::from(self.months_elapsed()) + 1;
        // first instant at which months_elapsed() reaches `next`
        let at = (next * year).div_ceil(12);
        let gap = at.saturating_sub(self.elapsed.as_nanos());
        Duration::from_nanos(u64::try_from(gap).unwrap_or(u64::MAX))
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn game_length(&self) -> Duration {
        self.year_len * self.total_years
    }

    pub fn is_finished(&self) -> bool {
        self.elapsed >= self.game_length()
    }

    /// Completed simulated years.
    pub fn year(&self) -> u32 {
        (self.elapsed.as_nanos() / self.year_len.as_nanos()) as u32
    }

    /// Month within the current year, 0..12.
    pub fn month(&self) -> u32 {
        self.months_elapsed() % 12
    }

    /// Completed simulated months since the start.
    pub fn months_elapsed(&self) -> u32 {
        (self.elapsed.as_nanos() * 12 / self.year_len.as_nanos()) as u32
    }

    /// Simulated years a real duration corresponds to.
    pub fn to_years(&self, real: Duration) -> f64 {
        real.as_secs_f64() / self.year_len.as_secs_f64()
    }

    /// Year boundaries (1-based) crossed since the last call, each reported once.
    pub fn take_year_crossings(&mut self) -> Range<u32> {
        let now = self.year();
        let crossed = self.years_seen + 1..now + 1;
        self.years_seen = self.years_seen.max(now);
        crossed
    }

    /// Month boundaries (1-based, counted from the start) crossed since the
    /// last call, each reported once.
    pub fn take_month_crossings(&mut self) -> Range<u32> {
        let now = self.months_elapsed();
        let crossed = self.months_seen + 1..now + 1;
        self.months_seen = self.months_seen.max(now);
        crossed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const YEAR: Duration = Duration::from_millis(1_200);

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    fn started() -> Clock {
        let mut c = Clock::new(YEAR, 10);
        c.start(Duration::ZERO);
        c
    }

    /// Bank time up to `now` and apply all of it.
    fn run_to(c: &mut Clock, now: Duration) {
        c.advance(now);
        c.step(Duration::MAX);
    }

    #[test]
    fn derives_year_and_month() {
        let mut c = started();
        run_to(&mut c, ms(1_200 + 250));
        assert_eq!(c.year(), 1);
        assert_eq!(c.month(), 2);
        assert_eq!(c.months_elapsed(), 14);
    }

    #[test]
    fn advance_banks_until_stepped() {
        let mut c = started();
        assert_eq!(c.advance(ms(450)), ms(450));
        assert_eq!(c.elapsed(), Duration::ZERO);
        assert_eq!(c.pending(), ms(450));
        assert_eq!(c.step(ms(100)), ms(100));
        assert_eq!(c.elapsed(), ms(100));
        assert_eq!(c.pending(), ms(350));
        assert_eq!(c.discard_pending(), ms(350));
        assert_eq!(c.pending(), Duration::ZERO);
        assert_eq!(c.elapsed(), ms(100));
    }

    #[test]
    fn paused_advance_is_noop() {
        let mut c = started();
        c.advance(ms(100));
        c.pause(ms(200));
        assert_eq!(c.pending(), ms(200));
        assert_eq!(c.advance(ms(5_000)), Duration::ZERO);
        c.step(Duration::MAX);
        assert_eq!(c.elapsed(), ms(200));
    }

    #[test]
    fn pause_banks_pending_time_and_is_idempotent() {
        let mut c = started();
        c.pause(ms(300));
        c.pause(ms(900));
        assert_eq!(c.pending(), ms(300));
        c.resume(ms(1_000));
        run_to(&mut c, ms(1_100));
        assert_eq!(c.elapsed(), ms(400));
    }

    #[test]
    fn pause_resume_without_time_keeps_date() {
        let mut c = started();
        run_to(&mut c, ms(1_700));
        let before = (c.year(), c.month());
        c.pause(ms(1_700));
        c.resume(ms(1_700));
        run_to(&mut c, ms(1_700));
        assert_eq!((c.year(), c.month()), before);
    }

    #[test]
    fn month_boundaries_are_reachable_exactly() {
        let mut c = started();
        c.advance(ms(250));
        assert_eq!(c.until_next_month(), ms(100));
        c.step(c.until_next_month());
        assert_eq!(c.months_elapsed(), 1);
        assert_eq!(c.until_next_month(), ms(100));

        // a year length that does not divide into twelve
        let mut odd = Clock::new(Duration::from_nanos(1_000_003), 1);
        odd.start(Duration::ZERO);
        odd.advance(ms(2));
        for month in 1..=12 {
            odd.step(odd.until_next_month());
            assert_eq!(odd.months_elapsed(), month);
        }
        assert!(odd.is_finished());
    }

    #[test]
    fn crossings_reported_once() {
        let mut c = started();
        run_to(&mut c, ms(1_201));
        assert_eq!(c.take_year_crossings(), 1..2);
        run_to(&mut c, ms(1_201));
        assert!(c.take_year_crossings().is_empty());
        // an irregular jump over several boundaries reports each of them
        run_to(&mut c, ms(4_900));
        assert_eq!(c.take_year_crossings(), 2..5);
        assert_eq!(c.take_month_crossings(), 1..50);
        assert!(c.take_month_crossings().is_empty());
    }

    #[test]
    fn elapsed_clamps_at_game_end() {
        let mut c = started();
        run_to(&mut c, ms(60_000));
        assert!(c.is_finished());
        assert_eq!(c.year(), 10);
        assert_eq!(c.elapsed(), YEAR * 10);
        assert_eq!(c.take_year_crossings(), 1..11);
        assert_eq!(c.advance(ms(70_000)), Duration::ZERO);
    }

    #[test]
    fn first_advance_without_start_sets_origin() {
        let mut c = Clock::new(YEAR, 10);
        assert_eq!(c.advance(ms(500)), Duration::ZERO);
        assert_eq!(c.advance(ms(800)), ms(300));
    }

    #[test]
    fn manual_source_is_shared() {
        let a = ManualTimeSource::new();
        let b = a.clone();
        a.advance(ms(250));
        assert_eq!(b.now(), ms(250));
        b.set(ms(10));
        assert_eq!(a.now(), ms(10));
    }
}
