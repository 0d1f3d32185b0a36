#![deny(warnings)]

//! ECS runtime for Decade Investor: clock, portfolio ledger, events,
//! settlement and the game controller that ties them into one tick pipeline.

pub mod clock;
pub mod events;
pub mod game;
pub mod ledger;
pub mod settlement;
pub mod ticker;

pub use clock::{Clock, ManualTimeSource, SystemTimeSource, TimeSource};
pub use events::{EventGenerator, PendingEvent};
pub use game::{Action, Game, GamePhase, GameSnapshot, InstrumentView, PositionView};
pub use ledger::{Holding, Ledger, Position};
pub use settlement::Settlement;
pub use ticker::{spawn, TickerHandle, TokioTimeSource};
