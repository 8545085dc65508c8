//! Marionette Runtime - Frame loop infrastructure
//!
//! Provides the building blocks shared by every avatar component:
//! - `FrameClock` - accumulated virtual time with a fixed-step option for headless runs
//! - `Countdown` - `dt`-driven timer used instead of wall-clock callbacks
//! - `EventBus` - typed observer with subscribe/unsubscribe plus a drainable queue
//! - `RuntimeSystem` - trait for systems ticked by the render loop
//! - `PointerInput` / `InteractionType` - the raw interaction stream

mod clock;
mod countdown;
mod event_bus;
mod input;
mod system;

pub use clock::FrameClock;
pub use countdown::Countdown;
pub use event_bus::{EventBus, SubscriptionId};
pub use input::{InteractionType, PointerInput};
pub use system::RuntimeSystem;
