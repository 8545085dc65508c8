//! Runtime system trait

use marionette_core::Result;

/// A system that can be ticked by the render loop
///
/// Systems are updated in registration order with the frame delta in seconds.
/// The context type is whatever the host hands every system (usually the avatar rig).
pub trait RuntimeSystem<Ctx: ?Sized> {
    /// Called once before the first update
    fn initialize(&mut self, ctx: &mut Ctx) -> Result<()>;

    /// Called once per frame
    fn update(&mut self, ctx: &mut Ctx, dt: f64) -> Result<()>;

    /// Called when the system is being shut down. Must be safe to call twice.
    fn shutdown(&mut self) -> Result<()>;

    /// Human-readable name for this system
    fn name(&self) -> &str;
}
