// Order sizing, position state and the rolling price window
pub mod position_manager;
pub mod price_window;
pub mod quantizer;

pub use position_manager::{ExitReason, OrderOutcome, Position, PositionManager};
pub use price_window::PriceWindow;
pub use quantizer::quantize;
