// Position lifecycle, portfolio routing and the control loop
pub mod portfolio;
pub mod position;
pub mod scheduler;
pub mod sizing;

pub use portfolio::{PortfolioLimits, PortfolioManager, UpdateReport};
pub use position::{
    realized_profit, ClosedTrade, EntryPlan, OpenPosition, PositionExecutor, PositionState,
    PositionSummary,
};
pub use scheduler::{DecisionClock, DecisionScheduler, SchedulerConfig, TickReport};
pub use sizing::{align_to_step, is_step_aligned, lot_size_quantity};
