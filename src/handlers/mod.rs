pub mod event;

pub use event::{DispatchOutcome, DispatchSettings, EventDispatcher, chart_reference};
