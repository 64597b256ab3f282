//! Fan-out Dispatcher and the change pipeline that drives it

mod dispatcher;
mod pipeline;

pub use dispatcher::{DispatchConfig, DispatchReport, FanoutDispatcher, PushChannel};
pub use pipeline::ChangePipeline;
