//! Change Consumer

mod consumer;

pub use consumer::ChangeConsumer;
