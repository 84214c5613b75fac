pub mod counter_actor;
pub mod counter_ops;
pub mod deck;
pub mod quote_service;

pub use counter_actor::{CounterActorMessage, CounterHandle};
pub use counter_ops::CounterOps;
pub use deck::QuoteDeck;
pub use quote_service::QuoteService;
