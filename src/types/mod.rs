pub mod counter;
pub mod quote;
pub mod realtime;

pub use counter::{CountSource, CounterPhase, CounterRow, CounterSnapshot, QuoteStats};
pub use quote::{NewQuote, Quote, QuoteQuery, SortField, SortOrder};
pub use realtime::{ChangeEvent, ChangeFilter, ChangeKind};
