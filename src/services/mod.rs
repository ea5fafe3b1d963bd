pub mod events;
pub mod impact;
pub mod optimizer;
pub mod worker;
