//! The stage library.
//!
//! Every stage is a plain value describing one step; nothing runs until a
//! pipeline is attached to a sink and started. Stages forward any outcome
//! they have no specific behavior for (a `map` forwards failures and
//! stops, a `catch` forwards successes).

pub mod catch;
pub mod consume;
pub mod eventual;
pub mod iterate;
pub mod just;
pub mod map;
pub mod raise;
pub mod reschedule;
pub mod terminal;
pub mod then;
pub mod until;

pub use catch::{Catch, catch};
pub use consume::{Reduce, collect, for_each, reduce};
pub use eventual::{Completer, Eventual, eventual};
pub use iterate::{Iterate, iterate};
pub use just::{Just, just};
pub use map::{Map, map};
pub use raise::{Raise, TryMap, raise, try_map};
pub use reschedule::{Preempt, Reschedule, preempt, reschedule, reschedule_after};
pub use terminal::{Terminal, run, spawn, start, terminal};
pub use then::{Then, then};
pub use until::{Until, until};
