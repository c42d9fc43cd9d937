//! # Continua
//!
//! **Continua** is a runtime for composable continuations. Pipelines are
//! built from small *stages* joined with `>>`; each stage knows, at
//! compile time, what it accepts, what it produces and which errors it can
//! raise, so a whole pipeline carries a typed error set that the caller
//! matches exhaustively.
//!
//! Nothing runs until a pipeline is attached to a sink and started.
//! Completion is delivered through continuations rather than polled, and
//! every activation ends in exactly one outcome: a value, a typed failure,
//! or a stop caused by an [`Interrupt`].
//!
//! It offers:
//!
//! - **Single values and streams**: `just`, `map`, `then`, `eventual` and
//!   friends on one side; `iterate`, `until`, `collect`, `reduce` and
//!   `for_each` on the other
//! - **Typed errors**: `raise`, `try_map` and `catch` grow and shrink the
//!   error set
//! - **Scheduling contexts** with an inline cooperative scheduler and a
//!   pinned [`StaticThreadPool`]
//! - **Cooperative locking**: [`Lock`], [`synchronized`], [`wait`] and
//!   [`ConditionVariable`]
//! - **Fan-out**: [`concurrent`], [`concurrent_ordered`] and [`parallel`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use continua::{collect, iterate, map, run};
//!
//! let doubled = run(iterate(vec![1, 2, 3]) >> map(|x: i32| x * 2) >> collect::<Vec<_>>());
//! assert_eq!(doubled.ok(), Some(vec![2, 4, 6]));
//! ```
//!
//! ## Modules
//!
//! - [`compose`]: the continuation protocol and `>>`
//! - [`stages`]: the stage library
//! - [`scheduler`]: contexts, the default scheduler and the thread pool
//! - [`lock`]: the cooperative lock and its stages
//! - [`concurrent`]: fan-out over streams

mod erased;

pub mod compose;
pub mod concurrent;
pub mod error;
pub mod generator;
pub mod interrupt;
pub mod lock;
pub mod promise;
pub mod scheduler;
pub mod stages;
pub mod stream;
pub mod task;

pub use compose::{Attach, Continuation, Listener, Many, Single, Stage, build};
pub use concurrent::{concurrent, concurrent_ordered, parallel};
pub use erased::{Boxed, BoxedListener};
pub use error::{Cons, Error, Nil};
pub use generator::Generator;
pub use interrupt::{Handler, Interrupt};
pub use lock::{ConditionVariable, Lock, synchronized, wait};
pub use promise::{Future, Promise};
pub use scheduler::{Context, PoolBuilder, Requirements, Scheduler, StaticThreadPool};
pub use stages::{
    Completer, catch, collect, eventual, for_each, iterate, just, map, preempt, raise, reduce,
    reschedule, reschedule_after, run, spawn, start, terminal, then, try_map, until,
};
pub use stream::Stream;
pub use task::Task;
