//! Reactive building blocks
//!
//! ```text
//! Observable<T>      value holder, notifies observers on change
//!     ▲
//! LiveValue<T>       Observable fed by an upstream task that runs only
//!                    while observed (plus a grace period)
//! ```

pub mod observable;
pub mod shared;

pub use observable::Observable;
pub use shared::{LiveValue, Publisher, SharingPolicy, Upstream};
