pub mod event;
pub mod grade;
pub mod schedule;
pub mod subscriber;

pub use event::*;
pub use grade::*;
pub use schedule::*;
pub use subscriber::*;
