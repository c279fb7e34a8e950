pub mod control;
pub mod extractor;
pub mod lock;
pub mod message_queue;
pub mod repository;

pub use control::*;
pub use extractor::*;
pub use lock::*;
pub use message_queue::*;
pub use repository::*;
