pub mod sqlite_entity_repository;
pub mod sqlite_run_repository;
pub mod sqlite_schedule_repository;

pub use sqlite_entity_repository::SqliteEntityRepository;
pub use sqlite_run_repository::SqliteRunRepository;
pub use sqlite_schedule_repository::SqliteSourceScheduleRepository;
