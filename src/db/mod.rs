pub mod mock_sql_runner;
pub mod sql_runner;
pub mod sqlite_sql_runner;
