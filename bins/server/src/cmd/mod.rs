pub mod init_schema;
pub mod insert;
pub mod run;
